//! Face-region compositing for stylized portraits.
//!
//! This crate provides:
//! - Region selection from face detections, with a fixed fallback
//! - Cover-fit placement of the stylized image inside that region
//! - Feathered-mask compositing onto a copy of the template
//! - The `FaceLocator` seam for external face detection
//! - `FaceInserter`, which ties the above together over files on disk

pub mod compositor;
pub mod error;
pub mod face;
pub mod insert;
pub mod placement;
pub mod region;

pub use compositor::{feather_mask, Compositor, DEFAULT_FEATHER_RADIUS};
pub use error::{MediaError, MediaResult};
pub use face::{FaceLocator, NoFaceLocator};
pub use insert::FaceInserter;
pub use placement::{fit_and_center, Placement};
pub use region::select_region;
