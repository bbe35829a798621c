//! Clients for the external ML services.
//!
//! - `ReplicateClient`: image stylization through Replicate predictions
//! - `HttpFaceLocator`: face boxes from a detection service
//! - `extract`: tolerant parsing of the stylization output field

pub mod error;
pub mod extract;
pub mod face;
pub mod replicate;
pub mod stylizer;

pub use error::{MlError, MlResult};
pub use extract::extract_output_reference;
pub use face::HttpFaceLocator;
pub use replicate::{ReplicateClient, ReplicateConfig};
pub use stylizer::{StylizeRequest, Stylizer};
