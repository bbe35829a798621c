//! Default template resolution.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{info, warn};

use crate::error::WorkerResult;

/// Make sure the configured default template is present under its
/// expected name.
///
/// Templates uploaded through some tools end up as `template.png.png`.
/// When the configured file is absent but such a sibling exists, the
/// sibling is copied into place. Returns `true` when a copy was made.
pub async fn ensure_default_template(path: &Path) -> WorkerResult<bool> {
    if fs::try_exists(path).await? {
        return Ok(false);
    }

    let doubled = doubled_extension(path);
    if fs::try_exists(&doubled).await? {
        fs::copy(&doubled, path).await?;
        info!(
            from = %doubled.display(),
            to = %path.display(),
            "Restored default template from doubled extension"
        );
        return Ok(true);
    }

    warn!(path = %path.display(), "Default template not found");
    Ok(false)
}

fn doubled_extension(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    match path.extension() {
        Some(ext) => {
            name.push(".");
            name.push(ext);
        }
        None => name.push(".png"),
    }
    PathBuf::from(name)
}
