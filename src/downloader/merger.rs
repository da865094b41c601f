//! Stream remuxing via ffmpeg

use crate::utils::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Remux separate video and audio streams into one container with
/// `ffmpeg -c copy`. No re-encoding happens.
pub async fn remux(video: &Path, audio: &Path, output: &Path) -> Result<()> {
    debug!(
        "Remuxing {} + {} -> {}",
        video.display(),
        audio.display(),
        output.display()
    );

    let status = Command::new("ffmpeg")
        .arg("-y")
        .arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-i")
        .arg(video)
        .arg("-i")
        .arg(audio)
        .arg("-c")
        .arg("copy")
        .arg(output)
        .status()
        .await
        .map_err(|e| Error::MergeFailed(format!("could not run ffmpeg: {}", e)))?;

    if !status.success() {
        return Err(Error::MergeFailed(format!(
            "ffmpeg exited with {}",
            status
        )));
    }

    info!("Merged streams into {}", output.display());
    Ok(())
}

/// Remove temporary stream files, logging rather than failing on errors.
pub async fn cleanup(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
