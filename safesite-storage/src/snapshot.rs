// On-demand incident snapshots

use chrono::Local;
use safesite_core::{Error, LatestFrame, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Writes the last processed frame to `<dir>/incident_%Y%m%d_%H%M%S.jpg`
pub struct SnapshotService {
    frames: Arc<dyn LatestFrame>,
    dir: PathBuf,
}

impl SnapshotService {
    pub fn new(frames: Arc<dyn LatestFrame>, dir: impl Into<PathBuf>) -> Self {
        Self {
            frames,
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save the frame and return the file name (relative to the captures directory)
    pub async fn capture(&self) -> Result<String> {
        let jpeg = self.frames.latest_jpeg().ok_or(Error::NoFrame)?;

        tokio::fs::create_dir_all(&self.dir).await?;

        let stem = format!("incident_{}", Local::now().format("%Y%m%d_%H%M%S"));
        let mut suffix = 0u32;
        loop {
            let filename = match suffix {
                0 => format!("{}.jpg", stem),
                n => format!("{}_{}.jpg", stem, n),
            };
            let path = self.dir.join(&filename);
            // create_new claims the name atomically
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(mut file) => {
                    file.write_all(&jpeg).await?;
                    file.flush().await?;
                    info!("Snapshot saved to {}", path.display());
                    return Ok(filename);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
