use chrono::Utc;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Writes the images seen by OCR to a directory for later inspection.
///
/// Disabled when no directory is configured. Write failures are logged and
/// otherwise ignored; artifacts never affect an analysis result.
#[derive(Debug, Default)]
pub struct DebugArtifacts {
    dir: Option<PathBuf>,
    seq: AtomicU64,
}

impl DebugArtifacts {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir, seq: AtomicU64::new(0) }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Save `bytes` as `<prefix>-<timestamp>-<n>.png`, returning the written path
    pub async fn save(&self, bytes: &[u8], prefix: &str) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        let timestamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string();
        let path = dir.join(format!("{}-{}-{}.png", prefix, timestamp, n));

        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!("Failed to create debug directory {}: {}", dir.display(), e);
            return None;
        }
        match tokio::fs::write(&path, bytes).await {
            Ok(()) => {
                debug!("Saved debug image {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Failed to save debug image {}: {}", path.display(), e);
                None
            }
        }
    }
}
