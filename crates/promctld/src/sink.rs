//! Writes rendered config to the local filesystem.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use promctl_engine::{ConfigSink, SinkError};

/// Writes via a sibling temp file and a rename, so the managed server never
/// sees a half-written document.
#[derive(Debug, Default, Clone)]
pub struct FsConfigSink;

#[async_trait]
impl ConfigSink for FsConfigSink {
    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), SinkError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SinkError::new(path, e))?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");

        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| SinkError::new(path, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| SinkError::new(path, e))?;

        debug!(path = %path.display(), bytes = bytes.len(), "config file replaced");
        Ok(())
    }
}
