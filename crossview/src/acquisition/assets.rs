//! Image asset downloads for accepted records.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::retry::RetryPolicy;
use super::sleep_or_cancel;
use crate::provider::{AsyncHttpClient, ProviderError};
use crate::record::Record;

/// Which images to download for each accepted record.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetConfig {
    /// Download a viewer thumbnail into `images/`.
    pub thumbs: bool,
    /// Target thumbnail size.
    pub thumb_size: u32,
    /// Download a larger image into `images_full/`.
    pub full: bool,
    /// Target size for the larger image.
    pub full_size: u32,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            thumbs: true,
            thumb_size: 256,
            full: false,
            full_size: 1024,
        }
    }
}

impl AssetConfig {
    /// No downloads at all.
    pub fn disabled() -> Self {
        Self {
            thumbs: false,
            full: false,
            ..Self::default()
        }
    }
}

/// Destination directories for downloaded images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDirs {
    pub images: PathBuf,
    pub images_full: PathBuf,
}

/// Path of a record's image inside `dir`.
pub fn image_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.jpg", id))
}

pub(crate) struct AssetFetcher<'a, C: AsyncHttpClient> {
    pub client: &'a C,
    pub config: &'a AssetConfig,
    pub dirs: &'a AssetDirs,
    pub retry: &'a RetryPolicy,
    pub cancel: &'a CancellationToken,
}

impl<C: AsyncHttpClient> AssetFetcher<'_, C> {
    /// Downloads the configured images and records the saved sizes.
    ///
    /// Failures leave the corresponding `*_saved_size` empty.
    pub async fn fetch(&self, mut record: Record) -> Record {
        if self.config.thumbs {
            record.thumb_saved_size = self
                .fetch_one(&record, self.config.thumb_size, &self.dirs.images)
                .await;
        }
        if self.config.full {
            record.full_saved_size = self
                .fetch_one(&record, self.config.full_size, &self.dirs.images_full)
                .await;
        }
        record
    }

    async fn fetch_one(&self, record: &Record, size: u32, dir: &Path) -> Option<u32> {
        let url = record.pick_thumb(size)?;
        let path = image_path(dir, &record.id);
        if path.exists() {
            debug!(id = %record.id, path = %path.display(), "Image already present");
            return Some(size);
        }

        match self.download(url, &path).await {
            Ok(()) => Some(size),
            Err(e) => {
                warn!(id = %record.id, size, error = %e, "Image download failed");
                None
            }
        }
    }

    async fn download(&self, url: &str, path: &Path) -> Result<(), ProviderError> {
        let mut retries = 0;
        let bytes = loop {
            if self.cancel.is_cancelled() {
                return Err(ProviderError::HttpError("cancelled".to_string()));
            }
            match self.client.get(url).await {
                Ok(bytes) => break bytes,
                Err(e) if e.kind().is_retryable() && self.retry.should_retry(retries) => {
                    let delay = self.retry.delay_for_retry(retries);
                    debug!(attempt = retries + 1, delay_ms = delay.as_millis() as u64, error = %e, "Retrying image download");
                    if !sleep_or_cancel(self.cancel, delay).await {
                        return Err(ProviderError::HttpError("cancelled".to_string()));
                    }
                    retries += 1;
                }
                Err(e) => return Err(e),
            }
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProviderError::HttpError(format!("create {}: {}", parent.display(), e)))?;
        }
        let mut temp = path.as_os_str().to_owned();
        temp.push(".tmp");
        tokio::fs::write(&temp, &bytes)
            .await
            .map_err(|e| ProviderError::HttpError(format!("write {}: {}", path.display(), e)))?;
        tokio::fs::rename(&temp, path)
            .await
            .map_err(|e| ProviderError::HttpError(format!("rename {}: {}", path.display(), e)))?;
        Ok(())
    }
}
