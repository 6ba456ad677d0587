//! Review artifact uploader
//!
//! Pushes review screenshots to the external object store and hands
//! back public URLs. Keys are content hashes, so re-uploading the
//! same bytes is idempotent and yields the same URL. Upload failure
//! is never fatal to a review; callers fall back to local paths.

use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use adw_core::Config;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("uploader not configured (ARTIFACT_STORE_URL unset)")]
    NotConfigured,
    #[error("upload failed: {0}")]
    Failed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, UploadError>;

impl From<UploadError> for adw_core::Error {
    fn from(err: UploadError) -> Self {
        adw_core::Error::UploadFailed(err.to_string())
    }
}

pub struct ArtifactUploader {
    client: reqwest::Client,
    store_url: Option<String>,
    public_url: Option<String>,
}

impl ArtifactUploader {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            store_url: config.artifact_store_url.clone(),
            public_url: config.artifact_public_url.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.store_url.is_some()
    }

    /// Upload one file, returning its public URL.
    pub async fn upload(&self, local_path: &Path) -> Result<String> {
        let store_url = self
            .store_url
            .as_deref()
            .ok_or(UploadError::NotConfigured)?;

        let bytes = tokio::fs::read(local_path).await?;
        let key = object_key(&bytes, local_path);

        let put_url = format!("{}/{}", store_url.trim_end_matches('/'), key);
        debug!(path = %local_path.display(), key = %key, "Uploading artifact");

        let response = self
            .client
            .put(&put_url)
            .body(bytes)
            .send()
            .await
            .map_err(|e| UploadError::Failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UploadError::Failed(format!(
                "{} returned {}",
                put_url,
                response.status()
            )));
        }

        let public_base = self.public_url.as_deref().unwrap_or(store_url);
        let url = format!("{}/{}", public_base.trim_end_matches('/'), key);
        info!(url = %url, "Uploaded artifact");
        Ok(url)
    }
}

/// Hex SHA-256 of the content plus the original extension.
fn object_key(bytes: &[u8], local_path: &Path) -> String {
    let hash = Sha256::digest(bytes);
    let hex: String = hash.iter().map(|b| format!("{b:02x}")).collect();
    match local_path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{hex}.{ext}"),
        None => hex,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_is_content_addressed() {
        let a = object_key(b"screenshot bytes", Path::new("img/home.png"));
        let b = object_key(b"screenshot bytes", Path::new("elsewhere/copy.png"));
        let c = object_key(b"different bytes", Path::new("img/home.png"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.ends_with(".png"));
    }

    #[test]
    fn test_object_key_without_extension() {
        let key = object_key(b"x", Path::new("artifact"));
        assert_eq!(key.len(), 64);
    }

    #[tokio::test]
    async fn test_unconfigured_uploader_errors() {
        let uploader = ArtifactUploader {
            client: reqwest::Client::new(),
            store_url: None,
            public_url: None,
        };
        assert!(!uploader.is_configured());
        let err = uploader.upload(Path::new("/nonexistent.png")).await;
        assert!(matches!(err, Err(UploadError::NotConfigured)));
    }
}
