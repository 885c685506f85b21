//! HTTP appearance fetcher with a fingerprint-keyed disk cache.

use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use super::{fingerprint, AppearanceError, AppearanceFetcher, RetryPolicy};
use crate::types::Appearance;

/// Reads `GET {base}/avatars/{key}?overlay` and caches each distinct asset
/// as `{cache_dir}/{fingerprint}.png`.
pub struct HttpAppearanceFetcher {
    client: Client,
    base_url: String,
    cache_dir: PathBuf,
    retry: RetryPolicy,
}

impl HttpAppearanceFetcher {
    pub fn new(
        base_url: impl Into<String>,
        cache_dir: PathBuf,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, AppearanceError> {
        std::fs::create_dir_all(&cache_dir).map_err(|e| AppearanceError::Cache(e.to_string()))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppearanceError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache_dir,
            retry,
        })
    }

    /// Cache location for a fingerprint.
    pub fn cached_path(&self, fingerprint: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.png", fingerprint))
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, AppearanceError> {
        let url = format!("{}/avatars/{}?overlay", self.base_url, key);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppearanceError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppearanceError::Status {
                key: key.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppearanceError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn download_with_retry(&self, key: &str) -> Result<Vec<u8>, AppearanceError> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.download(key).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempts >= self.retry.max_attempts => {
                    return Err(AppearanceError::RetriesExhausted {
                        key: key.to_string(),
                        attempts,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = self.retry.delay_after(attempts);
                    warn!(
                        identity = %key,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Appearance fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn store_if_absent(path: &Path, bytes: &[u8]) -> Result<(), AppearanceError> {
    if path.exists() {
        return Ok(());
    }
    std::fs::write(path, bytes).map_err(|e| AppearanceError::Cache(e.to_string()))
}

#[async_trait]
impl AppearanceFetcher for HttpAppearanceFetcher {
    async fn fetch(&self, key: &str) -> Result<Appearance, AppearanceError> {
        let bytes = self.download_with_retry(key).await?;
        let fingerprint = fingerprint(&bytes);

        store_if_absent(&self.cached_path(&fingerprint), &bytes)?;
        debug!(identity = %key, fingerprint = %fingerprint, "Fetched appearance");

        Ok(Appearance { fingerprint, bytes })
    }
}
