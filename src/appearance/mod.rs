//! Appearance assets and their fingerprints.
//!
//! The fetcher is called exactly once per identity per run. Its fingerprint
//! is what change detection compares against the snapshot.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::types::Appearance;

pub use http::HttpAppearanceFetcher;
pub use mock::MockAppearance;

/// Appearance fetch errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum AppearanceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Asset for {key} returned HTTP {status}")]
    Status { key: String, status: u16 },

    #[error("Gave up on {key} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        key: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Cache error: {0}")]
    Cache(String),
}

impl AppearanceError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AppearanceError::Network(_) => true,
            AppearanceError::Status { status, .. } => *status == 429 || *status >= 500,
            AppearanceError::RetriesExhausted { .. } | AppearanceError::Cache(_) => false,
        }
    }
}

/// Fetches an identity's current appearance.
#[async_trait]
pub trait AppearanceFetcher: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Appearance, AppearanceError>;
}

/// Lowercase hex SHA-256 of the asset bytes.
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}
