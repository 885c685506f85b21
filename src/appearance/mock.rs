//! Fixed appearances for tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use super::{fingerprint, AppearanceError, AppearanceFetcher};
use crate::types::Appearance;

/// Serves configured asset bytes per identity key.
///
/// Unknown keys get an asset derived from the key itself.
#[derive(Default)]
pub struct MockAppearance {
    assets: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<Vec<String>>,
    call_count: AtomicU32,
}

impl MockAppearance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(self, key: &str) -> Self {
        if let Ok(mut failing) = self.failing.lock() {
            failing.push(key.to_string());
        }
        self
    }

    /// Change an identity's asset between runs.
    pub fn set_asset(&self, key: &str, bytes: &[u8]) {
        if let Ok(mut assets) = self.assets.lock() {
            assets.insert(key.to_string(), bytes.to_vec());
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AppearanceFetcher for MockAppearance {
    async fn fetch(&self, key: &str) -> Result<Appearance, AppearanceError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let fails = self
            .failing
            .lock()
            .map(|f| f.iter().any(|k| k == key))
            .unwrap_or(false);
        if fails {
            return Err(AppearanceError::RetriesExhausted {
                key: key.to_string(),
                attempts: 3,
                last_error: "mock failure".to_string(),
            });
        }

        let bytes = self
            .assets
            .lock()
            .ok()
            .and_then(|a| a.get(key).cloned())
            .unwrap_or_else(|| format!("asset-{}", key).into_bytes());

        Ok(Appearance {
            fingerprint: fingerprint(&bytes),
            bytes,
        })
    }
}
