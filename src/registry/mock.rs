//! Recording in-memory registry for tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use super::traits::*;
use crate::types::{ContainerInfo, TokenId, TokenInfo};

/// A side-effecting call the registry received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    Create { container: String, name: String },
    Rename { container: String, token: String, name: String },
    Delete { container: String, token: String },
    PostMessage { channel: String, content: String },
}

#[derive(Debug, Clone)]
struct MockContainer {
    tokens: Vec<TokenInfo>,
    capacity: usize,
}

/// In-memory registry enforcing container capacity.
///
/// Failures can be injected per operation; failed calls are still recorded.
#[derive(Default)]
pub struct MockRegistry {
    containers: Mutex<HashMap<String, MockContainer>>,
    calls: Mutex<Vec<RegistryCall>>,
    next_id: AtomicU32,
    fail_create: Mutex<bool>,
    fail_rename: Mutex<bool>,
    fail_delete: Mutex<bool>,
    unreachable: Mutex<HashSet<String>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a container holding `used` placeholder tokens.
    pub fn with_container(self, id: &str, used: usize, capacity: usize) -> Self {
        let tokens = (0..used)
            .map(|i| TokenInfo {
                id: format!("{}-existing-{}", id, i),
                name: format!("existing_{}", i),
            })
            .collect();

        if let Ok(mut containers) = self.containers.lock() {
            containers.insert(id.to_string(), MockContainer { tokens, capacity });
        }
        self
    }

    /// Make `describe` fail for a container.
    pub fn with_unreachable(self, id: &str) -> Self {
        if let Ok(mut unreachable) = self.unreachable.lock() {
            unreachable.insert(id.to_string());
        }
        self
    }

    pub fn set_fail_create(&self, fail: bool) {
        if let Ok(mut f) = self.fail_create.lock() {
            *f = fail;
        }
    }

    pub fn set_fail_rename(&self, fail: bool) {
        if let Ok(mut f) = self.fail_rename.lock() {
            *f = fail;
        }
    }

    pub fn set_fail_delete(&self, fail: bool) {
        if let Ok(mut f) = self.fail_delete.lock() {
            *f = fail;
        }
    }

    /// All recorded side-effecting calls, in order.
    pub fn calls(&self) -> Vec<RegistryCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    /// Tokens currently in a container.
    pub fn tokens(&self, container: &str) -> Vec<TokenInfo> {
        self.containers
            .lock()
            .ok()
            .and_then(|c| c.get(container).map(|c| c.tokens.clone()))
            .unwrap_or_default()
    }

    fn record(&self, call: RegistryCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn flag(flag: &Mutex<bool>) -> bool {
        flag.lock().map(|f| *f).unwrap_or(false)
    }

    fn injected() -> RegistryError {
        RegistryError::Status {
            status: 500,
            body: "injected failure".to_string(),
        }
    }

    fn unknown_container(container: &str) -> RegistryError {
        RegistryError::Status {
            status: 404,
            body: format!("Unknown container {}", container),
        }
    }
}

#[async_trait]
impl TokenRegistry for MockRegistry {
    async fn describe(&self, container: &str) -> Result<ContainerInfo, RegistryError> {
        let unreachable = self
            .unreachable
            .lock()
            .map(|u| u.contains(container))
            .unwrap_or(false);
        if unreachable {
            return Err(RegistryError::Network("connection refused".to_string()));
        }

        let containers = self
            .containers
            .lock()
            .map_err(|e| RegistryError::Network(e.to_string()))?;
        let c = containers
            .get(container)
            .ok_or_else(|| Self::unknown_container(container))?;

        Ok(ContainerInfo {
            id: container.to_string(),
            tokens: c.tokens.clone(),
            capacity: c.capacity,
        })
    }

    async fn create(
        &self,
        container: &str,
        name: &str,
        _asset: &[u8],
    ) -> Result<TokenId, RegistryError> {
        self.record(RegistryCall::Create {
            container: container.to_string(),
            name: name.to_string(),
        });

        if Self::flag(&self.fail_create) {
            return Err(Self::injected());
        }

        let mut containers = self
            .containers
            .lock()
            .map_err(|e| RegistryError::Network(e.to_string()))?;
        let c = containers
            .get_mut(container)
            .ok_or_else(|| Self::unknown_container(container))?;

        if c.tokens.len() >= c.capacity {
            return Err(RegistryError::Status {
                status: 400,
                body: "Maximum number of emojis reached".to_string(),
            });
        }

        let id = format!("t{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        c.tokens.push(TokenInfo {
            id: id.clone(),
            name: name.to_string(),
        });
        Ok(id)
    }

    async fn rename(&self, container: &str, token: &str, name: &str) -> Result<(), RegistryError> {
        self.record(RegistryCall::Rename {
            container: container.to_string(),
            token: token.to_string(),
            name: name.to_string(),
        });

        if Self::flag(&self.fail_rename) {
            return Err(Self::injected());
        }

        let mut containers = self
            .containers
            .lock()
            .map_err(|e| RegistryError::Network(e.to_string()))?;
        let t = containers
            .get_mut(container)
            .and_then(|c| c.tokens.iter_mut().find(|t| t.id == token))
            .ok_or_else(|| RegistryError::Status {
                status: 404,
                body: "Unknown Emoji".to_string(),
            })?;
        t.name = name.to_string();
        Ok(())
    }

    async fn delete(&self, container: &str, token: &str) -> Result<(), RegistryError> {
        self.record(RegistryCall::Delete {
            container: container.to_string(),
            token: token.to_string(),
        });

        if Self::flag(&self.fail_delete) {
            return Err(Self::injected());
        }

        let mut containers = self
            .containers
            .lock()
            .map_err(|e| RegistryError::Network(e.to_string()))?;
        let c = containers
            .get_mut(container)
            .ok_or_else(|| Self::unknown_container(container))?;

        let before = c.tokens.len();
        c.tokens.retain(|t| t.id != token);
        if c.tokens.len() == before {
            return Err(RegistryError::Status {
                status: 404,
                body: "Unknown Emoji".to_string(),
            });
        }
        Ok(())
    }

    async fn post_message(&self, channel: &str, content: &str) -> Result<String, RegistryError> {
        self.record(RegistryCall::PostMessage {
            channel: channel.to_string(),
            content: content.to_string(),
        });
        Ok(format!("m{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_enforces_capacity() {
        let registry = MockRegistry::new().with_container("g1", 1, 2);

        registry.create("g1", "Alice", b"a").await.unwrap();
        let err = registry.create("g1", "Bob", b"b").await.unwrap_err();

        assert_eq!(err.status(), Some(400));
        assert_eq!(registry.describe("g1").await.unwrap().used(), 2);
        assert_eq!(registry.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_injected_failures_are_recorded() {
        let registry = MockRegistry::new().with_container("g1", 0, 50);
        let id = registry.create("g1", "Alice", b"a").await.unwrap();

        registry.set_fail_rename(true);
        assert!(registry.rename("g1", &id, "Alicia").await.is_err());
        assert_eq!(registry.tokens("g1")[0].name, "Alice");
        assert_eq!(registry.calls().len(), 2);
    }
}
