//! Shared domain types.

use serde::{Deserialize, Serialize};

/// Stable identity key (a UUID in practice).
pub type IdentityKey = String;

/// Remote token id assigned by the registry.
pub type TokenId = String;

/// Remote container id.
pub type ContainerId = String;

/// One tracked roster member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable key
    pub key: IdentityKey,
    /// Current display name, used as the token name
    pub display_name: String,
}

impl Identity {
    pub fn new(key: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
        }
    }
}

/// A token as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub id: TokenId,
    pub name: String,
}

/// Live view of one container from the Container Directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: ContainerId,
    /// Tokens currently hosted
    pub tokens: Vec<TokenInfo>,
    /// Fixed slot count
    pub capacity: usize,
}

impl ContainerInfo {
    /// Number of occupied slots.
    pub fn used(&self) -> usize {
        self.tokens.len()
    }
}

/// Fetched appearance asset with its content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appearance {
    /// Lowercase hex content hash
    pub fingerprint: String,
    /// Raw asset bytes (PNG)
    pub bytes: Vec<u8>,
}
