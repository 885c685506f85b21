//! Core trait for the token registry.

use async_trait::async_trait;

use crate::types::{ContainerInfo, TokenId};

/// Registry errors.
///
/// Every non-success HTTP status surfaces as `Status` with its code and body.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl RegistryError {
    /// HTTP status, when the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            RegistryError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Create/rename/delete/list tokens in capacity-limited containers.
#[async_trait]
pub trait TokenRegistry: Send + Sync {
    /// Current tokens and slot capacity of a container.
    async fn describe(&self, container: &str) -> Result<ContainerInfo, RegistryError>;

    /// Create a token from a PNG asset, returning its id.
    async fn create(&self, container: &str, name: &str, asset: &[u8])
        -> Result<TokenId, RegistryError>;

    /// Rename a token in place.
    async fn rename(&self, container: &str, token: &str, name: &str) -> Result<(), RegistryError>;

    /// Remove a token.
    async fn delete(&self, container: &str, token: &str) -> Result<(), RegistryError>;

    /// Post a plain text message to a channel, returning the message id.
    async fn post_message(&self, channel: &str, content: &str) -> Result<String, RegistryError>;
}

/// Slot count granted by a container's premium tier.
pub fn capacity_for_tier(tier: u8) -> usize {
    match tier {
        0 => 50,
        1 => 100,
        2 => 150,
        _ => 250,
    }
}
