//! Run-level error taxonomy.
//!
//! Leaf collaborators keep their own error types; `SyncError` is what a
//! reconciliation run aborts with. Every variant is fatal and maps to a
//! distinct process exit code.

use crate::appearance::AppearanceError;
use crate::config::ConfigError;
use crate::registry::RegistryError;
use crate::roster::RosterError;
use crate::store::StoreError;
use crate::types::{ContainerId, IdentityKey, TokenId};

/// Fatal run errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Configuration is missing required values
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Roster fetch failed
    #[error("Roster unavailable: {0}")]
    Roster(#[from] RosterError),

    /// Container detail fetch failed
    #[error("Container {container} unavailable: {source}")]
    ContainerDirectory {
        container: ContainerId,
        #[source]
        source: RegistryError,
    },

    /// No container has a free slot
    #[error("No container has spare capacity for identity {identity}")]
    CapacityExhausted { identity: IdentityKey },

    /// Token creation failed
    #[error("Token creation failed for identity {identity}: {source}")]
    CreateFailed {
        identity: IdentityKey,
        #[source]
        source: RegistryError,
    },

    /// Registry returned a token id that is already assigned
    #[error("Registry returned token {token} for identity {identity}, but it is already assigned")]
    DuplicateToken { identity: IdentityKey, token: TokenId },

    /// Appearance fetch failed after retries
    #[error("Appearance fetch failed: {0}")]
    Appearance(#[from] AppearanceError),

    /// Snapshot could not be loaded or persisted
    #[error("State store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncError::Config(_) => 2,
            SyncError::Roster(_) | SyncError::ContainerDirectory { .. } => 3,
            SyncError::CapacityExhausted { .. } => 4,
            SyncError::CreateFailed { .. } | SyncError::DuplicateToken { .. } => 5,
            SyncError::Appearance(_) => 6,
            SyncError::Store(_) => 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = vec![
            SyncError::Config(ConfigError::MissingToken),
            SyncError::Roster(RosterError::Network("down".to_string())),
            SyncError::CapacityExhausted {
                identity: "u1".to_string(),
            },
            SyncError::CreateFailed {
                identity: "u1".to_string(),
                source: RegistryError::Status {
                    status: 400,
                    body: "bad".to_string(),
                },
            },
            SyncError::Appearance(AppearanceError::Network("timeout".to_string())),
            SyncError::Store(StoreError::Io("denied".to_string())),
        ];

        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        assert!(codes.iter().all(|c| *c != 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_duplicate_token_is_a_create_failure() {
        let err = SyncError::DuplicateToken {
            identity: "u2".to_string(),
            token: "e9".to_string(),
        };
        assert_eq!(err.exit_code(), 5);
        assert!(err.to_string().contains("e9"));
    }

    #[test]
    fn test_container_directory_shares_input_code() {
        let err = SyncError::ContainerDirectory {
            container: "g1".to_string(),
            source: RegistryError::Network("refused".to_string()),
        };
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("g1"));
    }
}
