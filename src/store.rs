//! Persisted desired-state snapshot.
//!
//! The snapshot is four independent key/value documents. Each document is
//! replaced atomically on its own; there is no atomicity across documents.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::types::{ContainerId, IdentityKey, TokenId};

/// Display names document
pub const DISPLAY_NAMES_FILE: &str = "display-names.json";
/// Appearance fingerprints document
pub const FINGERPRINTS_FILE: &str = "fingerprints.json";
/// Token -> container document
pub const TOKEN_CONTAINERS_FILE: &str = "token-containers.json";
/// Identity -> token document
pub const TOKEN_ASSIGNMENTS_FILE: &str = "token-assignments.json";

/// The full desired-state bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// identity -> last known display name
    pub display_names: BTreeMap<IdentityKey, String>,
    /// identity -> fingerprint of the registered appearance
    pub fingerprints: BTreeMap<IdentityKey, String>,
    /// token -> container hosting it
    pub token_containers: BTreeMap<TokenId, ContainerId>,
    /// identity -> token
    pub token_assignments: BTreeMap<IdentityKey, TokenId>,
}

impl StateSnapshot {
    /// Token and container currently assigned to an identity.
    pub fn placement(&self, key: &str) -> Option<(&TokenId, &ContainerId)> {
        let token = self.token_assignments.get(key)?;
        let container = self.token_containers.get(token)?;
        Some((token, container))
    }

    /// Record a new token for an identity.
    pub fn assign(&mut self, key: &str, token: &str, container: &str) {
        self.token_assignments.insert(key.to_string(), token.to_string());
        self.token_containers.insert(token.to_string(), container.to_string());
    }

    /// Drop an identity's token records, returning the container it was in.
    pub fn unassign(&mut self, key: &str) -> Option<ContainerId> {
        let token = self.token_assignments.remove(key)?;
        self.token_containers.remove(&token)
    }

    /// Remove every trace of an identity.
    pub fn forget(&mut self, key: &str) {
        self.unassign(key);
        self.fingerprints.remove(key);
        self.display_names.remove(key);
    }

    /// Assignment and container maps reference exactly the same tokens.
    pub fn is_consistent(&self) -> bool {
        self.token_assignments.len() == self.token_containers.len()
            && self
                .token_assignments
                .values()
                .all(|t| self.token_containers.contains_key(t))
    }
}

/// State store errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Corrupt document {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Owner of the persisted snapshot.
pub trait StateStore: Send + Sync {
    /// Load the snapshot; absent documents load as empty maps.
    fn load(&self) -> Result<StateSnapshot, StoreError>;

    /// Persist all four documents unconditionally.
    fn save(&self, snapshot: &StateSnapshot) -> Result<(), StoreError>;
}

/// Four JSON documents in one directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_map<V: DeserializeOwned>(&self, name: &str) -> Result<BTreeMap<String, V>, StoreError> {
        let path = self.dir.join(name);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| StoreError::Io(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn write_map<V: Serialize>(&self, name: &str, map: &BTreeMap<String, V>) -> Result<(), StoreError> {
        let json = serde_json::to_vec(map).map_err(|e| StoreError::Io(e.to_string()))?;

        let mut file =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| StoreError::Io(e.to_string()))?;
        file.write_all(&json).map_err(|e| StoreError::Io(e.to_string()))?;
        file.flush().map_err(|e| StoreError::Io(e.to_string()))?;
        file.persist(self.dir.join(name))
            .map_err(|e| StoreError::Io(e.error.to_string()))?;
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<StateSnapshot, StoreError> {
        Ok(StateSnapshot {
            display_names: self.read_map(DISPLAY_NAMES_FILE)?,
            fingerprints: self.read_map(FINGERPRINTS_FILE)?,
            token_containers: self.read_map(TOKEN_CONTAINERS_FILE)?,
            token_assignments: self.read_map(TOKEN_ASSIGNMENTS_FILE)?,
        })
    }

    fn save(&self, snapshot: &StateSnapshot) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StoreError::Io(e.to_string()))?;

        self.write_map(DISPLAY_NAMES_FILE, &snapshot.display_names)?;
        self.write_map(FINGERPRINTS_FILE, &snapshot.fingerprints)?;
        self.write_map(TOKEN_CONTAINERS_FILE, &snapshot.token_containers)?;
        self.write_map(TOKEN_ASSIGNMENTS_FILE, &snapshot.token_assignments)?;
        Ok(())
    }
}

/// In-memory store that counts checkpoints.
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<StateSnapshot>,
    saves: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: StateSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            saves: AtomicU32::new(0),
        }
    }

    /// Last saved snapshot.
    pub fn current(&self) -> StateSnapshot {
        self.snapshot.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn save_count(&self) -> u32 {
        self.saves.load(Ordering::SeqCst)
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<StateSnapshot, StoreError> {
        self.snapshot
            .lock()
            .map(|s| s.clone())
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    fn save(&self, snapshot: &StateSnapshot) -> Result<(), StoreError> {
        let mut current = self
            .snapshot
            .lock()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        *current = snapshot.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
