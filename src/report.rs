//! Run reporting.
//!
//! The engine reports every identity transition to an injected `Reporter`
//! instead of a process-wide logger. `TracingReporter` forwards to `tracing`;
//! `MemoryReporter` keeps the events for inspection.

use serde::Serialize;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::registry::RegistryError;
use crate::types::{ContainerId, IdentityKey, TokenId};

/// Remote operation that was tolerated after failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteOp {
    Rename,
    Delete,
}

/// A rename/delete that failed remotely while local state advanced anyway.
///
/// These mark local/remote divergence that may need manual reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteWarning {
    pub op: RemoteOp,
    pub identity: IdentityKey,
    pub token: TokenId,
    pub container: ContainerId,
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteWarning {
    pub fn new(
        op: RemoteOp,
        identity: &str,
        token: &str,
        container: &str,
        error: &RegistryError,
    ) -> Self {
        Self {
            op,
            identity: identity.to_string(),
            token: token.to_string(),
            container: container.to_string(),
            status: error.status(),
            message: error.to_string(),
        }
    }
}

/// Something that happened during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    RunStarted { run_id: String, identities: usize },
    Classified {
        identity: IdentityKey,
        is_new: bool,
        is_renamed: bool,
        is_changed: bool,
    },
    Created { identity: IdentityKey, token: TokenId, container: ContainerId },
    Renamed { identity: IdentityKey, token: TokenId, name: String },
    Deleted { identity: IdentityKey, token: TokenId },
    RenameSkipped { identity: IdentityKey },
    /// Assignment dropped because its token had no container record
    DanglingAssignment { identity: IdentityKey, token: TokenId },
    Pruned { identity: IdentityKey, token: Option<TokenId> },
    Warning(RemoteWarning),
    RunFinished { run_id: String, stats: RunStats },
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub processed: usize,
    pub created: usize,
    pub renamed: usize,
    pub deleted: usize,
    pub pruned: usize,
    pub warnings: usize,
    /// Dangling assignments dropped
    pub repaired: usize,
}

impl RunStats {
    /// Whether the run touched the remote registry at all.
    pub fn had_side_effects(&self) -> bool {
        self.created + self.renamed + self.deleted + self.warnings > 0
    }
}

/// Receives run events.
pub trait Reporter: Send + Sync {
    fn record(&self, event: SyncEvent);
}

/// Structured log lines per event.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn record(&self, event: SyncEvent) {
        match event {
            SyncEvent::RunStarted { run_id, identities } => {
                info!(run_id = %run_id, identities, "Reconciliation started");
            }
            SyncEvent::Classified {
                identity,
                is_new,
                is_renamed,
                is_changed,
            } => {
                info!(identity = %identity, is_new, is_renamed, is_changed, "Processing identity");
            }
            SyncEvent::Created {
                identity,
                token,
                container,
            } => {
                info!(identity = %identity, token = %token, container = %container, "Token created");
            }
            SyncEvent::Renamed {
                identity,
                token,
                name,
            } => {
                info!(identity = %identity, token = %token, name = %name, "Token renamed");
            }
            SyncEvent::Deleted { identity, token } => {
                info!(identity = %identity, token = %token, "Token deleted for appearance change");
            }
            SyncEvent::RenameSkipped { identity } => {
                info!(identity = %identity, "Rename skipped, no token currently assigned");
            }
            SyncEvent::DanglingAssignment { identity, token } => {
                warn!(
                    identity = %identity,
                    token = %token,
                    "Assigned token has no container record, dropping assignment; the remote token may be orphaned"
                );
            }
            SyncEvent::Pruned { identity, token } => {
                info!(identity = %identity, token = ?token, "Pruned identity from snapshot");
            }
            SyncEvent::Warning(w) => {
                warn!(
                    op = ?w.op,
                    identity = %w.identity,
                    token = %w.token,
                    container = %w.container,
                    status = ?w.status,
                    error = %w.message,
                    "Remote operation failed, local state advanced anyway"
                );
            }
            SyncEvent::RunFinished { run_id, stats } => {
                info!(
                    run_id = %run_id,
                    processed = stats.processed,
                    created = stats.created,
                    renamed = stats.renamed,
                    deleted = stats.deleted,
                    pruned = stats.pruned,
                    warnings = stats.warnings,
                    repaired = stats.repaired,
                    "Reconciliation finished"
                );
            }
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<SyncEvent>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Reporter for MemoryReporter {
    fn record(&self, event: SyncEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
