//! Reconciliation engine.
//!
//! Converges the token registry towards the roster one identity at a time:
//!
//! 1. drop a dangling assignment (token without a container record)
//! 2. fetch its appearance and `classify` it against the working snapshot
//!    (new / renamed / changed)
//! 3. apply side effects in a fixed order: delete (appearance change),
//!    rename, create
//! 4. checkpoint the whole snapshot
//!
//! After the roster is exhausted, identities that were not seen are pruned
//! from the snapshot. Pruning never deletes remote tokens.
//!
//! An appearance change is a two-phase replace: the old token is deleted
//! and the identity becomes tokenless, so the next run recreates it through
//! the "new" path.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info_span, Instrument};

use crate::allocation::ContainerPool;
use crate::appearance::AppearanceFetcher;
use crate::config::{NewIdentityRule, SyncConfig};
use crate::error::SyncError;
use crate::registry::{RegistryError, TokenRegistry};
use crate::report::{RemoteOp, RemoteWarning, Reporter, RunStats, SyncEvent};
use crate::roster::{collect_roster, RosterSource};
use crate::store::{StateSnapshot, StateStore};
use crate::types::{Identity, IdentityKey};

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub new_identity_rule: NewIdentityRule,
    /// Pause after each identity, for registry rate limits
    pub step_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            new_identity_rule: NewIdentityRule::default(),
            step_delay: Duration::from_secs(1),
        }
    }
}

impl From<&SyncConfig> for EngineConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            new_identity_rule: config.new_identity_rule,
            step_delay: Duration::from_millis(config.step_delay_ms),
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    /// Snapshot as persisted at the end of the run
    pub snapshot: StateSnapshot,
    /// Occupancy after the run
    pub containers: ContainerPool,
    pub stats: RunStats,
    /// Tolerated rename/delete failures
    pub warnings: Vec<RemoteWarning>,
}

/// Flags derived from the roster name and the working snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    pub is_new: bool,
    pub is_renamed: bool,
    pub is_changed: bool,
}

/// Mutable state of one run.
struct RunState {
    snapshot: StateSnapshot,
    pool: ContainerPool,
    stats: RunStats,
    warnings: Vec<RemoteWarning>,
}

/// Drives the registry towards the roster.
pub struct Reconciler {
    registry: Arc<dyn TokenRegistry>,
    appearance: Arc<dyn AppearanceFetcher>,
    store: Arc<dyn StateStore>,
    reporter: Arc<dyn Reporter>,
    config: EngineConfig,
}

impl Reconciler {
    pub fn new(
        registry: Arc<dyn TokenRegistry>,
        appearance: Arc<dyn AppearanceFetcher>,
        store: Arc<dyn StateStore>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            registry,
            appearance,
            store,
            reporter,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Full run: fetch the roster, survey containers, load the snapshot and
    /// reconcile.
    ///
    /// Roster and container failures abort before any state is touched.
    pub async fn run(
        &self,
        roster_source: &dyn RosterSource,
        groups: &[String],
        container_ids: &[String],
    ) -> Result<RunOutcome, SyncError> {
        let roster = collect_roster(roster_source, groups).await?;
        let pool = ContainerPool::survey(self.registry.as_ref(), container_ids).await?;
        let snapshot = self.store.load()?;

        self.reconcile(&roster, pool, snapshot).await
    }

    /// Reconcile a roster against a snapshot, checkpointing after every
    /// identity.
    pub async fn reconcile(
        &self,
        roster: &[Identity],
        pool: ContainerPool,
        snapshot: StateSnapshot,
    ) -> Result<RunOutcome, SyncError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        self.reporter.record(SyncEvent::RunStarted {
            run_id: run_id.clone(),
            identities: roster.len(),
        });

        let mut state = RunState {
            snapshot,
            pool,
            stats: RunStats::default(),
            warnings: Vec::new(),
        };
        let mut seen: HashSet<&str> = HashSet::with_capacity(roster.len());

        for identity in roster {
            if !seen.insert(identity.key.as_str()) {
                continue;
            }

            let span = info_span!("identity", key = %identity.key, name = %identity.display_name);
            self.step(identity, &mut state).instrument(span).await?;

            state.stats.processed += 1;
            self.store.save(&state.snapshot)?;

            if !self.config.step_delay.is_zero() {
                tokio::time::sleep(self.config.step_delay).await;
            }
        }

        self.prune(&seen, &mut state);
        self.store.save(&state.snapshot)?;

        self.reporter.record(SyncEvent::RunFinished {
            run_id: run_id.clone(),
            stats: state.stats.clone(),
        });

        Ok(RunOutcome {
            run_id,
            snapshot: state.snapshot,
            containers: state.pool,
            stats: state.stats,
            warnings: state.warnings,
        })
    }

    async fn step(&self, identity: &Identity, state: &mut RunState) -> Result<(), SyncError> {
        let key = identity.key.as_str();
        let name = identity.display_name.as_str();

        // An assignment whose token lost its container record (a partially
        // saved snapshot) can be neither deleted nor renamed. Drop it so the
        // identity is treated as tokenless from here on.
        if let Some(token) = dangling_token(&state.snapshot, key) {
            state.snapshot.unassign(key);
            state.stats.repaired += 1;
            self.reporter.record(SyncEvent::DanglingAssignment {
                identity: key.to_string(),
                token,
            });
        }

        let appearance = self.appearance.fetch(key).await?;
        debug!(fingerprint = %appearance.fingerprint, "Fetched appearance");

        let Classification {
            is_new,
            is_renamed,
            is_changed,
        } = classify(
            identity,
            &appearance.fingerprint,
            &state.snapshot,
            self.config.new_identity_rule,
        );

        // A new identity takes its name now and is never also renamed.
        if is_new || is_renamed {
            state
                .snapshot
                .display_names
                .insert(key.to_string(), name.to_string());
        }

        self.reporter.record(SyncEvent::Classified {
            identity: key.to_string(),
            is_new,
            is_renamed,
            is_changed,
        });

        if is_changed {
            state
                .snapshot
                .fingerprints
                .insert(key.to_string(), appearance.fingerprint.clone());

            if let Some((token, container)) = placement(&state.snapshot, key) {
                match self.registry.delete(&container, &token).await {
                    Ok(()) => {
                        state.pool.release(&container);
                        state.stats.deleted += 1;
                        self.reporter.record(SyncEvent::Deleted {
                            identity: key.to_string(),
                            token: token.clone(),
                        });
                    }
                    Err(e) => self.warn(state, RemoteOp::Delete, key, &token, &container, &e),
                }
            }
            state.snapshot.unassign(key);
        }

        if is_renamed {
            match placement(&state.snapshot, key) {
                Some((token, container)) => match self.registry.rename(&container, &token, name).await {
                    Ok(()) => {
                        state.stats.renamed += 1;
                        self.reporter.record(SyncEvent::Renamed {
                            identity: key.to_string(),
                            token,
                            name: name.to_string(),
                        });
                    }
                    Err(e) => self.warn(state, RemoteOp::Rename, key, &token, &container, &e),
                },
                None => self.reporter.record(SyncEvent::RenameSkipped {
                    identity: key.to_string(),
                }),
            }
        }

        if is_new && !state.snapshot.token_assignments.contains_key(key) {
            let container = state
                .pool
                .pick()
                .cloned()
                .ok_or_else(|| SyncError::CapacityExhausted {
                    identity: key.to_string(),
                })?;

            let token = self
                .registry
                .create(&container, name, &appearance.bytes)
                .await
                .map_err(|source| SyncError::CreateFailed {
                    identity: key.to_string(),
                    source,
                })?;

            // The registry handed out an id we already track; recording it
            // would leave two identities sharing one token.
            if state.snapshot.token_containers.contains_key(&token) {
                return Err(SyncError::DuplicateToken {
                    identity: key.to_string(),
                    token,
                });
            }

            state.snapshot.assign(key, &token, &container);
            state
                .snapshot
                .fingerprints
                .insert(key.to_string(), appearance.fingerprint);
            state.pool.occupy(&container);
            state.stats.created += 1;
            self.reporter.record(SyncEvent::Created {
                identity: key.to_string(),
                token,
                container,
            });
        }

        Ok(())
    }

    /// Drop every tracked identity that was not in this run's roster.
    fn prune(&self, seen: &HashSet<&str>, state: &mut RunState) {
        let tracked: BTreeSet<IdentityKey> = state
            .snapshot
            .token_assignments
            .keys()
            .chain(state.snapshot.display_names.keys())
            .cloned()
            .collect();

        for key in tracked.into_iter().filter(|k| !seen.contains(k.as_str())) {
            let token = state.snapshot.token_assignments.get(&key).cloned();
            state.snapshot.forget(&key);
            state.stats.pruned += 1;
            self.reporter.record(SyncEvent::Pruned {
                identity: key,
                token,
            });
        }
    }

    fn warn(
        &self,
        state: &mut RunState,
        op: RemoteOp,
        key: &str,
        token: &str,
        container: &str,
        error: &RegistryError,
    ) {
        let warning = RemoteWarning::new(op, key, token, container, error);
        state.stats.warnings += 1;
        state.warnings.push(warning.clone());
        self.reporter.record(SyncEvent::Warning(warning));
    }
}

fn is_new_under(rule: NewIdentityRule, key: &str, snapshot: &StateSnapshot) -> bool {
    let unnamed = !snapshot.display_names.contains_key(key);
    match rule {
        NewIdentityRule::NameOnly => unnamed,
        NewIdentityRule::NameOrToken => unnamed || !snapshot.token_assignments.contains_key(key),
    }
}

/// Token assigned to `key` whose container is unknown.
fn dangling_token(snapshot: &StateSnapshot, key: &str) -> Option<String> {
    let token = snapshot.token_assignments.get(key)?;
    if snapshot.token_containers.contains_key(token) {
        return None;
    }
    Some(token.clone())
}

fn placement(snapshot: &StateSnapshot, key: &str) -> Option<(String, String)> {
    snapshot
        .placement(key)
        .map(|(token, container)| (token.clone(), container.clone()))
}

/// Classify an identity against a snapshot, given its current fingerprint.
///
/// Pure; the engine applies the resulting transitions.
pub fn classify(
    identity: &Identity,
    fingerprint: &str,
    snapshot: &StateSnapshot,
    rule: NewIdentityRule,
) -> Classification {
    let key = identity.key.as_str();
    let is_new = is_new_under(rule, key, snapshot);
    let is_renamed = !is_new
        && snapshot
            .display_names
            .get(key)
            .is_some_and(|n| *n != identity.display_name);
    let is_changed = snapshot
        .fingerprints
        .get(key)
        .is_some_and(|f| f != fingerprint);

    Classification {
        is_new,
        is_renamed,
        is_changed,
    }
}
