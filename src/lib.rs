//! Roster Tokens - keeps a token registry in sync with an identity roster
//!
//! Every identity on the roster owns one image-backed token, hosted in one of
//! a fixed list of capacity-limited containers. Each run compares the
//! persisted snapshot with the fetched roster and appearance fingerprints,
//! then creates, renames and deletes tokens until the registry matches.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  ┌──────────────────┐
//! │ RosterSource │  │ AppearanceFetcher│
//! └──────┬───────┘  └────────┬─────────┘
//!        └─────────┬─────────┘
//!                  ▼
//!         ┌─────────────────┐      ┌───────────────┐
//!         │   Reconciler    │─────▶│ TokenRegistry │
//!         │ (engine)        │      │ ContainerPool │
//!         └────────┬────────┘      └───────────────┘
//!                  ▼
//!         ┌─────────────────┐
//!         │   StateStore    │
//!         └─────────────────┘
//! ```

pub mod allocation;
pub mod appearance;
pub mod config;
pub mod engine;
pub mod error;
pub mod listing;
pub mod registry;
pub mod report;
pub mod roster;
pub mod store;
pub mod types;

pub use allocation::{ContainerPool, ContainerSlot};
pub use appearance::{AppearanceError, AppearanceFetcher, HttpAppearanceFetcher, RetryPolicy};
pub use config::{Config, ConfigError, NewIdentityRule};
pub use engine::{classify, Classification, EngineConfig, Reconciler, RunOutcome};
pub use error::SyncError;
pub use registry::{HttpRegistryClient, RegistryError, TokenRegistry};
pub use report::{MemoryReporter, RemoteWarning, Reporter, RunStats, SyncEvent, TracingReporter};
pub use roster::{HttpRosterSource, RosterError, RosterSource};
pub use store::{JsonFileStore, StateSnapshot, StateStore, StoreError};
pub use types::*;
