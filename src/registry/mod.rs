//! Remote token registry and container directory.
//!
//! - `traits`: the `TokenRegistry` seam used by the engine
//! - `http`: client for the platform's REST API
//! - `mock`: recording in-memory registry for tests

pub mod http;
pub mod mock;
pub mod traits;

pub use http::HttpRegistryClient;
pub use mock::{MockRegistry, RegistryCall};
pub use traits::{capacity_for_tier, RegistryError, TokenRegistry};
