//! Roster source: who should have a token.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use std::collections::HashSet;

use crate::types::Identity;

pub use http::HttpRosterSource;
pub use mock::MockRoster;

/// Roster fetch errors. Any of these is fatal for a run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RosterError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Group {group} returned HTTP {status}")]
    Status { group: String, status: u16 },

    #[error("Invalid roster response: {0}")]
    InvalidResponse(String),
}

/// Source of the current members of a group.
#[async_trait]
pub trait RosterSource: Send + Sync {
    /// Members of one group label.
    async fn members(&self, group: &str) -> Result<Vec<Identity>, RosterError>;
}

/// Fetch every group in order and merge them.
///
/// An identity listed in several groups is kept once, at its first
/// occurrence.
pub async fn collect_roster(
    source: &dyn RosterSource,
    groups: &[String],
) -> Result<Vec<Identity>, RosterError> {
    let mut seen = HashSet::new();
    let mut roster = Vec::new();

    for group in groups {
        let members = source.members(group).await?;
        tracing::info!(group = %group, count = members.len(), "Fetched roster group");

        for identity in members {
            if seen.insert(identity.key.clone()) {
                roster.push(identity);
            }
        }
    }

    Ok(roster)
}
