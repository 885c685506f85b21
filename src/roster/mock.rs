//! In-memory roster for tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use super::{RosterError, RosterSource};
use crate::types::Identity;

#[derive(Default)]
pub struct MockRoster {
    groups: HashMap<String, Vec<Identity>>,
    failing: HashSet<String>,
}

impl MockRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group: &str, members: Vec<Identity>) -> Self {
        self.groups.insert(group.to_string(), members);
        self
    }

    /// Make a group answer with HTTP 500.
    pub fn with_failing_group(mut self, group: &str) -> Self {
        self.failing.insert(group.to_string());
        self
    }
}

#[async_trait]
impl RosterSource for MockRoster {
    async fn members(&self, group: &str) -> Result<Vec<Identity>, RosterError> {
        if self.failing.contains(group) {
            return Err(RosterError::Status {
                group: group.to_string(),
                status: 500,
            });
        }
        Ok(self.groups.get(group).cloned().unwrap_or_default())
    }
}
