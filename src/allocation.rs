//! Container occupancy and first-fit allocation.
//!
//! The pool is built once per run from the Container Directory and then
//! updated in memory as tokens are created or deleted, so later identities
//! see current occupancy without re-querying the registry.

use serde::Serialize;
use tracing::info;

use crate::error::SyncError;
use crate::registry::TokenRegistry;
use crate::types::ContainerId;

/// Occupancy of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSlot {
    pub id: ContainerId,
    pub used: usize,
    pub capacity: usize,
}

impl ContainerSlot {
    pub fn new(id: impl Into<String>, used: usize, capacity: usize) -> Self {
        Self {
            id: id.into(),
            used,
            capacity,
        }
    }

    pub fn has_room(&self) -> bool {
        self.used < self.capacity
    }
}

/// Containers in allocation priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerPool {
    slots: Vec<ContainerSlot>,
}

impl ContainerPool {
    pub fn new(slots: Vec<ContainerSlot>) -> Self {
        Self { slots }
    }

    /// Query the registry for every container, preserving the given order.
    ///
    /// Any failure is an input error for the whole run.
    pub async fn survey(
        registry: &dyn TokenRegistry,
        container_ids: &[String],
    ) -> Result<Self, SyncError> {
        let mut slots = Vec::with_capacity(container_ids.len());

        for id in container_ids {
            let info = registry
                .describe(id)
                .await
                .map_err(|source| SyncError::ContainerDirectory {
                    container: id.clone(),
                    source,
                })?;

            info!(container = %id, used = info.used(), capacity = info.capacity, "Surveyed container");
            slots.push(ContainerSlot::new(id.clone(), info.used(), info.capacity));
        }

        Ok(Self { slots })
    }

    /// First container, in priority order, with a free slot.
    pub fn pick(&self) -> Option<&ContainerId> {
        self.slots.iter().find(|s| s.has_room()).map(|s| &s.id)
    }

    /// Count a newly created token against a container.
    pub fn occupy(&mut self, container: &str) {
        if let Some(slot) = self.slot_mut(container) {
            slot.used += 1;
        }
    }

    /// Return a slot freed by a deletion.
    pub fn release(&mut self, container: &str) {
        if let Some(slot) = self.slot_mut(container) {
            slot.used = slot.used.saturating_sub(1);
        }
    }

    pub fn slots(&self) -> &[ContainerSlot] {
        &self.slots
    }

    pub fn get(&self, container: &str) -> Option<&ContainerSlot> {
        self.slots.iter().find(|s| s.id == container)
    }

    /// Free slots across all containers.
    pub fn remaining(&self) -> usize {
        self.slots
            .iter()
            .map(|s| s.capacity.saturating_sub(s.used))
            .sum()
    }

    fn slot_mut(&mut self, container: &str) -> Option<&mut ContainerSlot> {
        self.slots.iter_mut().find(|s| s.id == container)
    }
}
