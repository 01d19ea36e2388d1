//! Audit trail of the descriptors behind each unit.
//!
//! After a successful create or join the controller records the descriptor
//! under `(group_id, unit_id)`, so later notify and compensation steps can
//! recover what was called and with which arguments. Local clean removes the
//! entry.

use crate::descriptor::TransactionDescriptor;
use dashmap::DashMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct AspectLog {
    entries: DashMap<(String, String), TransactionDescriptor>,
}

impl AspectLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trace(&self, group_id: &str, unit_id: &str, descriptor: &TransactionDescriptor) {
        debug!(%group_id, %unit_id, signature = %descriptor.signature(), "Aspect traced");
        self.entries.insert(
            (group_id.to_string(), unit_id.to_string()),
            descriptor.clone(),
        );
    }

    pub fn get(&self, group_id: &str, unit_id: &str) -> Option<TransactionDescriptor> {
        self.entries
            .get(&(group_id.to_string(), unit_id.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn remove(&self, group_id: &str, unit_id: &str) -> Option<TransactionDescriptor> {
        let removed = self
            .entries
            .remove(&(group_id.to_string(), unit_id.to_string()))
            .map(|(_, descriptor)| descriptor);
        if removed.is_some() {
            debug!(%group_id, %unit_id, "Aspect cleared");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
