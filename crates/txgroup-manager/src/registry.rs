//! # Group Registry
//!
//! Authoritative bookkeeping of every live group and its units.
//!
//! ## State machine
//!
//! ```text
//!   create          notify(state)          clean
//! ∅ ──────▶ OPEN ───────────────▶ NOTIFIED ──────▶ CLEANED (unknown again)
//! ```
//!
//! - `join` is recorded only while `OPEN`. A retried join for a unit already
//!   present overwrites its snapshot (last write wins).
//! - A join that arrives between `notify` and `clean` is accepted but ignored:
//!   the outcome is decided, the late unit is logged and dropped.
//! - After `clean` the group id is unknown; join/notify fail with
//!   [`RegistryError::UnknownGroup`].
//!
//! ## Concurrency
//!
//! Groups live in a `DashMap`. Every operation on one group id goes through
//! that key's entry, so operations on the same group are linearizable while
//! different groups proceed on different shards.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use txgroup_core::{ErrorKind, ManagerError, TransactionState};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate group {0}")]
    DuplicateGroup(String),
    #[error("unknown group {0}")]
    UnknownGroup(String),
    #[error("group {0} is not open")]
    GroupNotOpen(String),
    #[error("group {0} has not been notified")]
    GroupNotNotified(String),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::DuplicateGroup(_) => ErrorKind::DuplicateGroup,
            RegistryError::UnknownGroup(_) => ErrorKind::UnknownGroup,
            RegistryError::GroupNotOpen(_) => ErrorKind::GroupNotOpen,
            RegistryError::GroupNotNotified(_) => ErrorKind::GroupNotNotified,
        }
    }
}

impl From<RegistryError> for ManagerError {
    fn from(e: RegistryError) -> Self {
        ManagerError::new(e.kind(), e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Open,
    Notified(TransactionState),
    Cleaned,
}

/// One participant's registration in a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRecord {
    pub unit_id: String,
    pub unit_type: String,
    pub service_identity: String,
    pub state: TransactionState,
}

/// What a join did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Recorded,
    Replaced,
    /// The group was already notified; the join was dropped.
    Ignored,
}

/// Point-in-time copy of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSnapshot {
    pub group_id: String,
    pub state: GroupState,
    pub units: Vec<UnitRecord>,
}

#[derive(Debug)]
struct GroupRecord {
    state: GroupState,
    units: HashMap<String, UnitRecord>,
    created_at: Instant,
}

impl GroupRecord {
    fn snapshot(&self, group_id: &str) -> GroupSnapshot {
        let mut units: Vec<UnitRecord> = self.units.values().cloned().collect();
        units.sort_by(|a, b| a.unit_id.cmp(&b.unit_id));
        GroupSnapshot {
            group_id: group_id.to_string(),
            state: self.state,
            units,
        }
    }
}

#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: DashMap<String, GroupRecord>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, group_id: &str) -> Result<(), RegistryError> {
        match self.groups.entry(group_id.to_string()) {
            Entry::Occupied(_) => {
                warn!(%group_id, "Duplicate group");
                Err(RegistryError::DuplicateGroup(group_id.to_string()))
            }
            Entry::Vacant(slot) => {
                slot.insert(GroupRecord {
                    state: GroupState::Open,
                    units: HashMap::new(),
                    created_at: Instant::now(),
                });
                info!(%group_id, "Group created");
                Ok(())
            }
        }
    }

    pub fn join(&self, group_id: &str, unit: UnitRecord) -> Result<JoinOutcome, RegistryError> {
        let mut record = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| RegistryError::UnknownGroup(group_id.to_string()))?;

        if let GroupState::Notified(_) = record.state {
            warn!(%group_id, unit_id = %unit.unit_id, "Join after notify ignored");
            return Ok(JoinOutcome::Ignored);
        }

        let unit_id = unit.unit_id.clone();
        let outcome = match record.units.insert(unit_id.clone(), unit) {
            Some(_) => JoinOutcome::Replaced,
            None => JoinOutcome::Recorded,
        };
        info!(%group_id, %unit_id, ?outcome, units = record.units.len(), "Unit joined");
        Ok(outcome)
    }

    pub fn notify(
        &self,
        group_id: &str,
        state: TransactionState,
    ) -> Result<GroupSnapshot, RegistryError> {
        let mut record = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| RegistryError::UnknownGroup(group_id.to_string()))?;

        if record.state != GroupState::Open {
            warn!(%group_id, current = ?record.state, "Notify on group that is not open");
            return Err(RegistryError::GroupNotOpen(group_id.to_string()));
        }
        record.state = GroupState::Notified(state);
        info!(%group_id, %state, units = record.units.len(), "Group notified");
        Ok(record.snapshot(group_id))
    }

    /// Removes a notified group. Its id is unknown from here on.
    pub fn clean(&self, group_id: &str) -> Result<GroupSnapshot, RegistryError> {
        let removed = self
            .groups
            .remove_if(group_id, |_, record| {
                matches!(record.state, GroupState::Notified(_))
            });
        match removed {
            Some((group_id, record)) => {
                let mut snapshot = record.snapshot(&group_id);
                snapshot.state = GroupState::Cleaned;
                info!(%group_id, "Group cleaned");
                Ok(snapshot)
            }
            None if self.groups.contains_key(group_id) => {
                Err(RegistryError::GroupNotNotified(group_id.to_string()))
            }
            None => Err(RegistryError::UnknownGroup(group_id.to_string())),
        }
    }

    /// Whether `(group_id, unit_id)` is recorded. Unknown groups hold no units.
    pub fn has_unit(&self, group_id: &str, unit_id: &str) -> bool {
        self.groups
            .get(group_id)
            .is_some_and(|record| record.units.contains_key(unit_id))
    }

    pub fn state(&self, group_id: &str) -> Option<GroupState> {
        self.groups.get(group_id).map(|record| record.state)
    }

    pub fn snapshot(&self, group_id: &str) -> Option<GroupSnapshot> {
        self.groups
            .get(group_id)
            .map(|record| record.snapshot(group_id))
    }

    /// Drops every group older than `max_age`, whatever its state.
    ///
    /// Returns what each reclaimed group held at the moment it was dropped.
    pub fn expire_stale(&self, max_age: Duration) -> Vec<GroupSnapshot> {
        let now = Instant::now();
        let mut expired = Vec::new();
        self.groups.retain(|group_id, record| {
            let keep = now.duration_since(record.created_at) < max_age;
            if !keep {
                expired.push(record.snapshot(group_id));
            }
            keep
        });
        for snapshot in &expired {
            warn!(
                group_id = %snapshot.group_id,
                state = ?snapshot.state,
                units = snapshot.units.len(),
                "Stale group reclaimed by watchdog"
            );
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), remaining = self.groups.len(), "Watchdog pass");
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
