//! # Command Execution
//!
//! Turns one decoded [`ManagerCommand`] into registry calls and a
//! [`ManagerReply`]. Registry failures never escape as errors: they become
//! `ManagerReply::Error` so the client sees a business rejection.

use crate::applier::ResultApplier;
use crate::registry::{GroupRegistry, GroupState, RegistryError, UnitRecord};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use txgroup_core::{ManagerCommand, ManagerError, ManagerReply, TransactionState};

#[derive(Clone)]
pub struct ManagerService {
    registry: Arc<GroupRegistry>,
    applier: Arc<dyn ResultApplier>,
}

impl ManagerService {
    pub fn new(registry: Arc<GroupRegistry>, applier: Arc<dyn ResultApplier>) -> Self {
        Self { registry, applier }
    }

    pub fn registry(&self) -> &Arc<GroupRegistry> {
        &self.registry
    }

    pub async fn execute(&self, command: ManagerCommand) -> ManagerReply {
        let kind = command.kind();
        let group_id = command.group_id().to_string();
        let result = match command {
            ManagerCommand::CreateGroup { group_id } => self.create_group(&group_id),
            ManagerCommand::JoinGroup {
                group_id,
                unit_id,
                unit_type,
                requester_identity,
                local_state,
            } => self.join_group(
                &group_id,
                UnitRecord {
                    unit_id,
                    unit_type,
                    service_identity: requester_identity,
                    state: local_state,
                },
            ),
            ManagerCommand::NotifyGroup { group_id, state } => {
                self.notify_group(&group_id, state).await
            }
            ManagerCommand::CheckJoin { group_id, unit_id } => {
                return self.check_join(&group_id, &unit_id);
            }
        };
        match result {
            Ok(()) => ManagerReply::Ok,
            Err(e) => {
                warn!(command = kind, %group_id, error = %e, "Command rejected");
                let error = ManagerError::from(e);
                ManagerReply::error(error.kind, error.message)
            }
        }
    }

    #[instrument(skip(self))]
    fn create_group(&self, group_id: &str) -> Result<(), RegistryError> {
        self.registry.create(group_id)
    }

    #[instrument(skip(self, unit), fields(unit_id = %unit.unit_id, service = %unit.service_identity))]
    fn join_group(&self, group_id: &str, unit: UnitRecord) -> Result<(), RegistryError> {
        debug!("start join group");
        self.registry.join(group_id, unit)?;
        debug!("over join group");
        Ok(())
    }

    /// Records the outcome, hands it to the applier, then cleans the group.
    #[instrument(skip(self))]
    async fn notify_group(
        &self,
        group_id: &str,
        state: TransactionState,
    ) -> Result<(), RegistryError> {
        let snapshot = self.registry.notify(group_id, state)?;
        self.applier.apply(&snapshot, state).await;
        if let Err(e) = self.registry.clean(group_id) {
            // The watchdog may have reclaimed the group while the applier ran.
            warn!(error = %e, "Clean after notify failed");
        }
        Ok(())
    }

    /// Reclaims groups older than `max_age`. Groups nobody notified are
    /// rolled back through the applier so their units release what they hold.
    /// Notified groups already have their outcome in flight.
    pub async fn reclaim_stale(&self, max_age: Duration) -> usize {
        let expired = self.registry.expire_stale(max_age);
        let count = expired.len();
        for snapshot in expired {
            match snapshot.state {
                GroupState::Open => {
                    info!(
                        group_id = %snapshot.group_id,
                        units = snapshot.units.len(),
                        "Rolling back stale group"
                    );
                    self.applier
                        .apply(&snapshot, TransactionState::Rollback)
                        .await;
                }
                state => {
                    debug!(group_id = %snapshot.group_id, ?state, "Stale group already decided");
                }
            }
        }
        count
    }

    fn check_join(&self, group_id: &str, unit_id: &str) -> ManagerReply {
        let present = self.registry.has_unit(group_id, unit_id);
        debug!(%group_id, %unit_id, present, "Check join");
        if present {
            ManagerReply::Present
        } else {
            ManagerReply::Absent
        }
    }
}
