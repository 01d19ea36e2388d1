//! Hook that carries a decided outcome to the units of a group.
//!
//! The manager calls [`ResultApplier::apply`] once a group is notified and
//! cleans the group afterwards. Delivering the outcome to each participant is
//! the applier's business; the default only logs it.

use crate::registry::GroupSnapshot;
use async_trait::async_trait;
use tracing::info;
use txgroup_core::TransactionState;

#[async_trait]
pub trait ResultApplier: Send + Sync {
    async fn apply(&self, group: &GroupSnapshot, state: TransactionState);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingApplier;

#[async_trait]
impl ResultApplier for LoggingApplier {
    async fn apply(&self, group: &GroupSnapshot, state: TransactionState) {
        for unit in &group.units {
            info!(
                group_id = %group.group_id,
                unit_id = %unit.unit_id,
                service = %unit.service_identity,
                local_state = %unit.state,
                %state,
                "Outcome applied"
            );
        }
    }
}
