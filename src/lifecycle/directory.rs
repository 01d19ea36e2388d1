//! Routes decided outcomes from the manager to the services that joined.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{error, warn};
use txgroup_client::TxClient;
use txgroup_core::TransactionState;
use txgroup_manager::{GroupSnapshot, ResultApplier};

/// Service identity -> client stack, filled in after the manager is running.
#[derive(Default)]
pub struct ServiceDirectory {
    services: DashMap<String, TxClient>,
}

impl ServiceDirectory {
    pub fn register(&self, client: TxClient) {
        self.services.insert(client.service_id().to_string(), client);
    }

    pub fn clear(&self) {
        self.services.clear();
    }

    fn lookup(&self, service_id: &str) -> Option<TxClient> {
        self.services.get(service_id).map(|entry| entry.value().clone())
    }
}

/// [`ResultApplier`] that runs each unit's local clean in its own service.
pub struct DirectoryApplier {
    directory: Arc<ServiceDirectory>,
}

impl DirectoryApplier {
    pub fn new(directory: Arc<ServiceDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl ResultApplier for DirectoryApplier {
    async fn apply(&self, group: &GroupSnapshot, state: TransactionState) {
        for unit in &group.units {
            let Some(client) = self.directory.lookup(&unit.service_identity) else {
                warn!(
                    group_id = %group.group_id,
                    unit_id = %unit.unit_id,
                    service = %unit.service_identity,
                    "No route to service, outcome not applied"
                );
                continue;
            };
            if let Err(e) = client
                .clean(&group.group_id, &unit.unit_id, &unit.unit_type, state)
                .await
            {
                error!(group_id = %group.group_id, unit_id = %unit.unit_id, error = %e, "Apply outcome failed");
            }
        }
    }
}
