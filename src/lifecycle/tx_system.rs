use crate::inventory::InventoryService;
use crate::lifecycle::directory::{DirectoryApplier, ServiceDirectory};
use crate::orders::OrderService;
use std::sync::Arc;
use tracing::{error, info};
use txgroup_core::{Messenger, TxConfig};
use txgroup_manager::{GroupRegistry, ManagerActor};

/// Runs a manager and two services in one process.
///
/// - **Manager**: the [`ManagerActor`] loop, with a [`DirectoryApplier`] that
///   routes outcomes back to the services.
/// - **Order service**: initiator of every group.
/// - **Inventory service**: participant, joined through a tracing projection
///   the way a remote call would carry it.
///
/// # Example
///
/// ```ignore
/// let system = TxSystem::new(&TxConfig::default());
/// system.inventory.stock().add("sku-1", 10, 250);
///
/// let receipt = system.orders.place_order("sku-1", 2, 1_000).await?;
///
/// system.shutdown().await?;
/// ```
pub struct TxSystem {
    pub orders: OrderService,
    pub inventory: InventoryService,
    registry: Arc<GroupRegistry>,
    directory: Arc<ServiceDirectory>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl TxSystem {
    /// Starts the manager and wires both services to it.
    ///
    /// `config` supplies the timing settings; each service gets its own
    /// identity on top of it.
    pub fn new(config: &TxConfig) -> Self {
        // 1. Manager first; the applier's routes are filled in below
        let directory = Arc::new(ServiceDirectory::default());
        let (manager, messenger) =
            ManagerActor::with_applier(config, Arc::new(DirectoryApplier::new(directory.clone())));
        let registry = manager.registry();
        let manager_handle = tokio::spawn(manager.run());
        let messenger: Arc<dyn Messenger> = Arc::new(messenger);

        // 2. Services, each with its own client stack
        let inventory = InventoryService::new(
            service_config(config, "inventory", "inventory.local:8081"),
            messenger.clone(),
        );
        let orders = OrderService::new(
            service_config(config, "order", "order.local:8080"),
            messenger,
            inventory.clone(),
        );

        // 3. Late-bind the outcome routes
        directory.register(inventory.client().clone());
        directory.register(orders.client().clone());

        info!("Transaction system started");
        Self {
            orders,
            inventory,
            registry,
            directory,
            handles: vec![manager_handle],
        }
    }

    pub fn registry(&self) -> &Arc<GroupRegistry> {
        &self.registry
    }

    /// Drops every messenger so the manager loop ends, then waits for it.
    pub async fn shutdown(self) -> Result<(), String> {
        info!("Shutting down system...");

        // The directory holds client stacks too; without clearing it the
        // manager would keep a sender to itself.
        self.directory.clear();
        drop(self.orders);
        drop(self.inventory);

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Manager task failed: {:?}", e);
                return Err(format!("Manager task failed: {:?}", e));
            }
        }

        info!("System shutdown complete.");
        Ok(())
    }
}

fn service_config(base: &TxConfig, service_id: &str, address: &str) -> TxConfig {
    TxConfig {
        service_id: service_id.to_string(),
        address: address.to_string(),
        ..base.clone()
    }
}
