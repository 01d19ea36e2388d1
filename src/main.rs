use tracing::{info, warn, Instrument};
use txgroup::TxSystem;
use txgroup_core::telemetry::setup_tracing;
use txgroup_core::TxConfig;

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let config = match TxConfig::load(None) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Using default configuration");
            TxConfig::default()
        }
    };
    info!(?config, "Starting transaction group demo");

    let system = TxSystem::new(&config);
    system.inventory.stock().add("widget", 10, 250);

    // Commit: stock is reserved and the order fits the credit
    let receipt = system
        .orders
        .place_order("widget", 3, 1_000)
        .instrument(tracing::info_span!("order_commit"))
        .await
        .map_err(|e| e.to_string())?;
    info!(group_id = %receipt.group_id, total = receipt.total, "Order committed");

    // Rollback: inventory reserves, then the order exceeds the credit
    let rejected = system
        .orders
        .place_order("widget", 4, 500)
        .instrument(tracing::info_span!("order_rollback"))
        .await;
    if let Err(e) = &rejected {
        info!(error = %e, "Order rolled back");
    }

    info!(
        available = ?system.inventory.stock().available("widget"),
        holds = system.inventory.stock().holds(),
        groups = system.registry().len(),
        "Final state"
    );

    system.shutdown().await
}
