//! # Inventory Service
//!
//! The participant side of the demo. A reservation takes stock out of the
//! available pool right away and parks it as a *hold* keyed by the unit that
//! made it. When the group's outcome arrives, [`HoldCleaner`] either drops the
//! hold (commit) or puts the stock back (rollback).

use crate::error::ServiceError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use txgroup_client::{Propagation, RunError, TransactionCleaner, TxClient};
use txgroup_core::{
    ClearError, ContextError, LocalContext, Messenger, TracingContext, TransactionState, TxConfig,
};

pub const RESERVE_SIGNATURE: &str = "InventoryService::reserve(sku: &str, quantity: u32) -> u64";

#[derive(Debug, Clone)]
struct Hold {
    sku: String,
    quantity: u32,
}

/// Stock levels and outstanding holds.
#[derive(Debug, Default)]
pub struct Stock {
    available: DashMap<String, (u32, u64)>,
    holds: DashMap<(String, String), Hold>,
}

impl Stock {
    pub fn add(&self, sku: &str, quantity: u32, unit_price: u64) {
        let mut entry = self.available.entry(sku.to_string()).or_insert((0, unit_price));
        entry.0 += quantity;
        entry.1 = unit_price;
    }

    pub fn available(&self, sku: &str) -> Option<u32> {
        self.available.get(sku).map(|entry| entry.0)
    }

    pub fn holds(&self) -> usize {
        self.holds.len()
    }

    /// Takes `quantity` out of stock and parks it under `(group_id, unit_id)`.
    /// Returns the price of the reserved items.
    fn hold(&self, group_id: &str, unit_id: &str, sku: &str, quantity: u32) -> Result<u64, ServiceError> {
        let mut entry = self
            .available
            .get_mut(sku)
            .ok_or_else(|| ServiceError::NotFound(sku.to_string()))?;
        let (available, unit_price) = *entry;
        if available < quantity {
            return Err(ServiceError::InsufficientStock {
                requested: quantity,
                available,
            });
        }
        entry.0 -= quantity;
        drop(entry);

        self.holds.insert(
            (group_id.to_string(), unit_id.to_string()),
            Hold {
                sku: sku.to_string(),
                quantity,
            },
        );
        Ok(u64::from(quantity) * unit_price)
    }

    fn release(&self, group_id: &str, unit_id: &str, state: TransactionState) {
        let Some((_, hold)) = self
            .holds
            .remove(&(group_id.to_string(), unit_id.to_string()))
        else {
            return;
        };
        match state {
            TransactionState::Commit => {
                debug!(sku = %hold.sku, quantity = hold.quantity, "Hold committed");
            }
            TransactionState::Rollback => {
                if let Some(mut entry) = self.available.get_mut(&hold.sku) {
                    entry.0 += hold.quantity;
                }
                info!(sku = %hold.sku, quantity = hold.quantity, "Hold returned to stock");
            }
        }
    }
}

/// Applies a group outcome to the holds of this service.
pub struct HoldCleaner {
    stock: Arc<Stock>,
}

#[async_trait]
impl TransactionCleaner for HoldCleaner {
    async fn clean(
        &self,
        group_id: &str,
        unit_id: &str,
        _transaction_type: &str,
        state: TransactionState,
    ) -> Result<(), ClearError> {
        self.stock.release(group_id, unit_id, state);
        Ok(())
    }
}

#[derive(Clone)]
pub struct InventoryService {
    client: TxClient,
    stock: Arc<Stock>,
}

impl InventoryService {
    pub fn new(config: TxConfig, messenger: Arc<dyn Messenger>) -> Self {
        let stock = Arc::new(Stock::default());
        let client = TxClient::builder(config, messenger)
            .cleaner(Arc::new(HoldCleaner {
                stock: stock.clone(),
            }))
            .build();
        Self { client, stock }
    }

    pub fn client(&self) -> &TxClient {
        &self.client
    }

    pub fn stock(&self) -> &Arc<Stock> {
        &self.stock
    }

    /// Reserves stock as a unit of the caller's transaction group.
    #[instrument(skip(self))]
    pub async fn reserve(&self, sku: &str, quantity: u32) -> Result<u64, RunError<ServiceError>> {
        let descriptor = self.client.descriptor(
            RESERVE_SIGNATURE,
            "lcn",
            Propagation::Required,
            vec![json!(sku), json!(quantity)],
        );
        let stock = &self.stock;
        self.client
            .run(descriptor, move || async move {
                let frame = LocalContext::current()
                    .ok_or(ContextError::NoActiveGroup)?;
                let total = stock.hold(frame.group_id(), frame.unit_id(), sku, quantity)?;
                info!(%sku, quantity, total, "Stock reserved");
                Ok::<_, ServiceError>(total)
            })
            .await
    }

    /// Handles a reservation request that arrived with a tracing projection,
    /// in its own task the way an inbound request would.
    pub async fn serve_reserve(
        &self,
        projection: Vec<u8>,
        sku: String,
        quantity: u32,
    ) -> Result<u64, ServiceError> {
        let service = self.clone();
        let request = tokio::spawn(async move {
            let mut inbound = TracingContext::default();
            if let Err(e) = inbound.import_projection(&projection) {
                warn!(error = %e, "Rejecting request with malformed projection");
                return Err(ServiceError::Context(e));
            }
            TracingContext::scope(inbound, service.reserve(&sku, quantity))
                .await
                .map_err(ServiceError::from)
        });
        request
            .await
            .map_err(|e| ServiceError::Remote(e.to_string()))?
    }
}
