//! # Order Service
//!
//! The initiator side of the demo. Placing an order starts a group, reserves
//! stock from the inventory service under that group, and then checks the
//! total against the customer's credit. A failure anywhere rolls the whole
//! group back, including the stock that inventory already took out.

use crate::error::ServiceError;
use crate::inventory::InventoryService;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use txgroup_client::{Propagation, RunError, TxClient};
use txgroup_core::{Messenger, TracingContext, TxConfig};

pub const PLACE_SIGNATURE: &str =
    "OrderService::place_order(sku: &str, quantity: u32, credit: u64) -> Receipt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub group_id: String,
    pub sku: String,
    pub quantity: u32,
    pub total: u64,
}

#[derive(Clone)]
pub struct OrderService {
    client: TxClient,
    inventory: InventoryService,
}

impl OrderService {
    pub fn new(config: TxConfig, messenger: Arc<dyn Messenger>, inventory: InventoryService) -> Self {
        Self {
            client: TxClient::builder(config, messenger).build(),
            inventory,
        }
    }

    pub fn client(&self) -> &TxClient {
        &self.client
    }

    #[instrument(skip(self))]
    pub async fn place_order(
        &self,
        sku: &str,
        quantity: u32,
        credit: u64,
    ) -> Result<Receipt, RunError<ServiceError>> {
        let descriptor = self.client.descriptor(
            PLACE_SIGNATURE,
            "lcn",
            Propagation::Required,
            vec![json!(sku), json!(quantity), json!(credit)],
        );
        let inventory = &self.inventory;
        self.client
            .run(descriptor, move || async move {
                let ctx = TracingContext::current();
                let group_id = ctx.group_id()?.to_string();
                let projection = ctx.export_projection()?;

                let total = inventory
                    .serve_reserve(projection, sku.to_string(), quantity)
                    .await?;
                if total > credit {
                    return Err(ServiceError::InsufficientCredit { total, credit });
                }

                info!(%group_id, %sku, quantity, total, "Order placed");
                Ok(Receipt {
                    group_id,
                    sku: sku.to_string(),
                    quantity,
                    total,
                })
            })
            .await
    }
}
