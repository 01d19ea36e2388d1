//! Wiring of the client-side components for one service.
//!
//! ```rust
//! use std::sync::Arc;
//! use txgroup_client::{Propagation, TxClient};
//! use txgroup_core::mock::MockMessenger;
//! use txgroup_core::TxConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut mock = MockMessenger::new();
//!     mock.expect_create().return_ok();
//!     mock.expect_notify().return_ok();
//!
//!     let client = TxClient::builder(TxConfig::for_service("order", "10.0.0.1:8080"), Arc::new(mock.clone()))
//!         .build();
//!     let descriptor = client.descriptor("OrderService::place", "lcn", Propagation::Required, vec![]);
//!     let placed = client
//!         .run(descriptor, || async { Ok::<_, String>("order-1") })
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(placed, "order-1");
//!     mock.verify();
//! }
//! ```

use crate::audit::AspectLog;
use crate::checking::DelayedChecker;
use crate::clean::{CleanTemplate, NoopCleaner, TransactionCleaner};
use crate::control::TransactionControl;
use crate::descriptor::{DescriptorCache, Propagation, TransactionDescriptor};
use crate::failure::{AbortHandler, ExceptionHandler, RunError};
use crate::global::GlobalContext;
use crate::weaver::TransactionWeaver;
use std::future::Future;
use std::sync::Arc;
use tracing::info;
use txgroup_core::{ClearError, Messenger, ReliableMessenger, TransactionState, TxConfig};

pub struct TxClientBuilder {
    config: TxConfig,
    messenger: Arc<dyn Messenger>,
    handler: Arc<dyn ExceptionHandler>,
    cleaner: Arc<dyn TransactionCleaner>,
}

impl TxClientBuilder {
    pub fn handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn cleaner(mut self, cleaner: Arc<dyn TransactionCleaner>) -> Self {
        self.cleaner = cleaner;
        self
    }

    pub fn build(self) -> TxClient {
        let messenger = ReliableMessenger::new(self.messenger, self.config.service_id.clone());
        let aspect_log = Arc::new(AspectLog::new());
        let global = Arc::new(GlobalContext::new(self.config.dtx_time()));
        let checker = DelayedChecker::new(
            messenger.clone(),
            self.handler.clone(),
            self.config.delay_check(),
        );
        let clean = CleanTemplate::new(self.cleaner, checker.clone(), aspect_log.clone());
        let control = TransactionControl::new(
            messenger,
            aspect_log.clone(),
            checker.clone(),
            self.handler,
            clean.clone(),
            global.clone(),
        );
        let weaver = TransactionWeaver::new(
            control,
            global.clone(),
            self.config.service_id.clone(),
            self.config.address.clone(),
        );
        info!(service_id = %self.config.service_id, address = %self.config.address, "Transaction client ready");

        TxClient {
            service_id: self.config.service_id,
            weaver,
            clean,
            checker,
            aspect_log,
            global,
        }
    }
}

/// The client-side stack of one service.
#[derive(Clone)]
pub struct TxClient {
    service_id: String,
    weaver: TransactionWeaver,
    clean: CleanTemplate,
    checker: DelayedChecker,
    aspect_log: Arc<AspectLog>,
    global: Arc<GlobalContext>,
}

impl TxClient {
    /// Starts a builder with the aborting handler and a cleaner that holds no resources.
    pub fn builder(config: TxConfig, messenger: Arc<dyn Messenger>) -> TxClientBuilder {
        TxClientBuilder {
            config,
            messenger,
            handler: Arc::new(AbortHandler),
            cleaner: Arc::new(NoopCleaner),
        }
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Descriptor for a call, from the process-wide cache.
    pub fn descriptor(
        &self,
        signature: &str,
        transaction_type: &str,
        propagation: Propagation,
        args: Vec<serde_json::Value>,
    ) -> TransactionDescriptor {
        DescriptorCache::global().get_or_insert(signature, transaction_type, propagation, args)
    }

    pub async fn run<T, E, F, Fut>(
        &self,
        descriptor: TransactionDescriptor,
        business: F,
    ) -> Result<T, RunError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.weaver.start_or_join(descriptor, business).await
    }

    /// Applies a decided outcome to one of this service's units.
    pub async fn clean(
        &self,
        group_id: &str,
        unit_id: &str,
        transaction_type: &str,
        state: TransactionState,
    ) -> Result<(), ClearError> {
        self.clean
            .clean(group_id, unit_id, transaction_type, state)
            .await
    }

    pub fn weaver(&self) -> &TransactionWeaver {
        &self.weaver
    }

    pub fn checker(&self) -> &DelayedChecker {
        &self.checker
    }

    pub fn aspect_log(&self) -> &Arc<AspectLog> {
        &self.aspect_log
    }

    pub fn global(&self) -> &Arc<GlobalContext> {
        &self.global
    }
}
