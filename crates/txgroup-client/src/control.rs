//! # Group Lifecycle Controller
//!
//! The three client-side group operations. Each one is a short orchestration
//! over the messenger, the audit log and the delayed checker. A failed manager
//! round trip is classified into a [`Failure`] and handed to the configured
//! [`ExceptionHandler`]; raw transport errors never reach the caller.
//!
//! | operation | on success | extra |
//! |-----------|------------|-------|
//! | `create_group` | trace descriptor | |
//! | `join_group` | schedule delayed check, trace descriptor | check is also scheduled after a transport failure |
//! | `notify_group` | local clean (failures logged only) | short-circuits when the group is past its lifetime |

use crate::audit::AspectLog;
use crate::checking::DelayedChecker;
use crate::clean::CleanTemplate;
use crate::descriptor::TransactionDescriptor;
use crate::failure::{DtxTimeout, ExceptionHandler, Failure, Phase, TransactionError};
use crate::global::GlobalContext;
use std::sync::Arc;
use tracing::{error, info, instrument};
use txgroup_core::{MessageFailure, ReliableMessenger, TransactionState};

#[derive(Clone)]
pub struct TransactionControl {
    messenger: ReliableMessenger,
    aspect_log: Arc<AspectLog>,
    checker: DelayedChecker,
    handler: Arc<dyn ExceptionHandler>,
    clean: CleanTemplate,
    global: Arc<GlobalContext>,
}

impl TransactionControl {
    pub fn new(
        messenger: ReliableMessenger,
        aspect_log: Arc<AspectLog>,
        checker: DelayedChecker,
        handler: Arc<dyn ExceptionHandler>,
        clean: CleanTemplate,
        global: Arc<GlobalContext>,
    ) -> Self {
        Self {
            messenger,
            aspect_log,
            checker,
            handler,
            clean,
            global,
        }
    }

    #[instrument(skip(self, descriptor), fields(tx_type = %transaction_type))]
    pub async fn create_group(
        &self,
        group_id: &str,
        unit_id: &str,
        descriptor: &TransactionDescriptor,
        transaction_type: &str,
    ) -> Result<(), TransactionError> {
        info!("create group");
        match self.messenger.create_group(group_id).await {
            Ok(()) => self.aspect_log.trace(group_id, unit_id, descriptor),
            Err(e) => {
                let failure =
                    Failure::from_message(Phase::Create, group_id, unit_id, transaction_type, None, e);
                self.handler.handle(failure)?;
            }
        }
        info!("create group over");
        Ok(())
    }

    /// Sends the participant's local outcome to the manager.
    #[instrument(skip(self, descriptor), fields(tx_type = %transaction_type))]
    pub async fn join_group(
        &self,
        group_id: &str,
        unit_id: &str,
        transaction_type: &str,
        descriptor: &TransactionDescriptor,
        state: TransactionState,
    ) -> Result<(), TransactionError> {
        info!("join group");
        match self
            .messenger
            .join_group(group_id, unit_id, transaction_type, state)
            .await
        {
            Ok(()) => {
                info!("join group message over");
                self.checker
                    .schedule_check(group_id, unit_id, transaction_type, state);
                self.aspect_log.trace(group_id, unit_id, descriptor);
            }
            Err(e) => {
                if matches!(e, MessageFailure::Transport(_)) {
                    // The join may have landed anyway; let the check find out.
                    self.checker
                        .schedule_check(group_id, unit_id, transaction_type, state);
                }
                let failure = Failure::from_message(
                    Phase::Join,
                    group_id,
                    unit_id,
                    transaction_type,
                    Some(state),
                    e,
                );
                self.handler.handle(failure)?;
            }
        }
        info!("join logic group over");
        Ok(())
    }

    #[instrument(skip(self), fields(tx_type = %transaction_type))]
    pub async fn notify_group(
        &self,
        group_id: &str,
        unit_id: &str,
        transaction_type: &str,
        state: TransactionState,
    ) -> Result<(), TransactionError> {
        info!("notify group");
        if self.global.is_dtx_timeout(group_id) {
            let failure = Failure::business(
                Phase::Notify,
                group_id,
                unit_id,
                transaction_type,
                Some(state),
                DtxTimeout(group_id.to_string()),
            );
            return self.handler.handle(failure);
        }

        if let Err(e) = self.messenger.notify_group(group_id, state).await {
            let failure = Failure::from_message(
                Phase::Notify,
                group_id,
                unit_id,
                transaction_type,
                Some(state),
                e,
            );
            return self.handler.handle(failure);
        }

        if let Err(e) = self
            .clean
            .clean(group_id, unit_id, transaction_type, state)
            .await
        {
            error!(error = %e, "clean transaction fail");
        }
        info!("notify group over");
        Ok(())
    }

    pub fn clean_template(&self) -> &CleanTemplate {
        &self.clean
    }
}
