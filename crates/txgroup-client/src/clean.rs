//! Local cleanup once a group's outcome is known.
//!
//! Releasing the unit's resources (committing or rolling back a held local
//! transaction, running a compensation) belongs to a [`TransactionCleaner`]
//! supplied by the application. [`CleanTemplate`] wraps it with the
//! bookkeeping every clean needs, which runs even when the cleaner fails.

use crate::audit::AspectLog;
use crate::checking::DelayedChecker;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};
use txgroup_core::{ClearError, TransactionState};

#[async_trait]
pub trait TransactionCleaner: Send + Sync {
    async fn clean(
        &self,
        group_id: &str,
        unit_id: &str,
        transaction_type: &str,
        state: TransactionState,
    ) -> Result<(), ClearError>;
}

/// Cleaner for units that hold no local resources.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCleaner;

#[async_trait]
impl TransactionCleaner for NoopCleaner {
    async fn clean(
        &self,
        group_id: &str,
        unit_id: &str,
        transaction_type: &str,
        state: TransactionState,
    ) -> Result<(), ClearError> {
        debug!(%group_id, %unit_id, tx_type = %transaction_type, %state, "Nothing to clean");
        Ok(())
    }
}

#[derive(Clone)]
pub struct CleanTemplate {
    cleaner: Arc<dyn TransactionCleaner>,
    checker: DelayedChecker,
    aspect_log: Arc<AspectLog>,
}

impl CleanTemplate {
    pub fn new(
        cleaner: Arc<dyn TransactionCleaner>,
        checker: DelayedChecker,
        aspect_log: Arc<AspectLog>,
    ) -> Self {
        Self {
            cleaner,
            checker,
            aspect_log,
        }
    }

    /// Runs the cleaner, then stops the unit's delayed check and drops its
    /// audit entry regardless of the cleaner's result.
    #[instrument(skip(self))]
    pub async fn clean(
        &self,
        group_id: &str,
        unit_id: &str,
        transaction_type: &str,
        state: TransactionState,
    ) -> Result<(), ClearError> {
        let result = self
            .cleaner
            .clean(group_id, unit_id, transaction_type, state)
            .await;
        self.checker.stop_check(group_id, unit_id);
        self.aspect_log.remove(group_id, unit_id);
        debug!(ok = result.is_ok(), "Clean finished");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DescriptorCache, Propagation};
    use crate::failure::AbortHandler;
    use std::time::Duration;
    use txgroup_core::mock::MockMessenger;
    use txgroup_core::ReliableMessenger;

    struct FailingCleaner;

    #[async_trait]
    impl TransactionCleaner for FailingCleaner {
        async fn clean(
            &self,
            group_id: &str,
            _unit_id: &str,
            _transaction_type: &str,
            _state: TransactionState,
        ) -> Result<(), ClearError> {
            Err(ClearError(format!("connection for {group_id} already closed")))
        }
    }

    fn template(cleaner: Arc<dyn TransactionCleaner>) -> (CleanTemplate, DelayedChecker, Arc<AspectLog>) {
        let messenger = ReliableMessenger::new(Arc::new(MockMessenger::new()), "inventory");
        let checker = DelayedChecker::new(messenger, Arc::new(AbortHandler), Duration::from_secs(60));
        let aspect_log = Arc::new(AspectLog::new());
        let template = CleanTemplate::new(cleaner, checker.clone(), aspect_log.clone());
        (template, checker, aspect_log)
    }

    #[tokio::test]
    async fn test_clean_releases_bookkeeping_even_on_failure() {
        for cleaner in [Arc::new(NoopCleaner) as Arc<dyn TransactionCleaner>, Arc::new(FailingCleaner)] {
            let (template, checker, aspect_log) = template(cleaner);
            let descriptor = DescriptorCache::new().get_or_insert("reserve()", "lcn", Propagation::Required, vec![]);
            aspect_log.trace("G1", "U2", &descriptor);
            checker.schedule_check("G1", "U2", "lcn", TransactionState::Commit);

            let _ = template.clean("G1", "U2", "lcn", TransactionState::Commit).await;

            assert!(!checker.is_pending("G1", "U2"));
            assert!(aspect_log.get("G1", "U2").is_none());
        }
    }

    #[tokio::test]
    async fn test_cleaner_error_is_returned() {
        let (template, _, _) = template(Arc::new(FailingCleaner));
        let err = template
            .clean("G1", "U2", "lcn", TransactionState::Rollback)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "clean transaction fail: connection for G1 already closed");
    }
}
