//! # Delayed Checking
//!
//! A join reply can be lost after the manager already recorded the join, or
//! the join can be lost on the way in. Either way the participant cannot tell
//! from the failed call alone. [`DelayedChecker::schedule_check`] spawns a
//! detached task that waits for the configured delay, asks the manager whether
//! the unit is recorded, and re-issues the join once if it is not.
//!
//! The check never blocks the business call and never fails it: its own
//! failures go to the exception handler and are logged. Local clean cancels a
//! pending check through [`DelayedChecker::stop_check`].

use crate::failure::{ExceptionHandler, Failure, Phase};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use txgroup_core::{ReliableMessenger, TransactionState};

type UnitKey = (String, String);

struct PendingCheck {
    id: u64,
    handle: JoinHandle<()>,
}

#[derive(Clone)]
pub struct DelayedChecker {
    messenger: ReliableMessenger,
    handler: Arc<dyn ExceptionHandler>,
    delay: Duration,
    pending: Arc<DashMap<UnitKey, PendingCheck>>,
    next_id: Arc<AtomicU64>,
}

impl DelayedChecker {
    pub fn new(
        messenger: ReliableMessenger,
        handler: Arc<dyn ExceptionHandler>,
        delay: Duration,
    ) -> Self {
        Self {
            messenger,
            handler,
            delay,
            pending: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Schedules verification of a join. A check already pending for the same
    /// unit is replaced.
    pub fn schedule_check(
        &self,
        group_id: &str,
        unit_id: &str,
        transaction_type: &str,
        state: TransactionState,
    ) {
        let key: UnitKey = (group_id.to_string(), unit_id.to_string());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let task = CheckTask {
            messenger: self.messenger.clone(),
            handler: self.handler.clone(),
            group_id: group_id.to_string(),
            unit_id: unit_id.to_string(),
            transaction_type: transaction_type.to_string(),
            state,
        };
        let delay = self.delay;
        let pending = self.pending.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.run().await;
            pending.remove_if(&task_key, |_, check| check.id == id);
        });

        debug!(%group_id, %unit_id, ?delay, "Delayed check scheduled");
        if let Some(previous) = self.pending.insert(key.clone(), PendingCheck { id, handle }) {
            previous.handle.abort();
        }
        // The task may have finished before it was registered.
        self.pending
            .remove_if(&key, |_, check| check.id == id && check.handle.is_finished());
    }

    /// Cancels the pending check for a unit, if any.
    pub fn stop_check(&self, group_id: &str, unit_id: &str) -> bool {
        match self
            .pending
            .remove(&(group_id.to_string(), unit_id.to_string()))
        {
            Some((_, check)) => {
                check.handle.abort();
                debug!(%group_id, %unit_id, "Delayed check stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, group_id: &str, unit_id: &str) -> bool {
        self.pending
            .contains_key(&(group_id.to_string(), unit_id.to_string()))
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

struct CheckTask {
    messenger: ReliableMessenger,
    handler: Arc<dyn ExceptionHandler>,
    group_id: String,
    unit_id: String,
    transaction_type: String,
    state: TransactionState,
}

impl CheckTask {
    async fn run(self) {
        let (group_id, unit_id) = (&self.group_id, &self.unit_id);
        match self.messenger.check_join(group_id, unit_id).await {
            Ok(true) => debug!(%group_id, %unit_id, "Join confirmed"),
            Ok(false) => {
                warn!(%group_id, %unit_id, "Join not recorded, re-issuing");
                let rejoin = self
                    .messenger
                    .join_group(group_id, unit_id, &self.transaction_type, self.state)
                    .await;
                match rejoin {
                    Ok(()) => info!(%group_id, %unit_id, "Re-join accepted"),
                    Err(e) => {
                        let failure = Failure::from_message(
                            Phase::Join,
                            group_id,
                            unit_id,
                            &self.transaction_type,
                            Some(self.state),
                            e,
                        );
                        if let Err(e) = self.handler.handle(failure) {
                            error!(%group_id, %unit_id, error = %e, "Delayed check gave up");
                        }
                    }
                }
            }
            Err(e) => error!(%group_id, %unit_id, error = %e, "Delayed check failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::AbortHandler;
    use txgroup_core::mock::MockMessenger;
    use txgroup_core::{ErrorKind, ManagerCommand, MessengerError};

    fn checker(mock: &MockMessenger) -> DelayedChecker {
        let messenger = ReliableMessenger::new(Arc::new(mock.clone()), "inventory");
        DelayedChecker::new(messenger, Arc::new(AbortHandler), Duration::from_secs(2))
    }

    async fn settle(checker: &DelayedChecker) {
        tokio::time::sleep(Duration::from_secs(3)).await;
        for _ in 0..10 {
            if checker.pending() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_join_is_not_reissued() {
        let mut mock = MockMessenger::new();
        mock.expect_check().return_present(true);
        let checker = checker(&mock);

        checker.schedule_check("G1", "U2", "lcn", TransactionState::Commit);
        assert!(checker.is_pending("G1", "U2"));
        settle(&checker).await;

        mock.verify();
        assert_eq!(mock.received().len(), 1);
        assert_eq!(checker.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_join_is_reissued_with_snapshot() {
        let mut mock = MockMessenger::new();
        mock.expect_check().return_present(false);
        mock.expect_join().return_ok();
        let checker = checker(&mock);

        checker.schedule_check("G1", "U2", "lcn", TransactionState::Rollback);
        settle(&checker).await;

        mock.verify();
        let received = mock.received();
        assert!(matches!(
            &received[1],
            ManagerCommand::JoinGroup { unit_id, local_state: TransactionState::Rollback, .. } if unit_id == "U2"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_failures_stay_inside_the_task() {
        let mut mock = MockMessenger::new();
        mock.expect_check().return_err(MessengerError::Closed);
        mock.expect_check().return_present(false);
        mock.expect_join().return_rejection(ErrorKind::UnknownGroup, "G2");
        let checker = checker(&mock);

        checker.schedule_check("G1", "U2", "lcn", TransactionState::Commit);
        checker.schedule_check("G2", "U2", "lcn", TransactionState::Commit);
        settle(&checker).await;

        mock.verify();
        assert_eq!(checker.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_check_cancels_before_query() {
        let mock = MockMessenger::new();
        let checker = checker(&mock);

        checker.schedule_check("G1", "U2", "lcn", TransactionState::Commit);
        assert!(checker.stop_check("G1", "U2"));
        assert!(!checker.stop_check("G1", "U2"));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(mock.received().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_pending_check() {
        let mut mock = MockMessenger::new();
        mock.expect_check().return_present(true);
        let checker = checker(&mock);

        checker.schedule_check("G1", "U2", "lcn", TransactionState::Commit);
        checker.schedule_check("G1", "U2", "lcn", TransactionState::Commit);
        assert_eq!(checker.pending(), 1);
        settle(&checker).await;

        mock.verify();
        assert_eq!(mock.received().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_very_long_delay_stays_pending() {
        let mock = MockMessenger::new();
        let messenger = ReliableMessenger::new(Arc::new(mock.clone()), "inventory");
        let checker = DelayedChecker::new(messenger, Arc::new(AbortHandler), Duration::MAX);

        checker.schedule_check("G1", "U2", "lcn", TransactionState::Commit);
        tokio::time::sleep(Duration::from_secs(3_600)).await;

        assert!(checker.is_pending("G1", "U2"));
        assert!(mock.received().is_empty());
        assert!(checker.stop_check("G1", "U2"));
    }
}
