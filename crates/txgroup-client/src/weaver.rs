//! # Reentrancy & Teardown
//!
//! [`TransactionWeaver::start_or_join`] is the single entry point the
//! interception layer calls for every transactional method. It decides what
//! the call is and runs the matching lifecycle around the business callback:
//!
//! ```text
//! frame already running in this task ──► run business directly (nested)
//!        │ no
//!        ▼
//! resolve propagation against the tracing context
//!   ├─ NonTransactional ──► run business, no coordination
//!   ├─ Initiator ─────────► create ─► business ─► notify(commit | rollback)
//!   └─ Participant ───────► business ─► join(local state)
//! ```
//!
//! Only the outermost frame owns teardown. Teardown runs from a drop guard, so
//! it happens on success, on business failure, on coordination failure, and
//! when the caller drops the future halfway.

use crate::control::TransactionControl;
use crate::descriptor::{Propagation, Role, TransactionDescriptor};
use crate::failure::{Failure, Phase, RunError, TransactionError};
use crate::global::{GlobalContext, GroupContext};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};
use txgroup_core::{ContextError, LocalContext, TracingContext, TransactionState};

#[derive(Clone)]
pub struct TransactionWeaver {
    control: TransactionControl,
    global: Arc<GlobalContext>,
    service_id: String,
    address: String,
}

impl TransactionWeaver {
    pub fn new(
        control: TransactionControl,
        global: Arc<GlobalContext>,
        service_id: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            control,
            global,
            service_id: service_id.into(),
            address: address.into(),
        }
    }

    /// Runs `business` as one transactional call described by `descriptor`.
    ///
    /// Returns the callback's value, the callback's own error untouched, or
    /// the coordination failure that aborted the call.
    pub async fn start_or_join<T, E, F, Fut>(
        &self,
        descriptor: TransactionDescriptor,
        business: F,
    ) -> Result<T, RunError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(frame) = LocalContext::current() {
            debug!(
                group_id = %frame.group_id(),
                unit_id = %descriptor.unit_id(),
                "Nested transactional call"
            );
            return LocalContext::scope(frame.nested(), business())
                .await
                .map_err(RunError::Business);
        }

        let fresh_scope = descriptor.propagation() == Propagation::RequiresNew
            || !TracingContext::is_entered();
        if fresh_scope {
            TracingContext::scope(TracingContext::default(), self.run_frame(descriptor, business))
                .await
        } else {
            self.run_frame(descriptor, business).await
        }
    }

    async fn run_frame<T, E, F, Fut>(
        &self,
        descriptor: TransactionDescriptor,
        business: F,
    ) -> Result<T, RunError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let has_group = TracingContext::with_current(|ctx| ctx.has_group()).unwrap_or(false);
        let role = descriptor.propagation().resolve(has_group);
        if role == Role::NonTransactional {
            debug!(unit_id = %descriptor.unit_id(), "No group to support, running uncoordinated");
            return business().await.map_err(RunError::Business);
        }

        let group_id = match self.enter_group(role) {
            Ok(group_id) => group_id,
            Err(e) => {
                let phase = match role {
                    Role::Initiator => Phase::Create,
                    _ => Phase::Join,
                };
                let failure = Failure::business(
                    phase,
                    "",
                    descriptor.unit_id(),
                    descriptor.transaction_type(),
                    None,
                    e,
                );
                return Err(TransactionError::from(failure).into());
            }
        };

        let (group, created) = self.global.start_tx(&group_id);
        let in_group = !created;
        let frame = LocalContext::owner(
            &group_id,
            descriptor.unit_id(),
            descriptor.transaction_type(),
            in_group,
        );
        debug!(%group_id, unit_id = %descriptor.unit_id(), ?role, in_group, "Transaction frame start");

        LocalContext::scope(frame, async move {
            let _teardown = Teardown {
                group,
                global: self.global.clone(),
                in_group,
            };
            match role {
                Role::Initiator => self.run_initiator(&group_id, &descriptor, business).await,
                _ => self.run_participant(&group_id, &descriptor, business).await,
            }
        })
        .await
    }

    /// Starts or inherits the group in the current tracing context and
    /// registers this service as a participant.
    fn enter_group(&self, role: Role) -> Result<String, ContextError> {
        TracingContext::with_current(|ctx| {
            if role == Role::Initiator {
                ctx.begin_group();
            }
            ctx.add_participant(self.service_id.as_str(), self.address.as_str())?;
            ctx.group_id().map(str::to_string)
        })
        .unwrap_or(Err(ContextError::NoActiveGroup))
    }

    async fn run_initiator<T, E, F, Fut>(
        &self,
        group_id: &str,
        descriptor: &TransactionDescriptor,
        business: F,
    ) -> Result<T, RunError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let unit_id = descriptor.unit_id();
        let transaction_type = descriptor.transaction_type();

        self.control
            .create_group(group_id, unit_id, descriptor, transaction_type)
            .await?;

        let outcome = business().await;
        let state = TransactionState::from_outcome(&outcome);
        LocalContext::set_current_state(state);

        let notified = self
            .control
            .notify_group(group_id, unit_id, transaction_type, state)
            .await;
        settle(outcome, notified)
    }

    async fn run_participant<T, E, F, Fut>(
        &self,
        group_id: &str,
        descriptor: &TransactionDescriptor,
        business: F,
    ) -> Result<T, RunError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let outcome = business().await;
        let state = TransactionState::from_outcome(&outcome);
        LocalContext::set_current_state(state);

        let joined = self
            .control
            .join_group(
                group_id,
                descriptor.unit_id(),
                descriptor.transaction_type(),
                descriptor,
                state,
            )
            .await;
        settle(outcome, joined)
    }
}

/// A business failure outranks the coordination failure that followed it.
fn settle<T, E>(
    outcome: Result<T, E>,
    step: Result<(), TransactionError>,
) -> Result<T, RunError<E>> {
    match (outcome, step) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), Ok(())) => Err(RunError::Business(e)),
        (Err(e), Err(step_error)) => {
            warn!(error = %step_error, "Coordination also failed after business failure");
            Err(RunError::Business(e))
        }
    }
}

struct Teardown {
    group: Arc<GroupContext>,
    global: Arc<GlobalContext>,
    in_group: bool,
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.group.complete();
        if !self.in_group {
            self.global.destroy_tx(self.group.group_id());
        }
        TracingContext::destroy_current();
        debug!(group_id = %self.group.group_id(), "Transaction frame end");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AspectLog;
    use crate::checking::DelayedChecker;
    use crate::clean::{CleanTemplate, NoopCleaner};
    use crate::descriptor::DescriptorCache;
    use crate::failure::{AbortHandler, FailureClass};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use txgroup_core::mock::MockMessenger;
    use txgroup_core::{ErrorKind, ManagerCommand, MessengerError, ReliableMessenger};

    fn weaver(mock: &MockMessenger) -> (TransactionWeaver, Arc<GlobalContext>) {
        let messenger = ReliableMessenger::new(Arc::new(mock.clone()), "order");
        let aspect_log = Arc::new(AspectLog::new());
        let handler = Arc::new(AbortHandler);
        let checker = DelayedChecker::new(messenger.clone(), handler.clone(), Duration::from_secs(60));
        let global = Arc::new(GlobalContext::new(Duration::from_secs(30)));
        let clean = CleanTemplate::new(Arc::new(NoopCleaner), checker.clone(), aspect_log.clone());
        let control = TransactionControl::new(
            messenger,
            aspect_log,
            checker,
            handler,
            clean,
            global.clone(),
        );
        (
            TransactionWeaver::new(control, global.clone(), "order", "10.0.0.1:8080"),
            global,
        )
    }

    fn descriptor(signature: &str, propagation: Propagation) -> TransactionDescriptor {
        DescriptorCache::new().get_or_insert(signature, "lcn", propagation, vec![])
    }

    #[tokio::test]
    async fn test_initiator_creates_then_notifies_commit() {
        let mut mock = MockMessenger::new();
        mock.expect_create().return_ok();
        mock.expect_notify().return_ok();
        let (weaver, global) = weaver(&mock);

        let value = weaver
            .start_or_join(descriptor("place()", Propagation::Required), || async {
                let frame = LocalContext::current().unwrap();
                assert!(frame.is_destroy());
                assert!(!frame.is_in_group());
                assert!(TracingContext::current().has_group());
                Ok::<_, String>(7)
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        mock.verify();
        let received = mock.received();
        assert!(matches!(
            &received[1],
            ManagerCommand::NotifyGroup { state: TransactionState::Commit, .. }
        ));
        assert!(global.is_empty());
        assert!(LocalContext::current().is_none());
    }

    #[tokio::test]
    async fn test_business_failure_notifies_rollback_and_tears_down() {
        let mut mock = MockMessenger::new();
        mock.expect_create().return_ok();
        mock.expect_notify().return_ok();
        let (weaver, global) = weaver(&mock);

        let caller = TracingContext::default();
        let (result, after) = TracingContext::scope(caller, async {
            let result = weaver
                .start_or_join(descriptor("place()", Propagation::Required), || async {
                    Err::<(), _>("out of stock")
                })
                .await;
            (result, TracingContext::current())
        })
        .await;

        assert_eq!(result.unwrap_err().business(), Some(&"out of stock"));
        assert!(matches!(
            &mock.received()[1],
            ManagerCommand::NotifyGroup { state: TransactionState::Rollback, .. }
        ));
        assert!(!after.has_group());
        assert!(global.is_empty());
    }

    #[tokio::test]
    async fn test_nested_call_runs_business_once_without_messages() {
        let mut mock = MockMessenger::new();
        mock.expect_create().return_ok();
        mock.expect_notify().return_ok();
        let (weaver, _) = weaver(&mock);
        let calls = AtomicUsize::new(0);
        let (weaver_ref, calls_ref) = (&weaver, &calls);

        weaver
            .start_or_join(descriptor("outer()", Propagation::Required), move || async move {
                let outer_group = LocalContext::current().unwrap().group_id().to_string();
                let outer_ref = &outer_group;
                weaver_ref
                    .start_or_join(descriptor("inner()", Propagation::RequiresNew), move || async move {
                        calls_ref.fetch_add(1, Ordering::SeqCst);
                        let inner = LocalContext::current().unwrap();
                        assert_eq!(inner.group_id(), outer_ref.as_str());
                        assert!(!inner.is_destroy());
                        Ok::<_, String>(())
                    })
                    .await
                    .map_err(|e| e.to_string())?;
                assert!(LocalContext::current().unwrap().is_destroy());
                Ok::<_, String>(())
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        mock.verify();
        assert_eq!(mock.received().len(), 2);
    }

    #[tokio::test]
    async fn test_create_failure_aborts_before_business() {
        let mut mock = MockMessenger::new();
        mock.expect_create().return_err(MessengerError::Closed);
        let (weaver, global) = weaver(&mock);
        let calls = AtomicUsize::new(0);
        let calls_ref = &calls;

        let err = weaver
            .start_or_join(descriptor("place()", Propagation::Required), move || async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await
            .unwrap_err();

        let tx = err.transaction().unwrap();
        assert_eq!((tx.phase, tx.class), (Phase::Create, FailureClass::Transport));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(global.is_empty());
    }

    #[tokio::test]
    async fn test_participant_joins_inherited_group_after_business() {
        let mut mock = MockMessenger::new();
        mock.expect_join().return_ok();
        let (weaver, global) = weaver(&mock);

        let mut inherited = TracingContext::default();
        inherited.begin_group();
        let group_id = inherited.group_id().unwrap().to_string();
        let group_ref = &group_id;

        let participants = TracingContext::scope(inherited, async {
            weaver
                .start_or_join(descriptor("reserve()", Propagation::Supports), move || async move {
                    let frame = LocalContext::current().unwrap();
                    assert_eq!(frame.group_id(), group_ref.as_str());
                    Ok::<_, String>(TracingContext::current().participants().unwrap().clone())
                })
                .await
                .unwrap()
        })
        .await;

        assert_eq!(participants.get("order").map(String::as_str), Some("10.0.0.1:8080"));
        assert!(matches!(
            &mock.received()[0],
            ManagerCommand::JoinGroup { group_id: g, local_state: TransactionState::Commit, .. } if *g == group_id
        ));
        assert!(global.is_empty());
    }

    #[tokio::test]
    async fn test_participant_join_rejection_surfaces() {
        let mut mock = MockMessenger::new();
        mock.expect_join().return_rejection(ErrorKind::UnknownGroup, "gone");
        let (weaver, _) = weaver(&mock);

        let mut inherited = TracingContext::default();
        inherited.begin_group();
        let err = TracingContext::scope(inherited, async {
            weaver
                .start_or_join(descriptor("reserve()", Propagation::Required), || async {
                    Ok::<_, String>(())
                })
                .await
                .unwrap_err()
        })
        .await;

        let tx = err.transaction().unwrap();
        assert_eq!((tx.phase, tx.class), (Phase::Join, FailureClass::Business));
    }

    #[tokio::test]
    async fn test_supports_without_group_is_uncoordinated() {
        let mock = MockMessenger::new();
        let (weaver, global) = weaver(&mock);

        let value = weaver
            .start_or_join(descriptor("lookup()", Propagation::Supports), || async {
                assert!(LocalContext::current().is_none());
                Ok::<_, String>("plain")
            })
            .await
            .unwrap();

        assert_eq!(value, "plain");
        assert!(mock.received().is_empty());
        assert!(global.is_empty());
    }

    #[tokio::test]
    async fn test_requires_new_ignores_inherited_group() {
        let mut mock = MockMessenger::new();
        mock.expect_create().return_ok();
        mock.expect_notify().return_ok();
        let (weaver, _) = weaver(&mock);

        let mut inherited = TracingContext::default();
        inherited.begin_group();
        let outer_group = inherited.group_id().unwrap().to_string();

        let still_outer = TracingContext::scope(inherited, async {
            weaver
                .start_or_join(descriptor("audit()", Propagation::RequiresNew), || async {
                    Ok::<_, String>(())
                })
                .await
                .unwrap();
            TracingContext::current().group_id().map(str::to_string)
        })
        .await;

        assert_eq!(still_outer.as_deref(), Ok(outer_group.as_str()));
        assert!(matches!(
            &mock.received()[0],
            ManagerCommand::CreateGroup { group_id } if *group_id != outer_group
        ));
    }

    #[tokio::test]
    async fn test_teardown_wakes_completion_waiters() {
        let mut mock = MockMessenger::new();
        mock.expect_create().return_ok();
        mock.expect_notify().return_ok();
        let (weaver, global) = weaver(&mock);
        let global_ref = &global;

        let (context_tx, context_rx) = tokio::sync::oneshot::channel::<Arc<GroupContext>>();
        let watcher = async {
            let context = context_rx.await.unwrap();
            context.wait_for_completion().await;
            context.is_completed()
        };
        let run = weaver.start_or_join(
            descriptor("place()", Propagation::Required),
            move || async move {
                let group_id = LocalContext::current().unwrap().group_id().to_string();
                let context = global_ref.context(&group_id).unwrap();
                let _ = context_tx.send(context);
                tokio::task::yield_now().await;
                Ok::<_, String>(())
            },
        );

        let (completed, result) = tokio::join!(watcher, run);
        assert!(result.is_ok());
        assert!(completed);
        assert!(global.is_empty());
    }
}
