//! # Frame Context
//!
//! Per-call state of the transactional frame currently running in this task:
//! which group and unit it belongs to, whether it owns teardown, and whether
//! its group was inherited from a caller.
//!
//! Exactly one frame per group instance owns teardown (`is_destroy`). A
//! re-entrant call in the same task runs inside a [`LocalContext::nested`]
//! copy that keeps the group id and clears the flag.

use crate::message::TransactionState;
use std::cell::RefCell;
use std::future::Future;

tokio::task_local! {
    static LOCAL: RefCell<LocalContext>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalContext {
    group_id: String,
    unit_id: String,
    transaction_type: String,
    destroy: bool,
    in_group: bool,
    state: TransactionState,
}

impl LocalContext {
    /// Context for the outermost transactional frame of a task.
    pub fn owner(
        group_id: impl Into<String>,
        unit_id: impl Into<String>,
        transaction_type: impl Into<String>,
        in_group: bool,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            unit_id: unit_id.into(),
            transaction_type: transaction_type.into(),
            destroy: true,
            in_group,
            state: TransactionState::Commit,
        }
    }

    /// Copy for a re-entrant call: same group, never owns teardown.
    pub fn nested(&self) -> Self {
        Self {
            destroy: false,
            in_group: true,
            ..self.clone()
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    pub fn transaction_type(&self) -> &str {
        &self.transaction_type
    }

    pub fn is_destroy(&self) -> bool {
        self.destroy
    }

    pub fn is_in_group(&self) -> bool {
        self.in_group
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub async fn scope<F: Future>(ctx: LocalContext, f: F) -> F::Output {
        LOCAL.scope(RefCell::new(ctx), f).await
    }

    /// Snapshot of the running frame, if any.
    pub fn current() -> Option<LocalContext> {
        LOCAL.try_with(|cell| cell.borrow().clone()).ok()
    }

    /// Records the local outcome of the running frame. No-op outside a frame.
    pub fn set_current_state(state: TransactionState) {
        let _ = LOCAL.try_with(|cell| cell.borrow_mut().state = state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_nested_frame_inherits_group_but_not_teardown() {
        assert!(LocalContext::current().is_none());

        let owner = LocalContext::owner("G1", "U1", "lcn", false);
        LocalContext::scope(owner, async {
            let outer = LocalContext::current().unwrap();
            assert!(outer.is_destroy());
            assert!(!outer.is_in_group());

            LocalContext::scope(outer.nested(), async {
                let inner = LocalContext::current().unwrap();
                assert_eq!(inner.group_id(), "G1");
                assert!(!inner.is_destroy());
                assert!(inner.is_in_group());
            })
            .await;

            assert!(LocalContext::current().unwrap().is_destroy());
        })
        .await;

        assert!(LocalContext::current().is_none());
    }

    #[tokio::test]
    async fn test_set_current_state() {
        LocalContext::set_current_state(TransactionState::Rollback);
        let owner = LocalContext::owner("G1", "U1", "lcn", true);
        let state = LocalContext::scope(owner, async {
            LocalContext::set_current_state(TransactionState::Rollback);
            LocalContext::current().unwrap().state()
        })
        .await;
        assert_eq!(state, TransactionState::Rollback);
    }
}
