//! # Mock Messenger
//!
//! A [`Messenger`] that answers from a queue of expectations instead of a
//! manager. It makes failure paths that are hard to provoke against a real
//! manager (lost replies, timeouts, rejections) one line each.
//!
//! ```rust
//! use txgroup_core::mock::MockMessenger;
//! use txgroup_core::{Messenger, MessengerError, ManagerCommand, ManagerReply};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut mock = MockMessenger::new();
//!     mock.expect_create().return_ok();
//!     mock.expect_join().return_err(MessengerError::Dropped);
//!
//!     let reply = mock
//!         .send(ManagerCommand::CreateGroup { group_id: "G1".into() })
//!         .await;
//!     assert_eq!(reply, Ok(ManagerReply::Ok));
//!
//!     let reply = mock
//!         .send(ManagerCommand::JoinGroup {
//!             group_id: "G1".into(),
//!             unit_id: "U2".into(),
//!             unit_type: "lcn".into(),
//!             requester_identity: "inventory".into(),
//!             local_state: txgroup_core::TransactionState::Commit,
//!         })
//!         .await;
//!     assert_eq!(reply, Err(MessengerError::Dropped));
//!
//!     mock.verify();
//! }
//! ```

use crate::error::MessengerError;
use crate::message::{ErrorKind, ManagerCommand, ManagerReply};
use crate::messenger::Messenger;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandKind {
    Create,
    Join,
    Notify,
    Check,
}

impl CommandKind {
    fn of(command: &ManagerCommand) -> Self {
        match command {
            ManagerCommand::CreateGroup { .. } => CommandKind::Create,
            ManagerCommand::JoinGroup { .. } => CommandKind::Join,
            ManagerCommand::NotifyGroup { .. } => CommandKind::Notify,
            ManagerCommand::CheckJoin { .. } => CommandKind::Check,
        }
    }
}

struct Expectation {
    kind: CommandKind,
    response: Result<ManagerReply, MessengerError>,
}

type Expectations = Arc<Mutex<VecDeque<Expectation>>>;

/// A messenger with expectation tracking for fluent testing.
///
/// Clones share the same queue, so a clone can be handed to the code under
/// test while the original is kept for [`verify`](MockMessenger::verify).
#[derive(Clone, Default)]
pub struct MockMessenger {
    expectations: Expectations,
    received: Arc<Mutex<Vec<ManagerCommand>>>,
}

impl MockMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_create(&mut self) -> ExpectationBuilder {
        self.builder(CommandKind::Create)
    }

    pub fn expect_join(&mut self) -> ExpectationBuilder {
        self.builder(CommandKind::Join)
    }

    pub fn expect_notify(&mut self) -> ExpectationBuilder {
        self.builder(CommandKind::Notify)
    }

    pub fn expect_check(&mut self) -> ExpectationBuilder {
        self.builder(CommandKind::Check)
    }

    fn builder(&self, kind: CommandKind) -> ExpectationBuilder {
        ExpectationBuilder {
            kind,
            expectations: self.expectations.clone(),
        }
    }

    /// Commands received so far, in order.
    pub fn received(&self) -> Vec<ManagerCommand> {
        self.received.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.expectations.lock().unwrap().len()
    }

    /// Verifies that all expectations were met.
    pub fn verify(&self) {
        let remaining = self.remaining();
        if remaining != 0 {
            panic!("Not all expectations were met. {} remaining", remaining);
        }
    }
}

#[async_trait]
impl Messenger for MockMessenger {
    async fn send(&self, command: ManagerCommand) -> Result<ManagerReply, MessengerError> {
        let kind = CommandKind::of(&command);
        self.received.lock().unwrap().push(command.clone());
        let expectation = self.expectations.lock().unwrap().pop_front();
        match expectation {
            Some(expectation) if expectation.kind == kind => expectation.response,
            Some(expectation) => panic!(
                "Unexpected request {:?}, expected {:?}",
                command, expectation.kind
            ),
            None => panic!("Unexpected request {:?}, no expectation left", command),
        }
    }
}

/// Builder for one expected command.
pub struct ExpectationBuilder {
    kind: CommandKind,
    expectations: Expectations,
}

impl ExpectationBuilder {
    fn push(self, response: Result<ManagerReply, MessengerError>) {
        self.expectations.lock().unwrap().push_back(Expectation {
            kind: self.kind,
            response,
        });
    }

    /// The manager accepts the command.
    pub fn return_ok(self) {
        self.push(Ok(ManagerReply::Ok));
    }

    /// For check-join: the unit is (or is not) recorded.
    pub fn return_present(self, present: bool) {
        let reply = if present {
            ManagerReply::Present
        } else {
            ManagerReply::Absent
        };
        self.push(Ok(reply));
    }

    /// The manager rejects the command.
    pub fn return_rejection(self, kind: ErrorKind, message: impl Into<String>) {
        self.push(Ok(ManagerReply::error(kind, message)));
    }

    /// The transport fails.
    pub fn return_err(self, error: MessengerError) {
        self.push(Err(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_answers_in_order_and_records() {
        let mut mock = MockMessenger::new();
        mock.expect_create().return_ok();
        mock.expect_check().return_present(false);

        let client = mock.clone();
        let create = client
            .send(ManagerCommand::CreateGroup {
                group_id: "G1".into(),
            })
            .await;
        assert_eq!(create, Ok(ManagerReply::Ok));

        let check = client
            .send(ManagerCommand::CheckJoin {
                group_id: "G1".into(),
                unit_id: "U1".into(),
            })
            .await;
        assert_eq!(check, Ok(ManagerReply::Absent));

        assert_eq!(mock.received().len(), 2);
        mock.verify();
    }

    #[tokio::test]
    #[should_panic(expected = "Unexpected request")]
    async fn test_mock_panics_on_mismatch() {
        let mut mock = MockMessenger::new();
        mock.expect_notify().return_ok();
        let _ = mock
            .send(ManagerCommand::CreateGroup {
                group_id: "G1".into(),
            })
            .await;
    }
}
