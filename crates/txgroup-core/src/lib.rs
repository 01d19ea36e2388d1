//! # txgroup core
//!
//! Shared building blocks for distributed transaction groups: the identity
//! that follows a call chain across tasks and processes, the command
//! vocabulary spoken with the manager, and the transport seam.
//!
//! ## Architecture Overview
//!
//! A *group* is one distributed transaction. The service that starts it (the
//! initiator) asks the manager to create it; every downstream service that
//! takes part (a participant) joins it as a *unit*; the initiator finally
//! notifies the outcome. Three layers make that possible without the business
//! code ever holding a group id:
//!
//! 1. **Identity** ([`propagation`], [`local`]): task-local contexts. The
//!    [`TracingContext`] is what crosses process boundaries (group id and
//!    participant map); the [`LocalContext`] is the state of the running
//!    transactional frame.
//! 2. **Vocabulary** ([`message`], [`codec`]): serde commands and replies.
//! 3. **Transport** ([`messenger`]): the [`Messenger`] trait, an in-process
//!    [`ChannelMessenger`], and the typed [`ReliableMessenger`] front.
//!
//! ## Testing
//!
//! [`mock::MockMessenger`] replaces the manager with a queue of expected
//! replies, including transport failures. See the [`mock`] module.

pub mod codec;
pub mod config;
pub mod error;
pub mod local;
pub mod message;
pub mod messenger;
pub mod mock;
pub mod propagation;
pub mod telemetry;

pub use config::TxConfig;
pub use error::{
    BoxError, ClearError, ConfigError, ContextError, ManagerError, MessageFailure, MessengerError,
};
pub use local::LocalContext;
pub use message::{ErrorKind, Frame, ManagerCommand, ManagerReply, Responder, TransactionState};
pub use messenger::{ChannelMessenger, Messenger, ReliableMessenger};
pub use propagation::{TracingContext, TracingProjection};
