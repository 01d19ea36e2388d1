//! # txgroup client
//!
//! The service side of a transaction group. Everything a transactional method
//! call goes through between interception and the business code:
//!
//! - [`descriptor`]: per-method metadata and the process-wide descriptor cache.
//! - [`weaver`]: the entry point. Resolves the call's role, handles re-entrant
//!   calls, and owns teardown.
//! - [`control`]: create, join and notify against the manager.
//! - [`failure`]: the phase by class failure taxonomy and its handlers.
//! - [`checking`]: delayed verification of joins.
//! - [`clean`]: local cleanup once an outcome is known.
//! - [`global`] and [`audit`]: per-group process state and the descriptor trail.
//!
//! [`TxClient`] wires all of it for one service.

pub mod audit;
pub mod checking;
pub mod clean;
pub mod client;
pub mod control;
pub mod descriptor;
pub mod failure;
pub mod global;
pub mod weaver;

pub use audit::AspectLog;
pub use checking::DelayedChecker;
pub use clean::{CleanTemplate, NoopCleaner, TransactionCleaner};
pub use client::{TxClient, TxClientBuilder};
pub use control::TransactionControl;
pub use descriptor::{DescriptorCache, MethodMeta, Propagation, Role, TransactionDescriptor};
pub use failure::{
    AbortHandler, DtxTimeout, ExceptionHandler, Failure, FailureClass, Phase, RunError,
    TolerantHandler, TransactionError,
};
pub use global::{GlobalContext, GroupContext};
pub use weaver::TransactionWeaver;
