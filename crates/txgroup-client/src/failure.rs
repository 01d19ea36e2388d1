//! # Failure Taxonomy
//!
//! Every failure the lifecycle controller sees is classified along two axes:
//! the phase it happened in ([`Phase`]) and whether the outcome on the manager
//! side is unknown ([`FailureClass::Transport`]) or a known rejection
//! ([`FailureClass::Business`]). The classified [`Failure`] goes to a single
//! [`ExceptionHandler`], which decides whether the enclosing business call is
//! aborted with a [`TransactionError`] or allowed to continue.

use std::fmt;
use tracing::{error, warn};
use txgroup_core::{BoxError, MessageFailure, TransactionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Create,
    Join,
    Notify,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Create => write!(f, "create"),
            Phase::Join => write!(f, "join"),
            Phase::Notify => write!(f, "notify"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// The message may or may not have reached the manager.
    Transport,
    /// The manager answered and said no.
    Business,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::Transport => write!(f, "transport"),
            FailureClass::Business => write!(f, "business"),
        }
    }
}

/// The group outlived its allowed lifetime before it could be notified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("dtx timeout for group {0}")]
pub struct DtxTimeout(pub String);

/// A classified failure together with the full operation context.
#[derive(Debug)]
pub struct Failure {
    pub phase: Phase,
    pub class: FailureClass,
    pub group_id: String,
    pub unit_id: String,
    pub transaction_type: String,
    /// Outcome carried by the failed command. Set for join and notify.
    pub state: Option<TransactionState>,
    pub cause: BoxError,
}

impl Failure {
    /// Classifies a failed manager round trip.
    pub fn from_message(
        phase: Phase,
        group_id: &str,
        unit_id: &str,
        transaction_type: &str,
        state: Option<TransactionState>,
        failure: MessageFailure,
    ) -> Self {
        let (class, cause): (FailureClass, BoxError) = match failure {
            MessageFailure::Transport(e) => (FailureClass::Transport, Box::new(e)),
            MessageFailure::Business(e) => (FailureClass::Business, Box::new(e)),
        };
        Self {
            phase,
            class,
            group_id: group_id.to_string(),
            unit_id: unit_id.to_string(),
            transaction_type: transaction_type.to_string(),
            state,
            cause,
        }
    }

    pub fn business(
        phase: Phase,
        group_id: &str,
        unit_id: &str,
        transaction_type: &str,
        state: Option<TransactionState>,
        cause: impl Into<BoxError>,
    ) -> Self {
        Self {
            phase,
            class: FailureClass::Business,
            group_id: group_id.to_string(),
            unit_id: unit_id.to_string(),
            transaction_type: transaction_type.to_string(),
            state,
            cause: cause.into(),
        }
    }
}

/// The coordination failure surfaced to the business caller.
#[derive(Debug, thiserror::Error)]
#[error("{phase} group {group_id} failed ({class}) for unit {unit_id}: {source}")]
pub struct TransactionError {
    pub phase: Phase,
    pub class: FailureClass,
    pub group_id: String,
    pub unit_id: String,
    pub transaction_type: String,
    pub state: Option<TransactionState>,
    #[source]
    pub source: BoxError,
}

impl From<Failure> for TransactionError {
    fn from(failure: Failure) -> Self {
        Self {
            phase: failure.phase,
            class: failure.class,
            group_id: failure.group_id,
            unit_id: failure.unit_id,
            transaction_type: failure.transaction_type,
            state: failure.state,
            source: failure.cause,
        }
    }
}

/// What the entry operation returns on failure.
///
/// The business error is passed through untouched; coordination failures are
/// wrapped so the caller can tell the two apart.
#[derive(Debug, thiserror::Error)]
pub enum RunError<E> {
    #[error("business failure: {0}")]
    Business(E),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl<E> RunError<E> {
    pub fn business(&self) -> Option<&E> {
        match self {
            RunError::Business(e) => Some(e),
            RunError::Transaction(_) => None,
        }
    }

    pub fn transaction(&self) -> Option<&TransactionError> {
        match self {
            RunError::Business(_) => None,
            RunError::Transaction(e) => Some(e),
        }
    }
}

/// Decides abort-or-continue for a classified failure.
///
/// Returning `Err` aborts the enclosing business call; returning `Ok` lets it
/// continue as if the step had succeeded.
pub trait ExceptionHandler: Send + Sync {
    fn handle(&self, failure: Failure) -> Result<(), TransactionError>;
}

/// Aborts on every failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortHandler;

impl ExceptionHandler for AbortHandler {
    fn handle(&self, failure: Failure) -> Result<(), TransactionError> {
        error!(
            phase = %failure.phase,
            class = %failure.class,
            group_id = %failure.group_id,
            unit_id = %failure.unit_id,
            tx_type = %failure.transaction_type,
            cause = %failure.cause,
            "Transaction step failed, aborting"
        );
        Err(failure.into())
    }
}

/// Continues past transport failures of join and notify and aborts on
/// everything else.
///
/// A lost join reply is recovered by the delayed check and a lost notify is
/// recovered by the manager watchdog, so neither has to fail the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct TolerantHandler;

impl ExceptionHandler for TolerantHandler {
    fn handle(&self, failure: Failure) -> Result<(), TransactionError> {
        match (failure.phase, failure.class) {
            (Phase::Join | Phase::Notify, FailureClass::Transport) => {
                warn!(
                    phase = %failure.phase,
                    group_id = %failure.group_id,
                    unit_id = %failure.unit_id,
                    cause = %failure.cause,
                    "Transport failure tolerated, outcome unknown"
                );
                Ok(())
            }
            _ => AbortHandler.handle(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txgroup_core::{ErrorKind, ManagerError, MessengerError};

    fn failure(phase: Phase, cause: MessageFailure) -> Failure {
        Failure::from_message(phase, "G1", "U2", "lcn", Some(TransactionState::Commit), cause)
    }

    #[test]
    fn test_message_failure_is_classified() {
        let transport = failure(Phase::Join, MessengerError::Dropped.into());
        assert_eq!(transport.class, FailureClass::Transport);

        let business = failure(
            Phase::Join,
            ManagerError::new(ErrorKind::UnknownGroup, "G1").into(),
        );
        assert_eq!(business.class, FailureClass::Business);
    }

    #[test]
    fn test_abort_handler_wraps_context_and_cause() {
        let err = AbortHandler
            .handle(failure(Phase::Create, MessengerError::Closed.into()))
            .unwrap_err();
        assert_eq!(err.phase, Phase::Create);
        assert_eq!(err.class, FailureClass::Transport);
        assert_eq!(err.group_id, "G1");
        assert_eq!(err.unit_id, "U2");
        assert_eq!(err.transaction_type, "lcn");
        assert_eq!(err.source.to_string(), "manager channel closed");
        assert!(err.to_string().starts_with("create group G1 failed (transport)"));
    }

    #[test]
    fn test_tolerant_handler() {
        let handler = TolerantHandler;
        assert!(handler
            .handle(failure(Phase::Join, MessengerError::Dropped.into()))
            .is_ok());
        assert!(handler
            .handle(failure(Phase::Notify, MessengerError::Closed.into()))
            .is_ok());
        assert!(handler
            .handle(failure(Phase::Create, MessengerError::Closed.into()))
            .is_err());
        let rejected = ManagerError::new(ErrorKind::GroupNotOpen, "G1");
        assert!(handler
            .handle(failure(Phase::Join, rejected.into()))
            .is_err());
    }

    #[test]
    fn test_run_error_accessors() {
        let business: RunError<&str> = RunError::Business("out of stock");
        assert_eq!(business.business(), Some(&"out of stock"));
        assert!(business.transaction().is_none());

        let tx: RunError<&str> = RunError::Transaction(
            Failure::business(Phase::Notify, "G1", "U1", "lcn", None, DtxTimeout("G1".into()))
                .into(),
        );
        assert_eq!(tx.transaction().map(|e| e.phase), Some(Phase::Notify));
        assert_eq!(tx.to_string(), "notify group G1 failed (business) for unit U1: dtx timeout for group G1");
    }
}
