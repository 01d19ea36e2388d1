//! # Messenger
//!
//! The only thing the coordination layer knows about the network is
//! [`Messenger::send`]: hand over a command, get a reply or a transport error.
//!
//! - [`Messenger`]: the transport seam. Swap in a socket transport, an
//!   in-process channel, or the [`mock`](crate::mock) for tests.
//! - [`ChannelMessenger`]: in-process transport over a Tokio mpsc channel,
//!   with a oneshot reply per call and a per-call timeout.
//! - [`ReliableMessenger`]: typed create/join/notify/check helpers that turn
//!   replies into `Result<_, MessageFailure>`.

use crate::codec;
use crate::error::{ManagerError, MessageFailure, MessengerError};
use crate::message::{Frame, ManagerCommand, ManagerReply, TransactionState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument};

/// Request/response transport to the manager.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, command: ManagerCommand) -> Result<ManagerReply, MessengerError>;
}

/// A cheap-to-clone messenger that forwards encoded frames to a manager task.
///
/// Holds only a sender, so cloning is inexpensive and clones can be shared
/// across tasks.
#[derive(Clone)]
pub struct ChannelMessenger {
    sender: mpsc::Sender<Frame>,
    timeout: Duration,
}

impl ChannelMessenger {
    pub fn new(sender: mpsc::Sender<Frame>, timeout: Duration) -> Self {
        Self { sender, timeout }
    }

    async fn round_trip(&self, payload: Vec<u8>) -> Result<Vec<u8>, MessengerError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(Frame {
                payload,
                respond_to,
            })
            .await
            .map_err(|_| MessengerError::Closed)?;
        response.await.map_err(|_| MessengerError::Dropped)
    }
}

#[async_trait]
impl Messenger for ChannelMessenger {
    async fn send(&self, command: ManagerCommand) -> Result<ManagerReply, MessengerError> {
        let payload = codec::encode(&command)?;
        let bytes = tokio::time::timeout(self.timeout, self.round_trip(payload))
            .await
            .map_err(|_| MessengerError::Timeout(self.timeout))??;
        codec::decode(&bytes)
    }
}

/// Typed front for a [`Messenger`], stamped with this service's identity.
#[derive(Clone)]
pub struct ReliableMessenger {
    inner: Arc<dyn Messenger>,
    service_id: String,
}

impl ReliableMessenger {
    pub fn new(inner: Arc<dyn Messenger>, service_id: impl Into<String>) -> Self {
        Self {
            inner,
            service_id: service_id.into(),
        }
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    #[instrument(skip(self))]
    pub async fn create_group(&self, group_id: &str) -> Result<(), MessageFailure> {
        debug!("Sending request");
        let reply = self
            .inner
            .send(ManagerCommand::CreateGroup {
                group_id: group_id.to_string(),
            })
            .await?;
        expect_ok(reply)
    }

    #[instrument(skip(self))]
    pub async fn join_group(
        &self,
        group_id: &str,
        unit_id: &str,
        unit_type: &str,
        local_state: TransactionState,
    ) -> Result<(), MessageFailure> {
        debug!("Sending request");
        let reply = self
            .inner
            .send(ManagerCommand::JoinGroup {
                group_id: group_id.to_string(),
                unit_id: unit_id.to_string(),
                unit_type: unit_type.to_string(),
                requester_identity: self.service_id.clone(),
                local_state,
            })
            .await?;
        expect_ok(reply)
    }

    #[instrument(skip(self))]
    pub async fn notify_group(
        &self,
        group_id: &str,
        state: TransactionState,
    ) -> Result<(), MessageFailure> {
        debug!("Sending request");
        let reply = self
            .inner
            .send(ManagerCommand::NotifyGroup {
                group_id: group_id.to_string(),
                state,
            })
            .await?;
        expect_ok(reply)
    }

    /// Asks whether the manager holds a join for `(group_id, unit_id)`.
    #[instrument(skip(self))]
    pub async fn check_join(&self, group_id: &str, unit_id: &str) -> Result<bool, MessageFailure> {
        debug!("Sending request");
        let reply = self
            .inner
            .send(ManagerCommand::CheckJoin {
                group_id: group_id.to_string(),
                unit_id: unit_id.to_string(),
            })
            .await?;
        match reply {
            ManagerReply::Present => Ok(true),
            ManagerReply::Absent => Ok(false),
            ManagerReply::Error { kind, message } => Err(ManagerError::new(kind, message).into()),
            ManagerReply::Ok => Err(unexpected(&reply)),
        }
    }
}

fn expect_ok(reply: ManagerReply) -> Result<(), MessageFailure> {
    match reply {
        ManagerReply::Ok => Ok(()),
        ManagerReply::Error { kind, message } => Err(ManagerError::new(kind, message).into()),
        other => Err(unexpected(&other)),
    }
}

fn unexpected(reply: &ManagerReply) -> MessageFailure {
    MessengerError::Codec(format!("unexpected reply {reply:?}")).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ErrorKind;

    /// Answers every frame with a fixed reply.
    fn spawn_echo(reply: ManagerReply) -> ChannelMessenger {
        let (sender, mut receiver) = mpsc::channel::<Frame>(4);
        tokio::spawn(async move {
            while let Some(frame) = receiver.recv().await {
                let _ = frame.respond_to.send(codec::encode(&reply).unwrap());
            }
        });
        ChannelMessenger::new(sender, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_channel_round_trip() {
        let messenger = spawn_echo(ManagerReply::Ok);
        let reply = messenger
            .send(ManagerCommand::CreateGroup {
                group_id: "G1".into(),
            })
            .await
            .unwrap();
        assert_eq!(reply, ManagerReply::Ok);
    }

    #[tokio::test]
    async fn test_closed_channel_is_transport_failure() {
        let (sender, receiver) = mpsc::channel::<Frame>(1);
        drop(receiver);
        let messenger = ChannelMessenger::new(sender, Duration::from_secs(1));
        let result = messenger
            .send(ManagerCommand::CreateGroup {
                group_id: "G1".into(),
            })
            .await;
        assert_eq!(result, Err(MessengerError::Closed));
    }

    #[tokio::test]
    async fn test_dropped_responder_is_transport_failure() {
        let (sender, mut receiver) = mpsc::channel::<Frame>(1);
        tokio::spawn(async move {
            while let Some(frame) = receiver.recv().await {
                drop(frame);
            }
        });
        let messenger = ChannelMessenger::new(sender, Duration::from_secs(1));
        let result = messenger
            .send(ManagerCommand::CreateGroup {
                group_id: "G1".into(),
            })
            .await;
        assert_eq!(result, Err(MessengerError::Dropped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_manager_times_out() {
        let (sender, mut receiver) = mpsc::channel::<Frame>(1);
        let _hold = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Some(frame) = receiver.recv().await {
                held.push(frame);
            }
        });
        let messenger = ChannelMessenger::new(sender, Duration::from_millis(50));
        let result = messenger
            .send(ManagerCommand::CreateGroup {
                group_id: "G1".into(),
            })
            .await;
        assert_eq!(result, Err(MessengerError::Timeout(Duration::from_millis(50))));
    }

    #[tokio::test]
    async fn test_reliable_maps_rejection_to_business_failure() {
        let messenger = spawn_echo(ManagerReply::error(ErrorKind::UnknownGroup, "G9"));
        let reliable = ReliableMessenger::new(Arc::new(messenger), "order-service");
        let result = reliable
            .join_group("G9", "U1", "lcn", TransactionState::Commit)
            .await;
        assert_eq!(
            result,
            Err(MessageFailure::Business(ManagerError::new(
                ErrorKind::UnknownGroup,
                "G9"
            )))
        );
    }

    #[tokio::test]
    async fn test_reliable_check_join() {
        let reliable = ReliableMessenger::new(Arc::new(spawn_echo(ManagerReply::Present)), "svc");
        assert!(reliable.check_join("G1", "U1").await.unwrap());

        let reliable = ReliableMessenger::new(Arc::new(spawn_echo(ManagerReply::Absent)), "svc");
        assert!(!reliable.check_join("G1", "U1").await.unwrap());
    }
}
