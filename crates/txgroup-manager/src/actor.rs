//! # Manager Actor
//!
//! The server half of the manager: it owns the receiving end of the command
//! channel and answers every [`Frame`] a [`ChannelMessenger`] sends.
//!
//! **Concurrency model**: the loop itself only decodes and dispatches. Each
//! command runs in its own task against the shared [`GroupRegistry`], so
//! commands for different groups never wait on each other; commands for the
//! same group are serialized by the registry's per-key entries.
//!
//! The same loop drives the watchdog: on every tick, groups older than the
//! configured lifetime are reclaimed whether or not they were ever notified.
//! A reclaimed group that was still open is rolled back through the applier.
//!
//! # Usage Pattern
//!
//! ```rust
//! use txgroup_core::{ReliableMessenger, TxConfig};
//! use txgroup_manager::ManagerActor;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (actor, messenger) = ManagerActor::new(&TxConfig::default());
//!     let registry = actor.registry();
//!     tokio::spawn(actor.run());
//!
//!     let client = ReliableMessenger::new(Arc::new(messenger), "order-service");
//!     client.create_group("G1").await.unwrap();
//!     assert!(registry.state("G1").is_some());
//! }
//! ```

use crate::applier::{LoggingApplier, ResultApplier};
use crate::registry::GroupRegistry;
use crate::service::ManagerService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use txgroup_core::codec;
use txgroup_core::{ChannelMessenger, ErrorKind, Frame, ManagerCommand, ManagerReply, TxConfig};

const MIN_WATCHDOG_INTERVAL: Duration = Duration::from_millis(1);

pub struct ManagerActor {
    receiver: mpsc::Receiver<Frame>,
    service: ManagerService,
    dtx_time: Duration,
    watchdog_interval: Duration,
}

impl ManagerActor {
    /// Creates the actor and the messenger that talks to it.
    pub fn new(config: &TxConfig) -> (Self, ChannelMessenger) {
        Self::with_applier(config, Arc::new(LoggingApplier))
    }

    pub fn with_applier(
        config: &TxConfig,
        applier: Arc<dyn ResultApplier>,
    ) -> (Self, ChannelMessenger) {
        if let Err(e) = config.validate() {
            warn!(error = %e, "Manager config out of range, clamping");
        }
        let (sender, receiver) = mpsc::channel(config.channel_buffer.max(1));
        let actor = Self {
            receiver,
            service: ManagerService::new(Arc::new(GroupRegistry::new()), applier),
            dtx_time: config.dtx_time(),
            watchdog_interval: config.watchdog_interval().max(MIN_WATCHDOG_INTERVAL),
        };
        let messenger = ChannelMessenger::new(sender, config.rpc_timeout());
        (actor, messenger)
    }

    pub fn registry(&self) -> Arc<GroupRegistry> {
        self.service.registry().clone()
    }

    /// Runs the command loop until every messenger is dropped.
    pub async fn run(mut self) {
        info!("Manager started");
        let mut watchdog = tokio::time::interval(self.watchdog_interval);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = self.receiver.recv() => {
                    let Some(frame) = frame else { break };
                    self.dispatch(frame);
                }
                _ = watchdog.tick() => {
                    let service = self.service.clone();
                    let dtx_time = self.dtx_time;
                    tokio::spawn(async move {
                        service.reclaim_stale(dtx_time).await;
                    });
                }
            }
        }

        info!(groups = self.service.registry().len(), "Manager shutdown");
    }

    fn dispatch(&self, frame: Frame) {
        let Frame {
            payload,
            respond_to,
        } = frame;
        let command: ManagerCommand = match codec::decode(&payload) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "Malformed command");
                let reply = ManagerReply::error(ErrorKind::MalformedCommand, e.to_string());
                respond(respond_to, &reply);
                return;
            }
        };

        debug!(command = command.kind(), group_id = %command.group_id(), "Dispatch");
        let service = self.service.clone();
        tokio::spawn(async move {
            let reply = service.execute(command).await;
            respond(respond_to, &reply);
        });
    }
}

fn respond(respond_to: txgroup_core::Responder, reply: &ManagerReply) {
    match codec::encode(reply) {
        Ok(bytes) => {
            // The caller may have timed out and gone away; that is its problem.
            let _ = respond_to.send(bytes);
        }
        Err(e) => error!(error = %e, "Failed to encode reply"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_malformed_frame_gets_rejection() {
        let (actor, _messenger) = ManagerActor::new(&TxConfig::default());
        let (respond_to, response) = oneshot::channel();
        actor.dispatch(Frame {
            payload: b"{not a command".to_vec(),
            respond_to,
        });
        let reply: ManagerReply = codec::decode(&response.await.unwrap()).unwrap();
        assert!(matches!(
            reply,
            ManagerReply::Error {
                kind: ErrorKind::MalformedCommand,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_zero_sizes_are_clamped() {
        let config = TxConfig {
            channel_buffer: 0,
            watchdog_interval_ms: 0,
            ..TxConfig::default()
        };
        let (actor, messenger) = ManagerActor::new(&config);
        assert_eq!(actor.watchdog_interval, MIN_WATCHDOG_INTERVAL);
        let registry = actor.registry();
        tokio::spawn(actor.run());

        let client = txgroup_core::ReliableMessenger::new(Arc::new(messenger), "order");
        client.create_group("G1").await.expect("create failed");
        assert!(registry.state("G1").is_some());
    }
}
