//! # txgroup manager
//!
//! The coordinating process. It owns the authoritative [`GroupRegistry`],
//! accepts create/join/notify/check commands through [`ManagerActor`], hands
//! decided outcomes to a [`ResultApplier`], and reclaims groups that outlive
//! their allowed lifetime.

pub mod actor;
pub mod applier;
pub mod registry;
pub mod service;

pub use actor::ManagerActor;
pub use applier::{LoggingApplier, ResultApplier};
pub use registry::{
    GroupRegistry, GroupSnapshot, GroupState, JoinOutcome, RegistryError, UnitRecord,
};
pub use service::ManagerService;
