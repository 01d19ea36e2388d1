//! Orchestration: starting the manager and the services, wiring outcome
//! routes, and shutting everything down.

pub mod directory;
pub mod tx_system;

pub use directory::{DirectoryApplier, ServiceDirectory};
pub use tx_system::TxSystem;
