//! # txgroup
//!
//! Distributed transaction groups for async Rust services.
//!
//! A *group* is one distributed transaction. The service whose call starts it
//! (the initiator) creates the group at a manager, every downstream service
//! that takes part joins it as a *unit*, and the initiator finally notifies
//! commit or rollback. Business code never handles group ids: identity rides
//! in task-local contexts and crosses service boundaries as a small wire
//! projection.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Building Blocks ([`txgroup_core`])
//! Propagation and frame contexts, the command vocabulary, the `Messenger`
//! transport seam, config, and tracing setup.
//!
//! ### 2. The Coordinator ([`txgroup_manager`])
//! The group registry (`OPEN → NOTIFIED → CLEANED`), the manager actor loop,
//! and the watchdog that reclaims groups nobody notified.
//!
//! ### 3. The Service Side ([`txgroup_client`])
//! The weaver that wraps each transactional call, the create/join/notify
//! controller, the failure taxonomy, and delayed join verification.
//!
//! ### 4. The Demo ([`lifecycle`], [`orders`], [`inventory`])
//! An order service (initiator) and an inventory service (participant) wired
//! to one manager by [`TxSystem`](lifecycle::TxSystem).
//!
//! ## 🚀 Quick Start
//!
//! ```bash
//! # Run the demo with info logs
//! RUST_LOG=info cargo run
//! ```

pub mod error;
pub mod inventory;
pub mod lifecycle;
pub mod orders;

pub use error::ServiceError;
pub use lifecycle::TxSystem;
