//! # Observability
//!
//! Structured logging for clients and the manager.
//!
//! Every lifecycle step logs with the same field names so one group can be
//! followed across services by filtering on `group_id`:
//!
//! - `group_id`, `unit_id`: transaction identity
//! - `tx_type`: coordination strategy tag
//! - `state`: commit / rollback
//!
//! ```bash
//! RUST_LOG=info cargo run                       # lifecycle milestones
//! RUST_LOG=debug cargo run                      # every command and context change
//! RUST_LOG=txgroup_manager=debug cargo run      # manager side only
//! ```

/// Initializes the tracing subscriber with `RUST_LOG` filtering and a compact format.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}

/// Like [`setup_tracing`], but tolerates a subscriber already being installed.
///
/// Useful in tests where several cases race to install one.
pub fn try_setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .with_test_writer()
        .try_init();
}
