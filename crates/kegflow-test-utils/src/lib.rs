//! Testing utilities for the kegflow crates.
//!
//! Fakes for the tap collaborator, a builder that wires a flow to a
//! controllable clock, and assertion helpers for flow state.

pub mod assertions;
pub mod builders;
pub mod mocks;

pub use assertions::{assert_flow_state, assert_frozen, FlowAssertionError};
pub use builders::{TestFlow, TestFlowBuilder};
pub use mocks::{tap_named, RecordingTap};

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize test tracing with a consistent format.
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_test_tracing() {
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("kegflow_core=debug,kegflow_manager=debug")
        }))
        .with_test_writer()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
