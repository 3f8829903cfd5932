//!
//! Kegflow Core - pour session accounting for metered taps
//!
//! This crate models a single pour session (a *flow*) on a tap fitted with a
//! pulse-emitting flow meter: tick accumulation, tick-to-volume conversion,
//! idle detection and the flow's lifecycle state machine.
//!
//! Flows are single-owner values. Share one across threads only behind
//! external synchronisation; the one piece of shared state here is the
//! [`FlowIdRegistry`] counter, which is safe under concurrent use.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - flow entity, collaborators and rules
pub mod domain;

/// Configuration
pub mod config;

/// Error types
pub mod error;

// Re-export main API types for easy use
pub use config::FlowConfig;
pub use domain::clock::{Clock, ManualClock, MonotonicClock};
pub use domain::events::{DomainEvent, FlowCompleted, FlowCreated, FlowStateChanged};
pub use domain::factory::FlowFactory;
pub use domain::flow::{Flow, FlowSnapshot, FlowState};
pub use domain::registry::{FlowId, FlowIdRegistry};
pub use domain::tap::{MeterTap, Tap};
pub use error::{FlowError, Result};
