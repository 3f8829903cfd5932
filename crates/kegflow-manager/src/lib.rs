//! Kegflow Manager - the controller that owns active flows.
//!
//! One flow is active per tap. Meter updates open and feed flows, explicit
//! calls end them, and the idle sweeper ends flows whose idle predicate has
//! fired. Every domain event a flow raises is handed to registered
//! [`FlowListener`]s after the manager releases its internal locks, in the
//! order the flow raised them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Flow event listeners
pub mod listener;

/// Flow manager
pub mod manager;

pub use listener::{FlowListener, LoggingFlowListener};
pub use manager::FlowManager;
