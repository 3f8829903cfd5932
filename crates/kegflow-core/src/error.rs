use thiserror::Error;

use crate::domain::flow::FlowState;
use crate::domain::registry::FlowId;

/// Core error type for flow accounting
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// A state change was requested on a flow that already completed
    #[error("Invalid transition: flow {flow_id} already completed, cannot set {target}")]
    InvalidTransition {
        /// The completed flow
        flow_id: FlowId,
        /// The state the caller asked for
        target: FlowState,
    },

    /// An input violated an operation's contract
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A mutation was attempted on a completed flow
    #[error("Flow {0} is completed and can no longer change")]
    FlowCompleted(FlowId),

    /// The manager does not know the named tap
    #[error("Unknown tap: {0}")]
    UnknownTap(String),

    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<serde_yaml::Error> for FlowError {
    fn from(err: serde_yaml::Error) -> Self {
        FlowError::Configuration(err.to_string())
    }
}

impl From<std::io::Error> for FlowError {
    fn from(err: std::io::Error) -> Self {
        FlowError::Configuration(err.to_string())
    }
}

/// Result alias used across the kegflow crates
pub type Result<T> = std::result::Result<T, FlowError>;
