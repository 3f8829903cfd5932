use crate::domain::flow::FlowState;
use crate::domain::registry::FlowId;
use std::fmt::Debug;

/// Domain event trait for all events raised by a flow
pub trait DomainEvent: Debug + Send + Sync {
    /// Returns the type of the event as a string
    fn event_type(&self) -> &'static str;

    /// Returns the flow this event is associated with
    fn flow_id(&self) -> FlowId;

    /// Monotonic timestamp (ms) at which the event occurred
    fn at_ms(&self) -> u64;
}

/// Event: Flow created
#[derive(Debug, Clone, PartialEq)]
pub struct FlowCreated {
    /// The new flow
    pub flow_id: FlowId,

    /// Name of the tap the flow is bound to
    pub tap: String,

    /// When the flow was created
    pub at_ms: u64,
}

impl DomainEvent for FlowCreated {
    fn event_type(&self) -> &'static str {
        "flow.created"
    }

    fn flow_id(&self) -> FlowId {
        self.flow_id
    }

    fn at_ms(&self) -> u64 {
        self.at_ms
    }
}

/// Event: Flow moved between states
#[derive(Debug, Clone, PartialEq)]
pub struct FlowStateChanged {
    /// The flow that changed
    pub flow_id: FlowId,

    /// State before the transition
    pub from: FlowState,

    /// State after the transition
    pub to: FlowState,

    /// When the transition happened
    pub at_ms: u64,
}

impl DomainEvent for FlowStateChanged {
    fn event_type(&self) -> &'static str {
        "flow.state_changed"
    }

    fn flow_id(&self) -> FlowId {
        self.flow_id
    }

    fn at_ms(&self) -> u64 {
        self.at_ms
    }
}

/// Event: Flow completed
#[derive(Debug, Clone, PartialEq)]
pub struct FlowCompleted {
    /// The finished flow
    pub flow_id: FlowId,

    /// Frozen session length
    pub duration_ms: u64,

    /// Final pulse count
    pub ticks: u64,

    /// Final volume as reported by the tap
    pub volume_ml: f64,

    /// When the flow completed
    pub at_ms: u64,
}

impl DomainEvent for FlowCompleted {
    fn event_type(&self) -> &'static str {
        "flow.completed"
    }

    fn flow_id(&self) -> FlowId {
        self.flow_id
    }

    fn at_ms(&self) -> u64 {
        self.at_ms
    }
}
