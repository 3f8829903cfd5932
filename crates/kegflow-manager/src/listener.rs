use kegflow_core::{DomainEvent, FlowSnapshot};
use tracing::info;

/// Receives the domain events raised by managed flows
pub trait FlowListener: Send + Sync {
    /// Called once per event, with the flow as it was after the operation
    /// that raised it
    fn on_flow_event(&self, snapshot: &FlowSnapshot, event: &dyn DomainEvent);
}

/// Listener that writes every event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingFlowListener;

impl FlowListener for LoggingFlowListener {
    fn on_flow_event(&self, snapshot: &FlowSnapshot, event: &dyn DomainEvent) {
        info!(
            event_type = event.event_type(),
            flow_id = %event.flow_id(),
            at_ms = event.at_ms(),
            tap = %snapshot.tap,
            state = %snapshot.state,
            ticks = snapshot.ticks,
            volume_ml = snapshot.volume_ml,
            "Flow event"
        );
    }
}
