use crate::config::FlowConfig;
use crate::domain::clock::{Clock, MonotonicClock};
use crate::domain::flow::Flow;
use crate::domain::registry::FlowIdRegistry;
use crate::domain::tap::Tap;
use std::sync::Arc;
use std::time::Duration;

/// Builds flows with fresh ids from a shared registry and a shared clock
#[derive(Debug, Clone)]
pub struct FlowFactory {
    registry: Arc<FlowIdRegistry>,
    clock: Arc<dyn Clock>,
    default_max_idle: Duration,
}

impl FlowFactory {
    /// Create a factory
    pub fn new(registry: Arc<FlowIdRegistry>, clock: Arc<dyn Clock>, config: &FlowConfig) -> Self {
        Self {
            registry,
            clock,
            default_max_idle: config.max_idle(),
        }
    }

    /// Factory using a fresh registry and the system monotonic clock
    pub fn with_config(config: &FlowConfig) -> Self {
        Self::new(
            Arc::new(FlowIdRegistry::new()),
            Arc::new(MonotonicClock::new()),
            config,
        )
    }

    /// Build a flow on `tap` with an explicit idle threshold
    pub fn build(&self, tap: Arc<dyn Tap>, max_idle: Duration) -> Flow {
        Flow::build(self.registry.next_id(), tap, max_idle, Arc::clone(&self.clock))
    }

    /// Build a flow using the configured idle threshold
    pub fn build_default(&self, tap: Arc<dyn Tap>) -> Flow {
        self.build(tap, self.default_max_idle)
    }

    /// Clock shared by every flow this factory builds
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Id registry backing this factory
    pub fn registry(&self) -> &Arc<FlowIdRegistry> {
        &self.registry
    }
}
