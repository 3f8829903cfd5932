use kegflow_core::{
    Flow, FlowConfig, FlowFactory, FlowIdRegistry, FlowState, ManualClock, MeterTap, Result, Tap,
};
use std::sync::Arc;
use std::time::Duration;

/// A flow together with the clock and tap it was built with
#[derive(Debug)]
pub struct TestFlow {
    /// The flow under test
    pub flow: Flow,
    /// Clock shared with the flow
    pub clock: Arc<ManualClock>,
    /// Tap the flow pours from
    pub tap: Arc<dyn Tap>,
}

impl TestFlow {
    /// Move the shared clock to `ms`
    pub fn at(&self, ms: u64) -> &Self {
        self.clock.set(ms);
        self
    }
}

/// Builder for flows driven by a [`ManualClock`]
#[derive(Debug, Clone)]
pub struct TestFlowBuilder {
    tap_name: String,
    ml_per_tick: f64,
    max_idle: Duration,
    start_ms: u64,
    state: FlowState,
    username: String,
    ticks: i64,
    tap: Option<Arc<dyn Tap>>,
}

impl Default for TestFlowBuilder {
    fn default() -> Self {
        Self {
            tap_name: "kegboard.flow0".to_string(),
            ml_per_tick: 1.0,
            max_idle: Duration::from_secs(1),
            start_ms: 0,
            state: FlowState::Initial,
            username: String::new(),
            ticks: 0,
            tap: None,
        }
    }
}

impl TestFlowBuilder {
    /// Start from the defaults: 1 ml per tick, 1 s idle threshold, t=0
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the generated tap
    pub fn tap_name(mut self, name: impl Into<String>) -> Self {
        self.tap_name = name.into();
        self
    }

    /// Conversion factor of the generated tap
    pub fn ml_per_tick(mut self, ml_per_tick: f64) -> Self {
        self.ml_per_tick = ml_per_tick;
        self
    }

    /// Use this tap instead of generating one
    pub fn tap(mut self, tap: Arc<dyn Tap>) -> Self {
        self.tap = Some(tap);
        self
    }

    /// Idle threshold
    pub fn max_idle_ms(mut self, ms: u64) -> Self {
        self.max_idle = Duration::from_millis(ms);
        self
    }

    /// Clock reading at construction
    pub fn start_ms(mut self, ms: u64) -> Self {
        self.start_ms = ms;
        self
    }

    /// State to move to after construction
    pub fn state(mut self, state: FlowState) -> Self {
        self.state = state;
        self
    }

    /// Username to attach
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Ticks to add after construction
    pub fn ticks(mut self, ticks: i64) -> Self {
        self.ticks = ticks;
        self
    }

    /// Build the flow. Setup happens at `start_ms`, events are drained.
    pub fn build(self) -> Result<TestFlow> {
        let clock = Arc::new(ManualClock::new(self.start_ms));
        let tap = match self.tap {
            Some(tap) => tap,
            None => Arc::new(MeterTap::new(self.tap_name, self.ml_per_tick)?),
        };
        let factory = FlowFactory::new(
            Arc::new(FlowIdRegistry::new()),
            clock.clone(),
            &FlowConfig::default(),
        );

        let mut flow = factory.build(Arc::clone(&tap), self.max_idle);
        if !self.username.is_empty() {
            flow.set_username(self.username)?;
        }
        if self.ticks > 0 {
            flow.add_ticks(self.ticks)?;
        }
        if self.state != FlowState::Initial {
            flow.set_state(self.state)?;
        }
        flow.take_events();

        Ok(TestFlow { flow, clock, tap })
    }
}
