use crate::listener::FlowListener;
use dashmap::DashMap;
use kegflow_core::{
    DomainEvent, Flow, FlowConfig, FlowError, FlowFactory, FlowId, FlowSnapshot, FlowState,
    Result, Tap,
};
use kegflow_monitoring::LogExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock, TryLockError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, info_span};

type Published = (FlowSnapshot, Vec<Box<dyn DomainEvent>>);

/// Owns the active flow of every registered tap.
///
/// Listeners see each flow's events in the order the flow raised them, even
/// when several threads drive the same tap.
pub struct FlowManager {
    factory: FlowFactory,
    config: FlowConfig,
    taps: DashMap<String, Arc<dyn Tap>>,
    flows: DashMap<String, Flow>,
    listeners: RwLock<Vec<Arc<dyn FlowListener>>>,
    outbox: Mutex<VecDeque<Published>>,
    delivering: Mutex<()>,
}

impl FlowManager {
    /// Create a manager. New flows use the factory's clock and the
    /// configured idle threshold.
    pub fn new(factory: FlowFactory, config: FlowConfig) -> Self {
        Self {
            factory,
            config,
            taps: DashMap::new(),
            flows: DashMap::new(),
            listeners: RwLock::new(Vec::new()),
            outbox: Mutex::new(VecDeque::new()),
            delivering: Mutex::new(()),
        }
    }

    /// Make a tap known to the manager, replacing any tap with the same name
    pub fn register_tap(&self, tap: Arc<dyn Tap>) {
        debug!(tap = tap.name(), "Registering tap");
        self.taps.insert(tap.name().to_string(), tap);
    }

    /// Names of the registered taps, sorted
    pub fn taps(&self) -> Vec<String> {
        let mut names: Vec<String> = self.taps.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Register a listener for flow events
    pub fn add_listener(&self, listener: Arc<dyn FlowListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    /// Begin a session on `tap_name`, attributing it to `username` when one
    /// is given.
    ///
    /// If the tap already has a flow, that flow is reused; it picks up the
    /// username only while still anonymous.
    pub fn start_flow(&self, tap_name: &str, username: &str) -> Result<FlowId> {
        let tap = self.tap(tap_name)?;
        let flow_id = {
            let mut flow = self
                .flows
                .entry(tap_name.to_string())
                .or_insert_with(|| self.factory.build_default(tap));
            if !username.is_empty() && flow.is_anonymous() {
                flow.set_username(username)?;
            }
            info!(flow_id = %flow.id(), tap = tap_name, user = flow.username(), "Flow started");
            self.enqueue(&mut flow);
            flow.id()
        };

        self.flush();
        Ok(flow_id)
    }

    /// Record `delta` new meter pulses on `tap_name`.
    ///
    /// Opens a flow if the tap has none and moves the flow to ACTIVE.
    pub fn handle_meter_update(&self, tap_name: &str, delta: i64) -> Result<FlowSnapshot> {
        if delta < 0 {
            return Err(FlowError::InvalidArgument(format!(
                "tick delta must be non-negative, got {}",
                delta
            )));
        }
        let tap = self.tap(tap_name)?;

        let snapshot = {
            let mut flow = self
                .flows
                .entry(tap_name.to_string())
                .or_insert_with(|| self.factory.build_default(tap));
            if flow.state() != FlowState::Active {
                flow.set_state(FlowState::Active)?;
            }
            let total = flow.add_ticks(delta)?;
            debug!(flow_id = %flow.id(), tap = tap_name, delta, total, "Meter update");
            self.enqueue(&mut flow)
        };

        self.flush();
        Ok(snapshot)
    }

    /// Complete the flow on `tap_name`, if any, and return its final record
    pub fn end_flow(&self, tap_name: &str) -> Result<Option<FlowSnapshot>> {
        self.tap(tap_name)?;
        let Some((_, mut flow)) = self.flows.remove(tap_name) else {
            return Ok(None);
        };

        let span = info_span!("end_flow", flow_id = %flow.id(), tap = tap_name);
        let _entered = span.enter();
        flow.set_state(FlowState::Completed).log_err("Failed to complete flow")?;
        info!("{}", flow);
        let snapshot = self.enqueue(&mut flow);
        self.flush();
        Ok(Some(snapshot))
    }

    /// Current record of the flow on `tap_name`
    pub fn active_flow(&self, tap_name: &str) -> Option<FlowSnapshot> {
        self.flows.get(tap_name).map(|flow| flow.snapshot())
    }

    /// Current records of every open flow, ordered by flow id
    pub fn active_flows(&self) -> Vec<FlowSnapshot> {
        let mut flows: Vec<FlowSnapshot> =
            self.flows.iter().map(|e| e.value().snapshot()).collect();
        flows.sort_by_key(|f| f.flow_id);
        flows
    }

    /// End every flow whose idle predicate holds.
    ///
    /// Each one is marked IDLE, then completed and removed. Returns the final
    /// records of the flows that were ended.
    pub fn sweep_idle(&self) -> Vec<FlowSnapshot> {
        let idle_taps: Vec<String> = self
            .flows
            .iter()
            .filter(|e| e.value().is_idle())
            .map(|e| e.key().clone())
            .collect();

        let mut ended = Vec::with_capacity(idle_taps.len());
        for tap_name in idle_taps {
            // Activity may have arrived since the scan
            let Some((_, mut flow)) = self.flows.remove_if(&tap_name, |_, f| f.is_idle()) else {
                continue;
            };

            let span = info_span!("end_idle_flow", flow_id = %flow.id(), tap = %tap_name);
            let _entered = span.enter();
            let idle_for = flow.idle_duration();
            let completed = flow
                .set_state(FlowState::Idle)
                .and_then(|_| flow.set_state(FlowState::Completed))
                .log_warn("Failed to end idle flow");
            if completed.is_err() {
                continue;
            }

            info!(idle_ms = millis(idle_for), "Ended idle flow");
            ended.push(self.enqueue(&mut flow));
        }

        self.flush();
        ended
    }

    /// Sweep for idle flows every `sweep_interval` until `shutdown` turns
    /// true or its sender is dropped.
    pub async fn run_idle_sweeper(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.sweep_interval().max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_ms = millis(period), "Idle sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let ended = self.sweep_idle();
                    if !ended.is_empty() {
                        debug!(count = ended.len(), "Idle sweep ended flows");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Idle sweeper stopped");
    }

    /// Configuration the manager was created with
    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    fn tap(&self, tap_name: &str) -> Result<Arc<dyn Tap>> {
        self.taps
            .get(tap_name)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| FlowError::UnknownTap(tap_name.to_string()))
    }

    /// Queue the flow's pending events and return its snapshot. Callers hold
    /// the flow exclusively, so one flow's batches queue in the order raised.
    fn enqueue(&self, flow: &mut Flow) -> FlowSnapshot {
        let snapshot = flow.snapshot();
        let events = flow.take_events();
        if !events.is_empty() {
            self.outbox
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push_back((snapshot.clone(), events));
        }
        snapshot
    }

    /// Hand queued events to the listeners, outside every map lock.
    ///
    /// Only one thread delivers at a time. A caller that finds delivery in
    /// progress leaves its batch to the delivering thread, which includes a
    /// listener calling back into the manager.
    fn flush(&self) {
        loop {
            {
                let _delivering = match self.delivering.try_lock() {
                    Ok(guard) => guard,
                    Err(TryLockError::Poisoned(e)) => e.into_inner(),
                    Err(TryLockError::WouldBlock) => return,
                };
                while let Some(batch) = self.next_batch() {
                    self.deliver(batch);
                }
            }
            // A batch queued just before the lock was released was left to us
            if self.outbox.lock().unwrap_or_else(|e| e.into_inner()).is_empty() {
                return;
            }
        }
    }

    fn next_batch(&self) -> Option<Published> {
        self.outbox.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }

    fn deliver(&self, (snapshot, events): Published) {
        let listeners: Vec<Arc<dyn FlowListener>> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for event in &events {
            for listener in &listeners {
                listener.on_flow_event(&snapshot, event.as_ref());
            }
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kegflow_core::{FlowIdRegistry, ManualClock};
    use kegflow_test_utils::tap_named;
    use std::collections::HashMap;
    use std::sync::{OnceLock, Weak};
    use std::thread;

    #[derive(Default)]
    struct RecordingListener {
        seen: Mutex<Vec<(String, FlowId, FlowState)>>,
    }

    impl RecordingListener {
        fn event_types(&self) -> Vec<String> {
            self.seen.lock().unwrap().iter().map(|(t, _, _)| t.clone()).collect()
        }
    }

    impl FlowListener for RecordingListener {
        fn on_flow_event(&self, snapshot: &FlowSnapshot, event: &dyn DomainEvent) {
            self.seen.lock().unwrap().push((
                event.event_type().to_string(),
                event.flow_id(),
                snapshot.state,
            ));
        }
    }

    fn manager(max_idle_ms: u64) -> (FlowManager, Arc<ManualClock>, Arc<RecordingListener>) {
        let clock = Arc::new(ManualClock::new(0));
        let config = FlowConfig {
            max_idle_ms,
            sweep_interval_ms: 10,
        };
        let factory = FlowFactory::new(Arc::new(FlowIdRegistry::new()), clock.clone(), &config);
        let manager = FlowManager::new(factory, config);
        manager.register_tap(tap_named("tap0"));
        manager.register_tap(tap_named("tap1"));
        let listener = Arc::new(RecordingListener::default());
        manager.add_listener(listener.clone());
        (manager, clock, listener)
    }

    #[test]
    fn test_taps_are_sorted() {
        let (manager, _, _) = manager(0);
        assert_eq!(manager.taps(), vec!["tap0".to_string(), "tap1".to_string()]);
    }

    #[test]
    fn test_unknown_tap() {
        let (manager, _, _) = manager(0);
        assert_eq!(
            manager.handle_meter_update("nope", 1),
            Err(FlowError::UnknownTap("nope".to_string()))
        );
        assert!(matches!(manager.start_flow("nope", ""), Err(FlowError::UnknownTap(_))));
        assert!(matches!(manager.end_flow("nope"), Err(FlowError::UnknownTap(_))));
    }

    #[test]
    fn test_meter_update_opens_and_activates_flow() {
        let (manager, _, listener) = manager(1000);

        let snapshot = manager.handle_meter_update("tap0", 12).unwrap();

        assert_eq!(snapshot.state, FlowState::Active);
        assert_eq!(snapshot.ticks, 12);
        assert_eq!(snapshot.volume_ml, 12.0);
        assert_eq!(listener.event_types(), vec!["flow.created", "flow.state_changed"]);

        let again = manager.handle_meter_update("tap0", 3).unwrap();
        assert_eq!(again.flow_id, snapshot.flow_id);
        assert_eq!(again.ticks, 15);
        assert_eq!(listener.event_types().len(), 2);
    }

    #[test]
    fn test_negative_meter_update_does_not_open_flow() {
        let (manager, _, _) = manager(1000);
        assert!(matches!(
            manager.handle_meter_update("tap0", -1),
            Err(FlowError::InvalidArgument(_))
        ));
        assert!(manager.active_flow("tap0").is_none());
    }

    #[test]
    fn test_start_flow_attaches_user_once() {
        let (manager, _, _) = manager(1000);

        let id = manager.start_flow("tap0", "alice").unwrap();
        let same = manager.start_flow("tap0", "bob").unwrap();

        assert_eq!(id, same);
        let snapshot = manager.active_flow("tap0").unwrap();
        assert_eq!(snapshot.username, "alice");
        assert_eq!(snapshot.state, FlowState::Initial);
    }

    #[test]
    fn test_end_flow_returns_final_record() {
        let (manager, clock, listener) = manager(1000);
        manager.handle_meter_update("tap0", 5).unwrap();
        clock.set(300);

        let record = manager.end_flow("tap0").unwrap().unwrap();

        assert_eq!(record.state, FlowState::Completed);
        assert_eq!(record.end_ms, Some(300));
        assert_eq!(record.duration_ms, 300);
        assert!(manager.active_flow("tap0").is_none());
        assert_eq!(manager.end_flow("tap0").unwrap(), None);
        assert_eq!(listener.event_types().last().map(String::as_str), Some("flow.completed"));
    }

    #[test]
    fn test_new_flow_after_end_gets_new_id() {
        let (manager, _, _) = manager(1000);
        let first = manager.handle_meter_update("tap0", 1).unwrap().flow_id;
        manager.end_flow("tap0").unwrap();
        let second = manager.handle_meter_update("tap0", 1).unwrap().flow_id;
        assert!(second > first);
    }

    #[test]
    fn test_sweep_idle_ends_only_idle_flows() {
        let (manager, clock, listener) = manager(1000);
        manager.handle_meter_update("tap0", 10).unwrap();
        manager.start_flow("tap1", "").unwrap();

        clock.set(1001);
        let ended = manager.sweep_idle();

        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].tap, "tap0");
        assert_eq!(ended[0].state, FlowState::Completed);
        // INITIAL flows never count as idle
        assert!(manager.active_flow("tap1").is_some());
        assert!(manager.active_flow("tap0").is_none());

        let types = listener.event_types();
        assert_eq!(
            &types[types.len() - 3..],
            ["flow.state_changed", "flow.state_changed", "flow.completed"]
        );
    }

    #[test]
    fn test_sweep_respects_recent_activity() {
        let (manager, clock, _) = manager(1000);
        manager.handle_meter_update("tap0", 10).unwrap();
        clock.set(900);
        manager.handle_meter_update("tap0", 1).unwrap();
        clock.set(1500);

        assert!(manager.sweep_idle().is_empty());
        assert_eq!(manager.active_flows().len(), 1);
    }

    #[test]
    fn test_zero_idle_threshold_never_sweeps() {
        let (manager, clock, _) = manager(0);
        manager.handle_meter_update("tap0", 10).unwrap();
        clock.set(1_000_000);
        assert!(manager.sweep_idle().is_empty());
    }

    #[test]
    fn test_active_flows_ordered_by_id() {
        let (manager, _, _) = manager(1000);
        manager.handle_meter_update("tap1", 1).unwrap();
        manager.handle_meter_update("tap0", 1).unwrap();

        let taps: Vec<_> = manager.active_flows().into_iter().map(|f| f.tap).collect();
        assert_eq!(taps, vec!["tap1".to_string(), "tap0".to_string()]);
    }

    #[test]
    fn test_events_reach_listeners_in_flow_order_under_contention() {
        let (manager, _, listener) = manager(1000);
        let manager = Arc::new(manager);

        for _ in 0..50 {
            let updater = {
                let manager = Arc::clone(&manager);
                thread::spawn(move || {
                    for _ in 0..20 {
                        manager.handle_meter_update("tap0", 1).unwrap();
                    }
                })
            };
            let ender = {
                let manager = Arc::clone(&manager);
                thread::spawn(move || {
                    for _ in 0..20 {
                        manager.end_flow("tap0").unwrap();
                    }
                })
            };
            updater.join().unwrap();
            ender.join().unwrap();
        }
        manager.end_flow("tap0").unwrap();

        let mut per_flow: HashMap<FlowId, Vec<String>> = HashMap::new();
        for (event_type, flow_id, _) in listener.seen.lock().unwrap().iter() {
            per_flow.entry(*flow_id).or_default().push(event_type.clone());
        }
        assert!(!per_flow.is_empty());
        for (flow_id, types) in per_flow {
            let first = types.first().map(String::as_str);
            let last = types.last().map(String::as_str);
            assert_eq!(first, Some("flow.created"), "flow {}", flow_id);
            assert_eq!(last, Some("flow.completed"), "flow {}", flow_id);
            assert_eq!(types.iter().filter(|t| *t == "flow.completed").count(), 1);
        }
    }

    /// Opens a fresh flow on the tap whenever one completes
    #[derive(Default)]
    struct RestartingListener {
        manager: OnceLock<Weak<FlowManager>>,
        seen: Mutex<Vec<String>>,
    }

    impl FlowListener for RestartingListener {
        fn on_flow_event(&self, snapshot: &FlowSnapshot, event: &dyn DomainEvent) {
            self.seen.lock().unwrap().push(event.event_type().to_string());
            if event.event_type() != "flow.completed" {
                return;
            }
            if let Some(manager) = self.manager.get().and_then(Weak::upgrade) {
                manager.start_flow(&snapshot.tap, "next").unwrap();
            }
        }
    }

    #[test]
    fn test_listener_may_call_back_into_manager() {
        let (manager, _, _) = manager(1000);
        let manager = Arc::new(manager);
        let listener = Arc::new(RestartingListener::default());
        listener.manager.set(Arc::downgrade(&manager)).unwrap();
        manager.add_listener(listener.clone());

        let first = manager.handle_meter_update("tap0", 3).unwrap().flow_id;
        manager.end_flow("tap0").unwrap();

        assert_eq!(
            *listener.seen.lock().unwrap(),
            vec!["flow.created", "flow.state_changed", "flow.completed", "flow.created"]
        );
        let next = manager.active_flow("tap0").unwrap();
        assert!(next.flow_id > first);
        assert_eq!(next.username, "next");
    }

    #[tokio::test]
    async fn test_idle_sweeper_ends_flow_and_stops() {
        let (manager, clock, _) = manager(1000);
        let manager = Arc::new(manager);
        manager.handle_meter_update("tap0", 10).unwrap();
        clock.set(2_000);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&manager).run_idle_sweeper(rx));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while manager.active_flow("tap0").is_some() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(manager.active_flow("tap0").is_none());

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sweeper should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_idle_sweeper_stops_when_sender_dropped() {
        let (manager, _, _) = manager(1000);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::new(manager).run_idle_sweeper(rx));

        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sweeper should stop")
            .unwrap();
    }
}
