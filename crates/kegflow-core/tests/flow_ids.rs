use kegflow_core::{FlowConfig, FlowFactory, FlowIdRegistry, ManualClock, Tap};
use kegflow_test_utils::tap_named;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

#[test]
fn test_factories_sharing_a_registry_never_collide() {
    let registry = Arc::new(FlowIdRegistry::new());
    let clock = Arc::new(ManualClock::new(0));
    let config = FlowConfig::default();
    let tap: Arc<dyn Tap> = tap_named("t0");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let factory = FlowFactory::new(Arc::clone(&registry), clock.clone(), &config);
            let tap = Arc::clone(&tap);
            thread::spawn(move || {
                (0..250)
                    .map(|_| factory.build_default(Arc::clone(&tap)).id())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(ids.insert(id));
        }
    }

    assert_eq!(ids.len(), 1000);
    assert_eq!(registry.last_issued(), 1000);
}

#[test]
fn test_factory_with_config_uses_monotonic_clock() {
    let factory = FlowFactory::with_config(&FlowConfig::default());
    let flow = factory.build_default(tap_named("t1"));
    assert_eq!(flow.id().get(), 1);
    assert!(flow.duration() < std::time::Duration::from_secs(5));
}
