use kegflow_core::{MeterTap, Tap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Tap that counts how often it converts ticks to volume.
///
/// Conversion is `ticks * ml_per_tick`, like [`MeterTap`].
#[derive(Debug)]
pub struct RecordingTap {
    name: String,
    ml_per_tick: f64,
    conversions: AtomicUsize,
}

impl RecordingTap {
    /// Create a recording tap
    pub fn new(name: impl Into<String>, ml_per_tick: f64) -> Self {
        Self {
            name: name.into(),
            ml_per_tick,
            conversions: AtomicUsize::new(0),
        }
    }

    /// Number of `volume_ml_for_ticks` calls so far
    pub fn conversions(&self) -> usize {
        self.conversions.load(Ordering::SeqCst)
    }
}

impl Tap for RecordingTap {
    fn name(&self) -> &str {
        &self.name
    }

    fn volume_ml_for_ticks(&self, ticks: u64) -> f64 {
        self.conversions.fetch_add(1, Ordering::SeqCst);
        ticks as f64 * self.ml_per_tick
    }
}

/// A 1 ml-per-tick [`MeterTap`] with the given name
pub fn tap_named(name: &str) -> Arc<dyn Tap> {
    match MeterTap::new(name, 1.0) {
        Ok(tap) => Arc::new(tap),
        Err(e) => panic!("1.0 ml per tick is always valid: {}", e),
    }
}
