use std::fmt::Debug;

use crate::error::{FlowError, Result};

/// A metered tap a flow is bound to.
///
/// Flows only read from a tap. `volume_ml_for_ticks` must be a pure function
/// of the tap's configuration and the tick count.
#[cfg_attr(test, mockall::automock)]
pub trait Tap: Debug + Send + Sync {
    /// Identity used in summaries and to key per-tap state
    fn name(&self) -> &str;

    /// Convert an accumulated pulse count into millilitres
    fn volume_ml_for_ticks(&self, ticks: u64) -> f64;
}

/// Tap with a fixed volume per meter pulse
#[derive(Debug, Clone, PartialEq)]
pub struct MeterTap {
    name: String,
    ml_per_tick: f64,
}

impl MeterTap {
    /// Create a tap; `ml_per_tick` must be finite and positive
    pub fn new(name: impl Into<String>, ml_per_tick: f64) -> Result<Self> {
        if !ml_per_tick.is_finite() || ml_per_tick <= 0.0 {
            return Err(FlowError::InvalidArgument(format!(
                "ml_per_tick must be positive, got {}",
                ml_per_tick
            )));
        }

        Ok(Self {
            name: name.into(),
            ml_per_tick,
        })
    }

    /// Millilitres represented by one pulse
    pub fn ml_per_tick(&self) -> f64 {
        self.ml_per_tick
    }
}

impl Tap for MeterTap {
    fn name(&self) -> &str {
        &self.name
    }

    fn volume_ml_for_ticks(&self, ticks: u64) -> f64 {
        ticks as f64 * self.ml_per_tick
    }
}
