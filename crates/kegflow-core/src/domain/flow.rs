//! The flow aggregate: one pour session on a metered tap.
//!
//! A flow accumulates meter pulses ("ticks"), converts them to volume through
//! its [`Tap`], and tracks activity so callers can tell when the session went
//! quiet. Its lifecycle is a small state machine:
//!
//! ```text
//! INITIAL -> ACTIVE <-> IDLE -> COMPLETED
//! ```
//!
//! Only COMPLETED is enforced: any transition is accepted until the flow
//! completes, after which the flow is a read-only record. Idleness is exposed
//! twice on purpose. [`FlowState::Idle`] is a state a controller assigns,
//! while [`Flow::is_idle`] is a live observation that never changes the state
//! by itself.

use crate::domain::clock::Clock;
use crate::domain::events::{DomainEvent, FlowCompleted, FlowCreated, FlowStateChanged};
use crate::domain::registry::FlowId;
use crate::domain::tap::Tap;
use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Flow lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowState {
    /// Created, no pour observed yet
    Initial,

    /// Pouring, or expected to pour
    Active,

    /// Marked idle by a controller
    Idle,

    /// Finished; terminal
    Completed,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowState::Initial => "INITIAL",
            FlowState::Active => "ACTIVE",
            FlowState::Idle => "IDLE",
            FlowState::Completed => "COMPLETED",
        };
        f.write_str(name)
    }
}

/// Aggregate: a single pour session
#[derive(Debug)]
pub struct Flow {
    id: FlowId,
    tap: Arc<dyn Tap>,
    clock: Arc<dyn Clock>,

    /// Empty means anonymous
    username: String,

    /// Accumulated meter pulses
    ticks: u64,

    state: FlowState,

    start_ms: u64,

    /// Set exactly once, on completion
    end_ms: Option<u64>,

    /// Last activity
    update_ms: u64,

    /// Zero disables idle detection
    max_idle_ms: u64,

    shout: String,

    images: Vec<String>,

    events: Vec<Box<dyn DomainEvent>>,
}

impl Flow {
    /// Construct a flow in [`FlowState::Initial`].
    ///
    /// The id comes from a [`crate::FlowIdRegistry`]; most callers go through
    /// [`crate::FlowFactory`] instead of calling this directly.
    pub fn build(
        flow_id: FlowId,
        tap: Arc<dyn Tap>,
        max_idle: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now_ms();
        let max_idle_ms = u64::try_from(max_idle.as_millis()).unwrap_or(u64::MAX);

        let mut flow = Self {
            id: flow_id,
            tap,
            clock,
            username: String::new(),
            ticks: 0,
            state: FlowState::Initial,
            start_ms: now,
            end_ms: None,
            update_ms: now,
            max_idle_ms,
            shout: String::new(),
            images: Vec::new(),
            events: Vec::with_capacity(4),
        };

        debug!(flow_id = %flow.id, tap = flow.tap.name(), max_idle_ms, "Flow created");
        flow.record_event(Box::new(FlowCreated {
            flow_id: flow.id,
            tap: flow.tap.name().to_string(),
            at_ms: now,
        }));

        flow
    }

    /// Flow id
    #[inline]
    pub fn id(&self) -> FlowId {
        self.id
    }

    /// The tap this flow pours from
    #[inline]
    pub fn tap(&self) -> &Arc<dyn Tap> {
        &self.tap
    }

    /// Current state
    #[inline]
    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Move to `target`.
    ///
    /// Any transition is accepted while the flow is open. Completing stamps
    /// the end time. Once completed, every call fails with
    /// [`FlowError::InvalidTransition`] and the flow is left untouched.
    pub fn set_state(&mut self, target: FlowState) -> Result<()> {
        if self.state == FlowState::Completed {
            warn!(flow_id = %self.id, %target, "Rejected transition on completed flow");
            return Err(FlowError::InvalidTransition {
                flow_id: self.id,
                target,
            });
        }

        let from = self.state;
        let now = self.clock.now_ms();
        self.state = target;

        if from != target {
            debug!(flow_id = %self.id, %from, to = %target, "Flow state changed");
            self.record_event(Box::new(FlowStateChanged {
                flow_id: self.id,
                from,
                to: target,
                at_ms: now,
            }));
        }

        if target == FlowState::Completed {
            self.end_ms = Some(now);
            let duration_ms = now.saturating_sub(self.start_ms);
            let volume_ml = self.volume_ml();
            debug!(
                flow_id = %self.id,
                duration_ms,
                ticks = self.ticks,
                volume_ml,
                "Flow completed"
            );
            self.record_event(Box::new(FlowCompleted {
                flow_id: self.id,
                duration_ms,
                ticks: self.ticks,
                volume_ml,
                at_ms: now,
            }));
        }

        Ok(())
    }

    /// Refresh the last-activity time, restarting the idle clock
    pub fn poke_activity(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.update_ms = self.clock.now_ms();
        Ok(())
    }

    /// Add `delta` meter pulses and poke activity.
    ///
    /// Negative deltas are rejected so the counter never decreases. The
    /// counter saturates at `u64::MAX`. Returns the new total.
    pub fn add_ticks(&mut self, delta: i64) -> Result<u64> {
        self.ensure_open()?;
        let delta = u64::try_from(delta).map_err(|_| {
            warn!(flow_id = %self.id, delta, "Rejected negative tick delta");
            FlowError::InvalidArgument(format!("tick delta must be non-negative, got {}", delta))
        })?;

        self.ticks = self.ticks.saturating_add(delta);
        self.update_ms = self.clock.now_ms();
        Ok(self.ticks)
    }

    /// Accumulated meter pulses
    #[inline]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Poured volume, as converted by the tap
    pub fn volume_ml(&self) -> f64 {
        self.tap.volume_ml_for_ticks(self.ticks)
    }

    /// Username; empty for anonymous pours
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Attribute the flow to `username`; an empty name makes it anonymous
    pub fn set_username(&mut self, username: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        self.username = username.into();
        Ok(())
    }

    /// A user is attached
    pub fn is_authenticated(&self) -> bool {
        !self.username.is_empty()
    }

    /// No user is attached
    pub fn is_anonymous(&self) -> bool {
        !self.is_authenticated()
    }

    /// Shout text; never absent, empty by default
    pub fn shout(&self) -> &str {
        &self.shout
    }

    /// Set the shout. `None` clears it.
    pub fn set_shout(&mut self, shout: Option<&str>) -> Result<()> {
        self.ensure_open()?;
        self.shout = shout.unwrap_or_default().to_string();
        Ok(())
    }

    /// Append an image reference; duplicates are kept
    pub fn add_image(&mut self, image: impl Into<String>) -> Result<()> {
        self.ensure_open()?;
        self.images.push(image.into());
        Ok(())
    }

    /// Remove the first occurrence of `image`; returns whether one was removed
    pub fn remove_image(&mut self, image: &str) -> Result<bool> {
        self.ensure_open()?;
        match self.images.iter().position(|i| i == image) {
            Some(index) => {
                self.images.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Image references in insertion order
    pub fn images(&self) -> &[String] {
        &self.images
    }

    /// Creation time (monotonic ms)
    #[inline]
    pub fn start_ms(&self) -> u64 {
        self.start_ms
    }

    /// Completion time (monotonic ms), set only once completed
    #[inline]
    pub fn end_ms(&self) -> Option<u64> {
        self.end_ms
    }

    /// Last activity time (monotonic ms)
    #[inline]
    pub fn update_ms(&self) -> u64 {
        self.update_ms
    }

    /// Idle threshold; zero means the flow never counts as idle
    pub fn max_idle(&self) -> Duration {
        Duration::from_millis(self.max_idle_ms)
    }

    /// Session length. Grows while open, frozen once completed.
    pub fn duration(&self) -> Duration {
        let end = self.end_ms.unwrap_or_else(|| self.clock.now_ms());
        Duration::from_millis(end.saturating_sub(self.start_ms))
    }

    /// Time since the last activity, always measured against now
    pub fn idle_duration(&self) -> Duration {
        Duration::from_millis(self.clock.now_ms().saturating_sub(self.update_ms))
    }

    /// Time left before the flow counts as idle, never negative
    pub fn time_until_idle(&self) -> Duration {
        self.max_idle().saturating_sub(self.idle_duration())
    }

    /// True when the flow is ACTIVE, has an idle threshold, and has been
    /// quiet for longer than it.
    ///
    /// Advisory only: nothing moves the flow to [`FlowState::Idle`] on its own.
    pub fn is_idle(&self) -> bool {
        if self.state != FlowState::Active || self.max_idle_ms == 0 {
            return false;
        }
        self.idle_duration() > self.max_idle()
    }

    /// State is ACTIVE
    pub fn is_active(&self) -> bool {
        self.state == FlowState::Active
    }

    /// State is COMPLETED
    pub fn is_completed(&self) -> bool {
        self.state == FlowState::Completed
    }

    /// Owned copy of the flow's data, including derived values
    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            flow_id: self.id,
            tap: self.tap.name().to_string(),
            state: self.state,
            username: self.username.clone(),
            ticks: self.ticks,
            volume_ml: self.volume_ml(),
            start_ms: self.start_ms,
            end_ms: self.end_ms,
            update_ms: self.update_ms,
            duration_ms: u64::try_from(self.duration().as_millis()).unwrap_or(u64::MAX),
            max_idle_ms: self.max_idle_ms,
            shout: self.shout.clone(),
            images: self.images.clone(),
        }
    }

    fn record_event(&mut self, event: Box<dyn DomainEvent>) {
        self.events.push(event);
    }

    /// Get and clear all domain events
    pub fn take_events(&mut self) -> Vec<Box<dyn DomainEvent>> {
        std::mem::take(&mut self.events)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == FlowState::Completed {
            warn!(flow_id = %self.id, "Rejected mutation of completed flow");
            return Err(FlowError::FlowCompleted(self.id));
        }
        Ok(())
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Flow id={} state={} tap={} user={} ticks={} volume_ml={}",
            self.id,
            self.state,
            self.tap.name(),
            self.username,
            self.ticks,
            self.volume_ml()
        )?;
        if !self.images.is_empty() {
            write!(f, " images={}", self.images.len())?;
        }
        if !self.shout.is_empty() {
            write!(f, " shout='{}'", self.shout)?;
        }
        Ok(())
    }
}

/// Filter: flows in the ACTIVE state
pub fn is_active(flow: &Flow) -> bool {
    flow.is_active()
}

/// Filter: flows that are currently idle
pub fn is_idle(flow: &Flow) -> bool {
    flow.is_idle()
}

/// Filter: completed flows
pub fn is_completed(flow: &Flow) -> bool {
    flow.is_completed()
}

/// Immutable record of a flow at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSnapshot {
    /// Flow id
    pub flow_id: FlowId,
    /// Tap name
    pub tap: String,
    /// State at capture time
    pub state: FlowState,
    /// Username, empty when anonymous
    pub username: String,
    /// Accumulated pulses
    pub ticks: u64,
    /// Volume derived from `ticks`
    pub volume_ml: f64,
    /// Creation time (monotonic ms)
    pub start_ms: u64,
    /// Completion time, if completed
    pub end_ms: Option<u64>,
    /// Last activity (monotonic ms)
    pub update_ms: u64,
    /// Session length at capture time
    pub duration_ms: u64,
    /// Idle threshold
    pub max_idle_ms: u64,
    /// Shout text
    pub shout: String,
    /// Image references in insertion order
    pub images: Vec<String>,
}
