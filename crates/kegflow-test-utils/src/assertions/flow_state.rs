//! Assertion utilities for validating flow state.

use kegflow_core::{Flow, FlowSnapshot, FlowState};
use thiserror::Error;

/// Error type for flow validation failures
#[derive(Debug, Error, PartialEq)]
pub enum FlowAssertionError {
    #[error("Invalid flow state: expected {expected}, got {actual}")]
    InvalidState {
        expected: FlowState,
        actual: FlowState,
    },

    #[error("Flow {flow_id} changed after completion: {field}")]
    ChangedAfterCompletion { flow_id: u64, field: &'static str },

    #[error("Flow {0} is not completed")]
    NotCompleted(u64),
}

/// Asserts that a flow is in the expected state.
///
/// # Returns
///
/// * `Ok(())` - If the flow has the expected state
/// * `Err(FlowAssertionError)` - Otherwise
pub fn assert_flow_state(flow: &Flow, expected: FlowState) -> Result<(), FlowAssertionError> {
    if flow.state() != expected {
        return Err(FlowAssertionError::InvalidState {
            expected,
            actual: flow.state(),
        });
    }

    Ok(())
}

/// Asserts that a completed flow still matches the record taken at `before`.
///
/// `duration_ms` is included: a completed flow's duration must not move.
pub fn assert_frozen(before: &FlowSnapshot, flow: &Flow) -> Result<(), FlowAssertionError> {
    let flow_id = flow.id().get();
    if !flow.is_completed() {
        return Err(FlowAssertionError::NotCompleted(flow_id));
    }

    let now = flow.snapshot();
    let changed = |field| FlowAssertionError::ChangedAfterCompletion { flow_id, field };

    if now.state != before.state {
        return Err(changed("state"));
    }
    if now.ticks != before.ticks {
        return Err(changed("ticks"));
    }
    if now.end_ms != before.end_ms {
        return Err(changed("end_ms"));
    }
    if now.update_ms != before.update_ms {
        return Err(changed("update_ms"));
    }
    if now.duration_ms != before.duration_ms {
        return Err(changed("duration_ms"));
    }
    if now.username != before.username {
        return Err(changed("username"));
    }
    if now.shout != before.shout {
        return Err(changed("shout"));
    }
    if now.images != before.images {
        return Err(changed("images"));
    }

    Ok(())
}
