//! Assertion utilities for validating flows.

mod flow_state;

pub use flow_state::*;
