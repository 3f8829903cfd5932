//! Builders for flows under test.

mod flow;

pub use flow::*;
