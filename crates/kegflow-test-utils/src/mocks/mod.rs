//! Fake implementations of the tap collaborator.

mod tap;

pub use tap::*;
