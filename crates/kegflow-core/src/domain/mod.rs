/// Flow aggregate and lifecycle state machine
pub mod flow;

/// Domain events
pub mod events;

/// Tap collaborator
pub mod tap;

/// Monotonic clocks
pub mod clock;

/// Flow id allocation
pub mod registry;

/// Flow construction
pub mod factory;
