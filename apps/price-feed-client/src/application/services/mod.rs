//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `TickProcessor`: Decodes inbound frames, evaluates alerts, publishes events

mod tick_processor;

pub use tick_processor::{TickOutcome, TickProcessor};
