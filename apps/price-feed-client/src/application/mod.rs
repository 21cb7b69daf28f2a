//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the tick processing service and the port interfaces
//! that define how the client reaches the upstream price feed.

/// Port interfaces for the upstream price feed connection.
pub mod ports;

/// Application services for tick processing.
pub mod services;
