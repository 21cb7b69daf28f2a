//! Domain Layer - Core alert and streaming types.
//!
//! This layer contains the alert model, the alert store, and the stream
//! event types. Nothing here performs I/O; the only synchronization is the
//! lock inside the alert store.

/// Price alerts and the concurrency-safe alert store.
pub mod alert;

/// Price ticks, connection states, and published events.
pub mod streaming;
