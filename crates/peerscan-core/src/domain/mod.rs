//! Domain entities for PeerScan.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//! Code in the application crate depends on these types, never the other way
//! round, which keeps every rule here unit-testable in isolation.

/// Discovered peers and the ordered, deduplicated registry that holds them.
pub mod peer;

/// Named permission groups required before discovery may start.
pub mod permission;

/// Enabled/disabled state of the shared radio adapter.
pub mod radio;

/// The discovery session view state and its error taxonomy.
pub mod session;
