//! Application layer use cases for PeerScan.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure data and rules in `peerscan_core`) and the infrastructure (radio
//! stack, config files, UI shell).  Code here orchestrates domain objects,
//! depends on traits rather than concrete platforms, and performs no OS
//! calls of its own.
//!
//! # Sub-modules
//!
//! - **`platform`** – The traits the radio and permission shims implement,
//!   and the callback handle they report through.
//!
//! - **`event_bus`** – Bounded, drop-oldest multicast of raw hardware events.
//!
//! - **`permission_gate`** – At most one permission round trip at a time.
//!
//! - **`radio_state`** – Live enabled/disabled state of the adapter.
//!
//! - **`discovery_session`** – The coordinator: turns the above into one
//!   session state machine and a de-duplicated device list.

pub mod discovery_session;
pub mod event_bus;
pub mod permission_gate;
pub mod platform;
pub mod radio_state;
