//! # peerscan-core
//!
//! Shared domain types for PeerScan, the nearby-peer discovery coordinator.
//!
//! This crate has zero dependencies on async runtimes, OS APIs, or radio
//! stacks.  Everything here is plain data plus the rules that govern it, so it
//! can be tested on any machine without a Bluetooth adapter.
//!
//! # Architecture overview (for beginners)
//!
//! PeerScan lets a user look for nearby wireless devices.  A *discovery
//! session* asks the radio to scan; while the scan runs the radio reports each
//! device it hears.  The application crate (`peerscan`) turns those raw
//! reports into observable state for a UI.
//!
//! This crate defines the vocabulary that state is built from:
//!
//! - **`domain::peer`** – A discovered [`PeerDevice`] and the [`DeviceRegistry`]
//!   that keeps them unique by hardware address in first-seen order.
//!
//! - **`domain::permission`** – [`PermissionGroup`], a named bundle of platform
//!   access rights that must be granted before scanning.
//!
//! - **`domain::radio`** – [`RadioState`], whether the shared adapter is usable.
//!
//! - **`domain::session`** – [`SessionState`] (what the UI renders) and the
//!   [`DiscoveryErrorKind`] taxonomy of terminal session errors.

pub mod domain;

// Re-export the most-used types at the crate root so callers can write
// `peerscan_core::PeerDevice` instead of `peerscan_core::domain::peer::PeerDevice`.
pub use domain::peer::{DeviceRegistry, PeerDevice, UpsertOutcome, UNKNOWN_DEVICE_NAME};
pub use domain::permission::PermissionGroup;
pub use domain::radio::RadioState;
pub use domain::session::{DiscoveryErrorKind, SessionState};
