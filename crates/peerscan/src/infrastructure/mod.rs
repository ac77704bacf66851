//! Infrastructure layer for PeerScan.
//!
//! Contains the outward-facing adapters: platform shims, file-system
//! storage, and the UI command bridge.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `peerscan_core`, but MUST NOT be imported by the `application` or domain layers.

pub mod platform;
pub mod storage;
pub mod ui_bridge;
