//! Platform shims implementing the radio and permission traits.
//!
//! - **`simulated`** – scripted in-process radio and permission dialog used
//!   by the demo binary and the integration tests.
//!
//! Native shims (a mobile radio stack, BlueZ over D-Bus, ...) belong here as
//! siblings of `simulated`, each implementing
//! [`RadioPlatform`](crate::application::platform::RadioPlatform) and
//! [`PermissionPlatform`](crate::application::platform::PermissionPlatform).

pub mod simulated;
