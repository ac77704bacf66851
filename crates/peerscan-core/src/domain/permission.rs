//! Permission groups that gate discovery.
//!
//! A platform usually needs several runtime grants before it will let an app
//! scan for nearby devices (radio access, and on some systems location).
//! Each grant is modelled as a named [`PermissionGroup`] that is resolved to
//! granted or denied independently of the others.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A named capability requirement, e.g. `"radio-access"`.
///
/// Ordered by name so sets of groups iterate deterministically (stable UI
/// output and log lines).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionGroup(String);

impl PermissionGroup {
    /// Permission to use the radio for scanning and connecting.
    pub const RADIO_ACCESS: &'static str = "radio-access";
    /// Permission to use location while the app is in the background.
    pub const BACKGROUND_LOCATION: &'static str = "background-location";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn radio_access() -> Self {
        Self::new(Self::RADIO_ACCESS)
    }

    pub fn background_location() -> Self {
        Self::new(Self::BACKGROUND_LOCATION)
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PermissionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PermissionGroup {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}
