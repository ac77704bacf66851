//! Enabled/disabled state of the shared radio adapter.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether the radio adapter is currently usable.
///
/// There is exactly one radio per process, so there is exactly one
/// `RadioState` value; only the radio state monitor may change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RadioState {
    Enabled,
    /// Powered off, or no adapter present at all.
    #[default]
    Disabled,
}

impl RadioState {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            RadioState::Enabled
        } else {
            RadioState::Disabled
        }
    }

    pub fn is_enabled(self) -> bool {
        self == RadioState::Enabled
    }
}

impl fmt::Display for RadioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioState::Enabled => f.write_str("enabled"),
            RadioState::Disabled => f.write_str("disabled"),
        }
    }
}
