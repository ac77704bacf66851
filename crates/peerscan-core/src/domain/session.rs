//! Discovery session view state and the session error taxonomy.
//!
//! # Session lifecycle (for beginners)
//!
//! A UI screen renders one of three states:
//!
//! ```text
//!           start                finished / cancel
//!   Idle  ────────►  Loading  ─────────────────────►  Idle
//!     ▲                 │
//!     │ acknowledge     │ error / radio off
//!     └──────────── Error(kind) ◄┘
//! ```
//!
//! - `Idle`: nothing is scanning.  The discovered-device list may still show
//!   the results of the last completed session.
//! - `Loading`: the radio has been asked to scan and has not reported that it
//!   finished, and the user has not cancelled.
//! - `Error(kind)`: the session ended abnormally.  Errors are terminal; the
//!   user must start a new discovery to try again.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a discovery session ended abnormally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum DiscoveryErrorKind {
    /// At least one required permission group was not granted.
    #[error("required permissions were denied")]
    PermissionsDenied,
    /// The radio is switched off or the device has no radio at all.
    #[error("no radio adapter available for this device")]
    AdapterNotAvailable,
    /// The radio refused to start scanning (e.g. a scan is already active).
    #[error("discovery not possible")]
    DiscoveryNotPossible,
    /// A platform failure that carries a descriptive message.
    #[error("{0}")]
    Generic(String),
    /// An unclassified platform signal.
    #[error("an unknown error occurred")]
    Unknown,
}

/// The coordinator's public state, consumed by UI screens.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Idle,
    Loading,
    Error(DiscoveryErrorKind),
}

impl SessionState {
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Loading)
    }

    /// Returns the error kind when the session ended in failure.
    pub fn error(&self) -> Option<&DiscoveryErrorKind> {
        match self {
            SessionState::Error(kind) => Some(kind),
            _ => None,
        }
    }
}
