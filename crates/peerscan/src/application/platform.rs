//! Capability interfaces consumed from the platform shim, plus the inbound
//! callback handle the shim uses to report hardware events.
//!
//! # Outbound vs inbound (for beginners)
//!
//! The radio stack is an external collaborator.  We talk to it in two
//! directions:
//!
//! - **Outbound commands** (`start_discovery`, `cancel_discovery`, `connect`,
//!   `request_enable_adapter`) go through the [`RadioPlatform`] trait.  The
//!   coordinator holds an `Arc<dyn RadioPlatform>` injected at construction, so
//!   tests substitute a fake without touching any global state.
//!
//! - **Inbound signals** (device found, discovery finished, adapter toggled,
//!   permission dialog answered) arrive on whatever thread the platform
//!   chooses.  The shim reports them through a [`PlatformCallbacks`] handle.
//!   The handle only pushes into channels; it never mutates coordinator state
//!   directly, so a callback thread can never race a state transition.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use peerscan_core::{DiscoveryErrorKind, PeerDevice, PermissionGroup};
use thiserror::Error;
use tracing::debug;

use super::event_bus::DiscoveryEventBus;
use super::permission_gate::PermissionGate;
use super::radio_state::RadioStateMonitor;

/// Error type for platform command failures that are returned to the caller
/// rather than surfaced as a session state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The device has no radio hardware.
    #[error("no radio adapter present")]
    NoAdapter,
    /// The radio is present but switched off.
    #[error("radio adapter is disabled")]
    AdapterDisabled,
    /// The remote device did not answer the connection attempt.
    #[error("device {0} is not reachable")]
    Unreachable(String),
    #[error("platform error: {0}")]
    Other(String),
}

/// Commands the coordinator issues to the radio hardware.
///
/// Production implementations wrap the native radio stack; tests use the
/// mockall-generated `MockRadioPlatform` or
/// [`SimulatedRadio`](crate::infrastructure::platform::simulated::SimulatedRadio).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RadioPlatform: Send + Sync {
    /// Asks the radio to begin scanning.  Results arrive later through
    /// [`PlatformCallbacks`]; the return value only reports whether the radio
    /// accepted the request.
    async fn start_discovery(&self) -> Result<(), DiscoveryErrorKind>;

    /// Asks the radio to stop scanning.  Fire-and-forget.
    async fn cancel_discovery(&self);

    /// Opens a connection to the device with the given hardware address.
    async fn connect(&self, address: &str) -> Result<(), PlatformError>;

    /// Prompts the user to switch the radio on.  Best effort; the new state
    /// is reported later through `on_adapter_state_changed`.
    fn request_enable_adapter(&self);

    /// Returns `false` when the device has no radio hardware at all.
    fn adapter_present(&self) -> bool;

    /// Returns the adapter's current power state as the platform sees it.
    fn adapter_enabled(&self) -> bool;
}

/// Commands the permission gate issues to the platform's permission system.
#[cfg_attr(test, mockall::automock)]
pub trait PermissionPlatform: Send + Sync {
    /// Shows the platform permission prompt for `groups`.  Fire-and-forget;
    /// the answer is delivered through
    /// [`PlatformCallbacks::on_permission_result`], possibly before this call
    /// returns.
    fn request_permissions(&self, groups: &[PermissionGroup]);

    /// Returns the current grant status of a single group.
    fn is_granted(&self, group: &PermissionGroup) -> bool;
}

/// Inbound callback handle given to the platform shim.
///
/// Cheap to clone and safe to call from any thread.
#[derive(Clone)]
pub struct PlatformCallbacks {
    bus: Arc<DiscoveryEventBus>,
    radio: Arc<RadioStateMonitor>,
    permissions: Arc<PermissionGate>,
}

impl PlatformCallbacks {
    pub(crate) fn new(
        bus: Arc<DiscoveryEventBus>,
        radio: Arc<RadioStateMonitor>,
        permissions: Arc<PermissionGate>,
    ) -> Self {
        Self {
            bus,
            radio,
            permissions,
        }
    }

    /// The radio heard a device.  `name` is `None` when the device does not
    /// advertise one.
    pub fn on_device_found(&self, name: Option<String>, address: impl Into<String>) {
        let device = PeerDevice::from_report(name, address);
        debug!("device found: {} ({})", device.name, device.address);
        self.bus.emit_device_found(device);
    }

    /// The radio stopped scanning on its own.
    pub fn on_discovery_finished(&self) {
        debug!("discovery finished signal");
        self.bus.emit_discovery_finished();
    }

    /// The radio reported a failure while scanning.
    pub fn on_discovery_error(&self, kind: DiscoveryErrorKind) {
        debug!("discovery error signal: {kind}");
        self.bus.emit_error(kind);
    }

    /// The adapter was switched on or off, possibly from outside the app.
    pub fn on_adapter_state_changed(&self, enabled: bool) {
        self.radio.on_platform_state_changed(enabled);
    }

    /// The permission dialog was answered.
    pub fn on_permission_result(&self, results: HashMap<PermissionGroup, bool>) {
        self.permissions.on_permission_result(results);
    }
}
