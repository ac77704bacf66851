//! Discovered peer devices and the registry that deduplicates them.
//!
//! The radio stack reports the same device many times during a scan: once
//! when it is first heard, again whenever its advertised name is refreshed.
//! The [`DeviceRegistry`] collapses those reports so the UI shows one row per
//! physical device.
//!
//! # Identity rules
//!
//! - The hardware **address** is the identity key.  Two reports with the same
//!   address are the same device no matter what name they carry.
//! - The **last-seen name** wins.  A device first announced as `"Phone A"`
//!   and later as `"Phone A2"` is displayed as `"Phone A2"`.
//! - **First-seen order** is preserved.  Renaming a device never moves it to
//!   the end of the list, so rows do not jump around while the user reads them.
//!
//! Entries are never removed one at a time; the whole registry is cleared when
//! a new discovery session starts.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Display name used when the radio reports a device without a name.
pub const UNKNOWN_DEVICE_NAME: &str = "<Unknown>";

/// A nearby device reported by the radio during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerDevice {
    /// Human-readable name advertised by the device.
    pub name: String,
    /// Hardware address, e.g. `"AA:BB:CC:DD:EE:FF"`.  Stable identity key.
    pub address: String,
}

impl PeerDevice {
    /// Creates a peer with the given name and address.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Creates a peer from a possibly-missing advertised name.
    ///
    /// Devices that advertise no name are shown as [`UNKNOWN_DEVICE_NAME`].
    pub fn from_report(name: Option<String>, address: impl Into<String>) -> Self {
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_DEVICE_NAME.to_string());
        Self::new(name, address)
    }
}

/// Result of inserting a report into the [`DeviceRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The address was not known yet; the device was appended.
    Inserted,
    /// The address was known and the report carried a different name.
    Renamed,
    /// The address was known with the same name; nothing changed.
    Unchanged,
}

impl UpsertOutcome {
    /// Returns `true` if the visible registry contents changed.
    pub fn changed(self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }
}

/// Ordered set of discovered peers, unique by address.
///
/// A `Vec` keeps first-seen order for display; a side `HashMap` from address
/// to index gives O(1) duplicate detection.
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    devices: Vec<PeerDevice>,
    index: HashMap<String, usize>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new device or refreshes the name of a known one.
    pub fn upsert(&mut self, device: PeerDevice) -> UpsertOutcome {
        match self.index.get(&device.address) {
            Some(&pos) => {
                let existing = &mut self.devices[pos];
                if existing.name == device.name {
                    return UpsertOutcome::Unchanged;
                }
                trace!(
                    "peer {} renamed from {:?} to {:?}",
                    device.address,
                    existing.name,
                    device.name
                );
                existing.name = device.name;
                UpsertOutcome::Renamed
            }
            None => {
                self.index.insert(device.address.clone(), self.devices.len());
                self.devices.push(device);
                UpsertOutcome::Inserted
            }
        }
    }

    /// Returns the device with the given address, if it has been seen.
    pub fn get(&self, address: &str) -> Option<&PeerDevice> {
        self.index.get(address).map(|&pos| &self.devices[pos])
    }

    pub fn contains(&self, address: &str) -> bool {
        self.index.contains_key(address)
    }

    /// Returns all devices in first-seen order.
    pub fn snapshot(&self) -> Vec<PeerDevice> {
        self.devices.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerDevice> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Removes every device.  Called at the start of each discovery session.
    pub fn clear(&mut self) {
        self.devices.clear();
        self.index.clear();
    }
}
