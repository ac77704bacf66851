//! In-process radio and permission shims.
//!
//! These stand in for the native radio stack on desktops without radio
//! hardware, in the demo binary, and in integration tests.  They implement
//! the same platform traits a real shim would and report back through the
//! same [`PlatformCallbacks`] handle, so the coordinator cannot tell the
//! difference.
//!
//! # Wiring
//!
//! The coordinator needs the platform at construction, and the platform
//! needs the coordinator's callback handle to report events.  Construct the
//! shim first, build the coordinator around it, then [`attach`] the callbacks:
//!
//! ```ignore
//! let radio = Arc::new(SimulatedRadio::new().with_peers(SimulatedRadio::demo_peers(3)));
//! let permissions = Arc::new(SimulatedPermissions::all_granted());
//! let coordinator = DiscoverySessionCoordinator::new(
//!     radio.clone(), permissions.clone(), groups, settings);
//! radio.attach(coordinator.callbacks());
//! permissions.attach(coordinator.callbacks());
//! ```
//!
//! [`attach`]: SimulatedRadio::attach

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use peerscan_core::{DiscoveryErrorKind, PermissionGroup};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::platform::{
    PermissionPlatform, PlatformCallbacks, PlatformError, RadioPlatform,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One advertisement the simulated radio will report during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedPeer {
    pub name: Option<String>,
    pub address: String,
}

impl ScriptedPeer {
    pub fn named(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
        }
    }

    pub fn unnamed(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
        }
    }
}

// ── Radio ─────────────────────────────────────────────────────────────────────

/// A scripted radio adapter.
///
/// `start_discovery` replays the scripted peers through the attached
/// callbacks, optionally spaced by an emit interval, and then reports
/// discovery finished unless auto-finish is turned off.  With a zero
/// interval every report is delivered before `start_discovery` returns.
pub struct SimulatedRadio {
    callbacks: Mutex<Option<PlatformCallbacks>>,
    peers: Vec<ScriptedPeer>,
    emit_interval: Duration,
    auto_finish: bool,
    adapter_present: bool,
    adapter_enabled: AtomicBool,
    grant_enable_requests: bool,
    refuse_start: Mutex<Option<DiscoveryErrorKind>>,
    unreachable: Mutex<HashSet<String>>,
    scan: Mutex<Option<JoinHandle<()>>>,
    start_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    enable_requests: AtomicUsize,
    connected: Mutex<Vec<String>>,
}

impl SimulatedRadio {
    /// A present, enabled adapter with no scripted peers.
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(None),
            peers: Vec::new(),
            emit_interval: Duration::ZERO,
            auto_finish: true,
            adapter_present: true,
            adapter_enabled: AtomicBool::new(true),
            grant_enable_requests: true,
            refuse_start: Mutex::new(None),
            unreachable: Mutex::new(HashSet::new()),
            scan: Mutex::new(None),
            start_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            enable_requests: AtomicUsize::new(0),
            connected: Mutex::new(Vec::new()),
        }
    }

    /// A device with no radio hardware at all.
    pub fn without_adapter() -> Self {
        Self {
            adapter_present: false,
            adapter_enabled: AtomicBool::new(false),
            ..Self::new()
        }
    }

    /// A present adapter that is switched off.
    pub fn disabled() -> Self {
        Self {
            adapter_enabled: AtomicBool::new(false),
            ..Self::new()
        }
    }

    pub fn with_peers(mut self, peers: Vec<ScriptedPeer>) -> Self {
        self.peers = peers;
        self
    }

    pub fn with_emit_interval(mut self, interval: Duration) -> Self {
        self.emit_interval = interval;
        self
    }

    /// Keeps the scan running after the last scripted peer; only a cancel,
    /// a timeout, or an explicit callback ends the session.
    pub fn without_auto_finish(mut self) -> Self {
        self.auto_finish = false;
        self
    }

    /// The user declines every "turn on the radio" prompt.
    pub fn declining_enable_requests(mut self) -> Self {
        self.grant_enable_requests = false;
        self
    }

    /// `count` peers named `Peer 1..=count`; every fourth one advertises no name.
    pub fn demo_peers(count: usize) -> Vec<ScriptedPeer> {
        (1..=count)
            .map(|i| {
                let address = format!("02:00:00:00:{:02X}:{:02X}", i / 256, i % 256);
                if i % 4 == 0 {
                    ScriptedPeer::unnamed(address)
                } else {
                    ScriptedPeer::named(format!("Peer {i}"), address)
                }
            })
            .collect()
    }

    /// Connects the shim to the coordinator's callback handle.
    pub fn attach(&self, callbacks: PlatformCallbacks) {
        *lock(&self.callbacks) = Some(callbacks);
    }

    /// Makes the next `start_discovery` calls fail with `kind`.
    pub fn set_refuse_start(&self, kind: Option<DiscoveryErrorKind>) {
        *lock(&self.refuse_start) = kind;
    }

    /// Makes `connect` to `address` fail.
    pub fn set_unreachable(&self, address: impl Into<String>) {
        lock(&self.unreachable).insert(address.into());
    }

    /// Flips the adapter as if the user used the system quick settings.
    pub fn toggle_adapter(&self, enabled: bool) {
        if !self.adapter_present {
            return;
        }
        self.adapter_enabled.store(enabled, Ordering::SeqCst);
        info!("simulated adapter switched {}", if enabled { "on" } else { "off" });
        if let Some(callbacks) = self.callbacks() {
            callbacks.on_adapter_state_changed(enabled);
        }
    }

    /// Reports a discovery error as if the radio stack failed mid-scan.
    pub fn fail_scan(&self, kind: DiscoveryErrorKind) {
        self.stop_scan_task();
        if let Some(callbacks) = self.callbacks() {
            callbacks.on_discovery_error(kind);
        }
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn enable_requests(&self) -> usize {
        self.enable_requests.load(Ordering::SeqCst)
    }

    /// Addresses successfully connected to, in call order.
    pub fn connected(&self) -> Vec<String> {
        lock(&self.connected).clone()
    }

    fn callbacks(&self) -> Option<PlatformCallbacks> {
        lock(&self.callbacks).clone()
    }

    fn stop_scan_task(&self) {
        if let Some(task) = lock(&self.scan).take() {
            task.abort();
        }
    }
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RadioPlatform for SimulatedRadio {
    async fn start_discovery(&self) -> Result<(), DiscoveryErrorKind> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);

        let refused = lock(&self.refuse_start).clone();
        if let Some(kind) = refused {
            warn!("simulated radio refusing to scan: {kind}");
            return Err(kind);
        }
        if !self.adapter_enabled.load(Ordering::SeqCst) {
            return Err(DiscoveryErrorKind::AdapterNotAvailable);
        }
        let Some(callbacks) = self.callbacks() else {
            return Err(DiscoveryErrorKind::Generic(
                "simulated radio has no callbacks attached".to_string(),
            ));
        };

        debug!("simulated scan started with {} scripted peer(s)", self.peers.len());
        self.stop_scan_task();

        if self.emit_interval.is_zero() {
            replay(&callbacks, self.peers.iter().cloned(), self.auto_finish);
            return Ok(());
        }

        let peers = self.peers.clone();
        let interval = self.emit_interval;
        let auto_finish = self.auto_finish;
        let task = tokio::spawn(async move {
            for peer in peers {
                tokio::time::sleep(interval).await;
                callbacks.on_device_found(peer.name, peer.address);
            }
            if auto_finish {
                callbacks.on_discovery_finished();
            }
        });
        *lock(&self.scan) = Some(task);
        Ok(())
    }

    async fn cancel_discovery(&self) {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.stop_scan_task();
        debug!("simulated scan cancelled");
    }

    async fn connect(&self, address: &str) -> Result<(), PlatformError> {
        if !self.adapter_present {
            return Err(PlatformError::NoAdapter);
        }
        if !self.adapter_enabled.load(Ordering::SeqCst) {
            return Err(PlatformError::AdapterDisabled);
        }
        if lock(&self.unreachable).contains(address) {
            return Err(PlatformError::Unreachable(address.to_string()));
        }
        lock(&self.connected).push(address.to_string());
        info!("simulated connection to {address} established");
        Ok(())
    }

    fn request_enable_adapter(&self) {
        self.enable_requests.fetch_add(1, Ordering::SeqCst);
        if self.grant_enable_requests {
            self.toggle_adapter(true);
        } else {
            debug!("simulated user declined the radio enable prompt");
        }
    }

    fn adapter_present(&self) -> bool {
        self.adapter_present
    }

    fn adapter_enabled(&self) -> bool {
        self.adapter_present && self.adapter_enabled.load(Ordering::SeqCst)
    }
}

fn replay(
    callbacks: &PlatformCallbacks,
    peers: impl Iterator<Item = ScriptedPeer>,
    auto_finish: bool,
) {
    for peer in peers {
        callbacks.on_device_found(peer.name, peer.address);
    }
    if auto_finish {
        callbacks.on_discovery_finished();
    }
}

// ── Permissions ───────────────────────────────────────────────────────────────

/// How the simulated user answers a permission dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogAnswer {
    GrantAll,
    DenyAll,
    /// Nobody answers; the test drives `PlatformCallbacks::on_permission_result`.
    Silent,
}

pub struct SimulatedPermissions {
    callbacks: Mutex<Option<PlatformCallbacks>>,
    granted: Mutex<BTreeSet<PermissionGroup>>,
    always_granted: bool,
    answer: DialogAnswer,
    requests: AtomicUsize,
}

impl SimulatedPermissions {
    /// A platform without runtime permissions: everything is granted up front.
    pub fn all_granted() -> Self {
        Self {
            always_granted: true,
            ..Self::prompting(DialogAnswer::GrantAll)
        }
    }

    /// Nothing is granted yet; each dialog is answered with `answer`.
    pub fn prompting(answer: DialogAnswer) -> Self {
        Self {
            callbacks: Mutex::new(None),
            granted: Mutex::new(BTreeSet::new()),
            always_granted: false,
            answer,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn attach(&self, callbacks: PlatformCallbacks) {
        *lock(&self.callbacks) = Some(callbacks);
    }

    /// Grants `group` outside any dialog, as if from the system settings app.
    pub fn grant(&self, group: PermissionGroup) {
        lock(&self.granted).insert(group);
    }

    pub fn revoke(&self, group: &PermissionGroup) {
        lock(&self.granted).remove(group);
    }

    /// Number of dialogs shown so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl PermissionPlatform for SimulatedPermissions {
    fn request_permissions(&self, groups: &[PermissionGroup]) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let granted = match self.answer {
            DialogAnswer::GrantAll => true,
            DialogAnswer::DenyAll => false,
            DialogAnswer::Silent => {
                debug!("simulated permission dialog left unanswered");
                return;
            }
        };

        if granted {
            lock(&self.granted).extend(groups.iter().cloned());
        }
        let results: HashMap<PermissionGroup, bool> =
            groups.iter().map(|g| (g.clone(), granted)).collect();

        let callbacks = lock(&self.callbacks).clone();
        match callbacks {
            Some(callbacks) => callbacks.on_permission_result(results),
            None => warn!("simulated permission dialog answered with no callbacks attached"),
        }
    }

    fn is_granted(&self, group: &PermissionGroup) -> bool {
        self.always_granted || lock(&self.granted).contains(group)
    }
}
