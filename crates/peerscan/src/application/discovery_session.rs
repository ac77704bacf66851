//! DiscoverySessionCoordinator: the discovery state machine.
//!
//! This use case ties the permission gate, the radio state monitor, and the
//! event bus together and exposes a reduced view state to any number of UI
//! screens.  Screens only see [`SessionState`], the discovered-device list,
//! the radio state, and the denied-permission set; they never touch hardware
//! callbacks.
//!
//! # State machine
//!
//! ```text
//!                       permissions ok, radio on,
//!          start        hardware accepted
//!  Idle ─────────► AwaitingPermission ─────────────► Discovering ──┐
//!   ▲  ▲                  │                            │   │       │
//!   │  │     denied /     │ cancel                     │   │ error / radio off
//!   │  │     radio off    ▼                   finished │   ▼
//!   │  └──────────────── Idle ◄──── cancel / timeout ──┘  Failed(kind)
//!   └───────────────────── acknowledge_error ◄────────────────┘
//! ```
//!
//! `AwaitingPermission` is rendered as [`SessionState::Idle`]: the UI only
//! shows `Loading` once the hardware has actually been asked to scan.
//!
//! # Serialization
//!
//! Every transition and every registry mutation happens while holding the
//! single `tokio::sync::Mutex<SessionCore>`.  During a session one pump task
//! is the only consumer of the bus subscription, and it applies each event
//! through that mutex.  Events tagged with a stale session id (after a cancel
//! or a restart) are discarded.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use peerscan_core::{
    DeviceRegistry, DiscoveryErrorKind, PeerDevice, PermissionGroup, RadioState, SessionState,
};
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::event_bus::{BusCapacity, BusEvent, BusSubscription, DiscoveryEventBus};
use super::permission_gate::{PermissionGate, PermissionOutcome};
use super::platform::{PermissionPlatform, PlatformCallbacks, PlatformError, RadioPlatform};
use super::radio_state::RadioStateMonitor;

/// How long a session may scan before it is finished automatically.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(12);

/// Error type for coordinator commands that report failure to the caller.
#[derive(Debug, Error, PartialEq)]
pub enum CoordinatorError {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: PlatformError,
    },
}

/// What `start_discovery` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The hardware is now scanning.
    Started,
    /// A session was already starting or running; nothing was done.
    AlreadyRunning,
    /// The start was cancelled while waiting for permissions.
    Cancelled,
    /// The session failed before the hardware started scanning.
    Failed(DiscoveryErrorKind),
}

/// Runtime tunables for the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorSettings {
    pub bus_capacity: BusCapacity,
    /// `None` lets a session run until the hardware reports it finished.
    pub discovery_timeout: Option<Duration>,
    /// `None` waits for the permission dialog indefinitely.
    pub permission_timeout: Option<Duration>,
    /// Cancel an in-flight scan before connecting.
    pub cancel_discovery_before_connect: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            bus_capacity: BusCapacity::default(),
            discovery_timeout: Some(DEFAULT_DISCOVERY_TIMEOUT),
            permission_timeout: None,
            cancel_discovery_before_connect: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Idle,
    AwaitingPermission,
    Discovering { session_id: Uuid },
    Failed(DiscoveryErrorKind),
}

struct SessionCore {
    phase: Phase,
    registry: DeviceRegistry,
    pump: Option<JoinHandle<()>>,
}

impl SessionCore {
    fn is_current(&self, session_id: Uuid) -> bool {
        self.phase == Phase::Discovering { session_id }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpStep {
    Continue,
    Stop,
}

/// Releases the `AwaitingPermission` claim when a `start_discovery` future
/// is dropped mid-flight (for example by a caller-side timeout).
struct AbandonedStartGuard {
    coordinator: Option<Arc<DiscoverySessionCoordinator>>,
}

impl AbandonedStartGuard {
    fn new(coordinator: Arc<DiscoverySessionCoordinator>) -> Self {
        Self {
            coordinator: Some(coordinator),
        }
    }

    fn disarm(mut self) {
        self.coordinator = None;
    }
}

impl Drop for AbandonedStartGuard {
    fn drop(&mut self) {
        if let Some(coordinator) = self.coordinator.take() {
            coordinator.release_abandoned_start();
        }
    }
}

pub struct DiscoverySessionCoordinator {
    platform: Arc<dyn RadioPlatform>,
    permissions: Arc<PermissionGate>,
    radio: Arc<RadioStateMonitor>,
    bus: Arc<DiscoveryEventBus>,
    settings: CoordinatorSettings,
    core: Mutex<SessionCore>,
    session_tx: watch::Sender<SessionState>,
    devices_tx: watch::Sender<Vec<PeerDevice>>,
}

impl DiscoverySessionCoordinator {
    /// Builds the coordinator together with its gate, monitor and bus.
    pub fn new(
        radio_platform: Arc<dyn RadioPlatform>,
        permission_platform: Arc<dyn PermissionPlatform>,
        required_groups: Vec<PermissionGroup>,
        settings: CoordinatorSettings,
    ) -> Arc<Self> {
        let permissions = Arc::new(PermissionGate::new(permission_platform, required_groups));
        let radio = Arc::new(RadioStateMonitor::new(Arc::clone(&radio_platform)));
        let bus = Arc::new(DiscoveryEventBus::new(settings.bus_capacity));
        let (session_tx, _) = watch::channel(SessionState::Idle);
        let (devices_tx, _) = watch::channel(Vec::new());

        Arc::new(Self {
            platform: radio_platform,
            permissions,
            radio,
            bus,
            settings,
            core: Mutex::new(SessionCore {
                phase: Phase::Idle,
                registry: DeviceRegistry::new(),
                pump: None,
            }),
            session_tx,
            devices_tx,
        })
    }

    /// Returns the handle the platform shim uses to report hardware events.
    pub fn callbacks(&self) -> PlatformCallbacks {
        PlatformCallbacks::new(
            Arc::clone(&self.bus),
            Arc::clone(&self.radio),
            Arc::clone(&self.permissions),
        )
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    pub fn permission_gate(&self) -> &Arc<PermissionGate> {
        &self.permissions
    }

    pub fn radio_monitor(&self) -> &Arc<RadioStateMonitor> {
        &self.radio
    }

    pub fn event_bus(&self) -> &Arc<DiscoveryEventBus> {
        &self.bus
    }

    // ── Observable state ──────────────────────────────────────────────────────

    pub fn session_state(&self) -> watch::Receiver<SessionState> {
        self.session_tx.subscribe()
    }

    pub fn current_session_state(&self) -> SessionState {
        self.session_tx.borrow().clone()
    }

    /// Live stream of the discovered devices in first-seen order.
    pub fn discovered_devices(&self) -> watch::Receiver<Vec<PeerDevice>> {
        self.devices_tx.subscribe()
    }

    pub fn current_devices(&self) -> Vec<PeerDevice> {
        self.devices_tx.borrow().clone()
    }

    pub fn radio_state(&self) -> watch::Receiver<RadioState> {
        self.radio.state_stream()
    }

    pub fn denied_permissions(&self) -> watch::Receiver<BTreeSet<PermissionGroup>> {
        self.permissions.denied_groups_stream()
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    /// Starts a discovery session.
    ///
    /// Suspends while a permission round trip is in progress.  Duplicate calls
    /// while a session is starting or running are no-ops.
    pub async fn start_discovery(self: &Arc<Self>) -> StartOutcome {
        {
            let mut core = self.core.lock().await;
            match core.phase {
                Phase::AwaitingPermission | Phase::Discovering { .. } => {
                    debug!("start_discovery ignored: a session is already in flight");
                    return StartOutcome::AlreadyRunning;
                }
                Phase::Failed(_) => self.publish_state(SessionState::Idle),
                Phase::Idle => {}
            }
            core.phase = Phase::AwaitingPermission;
        }

        let guard = AbandonedStartGuard::new(Arc::clone(self));
        let outcome = self.complete_start().await;
        guard.disarm();
        outcome
    }

    /// The part of `start_discovery` that runs after the phase was claimed.
    /// If its future is dropped, [`AbandonedStartGuard`] releases the claim.
    async fn complete_start(self: &Arc<Self>) -> StartOutcome {
        let denied = self.permissions.denied_groups();
        if !denied.is_empty() && !self.request_permissions(denied).await {
            return self
                .fail_if_awaiting(DiscoveryErrorKind::PermissionsDenied)
                .await;
        }

        let mut core = self.core.lock().await;
        if core.phase != Phase::AwaitingPermission {
            info!("discovery start abandoned: cancelled while awaiting permission");
            return StartOutcome::Cancelled;
        }

        // Subscribe before reading the radio state so a disable in between
        // is not lost.
        let radio_disabled = self.radio.disabled_events();
        if !self.radio.current_state().is_enabled() {
            let kind = DiscoveryErrorKind::AdapterNotAvailable;
            self.fail(&mut core, kind.clone());
            return StartOutcome::Failed(kind);
        }

        core.registry.clear();
        self.publish_devices(&core.registry);

        let session_id = Uuid::new_v4();
        // Subscribe before asking the hardware so no early report is missed.
        let subscription = self.bus.subscribe();
        core.phase = Phase::Discovering { session_id };

        if let Err(kind) = self.platform.start_discovery().await {
            warn!("hardware refused to start discovery: {kind}");
            self.fail(&mut core, kind.clone());
            return StartOutcome::Failed(kind);
        }

        self.publish_state(SessionState::Loading);
        info!("discovery session {session_id} started");

        let pump = tokio::spawn(
            Arc::clone(self).run_pump(session_id, subscription, radio_disabled),
        );
        core.pump = Some(pump);
        StartOutcome::Started
    }

    /// Cancels the in-flight session.  The state flips to `Idle` before the
    /// hardware confirms anything.
    ///
    /// Returns `false` when there was nothing to cancel.
    pub async fn cancel_discovery(&self) -> bool {
        let mut core = self.core.lock().await;
        self.cancel_locked(&mut core).await
    }

    /// Connects to a discovered device.
    ///
    /// The radio cannot scan and connect at the same time, so an in-flight
    /// session is cancelled first (unless disabled in the settings).
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Connect`] if the platform rejects the
    /// connection.  The session state is not affected.
    pub async fn connect_to_device(&self, address: &str) -> Result<(), CoordinatorError> {
        let mut core = self.core.lock().await;
        if !core.registry.contains(address) {
            warn!("connecting to {address}, which was not discovered in the last session");
        }
        if self.settings.cancel_discovery_before_connect
            && matches!(core.phase, Phase::Discovering { .. })
        {
            info!("cancelling discovery before connecting to {address}");
            self.cancel_locked(&mut core).await;
        }

        info!("connecting to {address}");
        self.platform
            .connect(address)
            .await
            .map_err(|source| CoordinatorError::Connect {
                address: address.to_string(),
                source,
            })
    }

    pub fn request_enable_radio(&self) {
        self.radio.request_enable();
    }

    /// Dismisses a displayed error, returning to `Idle`.
    pub async fn acknowledge_error(&self) -> bool {
        let mut core = self.core.lock().await;
        if !matches!(core.phase, Phase::Failed(_)) {
            return false;
        }
        core.phase = Phase::Idle;
        self.publish_state(SessionState::Idle);
        true
    }

    /// Re-evaluates permissions and radio state when the host app returns
    /// to the foreground.
    pub fn on_resume(&self) {
        debug!("resume: refreshing permission and radio state");
        self.permissions.refresh_from_platform();
        self.radio.refresh();
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// Runs one permission round trip.  Returns `true` only if every group
    /// was granted.
    async fn request_permissions(&self, denied: BTreeSet<PermissionGroup>) -> bool {
        let groups: Vec<PermissionGroup> = denied.into_iter().collect();
        let request = self.permissions.request_groups(&groups);

        let result = match self.settings.permission_timeout {
            Some(limit) => match tokio::time::timeout(limit, request).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("permission request timed out after {limit:?}");
                    self.permissions.cancel_pending();
                    return false;
                }
            },
            None => request.await,
        };

        match result {
            Ok(PermissionOutcome::AllGranted) => true,
            Ok(PermissionOutcome::Denied(_)) => false,
            Err(e) => {
                warn!("permission request failed: {e}");
                false
            }
        }
    }

    /// Releases the phase claimed by a `start_discovery` call whose future
    /// was dropped before it finished.
    fn release_abandoned_start(self: Arc<Self>) {
        self.permissions.cancel_pending();
        if let Ok(mut core) = self.core.try_lock() {
            self.reset_abandoned_start(&mut core);
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let mut core = self.core.lock().await;
                    self.reset_abandoned_start(&mut core);
                });
            }
            Err(_) => warn!("abandoned discovery start could not be released: no runtime"),
        }
    }

    fn reset_abandoned_start(self: &Arc<Self>, core: &mut SessionCore) {
        match core.phase {
            Phase::AwaitingPermission => {
                info!("discovery start abandoned by its caller while awaiting permission");
            }
            // Dropped while the hardware was being asked to scan.
            Phase::Discovering { session_id } if core.pump.is_none() => {
                info!("discovery session {session_id} abandoned by its caller during start");
                let platform = Arc::clone(&self.platform);
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move { platform.cancel_discovery().await });
                }
            }
            _ => return,
        }
        core.phase = Phase::Idle;
        self.publish_state(SessionState::Idle);
    }

    async fn fail_if_awaiting(&self, kind: DiscoveryErrorKind) -> StartOutcome {
        let mut core = self.core.lock().await;
        if core.phase != Phase::AwaitingPermission {
            return StartOutcome::Cancelled;
        }
        self.fail(&mut core, kind.clone());
        StartOutcome::Failed(kind)
    }

    fn fail(&self, core: &mut SessionCore, kind: DiscoveryErrorKind) {
        warn!("discovery failed: {kind}");
        core.phase = Phase::Failed(kind.clone());
        self.publish_state(SessionState::Error(kind));
    }

    async fn cancel_locked(&self, core: &mut SessionCore) -> bool {
        match core.phase {
            Phase::Discovering { session_id } => {
                if let Some(pump) = core.pump.take() {
                    pump.abort();
                }
                core.phase = Phase::Idle;
                self.publish_state(SessionState::Idle);
                info!("discovery session {session_id} cancelled");
                self.platform.cancel_discovery().await;
                true
            }
            Phase::AwaitingPermission => {
                core.phase = Phase::Idle;
                self.permissions.cancel_pending();
                self.publish_state(SessionState::Idle);
                info!("discovery start cancelled while awaiting permission");
                true
            }
            Phase::Idle | Phase::Failed(_) => {
                debug!("cancel_discovery ignored: nothing in flight");
                false
            }
        }
    }

    async fn run_pump(
        self: Arc<Self>,
        session_id: Uuid,
        mut subscription: BusSubscription,
        mut radio_disabled: broadcast::Receiver<()>,
    ) {
        let limit = self.settings.discovery_timeout;
        let deadline = async move {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);
        let mut radio_open = true;

        loop {
            let step = tokio::select! {
                biased;
                event = subscription.recv() => match event {
                    Some(event) => self.apply_event(session_id, event).await,
                    None => {
                        debug!("event bus closed; stopping session {session_id} pump");
                        PumpStep::Stop
                    }
                },
                disabled = radio_disabled.recv(), if radio_open => match disabled {
                    Ok(()) | Err(RecvError::Lagged(_)) => {
                        self.apply_radio_disabled(session_id).await
                    }
                    Err(RecvError::Closed) => {
                        radio_open = false;
                        PumpStep::Continue
                    }
                },
                () = &mut deadline => self.apply_timeout(session_id).await,
            };

            if step == PumpStep::Stop {
                break;
            }
        }

        if subscription.dropped() > 0 {
            debug!(
                "session {session_id}: {} device report(s) lost to bus overflow",
                subscription.dropped()
            );
        }
    }

    async fn apply_event(&self, session_id: Uuid, event: BusEvent) -> PumpStep {
        let mut core = self.core.lock().await;
        if !core.is_current(session_id) {
            debug!("discarding event for stale session {session_id}");
            return PumpStep::Stop;
        }

        match event {
            BusEvent::DeviceFound(device) => {
                if core.registry.upsert(device).changed() {
                    self.publish_devices(&core.registry);
                }
                PumpStep::Continue
            }
            BusEvent::DiscoveryFinished => {
                core.pump.take();
                core.phase = Phase::Idle;
                self.publish_state(SessionState::Idle);
                info!(
                    "discovery session {session_id} finished with {} device(s)",
                    core.registry.len()
                );
                PumpStep::Stop
            }
            BusEvent::ErrorOccurred(kind) => {
                core.pump.take();
                self.fail(&mut core, kind);
                PumpStep::Stop
            }
        }
    }

    async fn apply_radio_disabled(&self, session_id: Uuid) -> PumpStep {
        let mut core = self.core.lock().await;
        if !core.is_current(session_id) {
            return PumpStep::Stop;
        }
        info!("radio disabled during discovery session {session_id}");
        core.pump.take();
        self.fail(&mut core, DiscoveryErrorKind::AdapterNotAvailable);
        PumpStep::Stop
    }

    async fn apply_timeout(&self, session_id: Uuid) -> PumpStep {
        let mut core = self.core.lock().await;
        if !core.is_current(session_id) {
            return PumpStep::Stop;
        }
        core.pump.take();
        core.phase = Phase::Idle;
        self.publish_state(SessionState::Idle);
        info!(
            "discovery session {session_id} reached its timeout with {} device(s)",
            core.registry.len()
        );
        self.platform.cancel_discovery().await;
        PumpStep::Stop
    }

    fn publish_state(&self, next: SessionState) {
        self.session_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next.clone();
            true
        });
    }

    fn publish_devices(&self, registry: &DeviceRegistry) {
        self.devices_tx.send_replace(registry.snapshot());
    }
}
