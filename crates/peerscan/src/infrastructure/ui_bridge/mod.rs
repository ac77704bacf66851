//! UI command bridge: exposes the discovery coordinator to a presentation layer.
//!
//! Every command function here delegates to the shared [`AppState`] and
//! returns plain serialisable DTOs, so a desktop shell (Tauri, a local HTTP
//! endpoint, a CLI) can forward them to a UI without knowing about watch
//! channels or domain types.  The Application layer must NOT import this
//! module.
//!
//! # Data Transfer Objects
//!
//! Domain types such as [`SessionState`] are enums carrying data, which map
//! awkwardly onto the JSON a web frontend expects.  DTOs flatten them into
//! simple structs of strings and booleans:
//!
//! ```json
//! { "session": { "state": "error", "error": "adapter not available" },
//!   "devices": [ { "name": "Phone A2", "address": "AA:BB" } ],
//!   "radio_enabled": false,
//!   "denied_permissions": [] }
//! ```
//!
//! # `CommandResult<T>` wrapper
//!
//! All commands return `CommandResult<T>` rather than `Result<T, E>`, so every
//! response has the same shape: `{ success: bool, data: T | null, error: string | null }`.

use std::path::PathBuf;
use std::sync::Arc;

use peerscan_core::{PeerDevice, SessionState};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::application::discovery_session::{DiscoverySessionCoordinator, StartOutcome};
use crate::infrastructure::storage::config::{
    save_config, save_config_to, AppConfig, ConfigError, DiscoveryConfig,
};

// ── Shared application state ──────────────────────────────────────────────────

/// State shared between command invocations.
pub struct AppState {
    pub coordinator: Arc<DiscoverySessionCoordinator>,
    /// The persisted configuration.  Edits are saved immediately and take
    /// effect for the coordinator on the next launch.
    pub config: Mutex<AppConfig>,
    /// Where edits are saved; `None` means the platform config file.
    config_path: Option<PathBuf>,
}

impl AppState {
    pub fn new(coordinator: Arc<DiscoverySessionCoordinator>, config: AppConfig) -> Arc<Self> {
        Self::build(coordinator, config, None)
    }

    /// Like [`AppState::new`], but edits are saved to `path`.
    pub fn with_config_path(
        coordinator: Arc<DiscoverySessionCoordinator>,
        config: AppConfig,
        path: PathBuf,
    ) -> Arc<Self> {
        Self::build(coordinator, config, Some(path))
    }

    fn build(
        coordinator: Arc<DiscoverySessionCoordinator>,
        config: AppConfig,
        config_path: Option<PathBuf>,
    ) -> Arc<Self> {
        Arc::new(Self {
            coordinator,
            config: Mutex::new(config),
            config_path,
        })
    }

    fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        match &self.config_path {
            Some(path) => save_config_to(config, path),
            None => save_config(config),
        }
    }
}

// ── Data Transfer Objects ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDeviceDto {
    pub name: String,
    pub address: String,
}

impl From<&PeerDevice> for PeerDeviceDto {
    fn from(d: &PeerDevice) -> Self {
        Self {
            name: d.name.clone(),
            address: d.address.clone(),
        }
    }
}

/// Flattened [`SessionState`]: `state` is `"idle"`, `"loading"` or `"error"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStateDto {
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&SessionState> for SessionStateDto {
    fn from(s: &SessionState) -> Self {
        let (state, error) = match s {
            SessionState::Idle => ("idle", None),
            SessionState::Loading => ("loading", None),
            SessionState::Error(kind) => ("error", Some(kind.to_string())),
        };
        Self {
            state: state.to_string(),
            error,
        }
    }
}

/// Everything a discovery screen renders, in one round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverySnapshotDto {
    pub session: SessionStateDto,
    pub devices: Vec<PeerDeviceDto>,
    pub radio_enabled: bool,
    pub denied_permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfigDto {
    pub device_found_capacity: usize,
    pub terminal_event_capacity: usize,
    pub discovery_timeout_secs: u64,
    pub permission_timeout_secs: u64,
    pub cancel_discovery_before_connect: bool,
}

impl From<&DiscoveryConfig> for DiscoveryConfigDto {
    fn from(c: &DiscoveryConfig) -> Self {
        Self {
            device_found_capacity: c.device_found_capacity,
            terminal_event_capacity: c.terminal_event_capacity,
            discovery_timeout_secs: c.discovery_timeout_secs,
            permission_timeout_secs: c.permission_timeout_secs,
            cancel_discovery_before_connect: c.cancel_discovery_before_connect,
        }
    }
}

impl From<&DiscoveryConfigDto> for DiscoveryConfig {
    fn from(dto: &DiscoveryConfigDto) -> Self {
        Self {
            device_found_capacity: dto.device_found_capacity,
            terminal_event_capacity: dto.terminal_event_capacity,
            discovery_timeout_secs: dto.discovery_timeout_secs,
            permission_timeout_secs: dto.permission_timeout_secs,
            cancel_discovery_before_connect: dto.cancel_discovery_before_connect,
        }
    }
}

/// Unified response wrapper used by every command.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Returns the current session state, devices, radio state and denied groups.
///
/// # Example (frontend)
/// ```ts
/// const snap = await invoke<DiscoverySnapshotDto>('get_discovery_snapshot');
/// ```
pub async fn get_discovery_snapshot(state: Arc<AppState>) -> CommandResult<DiscoverySnapshotDto> {
    let c = &state.coordinator;
    CommandResult::ok(DiscoverySnapshotDto {
        session: SessionStateDto::from(&c.current_session_state()),
        devices: c.current_devices().iter().map(PeerDeviceDto::from).collect(),
        radio_enabled: c.radio_monitor().current_state().is_enabled(),
        denied_permissions: c
            .permission_gate()
            .denied_groups()
            .iter()
            .map(|g| g.name().to_string())
            .collect(),
    })
}

/// Starts discovery.  Resolves once scanning has begun or the start failed.
pub async fn start_discovery(state: Arc<AppState>) -> CommandResult<SessionStateDto> {
    match state.coordinator.start_discovery().await {
        StartOutcome::Failed(kind) => CommandResult::err(kind.to_string()),
        StartOutcome::Started | StartOutcome::AlreadyRunning | StartOutcome::Cancelled => {
            CommandResult::ok(SessionStateDto::from(
                &state.coordinator.current_session_state(),
            ))
        }
    }
}

/// Cancels discovery.  `data` is `false` when nothing was running.
pub async fn cancel_discovery(state: Arc<AppState>) -> CommandResult<bool> {
    CommandResult::ok(state.coordinator.cancel_discovery().await)
}

pub async fn connect_to_device(state: Arc<AppState>, address: String) -> CommandResult<()> {
    match state.coordinator.connect_to_device(&address).await {
        Ok(()) => CommandResult::ok(()),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

pub async fn request_enable_radio(state: Arc<AppState>) -> CommandResult<()> {
    state.coordinator.request_enable_radio();
    CommandResult::ok(())
}

/// Dismisses the displayed error.  `data` is `false` when no error was shown.
pub async fn acknowledge_error(state: Arc<AppState>) -> CommandResult<bool> {
    CommandResult::ok(state.coordinator.acknowledge_error().await)
}

/// Called when the host window regains focus.
pub async fn on_resume(state: Arc<AppState>) -> CommandResult<DiscoverySnapshotDto> {
    state.coordinator.on_resume();
    get_discovery_snapshot(state).await
}

pub async fn get_discovery_config(state: Arc<AppState>) -> CommandResult<DiscoveryConfigDto> {
    let cfg = state.config.lock().await;
    CommandResult::ok(DiscoveryConfigDto::from(&cfg.discovery))
}

/// Validates and persists new discovery settings.
///
/// The running coordinator keeps the settings it was built with; the saved
/// values apply from the next launch.
pub async fn update_discovery_config(
    state: Arc<AppState>,
    discovery: DiscoveryConfigDto,
) -> CommandResult<DiscoveryConfigDto> {
    let next = DiscoveryConfig::from(&discovery);
    if let Err(e) = next.validate() {
        return CommandResult::err(e.to_string());
    }

    let mut cfg = state.config.lock().await;
    let previous = std::mem::replace(&mut cfg.discovery, next);
    if let Err(e) = state.save(&cfg) {
        cfg.discovery = previous;
        return CommandResult::err(format!("failed to save config: {e}"));
    }
    CommandResult::ok(DiscoveryConfigDto::from(&cfg.discovery))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::platform::simulated::{
        DialogAnswer, ScriptedPeer, SimulatedPermissions, SimulatedRadio,
    };
    use crate::infrastructure::storage::config::load_config_from;
    use peerscan_core::{DiscoveryErrorKind, PermissionGroup};

    /// Builds an isolated AppState that never touches the config file on disk.
    fn make_state(
        radio: SimulatedRadio,
        permissions: SimulatedPermissions,
    ) -> (Arc<AppState>, Arc<SimulatedRadio>) {
        let config = AppConfig::default();
        let radio = Arc::new(radio);
        let permissions = Arc::new(permissions);
        let coordinator = DiscoverySessionCoordinator::new(
            radio.clone(),
            permissions.clone(),
            config.permissions.required_groups.clone(),
            config.discovery.coordinator_settings(),
        );
        radio.attach(coordinator.callbacks());
        permissions.attach(coordinator.callbacks());
        (AppState::new(coordinator, config), radio)
    }

    #[test]
    fn test_session_state_dto_flattens_error() {
        let dto = SessionStateDto::from(&SessionState::Error(
            DiscoveryErrorKind::AdapterNotAvailable,
        ));
        assert_eq!(dto.state, "error");
        assert!(dto.error.is_some());
    }

    #[test]
    fn test_idle_dto_omits_error_field_in_json() {
        let json = serde_json::to_string(&SessionStateDto::from(&SessionState::Idle)).unwrap();
        assert_eq!(json, r#"{"state":"idle"}"#);
    }

    #[test]
    fn test_command_result_err_has_no_data() {
        let result: CommandResult<()> = CommandResult::err("boom");
        assert!(!result.success);
        assert!(result.data.is_none());
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_snapshot_initially_idle_and_empty() {
        // Arrange
        let (state, _radio) =
            make_state(SimulatedRadio::new(), SimulatedPermissions::all_granted());

        // Act
        let result = get_discovery_snapshot(state).await;

        // Assert
        assert!(result.success);
        let snap = result.data.unwrap();
        assert_eq!(snap.session.state, "idle");
        assert!(snap.devices.is_empty());
        assert!(snap.radio_enabled);
        assert!(snap.denied_permissions.is_empty());
    }

    #[tokio::test]
    async fn test_start_discovery_with_radio_off_returns_error() {
        let (state, radio) =
            make_state(SimulatedRadio::disabled(), SimulatedPermissions::all_granted());

        let result = start_discovery(Arc::clone(&state)).await;

        assert!(!result.success);
        assert_eq!(radio.start_calls(), 0);
        let snap = get_discovery_snapshot(state).await.data.unwrap();
        assert_eq!(snap.session.state, "error");
    }

    #[tokio::test]
    async fn test_snapshot_lists_denied_permissions() {
        let (state, _radio) = make_state(
            SimulatedRadio::new(),
            SimulatedPermissions::prompting(DialogAnswer::DenyAll),
        );

        let snap = get_discovery_snapshot(state).await.data.unwrap();

        assert_eq!(
            snap.denied_permissions,
            vec![
                PermissionGroup::BACKGROUND_LOCATION.to_string(),
                PermissionGroup::RADIO_ACCESS.to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_device_returns_error() {
        // Arrange
        let radio = SimulatedRadio::new().with_peers(vec![ScriptedPeer::named("Phone", "AA:BB")]);
        radio.set_unreachable("AA:BB");
        let (state, _radio) = make_state(radio, SimulatedPermissions::all_granted());

        // Act
        let result = connect_to_device(state, "AA:BB".to_string()).await;

        // Assert
        assert!(!result.success);
        assert!(result.error.unwrap().contains("AA:BB"));
    }

    #[tokio::test]
    async fn test_request_enable_radio_turns_radio_on() {
        let (state, radio) =
            make_state(SimulatedRadio::disabled(), SimulatedPermissions::all_granted());

        request_enable_radio(Arc::clone(&state)).await;

        assert_eq!(radio.enable_requests(), 1);
        let snap = get_discovery_snapshot(state).await.data.unwrap();
        assert!(snap.radio_enabled);
    }

    #[tokio::test]
    async fn test_get_discovery_config_returns_defaults() {
        let (state, _radio) =
            make_state(SimulatedRadio::new(), SimulatedPermissions::all_granted());

        let cfg = get_discovery_config(state).await.data.unwrap();

        assert_eq!(cfg.device_found_capacity, 8);
        assert_eq!(cfg.discovery_timeout_secs, 12);
    }

    fn state_saving_to(path: PathBuf) -> Arc<AppState> {
        let (state, _radio) =
            make_state(SimulatedRadio::new(), SimulatedPermissions::all_granted());
        AppState::with_config_path(
            Arc::clone(&state.coordinator),
            AppConfig::default(),
            path,
        )
    }

    #[tokio::test]
    async fn test_update_discovery_config_persists_to_file() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("peerscan_bridge_{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");
        let state = state_saving_to(path.clone());
        let mut dto = get_discovery_config(Arc::clone(&state)).await.data.unwrap();
        dto.discovery_timeout_secs = 30;
        dto.device_found_capacity = 16;

        // Act
        let result = update_discovery_config(Arc::clone(&state), dto.clone()).await;

        // Assert
        assert!(result.success);
        assert_eq!(result.data, Some(dto.clone()));
        let on_disk = load_config_from(&path).expect("saved config loads");
        assert_eq!(DiscoveryConfigDto::from(&on_disk.discovery), dto);
        assert_eq!(get_discovery_config(state).await.data, Some(dto));

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_update_discovery_config_rejects_zero_capacity() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("peerscan_bridge_{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");
        let state = state_saving_to(path.clone());
        let mut dto = get_discovery_config(Arc::clone(&state)).await.data.unwrap();
        dto.device_found_capacity = 0;

        // Act
        let result = update_discovery_config(Arc::clone(&state), dto).await;

        // Assert
        assert!(!result.success);
        assert!(result.error.unwrap().contains("device_found_capacity"));
        assert!(!path.exists());
        let current = get_discovery_config(state).await.data.unwrap();
        assert_eq!(current.device_found_capacity, 8);
    }
}
