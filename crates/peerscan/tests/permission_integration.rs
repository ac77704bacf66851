//! Integration tests for the permission round trip as seen from a discovery
//! session.
//!
//! The permission dialog is driven by [`SimulatedPermissions`]: it either
//! answers immediately (grant all / deny all) or stays silent, in which case
//! the test answers through the coordinator's callback handle, exactly like a
//! platform shim would after the user taps a button.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use peerscan::application::discovery_session::{
    CoordinatorSettings, DiscoverySessionCoordinator, StartOutcome,
};
use peerscan::infrastructure::platform::simulated::{
    DialogAnswer, SimulatedPermissions, SimulatedRadio,
};
use peerscan_core::{DiscoveryErrorKind, PermissionGroup, SessionState};

struct Harness {
    coordinator: Arc<DiscoverySessionCoordinator>,
    radio: Arc<SimulatedRadio>,
    permissions: Arc<SimulatedPermissions>,
}

fn required() -> Vec<PermissionGroup> {
    vec![
        PermissionGroup::radio_access(),
        PermissionGroup::background_location(),
    ]
}

fn harness_with(answer: DialogAnswer, settings: CoordinatorSettings) -> Harness {
    let radio = Arc::new(SimulatedRadio::new().without_auto_finish());
    let permissions = Arc::new(SimulatedPermissions::prompting(answer));
    let coordinator =
        DiscoverySessionCoordinator::new(radio.clone(), permissions.clone(), required(), settings);
    radio.attach(coordinator.callbacks());
    permissions.attach(coordinator.callbacks());
    Harness {
        coordinator,
        radio,
        permissions,
    }
}

fn harness(answer: DialogAnswer) -> Harness {
    harness_with(
        answer,
        CoordinatorSettings {
            discovery_timeout: None,
            ..CoordinatorSettings::default()
        },
    )
}

async fn wait_for_dialog(c: &DiscoverySessionCoordinator) {
    while !c.permission_gate().is_request_pending() {
        tokio::task::yield_now().await;
    }
}

fn spawn_start(c: &Arc<DiscoverySessionCoordinator>) -> tokio::task::JoinHandle<StartOutcome> {
    let c = Arc::clone(c);
    tokio::spawn(async move { c.start_discovery().await })
}

#[tokio::test]
async fn test_granted_dialog_leads_to_loading() {
    // Arrange
    let h = harness(DialogAnswer::GrantAll);
    assert_eq!(h.coordinator.permission_gate().denied_groups().len(), 2);

    // Act
    let outcome = h.coordinator.start_discovery().await;

    // Assert
    assert_eq!(outcome, StartOutcome::Started);
    assert_eq!(h.coordinator.current_session_state(), SessionState::Loading);
    assert_eq!(h.permissions.requests(), 1);
    assert!(h.coordinator.permission_gate().denied_groups().is_empty());
}

#[tokio::test]
async fn test_denied_dialog_fails_without_hardware_call() {
    let h = harness(DialogAnswer::DenyAll);

    let outcome = h.coordinator.start_discovery().await;

    assert_eq!(
        outcome,
        StartOutcome::Failed(DiscoveryErrorKind::PermissionsDenied)
    );
    assert_eq!(
        h.coordinator.current_session_state(),
        SessionState::Error(DiscoveryErrorKind::PermissionsDenied)
    );
    assert_eq!(h.radio.start_calls(), 0);
}

#[tokio::test]
async fn test_no_dialog_once_everything_is_granted() {
    // Arrange: the first session grants everything
    let h = harness(DialogAnswer::GrantAll);
    h.coordinator.start_discovery().await;
    h.coordinator.cancel_discovery().await;

    // Act
    let outcome = h.coordinator.start_discovery().await;

    // Assert
    assert_eq!(outcome, StartOutcome::Started);
    assert_eq!(h.permissions.requests(), 1);
}

#[tokio::test]
async fn test_partial_answer_reports_remaining_denied_group() {
    // Arrange
    let h = harness(DialogAnswer::Silent);
    let mut denied_rx = h.coordinator.denied_permissions();
    let start = spawn_start(&h.coordinator);
    wait_for_dialog(&h.coordinator).await;

    // Act: the user grants radio access but not background location
    h.coordinator.callbacks().on_permission_result(HashMap::from([
        (PermissionGroup::radio_access(), true),
        (PermissionGroup::background_location(), false),
    ]));

    // Assert
    assert_eq!(
        start.await.unwrap(),
        StartOutcome::Failed(DiscoveryErrorKind::PermissionsDenied)
    );
    let expected: BTreeSet<_> = [PermissionGroup::background_location()].into();
    assert!(denied_rx.has_changed().unwrap());
    assert_eq!(*denied_rx.borrow_and_update(), expected);
    assert_eq!(h.radio.start_calls(), 0);
}

#[tokio::test]
async fn test_triggers_during_dialog_do_not_open_second_dialog() {
    // Arrange
    let h = harness(DialogAnswer::Silent);
    let start = spawn_start(&h.coordinator);
    wait_for_dialog(&h.coordinator).await;

    // Act
    let again = h.coordinator.start_discovery().await;
    h.coordinator.callbacks().on_permission_result(
        required().into_iter().map(|g| (g, true)).collect(),
    );

    // Assert
    assert_eq!(again, StartOutcome::AlreadyRunning);
    assert_eq!(start.await.unwrap(), StartOutcome::Started);
    assert_eq!(h.permissions.requests(), 1);
    assert_eq!(h.radio.start_calls(), 1);
}

#[tokio::test]
async fn test_cancel_during_dialog_drops_late_answer() {
    // Arrange
    let h = harness(DialogAnswer::Silent);
    let start = spawn_start(&h.coordinator);
    wait_for_dialog(&h.coordinator).await;

    // Act
    let cancelled = h.coordinator.cancel_discovery().await;
    h.coordinator.callbacks().on_permission_result(
        required().into_iter().map(|g| (g, true)).collect(),
    );

    // Assert
    assert!(cancelled);
    assert_eq!(start.await.unwrap(), StartOutcome::Cancelled);
    assert_eq!(h.coordinator.current_session_state(), SessionState::Idle);
    // The late answer found nothing pending and changed nothing.
    assert_eq!(h.coordinator.permission_gate().denied_groups().len(), 2);
    assert_eq!(h.radio.start_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_dialog_times_out_as_denied() {
    // Arrange
    let h = harness_with(
        DialogAnswer::Silent,
        CoordinatorSettings {
            discovery_timeout: None,
            permission_timeout: Some(Duration::from_secs(30)),
            ..CoordinatorSettings::default()
        },
    );

    // Act
    let outcome = h.coordinator.start_discovery().await;

    // Assert
    assert_eq!(
        outcome,
        StartOutcome::Failed(DiscoveryErrorKind::PermissionsDenied)
    );
    assert!(!h.coordinator.permission_gate().is_request_pending());
    assert_eq!(h.radio.start_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_caller_timeout_on_dialog_leaves_coordinator_restartable() {
    // Arrange
    let h = harness(DialogAnswer::Silent);

    // Act: the UI stops waiting, then the user answers the stale dialog
    let gave_up =
        tokio::time::timeout(Duration::from_millis(50), h.coordinator.start_discovery()).await;
    let late_answer_applied = h.coordinator.permission_gate().on_permission_result(
        required().into_iter().map(|g| (g, true)).collect(),
    );

    // Assert
    assert!(gave_up.is_err());
    assert!(!late_answer_applied);
    assert_eq!(h.coordinator.current_session_state(), SessionState::Idle);

    let retry = spawn_start(&h.coordinator);
    wait_for_dialog(&h.coordinator).await;
    h.coordinator.callbacks().on_permission_result(
        required().into_iter().map(|g| (g, true)).collect(),
    );
    assert_eq!(retry.await.unwrap(), StartOutcome::Started);
    assert_eq!(h.permissions.requests(), 2);
    assert_eq!(h.radio.start_calls(), 1);
}

#[tokio::test]
async fn test_dialog_after_error_replaces_displayed_error() {
    // Arrange: the first dialog is denied
    let h = harness(DialogAnswer::Silent);
    let first = spawn_start(&h.coordinator);
    wait_for_dialog(&h.coordinator).await;
    h.coordinator.callbacks().on_permission_result(
        required().into_iter().map(|g| (g, false)).collect(),
    );
    first.await.unwrap();

    // Act
    let second = spawn_start(&h.coordinator);
    wait_for_dialog(&h.coordinator).await;

    // Assert
    assert_eq!(h.coordinator.current_session_state(), SessionState::Idle);
    h.coordinator.callbacks().on_permission_result(
        required().into_iter().map(|g| (g, true)).collect(),
    );
    assert_eq!(second.await.unwrap(), StartOutcome::Started);
}

#[tokio::test]
async fn test_resume_picks_up_grants_made_in_system_settings() {
    // Arrange: the dialog is denied, then the user grants both groups
    // from the system settings app and comes back
    let h = harness(DialogAnswer::DenyAll);
    h.coordinator.start_discovery().await;
    for group in required() {
        h.permissions.grant(group);
    }

    // Act
    h.coordinator.on_resume();
    h.coordinator.acknowledge_error().await;
    let outcome = h.coordinator.start_discovery().await;

    // Assert
    assert!(h.coordinator.permission_gate().denied_groups().is_empty());
    assert_eq!(outcome, StartOutcome::Started);
    assert_eq!(h.permissions.requests(), 1);
}

#[tokio::test]
async fn test_resume_notices_revoked_permission() {
    let h = harness(DialogAnswer::GrantAll);
    h.coordinator.start_discovery().await;
    assert!(h.coordinator.permission_gate().denied_groups().is_empty());

    h.permissions.revoke(&PermissionGroup::background_location());
    h.coordinator.on_resume();

    assert_eq!(
        h.coordinator.permission_gate().denied_groups(),
        [PermissionGroup::background_location()].into()
    );
}
