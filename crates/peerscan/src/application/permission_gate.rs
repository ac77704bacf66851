//! PermissionGate: decides whether discovery may proceed and performs at most
//! one permission round trip at a time.
//!
//! # The round trip (for beginners)
//!
//! Asking for a permission is a two-step conversation with the platform:
//!
//! ```text
//! request_groups(groups)                         platform
//!   ├─ store pending slot (oneshot sender)
//!   ├─ request_permissions(groups) ───────────►  shows dialog
//!   └─ await oneshot receiver                    user answers
//!                     ◄──────────────────────── on_permission_result(results)
//!      resolve pending slot exactly once
//! ```
//!
//! The pending slot holds the sending half of a [`tokio::sync::oneshot`]
//! channel.  `on_permission_result` takes the slot out and sends the answer,
//! so a request can only ever be resolved once.  A result that arrives when
//! nothing is pending (the user navigated away and the request was cancelled)
//! is dropped without error.
//!
//! Only one request may be in flight.  A second `request_groups` while one
//! is pending is rejected with [`PermissionError::RequestInFlight`], which
//! stops two screens from racing to show competing dialogs.
//!
//! The gate never times out on its own.  A platform that never answers leaves
//! the caller waiting; the coordinator decides whether to bound that wait.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use peerscan_core::PermissionGroup;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use super::platform::PermissionPlatform;

/// Error type for permission round trips.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PermissionError {
    /// Another request is still waiting for its answer.
    #[error("a permission request is already in flight")]
    RequestInFlight,
    /// The pending request was cancelled before the platform answered.
    #[error("permission request was cancelled")]
    Cancelled,
}

/// Result of a completed permission round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionOutcome {
    AllGranted,
    /// At least one requested group was denied (or missing from the answer).
    Denied(BTreeSet<PermissionGroup>),
}

impl PermissionOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionOutcome::AllGranted)
    }
}

struct PendingRequest {
    groups: BTreeSet<PermissionGroup>,
    reply: oneshot::Sender<HashMap<PermissionGroup, bool>>,
}

pub struct PermissionGate {
    platform: Arc<dyn PermissionPlatform>,
    required: Vec<PermissionGroup>,
    pending: Mutex<Option<PendingRequest>>,
    denied: watch::Sender<BTreeSet<PermissionGroup>>,
}

impl PermissionGate {
    /// Creates a gate for the given required groups and evaluates their
    /// current status through the platform.
    pub fn new(platform: Arc<dyn PermissionPlatform>, required: Vec<PermissionGroup>) -> Self {
        let (denied, _) = watch::channel(BTreeSet::new());
        let gate = Self {
            platform,
            required,
            pending: Mutex::new(None),
            denied,
        };
        gate.refresh_from_platform();
        gate
    }

    pub fn required_groups(&self) -> &[PermissionGroup] {
        &self.required
    }

    /// Returns the cached set of denied groups.
    pub fn denied_groups(&self) -> BTreeSet<PermissionGroup> {
        self.denied.borrow().clone()
    }

    /// Returns a live stream of the denied set.
    pub fn denied_groups_stream(&self) -> watch::Receiver<BTreeSet<PermissionGroup>> {
        self.denied.subscribe()
    }

    pub fn is_request_pending(&self) -> bool {
        self.lock_pending().is_some()
    }

    /// Requests `groups` from the platform and waits for the answer.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::RequestInFlight`] if another request is
    /// pending, and [`PermissionError::Cancelled`] if this request is
    /// cancelled before the platform answers.
    pub async fn request_groups(
        &self,
        groups: &[PermissionGroup],
    ) -> Result<PermissionOutcome, PermissionError> {
        let requested: BTreeSet<PermissionGroup> = groups.iter().cloned().collect();
        let reply = {
            let mut pending = self.lock_pending();
            if pending.is_some() {
                warn!("rejecting permission request: another request is in flight");
                return Err(PermissionError::RequestInFlight);
            }
            let (tx, rx) = oneshot::channel();
            *pending = Some(PendingRequest {
                groups: requested.clone(),
                reply: tx,
            });
            rx
        };

        info!("requesting permission groups: {}", join_groups(&requested));
        // The platform may answer synchronously, so the lock must not be held here.
        self.platform.request_permissions(groups);

        let results = reply.await.map_err(|_| PermissionError::Cancelled)?;
        let denied: BTreeSet<PermissionGroup> = requested
            .into_iter()
            .filter(|g| !results.get(g).copied().unwrap_or(false))
            .collect();

        if denied.is_empty() {
            info!("all requested permission groups granted");
            Ok(PermissionOutcome::AllGranted)
        } else {
            info!("permission groups denied: {}", join_groups(&denied));
            Ok(PermissionOutcome::Denied(denied))
        }
    }

    /// Delivers the platform's answer to the pending request.
    ///
    /// Returns `false` when no request was pending and the result was dropped.
    pub fn on_permission_result(&self, results: HashMap<PermissionGroup, bool>) -> bool {
        let Some(pending) = self.lock_pending().take() else {
            debug!("dropping permission result: no request pending");
            return false;
        };

        self.denied.send_if_modified(|denied| {
            let before = denied.clone();
            for group in &pending.groups {
                if results.get(group).copied().unwrap_or(false) {
                    denied.remove(group);
                } else {
                    denied.insert(group.clone());
                }
            }
            for (group, granted) in &results {
                if *granted {
                    denied.remove(group);
                }
            }
            *denied != before
        });

        if pending.reply.send(results).is_err() {
            debug!("permission requester went away before the result arrived");
        }
        true
    }

    /// Cancels the pending request, if any.  The waiting caller receives
    /// [`PermissionError::Cancelled`].
    pub fn cancel_pending(&self) -> bool {
        let cancelled = self.lock_pending().take().is_some();
        if cancelled {
            info!("pending permission request cancelled");
        }
        cancelled
    }

    /// Recomputes the denied set by asking `evaluator` about every required group.
    pub fn refresh_denied_groups<F>(&self, evaluator: F)
    where
        F: Fn(&PermissionGroup) -> bool,
    {
        let next: BTreeSet<PermissionGroup> = self
            .required
            .iter()
            .filter(|g| !evaluator(g))
            .cloned()
            .collect();
        let changed = self.denied.send_if_modified(|denied| {
            if *denied == next {
                return false;
            }
            *denied = next.clone();
            true
        });
        if changed {
            debug!("denied permission groups now: [{}]", join_groups(&next));
        }
    }

    /// Recomputes the denied set using the platform's grant status.
    pub fn refresh_from_platform(&self) {
        let platform = Arc::clone(&self.platform);
        self.refresh_denied_groups(|g| platform.is_granted(g));
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<PendingRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn join_groups(groups: &BTreeSet<PermissionGroup>) -> String {
    groups
        .iter()
        .map(PermissionGroup::name)
        .collect::<Vec<_>>()
        .join(", ")
}
