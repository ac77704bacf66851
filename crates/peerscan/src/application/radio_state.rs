//! RadioStateMonitor: single source of truth for whether the radio is usable.
//!
//! The state lives in a [`tokio::sync::watch`] channel.  A watch channel
//! always holds the latest value, so a UI screen that subscribes late still
//! learns the current state immediately instead of waiting for the next
//! transition.
//!
//! The monitor never changes state on its own initiative.  `request_enable`
//! only asks the platform to prompt the user; the new state arrives later
//! through the platform's broadcast signal (`on_platform_state_changed`).
//!
//! A device without any radio hardware is permanently `Disabled` and every
//! request is a no-op.
//!
//! # Disable signals
//!
//! A watch channel coalesces: an off/on blip that happens before a reader
//! looks shows up as a single `Enabled`.  A running scan is killed by such a
//! blip, so every `Enabled → Disabled` transition is also sent on a
//! [`tokio::sync::broadcast`] channel (see [`RadioStateMonitor::disabled_events`]).
//! A receiver that lags has still missed at least one disable.

use std::sync::Arc;

use peerscan_core::RadioState;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::platform::RadioPlatform;

pub struct RadioStateMonitor {
    platform: Arc<dyn RadioPlatform>,
    adapter_present: bool,
    state: watch::Sender<RadioState>,
    disabled: broadcast::Sender<()>,
}

impl RadioStateMonitor {
    /// Reads the initial adapter state from the platform.
    pub fn new(platform: Arc<dyn RadioPlatform>) -> Self {
        let adapter_present = platform.adapter_present();
        let initial = if adapter_present {
            RadioState::from_enabled(platform.adapter_enabled())
        } else {
            warn!("no radio adapter present; discovery will be unavailable");
            RadioState::Disabled
        };
        let (state, _) = watch::channel(initial);
        let (disabled, _) = broadcast::channel(1);
        info!("radio state monitor initialised: radio {initial}");
        Self {
            platform,
            adapter_present,
            state,
            disabled,
        }
    }

    pub fn current_state(&self) -> RadioState {
        *self.state.borrow()
    }

    /// Returns a live stream of radio states, starting from the current one.
    pub fn state_stream(&self) -> watch::Receiver<RadioState> {
        self.state.subscribe()
    }

    /// Returns a receiver that gets one message per `Enabled → Disabled`
    /// transition after subscribing.  Transitions are never merged away;
    /// `RecvError::Lagged` means at least one disable was missed.
    pub fn disabled_events(&self) -> broadcast::Receiver<()> {
        self.disabled.subscribe()
    }

    pub fn adapter_present(&self) -> bool {
        self.adapter_present
    }

    /// Asks the platform to prompt the user to enable the radio.
    pub fn request_enable(&self) {
        if !self.adapter_present {
            debug!("ignoring enable request: no radio adapter present");
            return;
        }
        info!("requesting radio enable prompt");
        self.platform.request_enable_adapter();
    }

    /// Applies a platform broadcast.  Identical consecutive values do not
    /// notify subscribers.
    pub fn on_platform_state_changed(&self, enabled: bool) {
        if !self.adapter_present {
            debug!("ignoring adapter state change: no radio adapter present");
            return;
        }
        let next = RadioState::from_enabled(enabled);
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            info!("radio state changed to {next}");
            if next == RadioState::Disabled {
                // No receivers simply means no session is watching.
                let _ = self.disabled.send(());
            }
        }
    }

    /// Re-reads the adapter state from the platform (foreground resume).
    pub fn refresh(&self) {
        if self.adapter_present {
            self.on_platform_state_changed(self.platform.adapter_enabled());
        }
    }
}
