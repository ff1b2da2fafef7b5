//! Kill Switch
//!
//! Client-side mirror of the kill switch policy. The backend enforces
//! the block; this tracks what it is doing so the UI can tell the user
//! whether traffic is currently blocked.
//!
//! # Behavior
//!
//! | Setting | Tunnel | State      |
//! |---------|--------|------------|
//! | off     | any    | `Disabled` |
//! | on      | up     | `Armed`    |
//! | on      | down   | `Blocking` |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Kill switch state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillSwitchState {
    /// Setting is off, traffic always flows
    Disabled,
    /// Setting is on and the tunnel is up
    Armed,
    /// Setting is on and the tunnel is down, traffic blocked
    Blocking,
}

impl KillSwitchState {
    /// Check if traffic is allowed
    pub fn allows_traffic(&self) -> bool {
        !self.is_blocking()
    }

    /// Check if traffic is blocked
    pub fn is_blocking(&self) -> bool {
        matches!(self, KillSwitchState::Blocking)
    }
}

/// Kill switch policy mirror
///
/// Clones share state. The settings store owns the enabled flag, the
/// session controller owns the tunnel flag.
#[derive(Debug, Clone)]
pub struct KillSwitch {
    enabled: Arc<AtomicBool>,
    tunnel_up: Arc<AtomicBool>,
}

impl KillSwitch {
    /// Create a kill switch with the tunnel down
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
            tunnel_up: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> KillSwitchState {
        if !self.enabled.load(Ordering::Acquire) {
            KillSwitchState::Disabled
        } else if self.tunnel_up.load(Ordering::Acquire) {
            KillSwitchState::Armed
        } else {
            KillSwitchState::Blocking
        }
    }

    pub fn allows_traffic(&self) -> bool {
        self.state().allows_traffic()
    }

    pub fn is_blocking(&self) -> bool {
        self.state().is_blocking()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Apply the acknowledged kill switch setting
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::AcqRel);
        if was != enabled {
            debug!("Kill switch {}", if enabled { "enabled" } else { "disabled" });
        }
    }

    /// Tunnel came up
    pub fn on_tunnel_up(&self) {
        debug!("Kill switch: tunnel up, traffic allowed");
        self.tunnel_up.store(true, Ordering::Release);
    }

    /// Tunnel went down or is going down
    pub fn on_tunnel_down(&self) {
        let was_up = self.tunnel_up.swap(false, Ordering::AcqRel);
        if was_up && self.is_enabled() {
            warn!("Kill switch: tunnel down, blocking traffic");
        }
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new(true)
    }
}
