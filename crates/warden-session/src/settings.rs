//! Settings Store
//!
//! Merge-and-persist semantics for [`VpnSettings`]: every write is
//! acknowledged by the backend before it is committed to the session,
//! and all writes are serialized so a merge never overwrites a toggle
//! that landed while it was in flight.

use crate::backend::Backend;
use crate::error::SessionResult;
use crate::kill_switch::KillSwitch;
use crate::model::{SettingsPatch, VpnSettings};
use crate::state::Session;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Boolean settings with a dedicated backend toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettingsFlag {
    KillSwitch,
    AutoConnect,
}

impl SettingsFlag {
    fn get(self, settings: &VpnSettings) -> bool {
        match self {
            SettingsFlag::KillSwitch => settings.kill_switch,
            SettingsFlag::AutoConnect => settings.auto_connect,
        }
    }

    fn set(self, settings: &mut VpnSettings, value: bool) {
        match self {
            SettingsFlag::KillSwitch => settings.kill_switch = value,
            SettingsFlag::AutoConnect => settings.auto_connect = value,
        }
    }

    fn name(self) -> &'static str {
        match self {
            SettingsFlag::KillSwitch => "kill switch",
            SettingsFlag::AutoConnect => "auto-connect",
        }
    }
}

/// Settings store
#[derive(Clone)]
pub struct SettingsStore {
    session: Session,
    backend: Arc<dyn Backend>,
    kill_switch: KillSwitch,
    /// Serializes every settings write
    write_lock: Arc<Mutex<()>>,
}

impl SettingsStore {
    pub fn new(session: Session, backend: Arc<dyn Backend>, kill_switch: KillSwitch) -> Self {
        Self {
            session,
            backend,
            kill_switch,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Current settings
    pub async fn current(&self) -> VpnSettings {
        self.session.settings().await
    }

    /// Merge `patch` over the current settings and persist the result
    ///
    /// Returns the committed settings. On backend failure nothing changes.
    pub async fn update_settings(&self, patch: SettingsPatch) -> SessionResult<VpnSettings> {
        let _guard = self.write_lock.lock().await;

        let merged = patch.apply(&self.session.settings().await);
        self.backend.update_settings(&merged).await?;

        self.session
            .update(|s| s.settings = merged.clone())
            .await;
        self.kill_switch.set_enabled(merged.kill_switch);

        info!("Settings updated (protocol: {})", merged.protocol);
        Ok(merged)
    }

    /// Invert the kill switch, returning the acknowledged value
    pub async fn toggle_kill_switch(&self) -> SessionResult<bool> {
        self.toggle(SettingsFlag::KillSwitch).await
    }

    /// Invert auto-connect, returning the acknowledged value
    pub async fn toggle_auto_connect(&self) -> SessionResult<bool> {
        self.toggle(SettingsFlag::AutoConnect).await
    }

    async fn toggle(&self, flag: SettingsFlag) -> SessionResult<bool> {
        let _guard = self.write_lock.lock().await;

        let requested = !flag.get(&self.session.settings().await);
        let acknowledged = match flag {
            SettingsFlag::KillSwitch => self.backend.toggle_kill_switch(requested).await?,
            SettingsFlag::AutoConnect => self.backend.toggle_auto_connect(requested).await?,
        };

        if acknowledged != requested {
            warn!(
                "Backend kept {} {} (requested {})",
                flag.name(),
                on_off(acknowledged),
                on_off(requested)
            );
        }

        self.session
            .update(|s| flag.set(&mut s.settings, acknowledged))
            .await;
        if flag == SettingsFlag::KillSwitch {
            self.kill_switch.set_enabled(acknowledged);
        }

        info!("{} {}", flag.name(), on_off(acknowledged));
        Ok(acknowledged)
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}
