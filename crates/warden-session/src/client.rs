//! VPN Client
//!
//! Wires the session components around one [`Session`] and one backend.

use crate::backend::Backend;
use crate::bridge::{BridgeHandle, TriggerBridge, TriggerEvent};
use crate::catalog::ServerCatalog;
use crate::config::ClientConfig;
use crate::controller::SessionController;
use crate::error::SessionResult;
use crate::kill_switch::{KillSwitch, KillSwitchState};
use crate::model::ServerInfo;
use crate::settings::SettingsStore;
use crate::state::{Session, SessionState};
use crate::telemetry::TelemetryPoller;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// VPN client
///
/// Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct VpnClient {
    config: ClientConfig,
    backend: Arc<dyn Backend>,
    session: Session,
    controller: SessionController,
    settings: SettingsStore,
    catalog: ServerCatalog,
    telemetry: TelemetryPoller,
    kill_switch: KillSwitch,
}

impl VpnClient {
    /// Create a client in the disconnected state
    pub fn new(backend: Arc<dyn Backend>, config: ClientConfig) -> SessionResult<Self> {
        config.validate()?;

        let session = Session::new(config.settings.clone());
        let kill_switch = KillSwitch::new(config.settings.kill_switch);
        let telemetry = TelemetryPoller::new(session.clone(), backend.clone());
        let controller = SessionController::new(
            session.clone(),
            backend.clone(),
            telemetry.clone(),
            kill_switch.clone(),
            config.telemetry_interval(),
        );
        let settings = SettingsStore::new(session.clone(), backend.clone(), kill_switch.clone());
        let catalog = ServerCatalog::new(session.clone(), backend.clone());

        Ok(Self {
            config,
            backend,
            session,
            controller,
            settings,
            catalog,
            telemetry,
            kill_switch,
        })
    }

    /// Load the catalog and connect if auto-connect is on
    ///
    /// Returns the server connected to, if any.
    pub async fn start(&self) -> SessionResult<Option<ServerInfo>> {
        self.catalog.fetch_servers().await;

        if !self.session.settings().await.auto_connect {
            return Ok(None);
        }

        info!("Auto-connect enabled, quick connecting");
        self.controller.quick_connect().await.map(Some)
    }

    /// Subscribe the controller to external triggers
    pub fn activate_bridge(
        &self,
        events: mpsc::Receiver<TriggerEvent>,
        navigation: mpsc::UnboundedSender<String>,
    ) -> BridgeHandle {
        TriggerBridge::activate(self.controller.clone(), events, navigation)
    }

    /// Backend version, or the configured fallback
    pub async fn app_version(&self) -> String {
        match self.backend.get_app_version().await {
            Ok(version) => version,
            Err(e) => {
                warn!("Failed to get app version: {}", e);
                self.config.app_version_fallback.clone()
            }
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn catalog(&self) -> &ServerCatalog {
        &self.catalog
    }

    pub fn telemetry(&self) -> &TelemetryPoller {
        &self.telemetry
    }

    pub fn kill_switch_state(&self) -> KillSwitchState {
        self.kill_switch.state()
    }

    pub async fn snapshot(&self) -> SessionState {
        self.session.snapshot().await
    }

    /// Format status for display
    pub async fn status(&self) -> String {
        let state = self.snapshot().await;
        let server = state
            .current_server
            .as_ref()
            .map(|s| s.name.as_str())
            .unwrap_or("-");
        let stats = state
            .connection_stats
            .as_ref()
            .map(|s| s.format())
            .unwrap_or_else(|| "no stats".to_string());

        format!(
            "VPN: {} | Server: {} | {} | Kill switch: {:?}",
            state.connection_state,
            server,
            stats,
            self.kill_switch_state()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Operation;
    use crate::error::BackendError;
    use crate::model::{ConnectionState, SettingsPatch, VpnSettings};
    use crate::simulated::SimulatedBackend;

    #[tokio::test]
    async fn test_client_creation() {
        let client = VpnClient::new(Arc::new(SimulatedBackend::new()), ClientConfig::default()).unwrap();

        let state = client.snapshot().await;
        assert_eq!(state.connection_state, ConnectionState::Disconnected);
        assert_eq!(state.settings, VpnSettings::default());
        assert_eq!(client.kill_switch_state(), KillSwitchState::Blocking);
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let config = ClientConfig {
            trigger_queue_capacity: 0,
            ..Default::default()
        };
        assert!(VpnClient::new(Arc::new(SimulatedBackend::new()), config).is_err());
    }

    #[tokio::test]
    async fn test_start_without_auto_connect() {
        let backend = Arc::new(SimulatedBackend::new());
        let client = VpnClient::new(backend.clone(), ClientConfig::default()).unwrap();

        assert!(client.start().await.unwrap().is_none());
        assert_eq!(client.session().servers().await.len(), 7);
        assert_eq!(backend.calls(Operation::QuickConnect), 0);
    }

    #[tokio::test]
    async fn test_start_with_auto_connect() {
        let mut config = ClientConfig::default();
        config.settings.auto_connect = true;
        let client = VpnClient::new(Arc::new(SimulatedBackend::new()), config).unwrap();

        let server = client.start().await.unwrap().unwrap();
        assert_eq!(server.id, "us-east-1");
        assert_eq!(client.kill_switch_state(), KillSwitchState::Armed);
        assert!(client.status().await.starts_with("VPN: connected | Server: New York #1"));
    }

    #[tokio::test]
    async fn test_app_version_fallback() {
        let backend = Arc::new(SimulatedBackend::new().with_version("2.4.1"));
        let config = ClientConfig {
            app_version_fallback: "0.0.0-offline".into(),
            ..Default::default()
        };
        let client = VpnClient::new(backend.clone(), config).unwrap();

        assert_eq!(client.app_version().await, "2.4.1");
        backend.fail_next(Operation::GetAppVersion, BackendError::Unavailable("down".into()));
        assert_eq!(client.app_version().await, "0.0.0-offline");
    }

    #[tokio::test]
    async fn test_settings_change_reaches_kill_switch() {
        let client = VpnClient::new(Arc::new(SimulatedBackend::new()), ClientConfig::default()).unwrap();

        let patch = SettingsPatch {
            kill_switch: Some(false),
            ..Default::default()
        };
        client.settings().update_settings(patch).await.unwrap();
        assert_eq!(client.kill_switch_state(), KillSwitchState::Disabled);

        client.settings().toggle_kill_switch().await.unwrap();
        assert_eq!(client.kill_switch_state(), KillSwitchState::Blocking);
    }
}
