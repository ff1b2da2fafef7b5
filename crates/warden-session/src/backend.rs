//! Backend contract
//!
//! The tunnel itself (handshakes, encryption, routing) lives in an
//! external backend process. The session layer only talks to it through
//! this narrow asynchronous interface.

use crate::error::BackendResult;
use crate::model::{ConnectionStats, ServerInfo, VpnSettings};
use async_trait::async_trait;
use std::fmt;

/// Operations of the backend contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    Disconnect,
    QuickConnect,
    GetServers,
    UpdateSettings,
    ToggleKillSwitch,
    ToggleAutoConnect,
    GetConnectionStats,
    GetAppVersion,
}

impl Operation {
    /// Wire name of the operation
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Connect => "connect",
            Operation::Disconnect => "disconnect",
            Operation::QuickConnect => "quick_connect",
            Operation::GetServers => "get_servers",
            Operation::UpdateSettings => "update_settings",
            Operation::ToggleKillSwitch => "toggle_kill_switch",
            Operation::ToggleAutoConnect => "toggle_auto_connect",
            Operation::GetConnectionStats => "get_connection_stats",
            Operation::GetAppVersion => "get_app_version",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The external VPN backend
///
/// Calls may suspend for a long time and cannot be cancelled on the
/// backend side; dropping the future only discards the answer.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Bring the tunnel up to `server_id`, returning the resolved server
    async fn connect(&self, server_id: &str) -> BackendResult<ServerInfo>;

    /// Tear the tunnel down
    async fn disconnect(&self) -> BackendResult<()>;

    /// Bring the tunnel up to a server of the backend's choosing
    async fn quick_connect(&self) -> BackendResult<ServerInfo>;

    /// Full server catalog
    async fn get_servers(&self) -> BackendResult<Vec<ServerInfo>>;

    /// Persist a complete settings object
    async fn update_settings(&self, settings: &VpnSettings) -> BackendResult<()>;

    /// Request a kill switch value; returns the value the backend applied
    async fn toggle_kill_switch(&self, enabled: bool) -> BackendResult<bool>;

    /// Request an auto-connect value; returns the value the backend applied
    async fn toggle_auto_connect(&self, enabled: bool) -> BackendResult<bool>;

    /// Statistics of the active tunnel
    async fn get_connection_stats(&self) -> BackendResult<ConnectionStats>;

    async fn get_app_version(&self) -> BackendResult<String>;
}
