//! Simulated backend
//!
//! In-process stand-in for the VPN backend. Used by the daemon when no
//! real backend is attached, and by the tests to script failures.
//!
//! # Usage
//!
//! ```rust,ignore
//! let backend = SimulatedBackend::new();
//! backend.fail_next(Operation::Connect, BackendError::Unavailable("ipc down".into()));
//!
//! // Next connect fails, the one after succeeds
//! assert!(backend.connect("us-east-1").await.is_err());
//! assert!(backend.connect("us-east-1").await.is_ok());
//! ```

use crate::backend::{Backend, Operation};
use crate::error::{BackendError, BackendResult};
use crate::model::{ConnectionStats, Protocol, ServerInfo, VpnSettings};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Bytes the simulated tunnel receives between two stats calls
const RX_PER_POLL: u64 = 256 * 1024;

/// Bytes the simulated tunnel sends between two stats calls
const TX_PER_POLL: u64 = 32 * 1024;

#[derive(Default)]
struct SimState {
    /// Server the tunnel is up to
    connected: Option<(String, Instant)>,
    bytes_in: u64,
    bytes_out: u64,
    last_poll: Option<Instant>,
    settings: Option<VpnSettings>,
    kill_switch: bool,
    auto_connect: bool,
    /// Flags the backend refuses to change (managed policy)
    pinned: HashMap<Operation, bool>,
    /// Queued failures per operation
    failures: HashMap<Operation, VecDeque<BackendError>>,
    calls: HashMap<Operation, usize>,
}

/// Simulated VPN backend
pub struct SimulatedBackend {
    servers: Vec<ServerInfo>,
    latency: Duration,
    version: String,
    state: Mutex<SimState>,
}

impl SimulatedBackend {
    /// Backend with the built-in server list and no latency
    pub fn new() -> Self {
        Self::with_servers(Self::default_servers())
    }

    pub fn with_servers(servers: Vec<ServerInfo>) -> Self {
        Self {
            servers,
            latency: Duration::ZERO,
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: Mutex::new(SimState::default()),
        }
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Built-in server list
    pub fn default_servers() -> Vec<ServerInfo> {
        vec![
            ServerInfo::new("us-east-1", "New York #1", "US", "New York", "192.169.69.1:51820")
                .with_load(12)
                .with_latency(38)
                .with_feature("streaming"),
            ServerInfo::new("us-west-1", "Los Angeles #1", "US", "Los Angeles", "192.169.70.1:51820")
                .with_load(41)
                .with_latency(72),
            ServerInfo::new("de-fra-1", "Frankfurt #1", "DE", "Frankfurt", "185.186.78.1:51820")
                .with_load(27)
                .with_latency(21)
                .with_feature("p2p"),
            ServerInfo::new("uk-lon-1", "London #1", "UK", "London", "178.62.1.1:51820")
                .with_load(55)
                .with_latency(24),
            ServerInfo::new("nl-ams-1", "Amsterdam #1", "NL", "Amsterdam", "185.107.56.1:51820")
                .with_load(33)
                .with_latency(19)
                .with_feature("p2p"),
            ServerInfo::new("jp-tyo-1", "Tokyo #1", "JP", "Tokyo", "103.231.88.1:1194")
                .with_load(64)
                .with_latency(182)
                .with_protocol(Protocol::OpenVpn),
            ServerInfo::new("sg-sin-1", "Singapore #1", "SG", "Singapore", "139.180.1.1:443")
                .with_load(48)
                .with_latency(160)
                .with_protocol(Protocol::Stealth),
        ]
    }

    /// Make the next call of `op` fail with `error`
    ///
    /// Failures queue up: calling this twice fails the next two calls.
    pub fn fail_next(&self, op: Operation, error: BackendError) {
        self.lock().failures.entry(op).or_default().push_back(error);
    }

    /// Make a toggle operation always acknowledge `value`
    pub fn pin_flag(&self, op: Operation, value: bool) {
        self.lock().pinned.insert(op, value);
    }

    /// Number of calls received for `op`
    pub fn calls(&self, op: Operation) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Settings last persisted through `update_settings`
    pub fn persisted_settings(&self) -> Option<VpnSettings> {
        self.lock().settings.clone()
    }

    /// Server the simulated tunnel is currently up to
    pub fn connected_server(&self) -> Option<String> {
        self.lock().connected.as_ref().map(|(id, _)| id.clone())
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count the call, wait out the latency, then pop a scripted failure
    async fn begin(&self, op: Operation) -> BackendResult<()> {
        *self.lock().calls.entry(op).or_default() += 1;
        debug!("Simulated backend: {}", op);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match self.lock().failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn bring_up(&self, server: &ServerInfo) {
        let mut state = self.lock();
        let now = Instant::now();
        state.connected = Some((server.id.clone(), now));
        state.bytes_in = 0;
        state.bytes_out = 0;
        state.last_poll = Some(now);
    }

    fn toggle(&self, op: Operation, requested: bool) -> bool {
        let mut state = self.lock();
        let applied = state.pinned.get(&op).copied().unwrap_or(requested);
        match op {
            Operation::ToggleKillSwitch => state.kill_switch = applied,
            Operation::ToggleAutoConnect => state.auto_connect = applied,
            _ => {}
        }
        applied
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for SimulatedBackend {
    async fn connect(&self, server_id: &str) -> BackendResult<ServerInfo> {
        self.begin(Operation::Connect).await?;

        let server = self
            .servers
            .iter()
            .find(|s| s.id == server_id)
            .cloned()
            .ok_or_else(|| BackendError::Validation(format!("unknown server: {server_id}")))?;

        self.bring_up(&server);
        Ok(server)
    }

    async fn disconnect(&self) -> BackendResult<()> {
        self.begin(Operation::Disconnect).await?;
        let mut state = self.lock();
        state.connected = None;
        state.last_poll = None;
        Ok(())
    }

    async fn quick_connect(&self) -> BackendResult<ServerInfo> {
        self.begin(Operation::QuickConnect).await?;

        let server = self
            .servers
            .iter()
            .min_by_key(|s| (s.load, s.latency_ms.unwrap_or(u32::MAX)))
            .cloned()
            .ok_or_else(|| BackendError::Rejected("no servers available".into()))?;

        self.bring_up(&server);
        Ok(server)
    }

    async fn get_servers(&self) -> BackendResult<Vec<ServerInfo>> {
        self.begin(Operation::GetServers).await?;
        Ok(self.servers.clone())
    }

    async fn update_settings(&self, settings: &VpnSettings) -> BackendResult<()> {
        self.begin(Operation::UpdateSettings).await?;
        self.lock().settings = Some(settings.clone());
        Ok(())
    }

    async fn toggle_kill_switch(&self, enabled: bool) -> BackendResult<bool> {
        self.begin(Operation::ToggleKillSwitch).await?;
        Ok(self.toggle(Operation::ToggleKillSwitch, enabled))
    }

    async fn toggle_auto_connect(&self, enabled: bool) -> BackendResult<bool> {
        self.begin(Operation::ToggleAutoConnect).await?;
        Ok(self.toggle(Operation::ToggleAutoConnect, enabled))
    }

    async fn get_connection_stats(&self) -> BackendResult<ConnectionStats> {
        self.begin(Operation::GetConnectionStats).await?;

        let mut state = self.lock();
        let since = match state.connected {
            Some((_, since)) => since,
            None => return Err(BackendError::Rejected("tunnel is down".into())),
        };

        let now = Instant::now();
        let elapsed = state
            .last_poll
            .map(|last| now.duration_since(last).as_secs_f64())
            .unwrap_or_default();
        state.bytes_in += RX_PER_POLL;
        state.bytes_out += TX_PER_POLL;
        state.last_poll = Some(now);

        let rate = |bytes: u64| if elapsed > 0.0 { bytes as f64 / elapsed } else { 0.0 };

        Ok(ConnectionStats {
            bytes_in: state.bytes_in,
            bytes_out: state.bytes_out,
            duration_secs: now.duration_since(since).as_secs(),
            download_rate: rate(RX_PER_POLL),
            upload_rate: rate(TX_PER_POLL),
        })
    }

    async fn get_app_version(&self) -> BackendResult<String> {
        self.begin(Operation::GetAppVersion).await?;
        Ok(self.version.clone())
    }
}
