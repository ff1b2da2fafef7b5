//! Session state
//!
//! The single aggregate describing "am I connected, to whom, under what
//! settings". One [`Session`] owns it for the life of the process; every
//! write goes through [`Session::update`], which also publishes the
//! connection state to watchers.

use crate::model::{ConnectionState, ConnectionStats, ServerInfo, VpnSettings};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

/// Maximum number of recently used servers kept
pub const MAX_RECENT_SERVERS: usize = 5;

/// Most-recent-first, deduplicated list of server ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentServers {
    ids: Vec<String>,
}

impl RecentServers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `id` to the front, dropping the oldest entry past the cap
    pub fn push(&mut self, id: &str) {
        self.ids.retain(|existing| existing != id);
        self.ids.insert(0, id.to_string());
        self.ids.truncate(MAX_RECENT_SERVERS);
    }

    pub fn as_slice(&self) -> &[String] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|existing| existing == id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Aggregate client view of the VPN session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub connection_state: ConnectionState,
    /// Server of the last successful connect. Kept on error for diagnostics.
    pub current_server: Option<ServerInfo>,
    /// Only present while connected
    pub connection_stats: Option<ConnectionStats>,
    /// Last catalog fetched from the backend
    pub servers: Vec<ServerInfo>,
    /// Locally toggled favorites, not persisted
    pub favorite_servers: BTreeSet<String>,
    pub recent_servers: RecentServers,
    pub settings: VpnSettings,
}

impl SessionState {
    /// Initial state: disconnected with the given settings
    pub fn new(settings: VpnSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }
}

struct SessionInner {
    state: RwLock<SessionState>,
    state_tx: watch::Sender<ConnectionState>,
}

/// Shared handle to the session state
///
/// Cloning is cheap; all clones see the same state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Create a session in the disconnected state
    pub fn new(settings: VpnSettings) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(SessionInner {
                state: RwLock::new(SessionState::new(settings)),
                state_tx,
            }),
        }
    }

    /// Apply a mutation and publish the resulting connection state
    ///
    /// The lock is released before returning, never hold it across a
    /// backend call.
    pub(crate) async fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.inner.state.write().await;
        let result = f(&mut state);
        let current = state.connection_state;
        self.inner.state_tx.send_if_modified(|published| {
            if *published != current {
                *published = current;
                true
            } else {
                false
            }
        });
        result
    }

    /// Read a value out of the state without cloning all of it
    pub async fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        let state = self.inner.state.read().await;
        f(&state)
    }

    /// Clone of the whole state
    pub async fn snapshot(&self) -> SessionState {
        self.inner.state.read().await.clone()
    }

    /// Follow connection state transitions
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.read(|s| s.connection_state).await
    }

    pub async fn is_connected(&self) -> bool {
        self.connection_state().await.is_connected()
    }

    pub async fn current_server(&self) -> Option<ServerInfo> {
        self.read(|s| s.current_server.clone()).await
    }

    pub async fn connection_stats(&self) -> Option<ConnectionStats> {
        self.read(|s| s.connection_stats.clone()).await
    }

    pub async fn settings(&self) -> VpnSettings {
        self.read(|s| s.settings.clone()).await
    }

    pub async fn servers(&self) -> Vec<ServerInfo> {
        self.read(|s| s.servers.clone()).await
    }

    pub async fn favorite_servers(&self) -> BTreeSet<String> {
        self.read(|s| s.favorite_servers.clone()).await
    }

    pub async fn recent_servers(&self) -> Vec<String> {
        self.read(|s| s.recent_servers.as_slice().to_vec()).await
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(VpnSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_servers_cap() {
        let mut recent = RecentServers::new();
        for id in ["s1", "s2", "s3", "s4", "s5", "s6"] {
            recent.push(id);
        }

        assert_eq!(recent.as_slice(), ["s6", "s5", "s4", "s3", "s2"]);
        assert!(!recent.contains("s1"));
    }

    #[test]
    fn test_recent_servers_dedup() {
        let mut recent = RecentServers::new();
        recent.push("a");
        recent.push("b");
        recent.push("a");

        assert_eq!(recent.len(), 2);
        assert_eq!(recent.iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_session_initial_state() {
        let session = Session::default();
        let state = session.snapshot().await;

        assert_eq!(state.connection_state, ConnectionState::Disconnected);
        assert!(state.current_server.is_none());
        assert!(state.connection_stats.is_none());
        assert!(state.recent_servers.is_empty());
        assert_eq!(state.settings, VpnSettings::default());
    }

    #[tokio::test]
    async fn test_update_publishes_state() {
        let session = Session::default();
        let mut rx = session.subscribe();

        session
            .update(|s| s.connection_state = ConnectionState::Connecting)
            .await;

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ConnectionState::Connecting);

        // Writes that leave the state alone don't wake watchers
        session.update(|s| s.favorite_servers.insert("x".into())).await;
        assert!(!rx.has_changed().unwrap());
    }
}
