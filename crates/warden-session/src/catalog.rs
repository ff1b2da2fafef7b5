//! Server Catalog
//!
//! Cached server list plus local favorites. Fetch failures are absorbed:
//! a stale list is better than disrupting the connection display.

use crate::backend::Backend;
use crate::model::ServerInfo;
use crate::state::Session;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Server catalog
#[derive(Clone)]
pub struct ServerCatalog {
    session: Session,
    backend: Arc<dyn Backend>,
}

impl ServerCatalog {
    pub fn new(session: Session, backend: Arc<dyn Backend>) -> Self {
        Self { session, backend }
    }

    /// Replace the cached list with the backend's
    ///
    /// Returns `false` if the fetch failed and the previous list was kept.
    pub async fn fetch_servers(&self) -> bool {
        match self.backend.get_servers().await {
            Ok(servers) => {
                let count = servers.len();
                self.session.update(|s| s.servers = servers).await;
                info!("Server catalog refreshed ({} servers)", count);
                true
            }
            Err(e) => {
                warn!("Failed to fetch servers, keeping cached list: {}", e);
                false
            }
        }
    }

    /// Add `server_id` to favorites if absent, remove it otherwise
    ///
    /// Local only. Returns whether the server is now a favorite.
    pub async fn toggle_favorite(&self, server_id: &str) -> bool {
        let now_favorite = self
            .session
            .update(|s| {
                if s.favorite_servers.remove(server_id) {
                    false
                } else {
                    s.favorite_servers.insert(server_id.to_string());
                    true
                }
            })
            .await;

        debug!("Favorite {}: {}", server_id, now_favorite);
        now_favorite
    }

    pub async fn is_favorite(&self, server_id: &str) -> bool {
        self.session
            .read(|s| s.favorite_servers.contains(server_id))
            .await
    }

    /// Cached entry for `server_id`
    pub async fn find(&self, server_id: &str) -> Option<ServerInfo> {
        self.session
            .read(|s| s.servers.iter().find(|srv| srv.id == server_id).cloned())
            .await
    }

    /// Cached favorites, in catalog order
    pub async fn favorites(&self) -> Vec<ServerInfo> {
        self.session
            .read(|s| {
                s.servers
                    .iter()
                    .filter(|srv| s.favorite_servers.contains(&srv.id))
                    .cloned()
                    .collect()
            })
            .await
    }

    /// Cached recents, most recent first. Ids missing from the cache are skipped.
    pub async fn recents(&self) -> Vec<ServerInfo> {
        self.session
            .read(|s| {
                s.recent_servers
                    .iter()
                    .filter_map(|id| s.servers.iter().find(|srv| srv.id == id).cloned())
                    .collect()
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Operation;
    use crate::error::BackendError;
    use crate::simulated::SimulatedBackend;

    #[tokio::test]
    async fn test_fetch_replaces_list() {
        let backend = Arc::new(SimulatedBackend::new());
        let session = Session::default();
        let catalog = ServerCatalog::new(session.clone(), backend);

        assert!(catalog.fetch_servers().await);
        assert_eq!(session.servers().await.len(), 7);
        assert!(catalog.find("de-fra-1").await.is_some());
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_stale_list() {
        let backend = Arc::new(SimulatedBackend::new());
        let session = Session::default();
        let catalog = ServerCatalog::new(session.clone(), backend.clone());
        catalog.fetch_servers().await;

        backend.fail_next(Operation::GetServers, BackendError::Unavailable("timeout".into()));
        assert!(!catalog.fetch_servers().await);
        assert_eq!(session.servers().await.len(), 7);
    }

    #[tokio::test]
    async fn test_toggle_favorite_twice_restores() {
        let backend = Arc::new(SimulatedBackend::new());
        let session = Session::default();
        let catalog = ServerCatalog::new(session.clone(), backend.clone());
        catalog.toggle_favorite("uk-lon-1").await;
        let before = session.favorite_servers().await;

        assert!(catalog.toggle_favorite("jp-tyo-1").await);
        assert!(!catalog.toggle_favorite("jp-tyo-1").await);

        assert_eq!(session.favorite_servers().await, before);
        // Favorites never reach the backend
        assert_eq!(backend.calls(Operation::UpdateSettings), 0);
    }

    #[tokio::test]
    async fn test_favorites_and_recents_resolve_from_cache() {
        let backend = Arc::new(SimulatedBackend::new());
        let session = Session::default();
        let catalog = ServerCatalog::new(session.clone(), backend);
        catalog.fetch_servers().await;

        catalog.toggle_favorite("nl-ams-1").await;
        catalog.toggle_favorite("gone-1").await;
        session
            .update(|s| {
                s.recent_servers.push("us-west-1");
                s.recent_servers.push("gone-2");
            })
            .await;

        let favorites: Vec<_> = catalog.favorites().await.into_iter().map(|s| s.id).collect();
        assert_eq!(favorites, vec!["nl-ams-1"]);

        let recents: Vec<_> = catalog.recents().await.into_iter().map(|s| s.id).collect();
        assert_eq!(recents, vec!["us-west-1"]);
        assert!(catalog.is_favorite("gone-1").await);
    }
}
