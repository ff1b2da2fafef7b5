//! Session Controller
//!
//! Owns the connection lifecycle. Every transition (connect, quick
//! connect, reconnect, disconnect) runs under one transition lock, so
//! requests from the UI and from external triggers queue up in arrival
//! order instead of interleaving.
//!
//! # Usage
//!
//! ```rust,ignore
//! let server = controller.quick_connect().await?;
//! println!("Connected to {}", server.name);
//!
//! controller.disconnect().await?;
//! ```
//!
//! # Cancellation
//!
//! A disconnect supersedes every connect issued before it. Connects still
//! waiting for the lock are dropped, and a connect already waiting on the
//! backend has its answer discarded. Either way the connect caller gets
//! [`SessionError::Cancelled`] and the disconnect runs next.

use crate::backend::Backend;
use crate::error::{BackendError, SessionError, SessionResult};
use crate::kill_switch::KillSwitch;
use crate::model::{ConnectionState, ServerInfo};
use crate::state::Session;
use crate::telemetry::TelemetryPoller;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How a connect picks its server
#[derive(Debug, Clone)]
enum Target {
    /// A server chosen by the caller
    Server(String),
    /// Backend-selected server
    Quick,
    /// The last known server
    Reconnect,
}

/// Session controller
#[derive(Clone)]
pub struct SessionController {
    session: Session,
    backend: Arc<dyn Backend>,
    telemetry: TelemetryPoller,
    kill_switch: KillSwitch,
    telemetry_interval: Duration,
    /// Held for the whole of a lifecycle transition
    transition: Arc<tokio::sync::Mutex<()>>,
    /// Cancelled by the next disconnect; connects capture it when issued
    connect_epoch: Arc<Mutex<CancellationToken>>,
}

impl SessionController {
    pub fn new(
        session: Session,
        backend: Arc<dyn Backend>,
        telemetry: TelemetryPoller,
        kill_switch: KillSwitch,
        telemetry_interval: Duration,
    ) -> Self {
        Self {
            session,
            backend,
            telemetry,
            kill_switch,
            telemetry_interval,
            transition: Arc::new(tokio::sync::Mutex::new(())),
            connect_epoch: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn state(&self) -> ConnectionState {
        self.session.connection_state().await
    }

    /// Check if a lifecycle transition currently holds the lock
    pub fn is_busy(&self) -> bool {
        self.transition.try_lock().is_err()
    }

    /// Connect to `server_id`
    ///
    /// On failure the state becomes `error`, the current server is left
    /// as it was, and the error is returned.
    pub async fn connect(&self, server_id: &str) -> SessionResult<ServerInfo> {
        self.connect_with(server_id, self.connect_ticket()).await
    }

    /// Connect to a server chosen by the backend
    pub async fn quick_connect(&self) -> SessionResult<ServerInfo> {
        self.quick_connect_with(self.connect_ticket()).await
    }

    /// Connect under a ticket taken earlier with [`Self::connect_ticket`]
    pub(crate) async fn connect_with(
        &self,
        server_id: &str,
        ticket: CancellationToken,
    ) -> SessionResult<ServerInfo> {
        self.establish(Target::Server(server_id.to_string()), ticket).await
    }

    pub(crate) async fn quick_connect_with(
        &self,
        ticket: CancellationToken,
    ) -> SessionResult<ServerInfo> {
        self.establish(Target::Quick, ticket).await
    }

    /// Token cancelled by the next disconnect
    ///
    /// A connect holding it counts as issued before that disconnect, even
    /// if it has not started yet.
    pub(crate) fn connect_ticket(&self) -> CancellationToken {
        self.epoch().clone()
    }

    /// Connect again to the last known server
    ///
    /// Fails without touching the state if no server is known.
    pub async fn reconnect(&self) -> SessionResult<ServerInfo> {
        self.establish(Target::Reconnect, self.connect_ticket()).await
    }

    /// Tear the tunnel down, cancelling any connect issued before
    ///
    /// Stats are cleared on entering `disconnecting`, so after a failed
    /// disconnect the state is `error` with the current server kept and
    /// no stats.
    pub async fn disconnect(&self) -> SessionResult<()> {
        self.cancel_pending_connects();
        self.disconnect_queued().await
    }

    /// Cancel every connect issued so far
    ///
    /// Connects issued afterwards are not affected.
    pub(crate) fn cancel_pending_connects(&self) {
        let previous = std::mem::replace(&mut *self.epoch(), CancellationToken::new());
        previous.cancel();
    }

    /// Disconnect without cancelling anything first
    pub(crate) async fn disconnect_queued(&self) -> SessionResult<()> {
        let _transition = self.transition.lock().await;

        info!("Disconnecting VPN");
        self.session
            .update(|s| {
                s.connection_state = ConnectionState::Disconnecting;
                s.connection_stats = None;
            })
            .await;
        self.telemetry.stop();
        self.kill_switch.on_tunnel_down();

        match self.backend.disconnect().await {
            Ok(()) => {
                self.session
                    .update(|s| {
                        s.connection_state = ConnectionState::Disconnected;
                        s.current_server = None;
                        s.connection_stats = None;
                    })
                    .await;
                info!("VPN disconnected");
                Ok(())
            }
            Err(e) => {
                error!("VPN disconnect failed: {}", e);
                self.session
                    .update(|s| s.connection_state = ConnectionState::Error)
                    .await;
                Err(e.into())
            }
        }
    }

    async fn establish(&self, target: Target, cancel: CancellationToken) -> SessionResult<ServerInfo> {
        let _transition = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Queued connect cancelled");
                return Err(SessionError::Cancelled);
            }
            guard = self.transition.lock() => guard,
        };

        let (server_id, transitional) = match &target {
            Target::Server(id) => (Some(id.clone()), ConnectionState::Connecting),
            Target::Quick => (None, ConnectionState::Connecting),
            Target::Reconnect => match self.session.current_server().await {
                Some(server) => (Some(server.id), ConnectionState::Reconnecting),
                None => {
                    warn!("Reconnect requested with no known server");
                    return Err(BackendError::Validation("no server to reconnect to".into()).into());
                }
            },
        };

        match &server_id {
            Some(id) => info!("Connecting to VPN ({})", id),
            None => info!("Quick connecting to VPN"),
        }
        self.session
            .update(|s| {
                s.connection_state = transitional;
                s.connection_stats = None;
            })
            .await;
        self.telemetry.stop();
        self.kill_switch.on_tunnel_down();

        let call = async {
            match &server_id {
                Some(id) => self.backend.connect(id).await,
                None => self.backend.quick_connect().await,
            }
        };
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Pending connect cancelled by disconnect");
                return Err(SessionError::Cancelled);
            }
            result = call => result,
        };

        match result {
            Ok(server) => {
                self.session
                    .update(|s| {
                        s.connection_state = ConnectionState::Connected;
                        s.recent_servers.push(&server.id);
                        s.current_server = Some(server.clone());
                    })
                    .await;
                self.kill_switch.on_tunnel_up();
                info!("VPN connected to {} ({})", server.name, server.location());

                // A disconnect cancels the first fetch instead of queueing behind it
                let fetched = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => false,
                    _ = self.telemetry.fetch_stats() => true,
                };
                if fetched {
                    self.telemetry.start(self.telemetry_interval);
                }
                Ok(server)
            }
            Err(e) => {
                error!("VPN connection failed: {}", e);
                self.session
                    .update(|s| s.connection_state = ConnectionState::Error)
                    .await;
                Err(e.into())
            }
        }
    }

    fn epoch(&self) -> MutexGuard<'_, CancellationToken> {
        self.connect_epoch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
