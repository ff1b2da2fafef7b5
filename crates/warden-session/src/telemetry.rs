//! Telemetry Poller
//!
//! Fetches connection statistics while the tunnel is up. A single fetch
//! is a no-op unless connected; the periodic driver ticks on an interval
//! and stops by itself as soon as the session leaves `connected`.

use crate::backend::Backend;
use crate::model::ConnectionState;
use crate::state::Session;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct Driver {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Telemetry poller
#[derive(Clone)]
pub struct TelemetryPoller {
    session: Session,
    backend: Arc<dyn Backend>,
    driver: Arc<Mutex<Option<Driver>>>,
}

impl TelemetryPoller {
    pub fn new(session: Session, backend: Arc<dyn Backend>) -> Self {
        Self {
            session,
            backend,
            driver: Arc::new(Mutex::new(None)),
        }
    }

    /// Fetch statistics once
    ///
    /// Returns `true` if the stats were replaced.
    pub async fn fetch_stats(&self) -> bool {
        fetch_into(&self.session, self.backend.as_ref(), None).await
    }

    /// Start the periodic driver, replacing a running one
    pub fn start(&self, period: Duration) {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_driver(
            self.session.clone(),
            self.session.subscribe(),
            self.backend.clone(),
            period,
            cancel.clone(),
        ));

        if let Some(old) = self.lock().replace(Driver { cancel, handle }) {
            old.cancel.cancel();
        }
        debug!("Telemetry driver started ({:?})", period);
    }

    /// Stop the periodic driver
    ///
    /// A fetch the driver already has in flight is discarded.
    pub fn stop(&self) {
        if let Some(driver) = self.lock().take() {
            driver.cancel.cancel();
            debug!("Telemetry driver stopped");
        }
    }

    /// Check if a driver is running
    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|d| !d.handle.is_finished())
    }

    fn lock(&self) -> MutexGuard<'_, Option<Driver>> {
        self.driver.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Fetch stats and commit them if still connected
///
/// A driver passes its own token: once it is cancelled the result belongs
/// to a connection that has ended, even if the session is connected again.
async fn fetch_into(
    session: &Session,
    backend: &dyn Backend,
    driver: Option<&CancellationToken>,
) -> bool {
    if !session.is_connected().await {
        return false;
    }

    match backend.get_connection_stats().await {
        Ok(stats) => {
            // The tunnel may have gone down while the call was in flight
            session
                .update(|s| {
                    let stale = driver.is_some_and(CancellationToken::is_cancelled);
                    if s.connection_state.is_connected() && !stale {
                        s.connection_stats = Some(stats);
                        true
                    } else {
                        false
                    }
                })
                .await
        }
        Err(e) => {
            warn!("Failed to fetch connection stats: {}", e);
            false
        }
    }
}

async fn run_driver(
    session: Session,
    mut state_rx: watch::Receiver<ConnectionState>,
    backend: Arc<dyn Backend>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            changed = state_rx.changed() => {
                if changed.is_err() || !state_rx.borrow_and_update().is_connected() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let fetched = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    fetched = fetch_into(&session, backend.as_ref(), Some(&cancel)) => fetched,
                };
                if fetched {
                    debug!("Telemetry tick");
                }
            }
        }
    }

    debug!("Telemetry driver exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Operation;
    use crate::error::BackendError;
    use crate::simulated::SimulatedBackend;

    async fn connected_session(backend: &SimulatedBackend) -> Session {
        let session = Session::default();
        let server = backend.connect("de-fra-1").await.unwrap();
        session
            .update(|s| {
                s.connection_state = ConnectionState::Connected;
                s.current_server = Some(server);
            })
            .await;
        session
    }

    #[tokio::test]
    async fn test_fetch_when_disconnected_is_noop() {
        let backend = Arc::new(SimulatedBackend::new());
        let session = Session::default();
        let poller = TelemetryPoller::new(session.clone(), backend.clone());

        assert!(!poller.fetch_stats().await);
        assert!(session.connection_stats().await.is_none());
        assert_eq!(backend.calls(Operation::GetConnectionStats), 0);
    }

    #[tokio::test]
    async fn test_fetch_when_connected() {
        let backend = Arc::new(SimulatedBackend::new());
        let session = connected_session(&backend).await;
        let poller = TelemetryPoller::new(session.clone(), backend);

        assert!(poller.fetch_stats().await);
        assert!(session.connection_stats().await.is_some());
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_stale_stats() {
        let backend = Arc::new(SimulatedBackend::new());
        let session = connected_session(&backend).await;
        let poller = TelemetryPoller::new(session.clone(), backend.clone());
        poller.fetch_stats().await;
        let before = session.connection_stats().await;

        backend.fail_next(
            Operation::GetConnectionStats,
            BackendError::Unavailable("ipc closed".into()),
        );
        assert!(!poller.fetch_stats().await);
        assert_eq!(session.connection_stats().await, before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_polls_while_connected() {
        let backend = Arc::new(SimulatedBackend::new());
        let session = connected_session(&backend).await;
        let poller = TelemetryPoller::new(session.clone(), backend.clone());

        poller.start(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert_eq!(backend.calls(Operation::GetConnectionStats), 3);
        assert!(poller.is_running());

        poller.stop();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(backend.calls(Operation::GetConnectionStats), 3);
        assert!(!poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_exits_when_state_leaves_connected() {
        let backend = Arc::new(SimulatedBackend::new());
        let session = connected_session(&backend).await;
        let poller = TelemetryPoller::new(session.clone(), backend.clone());

        poller.start(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1500)).await;

        session
            .update(|s| s.connection_state = ConnectionState::Disconnecting)
            .await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(backend.calls(Operation::GetConnectionStats), 1);
        assert!(!poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_driver_does_not_commit_old_stats() {
        let backend = Arc::new(SimulatedBackend::new().with_latency(Duration::from_secs(2)));
        let session = connected_session(&backend).await;
        let poller = TelemetryPoller::new(session.clone(), backend.clone());

        // First tick at 1s, its fetch returns at 3s
        poller.start(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(backend.calls(Operation::GetConnectionStats), 1);

        // Quick disconnect and reconnect while that fetch is in flight
        session
            .update(|s| s.connection_state = ConnectionState::Disconnecting)
            .await;
        poller.stop();
        session
            .update(|s| s.connection_state = ConnectionState::Connected)
            .await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(session.connection_stats().await.is_none());
        assert!(!poller.is_running());
    }
}
