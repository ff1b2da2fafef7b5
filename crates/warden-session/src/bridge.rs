//! External Trigger Bridge
//!
//! Turns events coming from outside the client (a tray icon, a second
//! process, a deep link) into session controller calls.
//!
//! # Architecture
//!
//! ```text
//!  trigger source ──▶ mpsc ──▶ receive loop ──┬──▶ navigation channel (UI)
//!                                             │
//!                                             └──▶ dispatch worker ──▶ SessionController
//! ```
//!
//! One receive loop handles all four events, so activating and
//! deactivating the bridge subscribes and unsubscribes all of them at
//! once. Controller calls run on a separate worker in arrival order.
//! Connect requests take their cancellation ticket on arrival, so a
//! disconnect request cancels every connect received before it, including
//! ones still waiting in the worker queue.

use crate::controller::SessionController;
use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Event from an external trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    /// Show a UI route; not handled by the controller
    Navigate(String),
    QuickConnect,
    Disconnect,
    /// Connect to a specific server id
    Connect(String),
}

impl TriggerEvent {
    /// Parse a trigger string
    ///
    /// Format: `name[:arg]`, e.g. `connect-request:de-fra-1` or
    /// `navigate:/settings`. Returns `None` for anything else.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let (name, arg) = match input.split_once(':') {
            Some((name, arg)) => (name, Some(arg.trim())),
            None => (input, None),
        };

        match (name, arg) {
            ("navigate", Some(path)) if !path.is_empty() => Some(Self::Navigate(path.to_string())),
            ("quick-connect-request", None) => Some(Self::QuickConnect),
            ("disconnect-request", None) => Some(Self::Disconnect),
            ("connect-request", Some(id)) if !id.is_empty() => Some(Self::Connect(id.to_string())),
            _ => None,
        }
    }

    /// Event channel name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Navigate(_) => "navigate",
            Self::QuickConnect => "quick-connect-request",
            Self::Disconnect => "disconnect-request",
            Self::Connect(_) => "connect-request",
        }
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Navigate(path) => write!(f, "{}:{}", self.name(), path),
            Self::Connect(id) => write!(f, "{}:{}", self.name(), id),
            _ => f.write_str(self.name()),
        }
    }
}

/// Create the channel trigger sources publish into
pub fn trigger_channel(capacity: usize) -> (mpsc::Sender<TriggerEvent>, mpsc::Receiver<TriggerEvent>) {
    mpsc::channel(capacity.max(1))
}

/// Controller-bound work queued for the dispatch worker
enum Dispatch {
    /// Carries the connect ticket taken on arrival
    QuickConnect(CancellationToken),
    /// Pending connects were already cancelled by the receive loop
    Disconnect,
    Connect(String, CancellationToken),
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuickConnect(_) => f.write_str("quick connect"),
            Self::Disconnect => f.write_str("disconnect"),
            Self::Connect(id, _) => write!(f, "connect to {}", id),
        }
    }
}

/// External trigger bridge
pub struct TriggerBridge;

impl TriggerBridge {
    /// Subscribe to all trigger events
    ///
    /// Navigation paths are forwarded to `navigation`; everything else
    /// goes to `controller`. Controller failures are logged and dropped,
    /// the session state already reflects them.
    pub fn activate(
        controller: SessionController,
        events: mpsc::Receiver<TriggerEvent>,
        navigation: mpsc::UnboundedSender<String>,
    ) -> BridgeHandle {
        let cancel = CancellationToken::new();
        let (work_tx, work_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_worker(controller.clone(), work_rx));
        let task = tokio::spawn(run_receiver(
            controller,
            events,
            navigation,
            work_tx,
            cancel.clone(),
        ));

        info!("Trigger bridge activated");
        BridgeHandle { cancel, task: Some(task) }
    }
}

/// Handle to an active bridge
///
/// Dropping the handle deactivates the bridge without waiting.
pub struct BridgeHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl BridgeHandle {
    /// Check if the bridge is still receiving events
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Unsubscribe from all trigger events and wait for the loop to exit
    ///
    /// Controller calls already dispatched still run to completion.
    pub async fn deactivate(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!("Trigger receive loop panicked: {}", e);
                }
            }
        }
        info!("Trigger bridge deactivated");
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_receiver(
    controller: SessionController,
    mut events: mpsc::Receiver<TriggerEvent>,
    navigation: mpsc::UnboundedSender<String>,
    work: mpsc::UnboundedSender<Dispatch>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => {
                    debug!("Trigger channel closed");
                    break;
                }
            },
        };

        debug!("Trigger event: {}", event);
        let dispatch = match event {
            TriggerEvent::Navigate(path) => {
                if navigation.send(path).is_err() {
                    debug!("Navigation receiver gone, dropping request");
                }
                continue;
            }
            TriggerEvent::QuickConnect => Dispatch::QuickConnect(controller.connect_ticket()),
            TriggerEvent::Connect(id) => Dispatch::Connect(id, controller.connect_ticket()),
            TriggerEvent::Disconnect => {
                controller.cancel_pending_connects();
                Dispatch::Disconnect
            }
        };

        if work.send(dispatch).is_err() {
            warn!("Trigger dispatch worker gone");
            break;
        }
    }
}

async fn run_worker(controller: SessionController, mut work: mpsc::UnboundedReceiver<Dispatch>) {
    while let Some(dispatch) = work.recv().await {
        let result = match &dispatch {
            Dispatch::QuickConnect(ticket) => {
                controller.quick_connect_with(ticket.clone()).await.map(|_| ())
            }
            Dispatch::Connect(id, ticket) => {
                controller.connect_with(id, ticket.clone()).await.map(|_| ())
            }
            Dispatch::Disconnect => controller.disconnect_queued().await,
        };

        match result {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => debug!("Triggered {} cancelled", dispatch),
            Err(e) => warn!("Triggered {} failed: {}", dispatch, e),
        }
    }
}
