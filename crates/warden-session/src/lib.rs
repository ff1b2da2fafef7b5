//! Warden Session - VPN client session controller
//!
//! Keeps the client's view of "am I connected, to whom, under what
//! settings" consistent while user actions, external triggers and slow
//! backend calls race each other. The tunnel itself is owned by an
//! external backend reached through the [`Backend`] trait.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        VpnClient                            │
//! │                                                             │
//! │  ┌──────────────┐   ┌───────────────────┐   ┌────────────┐  │
//! │  │ TriggerBridge│──▶│ SessionController │──▶│ Telemetry  │  │
//! │  │ (tray, IPC)  │   │ (transition lock) │   │  Poller    │  │
//! │  └──────────────┘   └─────────┬─────────┘   └─────┬──────┘  │
//! │  ┌──────────────┐             │                   │         │
//! │  │ SettingsStore│──┐          ▼                   ▼         │
//! │  └──────────────┘  ├────▶ Session (SessionState, watch)     │
//! │  ┌──────────────┐  │                                        │
//! │  │ ServerCatalog│──┘                                        │
//! │  └──────────────┘                                           │
//! └───────────────────────────┬────────────────────────────────┘
//!                             │ async calls
//!                             ▼
//!                   ┌───────────────────┐
//!                   │  Backend (tunnel) │
//!                   └───────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - At most one lifecycle transition runs at a time; others queue
//! - State changes only after the backend call settles
//! - A disconnect cancels connects issued before it
//! - Settings writes are serialized and commit the backend's answer

mod backend;
mod bridge;
mod catalog;
mod client;
mod config;
mod controller;
mod error;
mod kill_switch;
mod model;
mod settings;
mod simulated;
mod state;
mod telemetry;

pub use backend::{Backend, Operation};
pub use bridge::{trigger_channel, BridgeHandle, TriggerBridge, TriggerEvent};
pub use catalog::ServerCatalog;
pub use client::VpnClient;
pub use config::{ClientConfig, ConfigError, ConfigFormat};
pub use controller::SessionController;
pub use error::{BackendError, BackendResult, SessionError, SessionResult};
pub use kill_switch::{KillSwitch, KillSwitchState};
pub use model::{ConnectionState, ConnectionStats, Protocol, ServerInfo, SettingsPatch, VpnSettings};
pub use settings::SettingsStore;
pub use simulated::SimulatedBackend;
pub use state::{RecentServers, Session, SessionState, MAX_RECENT_SERVERS};
pub use telemetry::TelemetryPoller;
