//! Session data model
//!
//! Plain data types shared by every component: connection state,
//! server descriptions, live statistics and the client settings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No tunnel
    #[default]
    Disconnected,
    /// Connect or quick connect in flight
    Connecting,
    /// Tunnel is up
    Connected,
    /// Disconnect in flight
    Disconnecting,
    /// Reconnect to the last known server in flight
    Reconnecting,
    /// Last lifecycle transition failed
    Error,
}

impl ConnectionState {
    /// Check if the tunnel is up
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Check if a lifecycle transition is in flight
    pub fn is_transitioning(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::Disconnecting
                | ConnectionState::Reconnecting
        )
    }

    /// Check if the last transition failed
    pub fn is_error(&self) -> bool {
        matches!(self, ConnectionState::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunnel protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    WireGuard,
    OpenVpn,
    /// Obfuscated transport for filtered networks
    Stealth,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::WireGuard => "wireguard",
            Protocol::OpenVpn => "openvpn",
            Protocol::Stealth => "stealth",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wireguard" => Ok(Protocol::WireGuard),
            "openvpn" => Ok(Protocol::OpenVpn),
            "stealth" => Ok(Protocol::Stealth),
            _ => Err(format!("unknown protocol: {s}")),
        }
    }
}

/// A server advertised by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Backend identifier (e.g. "us-east-1")
    pub id: String,
    /// Display name
    pub name: String,
    /// Country code
    pub country: String,
    pub city: String,
    /// Load percentage (0-100)
    pub load: u8,
    /// Last measured latency in milliseconds
    #[serde(default)]
    pub latency_ms: Option<u32>,
    /// Capability tags (e.g. "p2p", "streaming")
    #[serde(default)]
    pub features: Vec<String>,
    /// Network address of the server endpoint
    pub address: String,
    pub protocol: Protocol,
}

impl ServerInfo {
    /// Create a server entry with no latency and no capability tags
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        country: impl Into<String>,
        city: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            country: country.into(),
            city: city.into(),
            load: 0,
            latency_ms: None,
            features: Vec::new(),
            address: address.into(),
            protocol: Protocol::default(),
        }
    }

    pub fn with_load(mut self, load: u8) -> Self {
        self.load = load.min(100);
        self
    }

    pub fn with_latency(mut self, latency_ms: u32) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.push(feature.into());
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Check for a capability tag
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }

    /// "City, Country" label for display
    pub fn location(&self) -> String {
        format!("{}, {}", self.city, self.country)
    }
}

/// Live statistics of the active tunnel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStats {
    /// Bytes received through the tunnel
    pub bytes_in: u64,
    /// Bytes sent through the tunnel
    pub bytes_out: u64,
    /// Session duration in seconds
    pub duration_secs: u64,
    /// Instantaneous download rate (bytes/s)
    pub download_rate: f64,
    /// Instantaneous upload rate (bytes/s)
    pub upload_rate: f64,
}

impl ConnectionStats {
    /// Format as human-readable string
    pub fn format(&self) -> String {
        format!(
            "RX: {:.2}MB ({:.1}KB/s), TX: {:.2}MB ({:.1}KB/s), up {}s",
            self.bytes_in as f64 / (1024.0 * 1024.0),
            self.download_rate / 1024.0,
            self.bytes_out as f64 / (1024.0 * 1024.0),
            self.upload_rate / 1024.0,
            self.duration_secs
        )
    }
}

/// Client settings
///
/// Always fully populated. Partial updates go through [`SettingsPatch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VpnSettings {
    /// Block all traffic when the tunnel drops
    pub kill_switch: bool,
    /// Connect automatically on startup
    pub auto_connect: bool,
    pub protocol: Protocol,
    /// Route only a subset of traffic through the tunnel
    pub split_tunneling: bool,
    /// Applications bypassing the tunnel when split tunneling is on
    pub excluded_apps: BTreeSet<String>,
    /// DNS servers used inside the tunnel, in priority order
    pub dns_servers: Vec<IpAddr>,
    pub start_minimized: bool,
    pub show_notifications: bool,
}

impl Default for VpnSettings {
    fn default() -> Self {
        Self {
            kill_switch: true,
            auto_connect: false,
            protocol: Protocol::WireGuard,
            split_tunneling: false,
            excluded_apps: BTreeSet::new(),
            dns_servers: vec![
                IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)), // Cloudflare
                IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9)), // Quad9
            ],
            start_minimized: false,
            show_notifications: true,
        }
    }
}

/// Field-wise override for [`VpnSettings`]
///
/// `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    pub kill_switch: Option<bool>,
    pub auto_connect: Option<bool>,
    pub protocol: Option<Protocol>,
    pub split_tunneling: Option<bool>,
    pub excluded_apps: Option<BTreeSet<String>>,
    pub dns_servers: Option<Vec<IpAddr>>,
    pub start_minimized: Option<bool>,
    pub show_notifications: Option<bool>,
}

impl SettingsPatch {
    /// Check if the patch overrides nothing
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge this patch over `base`, producing a complete settings object
    pub fn apply(&self, base: &VpnSettings) -> VpnSettings {
        VpnSettings {
            kill_switch: self.kill_switch.unwrap_or(base.kill_switch),
            auto_connect: self.auto_connect.unwrap_or(base.auto_connect),
            protocol: self.protocol.unwrap_or(base.protocol),
            split_tunneling: self.split_tunneling.unwrap_or(base.split_tunneling),
            excluded_apps: self
                .excluded_apps
                .clone()
                .unwrap_or_else(|| base.excluded_apps.clone()),
            dns_servers: self
                .dns_servers
                .clone()
                .unwrap_or_else(|| base.dns_servers.clone()),
            start_minimized: self.start_minimized.unwrap_or(base.start_minimized),
            show_notifications: self.show_notifications.unwrap_or(base.show_notifications),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Error.is_connected());
        assert!(ConnectionState::Reconnecting.is_transitioning());
        assert!(!ConnectionState::Disconnected.is_transitioning());
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Disconnecting.to_string(), "disconnecting");
    }

    #[test]
    fn test_protocol_parse() {
        let p: Protocol = "OpenVPN".parse().unwrap();
        assert_eq!(p, Protocol::OpenVpn);
        assert!("ipsec".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_default_settings() {
        let settings = VpnSettings::default();

        assert!(settings.kill_switch);
        assert!(!settings.auto_connect);
        assert_eq!(settings.protocol, Protocol::WireGuard);
        assert_eq!(settings.dns_servers.len(), 2);
        assert!(settings.show_notifications);
    }

    #[test]
    fn test_patch_overrides_only_given_fields() {
        let base = VpnSettings::default();
        let patch = SettingsPatch {
            kill_switch: Some(false),
            ..Default::default()
        };

        let merged = patch.apply(&base);
        assert!(!merged.kill_switch);
        assert_eq!(
            merged,
            VpnSettings {
                kill_switch: false,
                ..base
            }
        );
    }

    #[test]
    fn test_empty_patch() {
        let base = VpnSettings::default();
        let patch = SettingsPatch::default();

        assert!(patch.is_empty());
        assert_eq!(patch.apply(&base), base);
    }

    #[test]
    fn test_settings_serde_fills_missing_fields() {
        let settings: VpnSettings = serde_json::from_str(r#"{"protocol":"stealth"}"#).unwrap();

        assert_eq!(settings.protocol, Protocol::Stealth);
        assert!(settings.kill_switch);
        assert_eq!(settings.dns_servers, VpnSettings::default().dns_servers);
    }

    #[test]
    fn test_server_builder() {
        let server = ServerInfo::new("de-fra-1", "Frankfurt #1", "DE", "Frankfurt", "185.186.78.1:51820")
            .with_load(140)
            .with_feature("p2p");

        assert_eq!(server.load, 100);
        assert!(server.has_feature("p2p"));
        assert_eq!(server.location(), "Frankfurt, DE");
    }
}
