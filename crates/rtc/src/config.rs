//! Konfiguration der Peer-Verbindungen

use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_server::RTCIceServer;

/// Ein STUN- oder TURN-Server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IceServerEintrag {
    pub urls: Vec<String>,
    /// Nur fuer TURN
    pub username: String,
    /// Nur fuer TURN
    pub credential: String,
}

impl IceServerEintrag {
    /// STUN-Server ohne Zugangsdaten
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            ..Default::default()
        }
    }
}

/// WebRTC-Einstellungen eines Clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtcConfig {
    pub ice_servers: Vec<IceServerEintrag>,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![
                IceServerEintrag::stun("stun:stun.l.google.com:19302"),
                IceServerEintrag::stun("stun:stun1.l.google.com:19302"),
            ],
        }
    }
}

impl RtcConfig {
    /// Konfiguration ohne ICE-Server (nur Host-Kandidaten, z.B. im LAN)
    pub fn nur_lokal() -> Self {
        Self {
            ice_servers: Vec::new(),
        }
    }

    /// Umwandlung in die Server-Liste der WebRTC-Konfiguration
    pub fn rtc_ice_servers(&self) -> Vec<RTCIceServer> {
        self.ice_servers
            .iter()
            .filter(|s| !s.urls.is_empty())
            .map(|s| RTCIceServer {
                urls: s.urls.clone(),
                username: s.username.clone(),
                credential: s.credential.clone(),
                ..Default::default()
            })
            .collect()
    }
}
