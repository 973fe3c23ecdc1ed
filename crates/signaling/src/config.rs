//! Signaling-Konfiguration
//!
//! Wird vom Client aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Koordinator ohne Datei lauffaehig ist.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stranded_audio::{CaptureConstraints, PttConfig};

/// Wie ausgehende Angebote adressiert werden
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdressierungsModus {
    /// Ein reservierter Broadcast-Slot, Angebot ohne `targetId`.
    /// Die erste Antwort bindet den Slot; nur ein Zuhoerer pro Uebertragung.
    Broadcast,
    /// Eine Initiator-Session je bekannter Gegenstelle, Angebote mit `targetId`
    #[default]
    Mesh,
}

/// Konfiguration des Signaling-Koordinators
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Adressierung der eigenen Angebote
    pub modus: AdressierungsModus,
    /// Maximale Dauer einer unvollstaendigen Aushandlung in Sekunden
    pub verhandlungs_timeout_sek: u64,
    /// Intervall der Timeout-Pruefung in Millisekunden
    pub sweep_intervall_ms: u64,
    /// Obergrenze gepufferter Kandidaten pro Session bzw. Gegenstelle
    pub max_gepufferte_kandidaten: usize,
    /// Kapazitaet der Event-Queue
    pub event_queue_groesse: usize,
    /// Hoechstzahl gemerkter Gegenstellen; die am laengsten stille faellt heraus
    pub max_anwesende: usize,
    /// Anforderungen an das Mikrofon
    pub capture: CaptureConstraints,
    /// Push-to-Talk
    pub ptt: PttConfig,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            modus: AdressierungsModus::Mesh,
            verhandlungs_timeout_sek: 15,
            sweep_intervall_ms: 1000,
            max_gepufferte_kandidaten: 64,
            event_queue_groesse: 256,
            max_anwesende: 256,
            capture: CaptureConstraints::default(),
            ptt: PttConfig::default(),
        }
    }
}

impl SignalingConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    pub fn verhandlungs_timeout(&self) -> Duration {
        Duration::from_secs(self.verhandlungs_timeout_sek)
    }

    pub fn sweep_intervall(&self) -> Duration {
        // Null wuerde tokio::time::interval panisch machen
        Duration::from_millis(self.sweep_intervall_ms.max(1))
    }
}
