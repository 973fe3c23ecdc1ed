//! Fehlertypen fuer die Signalisierung

use stranded_audio::AudioError;
use thiserror::Error;

/// Fehlertyp des Signaling-Koordinators
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Mikrofon konnte nicht geoeffnet werden
    #[error("Audio-Geraet nicht verfuegbar: {0}")]
    DeviceUnavailable(#[from] AudioError),

    /// Frame passt nicht zum Zustand der Session (doppelte oder veraltete Antwort)
    #[error("Unerwarteter Signalisierungszustand: {0}")]
    UnexpectedSignalingState(String),

    /// Der Transport hat eine Beschreibung oder einen Kandidaten abgelehnt
    #[error("Transport hat die Aushandlung abgelehnt: {0}")]
    TransportApplyFailed(#[from] TransportError),

    /// Relay nicht verbunden – Signalisierung pausiert
    #[error("Relay nicht verfuegbar: {0}")]
    RelayUnavailable(#[from] RelayError),

    /// Payload ist kein gueltiger SignalFrame
    #[error("Ungueltiger Frame: {0}")]
    InvalidFrame(#[from] serde_json::Error),

    /// Die Event-Schleife des Koordinators laeuft nicht mehr
    #[error("Koordinator wurde beendet")]
    CoordinatorStopped,
}

impl SignalingError {
    /// Erstellt einen Zustandsfehler
    pub fn unerwartet(msg: impl Into<String>) -> Self {
        Self::UnexpectedSignalingState(msg.into())
    }
}

/// Result-Typ fuer die Signalisierung
pub type SignalingResult<T> = Result<T, SignalingError>;

/// Fehler eines Relay-Anschlusses
#[derive(Debug, Error)]
pub enum RelayError {
    /// Verbindung (noch) nicht hergestellt
    #[error("Relay nicht verbunden")]
    NichtVerbunden,

    /// Verbindung wurde geschlossen
    #[error("Relay-Verbindung geschlossen")]
    Geschlossen,

    /// IO-Fehler (TCP)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type RelayResult<T> = Result<T, RelayError>;

/// Fehler eines Peer-Transports
#[derive(Debug, Error)]
pub enum TransportError {
    /// Aushandlung abgelehnt (ungueltige SDP, falscher Zustand im Transport)
    #[error("Aushandlung fehlgeschlagen: {0}")]
    Aushandlung(String),

    /// Transport bereits geschlossen
    #[error("Transport geschlossen")]
    Geschlossen,

    /// Sonstiger Fehler der Transport-Implementierung
    #[error("Transport-Fehler: {0}")]
    Intern(String),
}

impl TransportError {
    /// Erstellt einen Aushandlungsfehler
    pub fn aushandlung(msg: impl Into<String>) -> Self {
        Self::Aushandlung(msg.into())
    }

    /// Erstellt einen internen Fehler
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
