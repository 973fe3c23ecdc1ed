//! Fehlertypen des WebRTC-Transports

use stranded_signaling::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RtcError {
    /// API oder Peer-Verbindung konnte nicht erstellt werden
    #[error("WebRTC-Aufbau fehlgeschlagen: {0}")]
    Aufbau(#[source] webrtc::Error),

    /// SDP oder Kandidat wurde abgelehnt
    #[error("{kontext} fehlgeschlagen: {quelle}")]
    Aushandlung {
        kontext: &'static str,
        #[source]
        quelle: webrtc::Error,
    },

    #[error("Beschreibungstyp {0} wird nicht unterstuetzt")]
    NichtUnterstuetzt(&'static str),
}

impl RtcError {
    /// Liefert einen Mapper fuer `map_err` mit Kontextangabe
    pub(crate) fn bei(kontext: &'static str) -> impl FnOnce(webrtc::Error) -> Self {
        move |quelle| Self::Aushandlung { kontext, quelle }
    }
}

impl From<RtcError> for TransportError {
    fn from(fehler: RtcError) -> Self {
        match fehler {
            RtcError::Aufbau(_) => TransportError::intern(fehler.to_string()),
            _ => TransportError::aushandlung(fehler.to_string()),
        }
    }
}

pub type RtcResult<T> = Result<T, RtcError>;
