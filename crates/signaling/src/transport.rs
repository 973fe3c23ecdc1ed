//! Schnittstelle zum Peer-Transport
//!
//! Der Koordinator spricht die eigentliche WebRTC-Implementierung nur ueber
//! diese Traits an. Ein Transport gehoert exklusiv genau einer `PeerSession`
//! und wird von ihr genau einmal geschlossen.
//!
//! Asynchrone Rueckmeldungen (lokale Kandidaten, Verbindungszustand) laufen
//! nicht ueber Rueckgabewerte, sondern ueber die [`TransportEvents`] aus dem
//! [`TransportKontext`] in die Event-Queue des Koordinators.

use async_trait::async_trait;
use stranded_core::types::{PeerId, SessionId};
use stranded_protocol::{IceCandidate, SessionDescription};

use crate::error::TransportResult;
use crate::events::TransportEvents;
use crate::session::SessionKey;

/// Ein Transport fuer genau eine Session
#[async_trait]
pub trait PeerTransport: Send + Sync + 'static {
    /// Erzeugt ein Angebot und setzt es als lokale Beschreibung
    async fn create_offer(&self) -> TransportResult<SessionDescription>;

    /// Erzeugt eine Antwort und setzt sie als lokale Beschreibung
    async fn create_answer(&self) -> TransportResult<SessionDescription>;

    /// Setzt die Beschreibung der Gegenstelle `remote`
    async fn set_remote_description(
        &self,
        remote: &PeerId,
        description: SessionDescription,
    ) -> TransportResult<()>;

    /// Wendet einen Kandidaten der Gegenstelle an
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> TransportResult<()>;

    /// Schliesst den Transport und beendet eine laufende Wiedergabe
    async fn close(&self);
}

/// Alles was ein Transport ueber seine Session wissen muss
#[derive(Debug, Clone)]
pub struct TransportKontext {
    pub key: SessionKey,
    pub session_id: SessionId,
    /// Rueckkanal in die Event-Queue, bereits mit Key und SessionId versehen
    pub events: TransportEvents,
}

/// Erzeugt Transporte fuer neue Sessions
///
/// `C` ist der Capture-Handle des Mikrofons. Er wird nur uebergeben, wenn
/// die Session die eigene Stimme senden soll.
#[async_trait]
pub trait TransportFactory<C: Send + 'static>: Send + Sync + 'static {
    type Transport: PeerTransport;

    async fn create(
        &self,
        kontext: TransportKontext,
        capture: Option<C>,
    ) -> TransportResult<Self::Transport>;
}
