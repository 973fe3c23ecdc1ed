//! Ereignisse der Koordinator-Queue und der Handle dazu
//!
//! Alles was den Zustand des Koordinators veraendern kann (lokale
//! Start/Stop-Aktionen, eingehende Relay-Payloads, Rueckmeldungen der
//! Transporte) wird als [`Ereignis`] in eine einzige `mpsc`-Queue gelegt
//! und dort strikt nacheinander verarbeitet.

use stranded_audio::PttAktion;
use stranded_core::types::SessionId;
use stranded_protocol::{IceCandidate, SignalFrame};
use tokio::sync::{mpsc, oneshot};

use crate::error::{SignalingError, SignalingResult};
use crate::session::SessionKey;

// ---------------------------------------------------------------------------
// Transport-Ereignisse
// ---------------------------------------------------------------------------

/// Rueckmeldung eines Transports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    /// Neuer lokaler Kandidat, muss an die Gegenstelle gehen
    LocalCandidate(IceCandidate),
    /// Medien fliessen
    Connected,
    /// Verbindung unterbrochen (ICE kann sich noch erholen)
    Disconnected,
    /// Endgueltiger Fehler – Session wird geschlossen
    Failed(String),
}

/// Rueckmeldung mit Zuordnung zur erzeugenden Session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub key: SessionKey,
    /// Veraltete Events (Session inzwischen ersetzt) werden daran erkannt
    pub session_id: SessionId,
    pub kind: TransportEventKind,
}

// ---------------------------------------------------------------------------
// Queue-Ereignisse
// ---------------------------------------------------------------------------

/// Ein Eintrag der Koordinator-Queue
#[derive(Debug)]
pub enum Ereignis {
    /// Lokale Uebertragung starten
    Start(oneshot::Sender<SignalingResult<()>>),
    /// Lokale Uebertragung beenden
    Stop(oneshot::Sender<SignalingResult<()>>),
    /// Roh-Payload vom Relay
    RelayPayload(String),
    /// Rueckmeldung eines Transports
    Transport(TransportEvent),
    /// Event-Schleife beenden
    Beenden,
}

// ---------------------------------------------------------------------------
// CoordinatorHandle
// ---------------------------------------------------------------------------

/// Klonbarer Zugang zur Event-Queue eines laufenden Koordinators
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Ereignis>,
}

impl CoordinatorHandle {
    /// Erstellt Handle und Empfaenger der Queue
    pub fn kanal(kapazitaet: usize) -> (Self, mpsc::Receiver<Ereignis>) {
        let (tx, rx) = mpsc::channel(kapazitaet.max(1));
        (Self { tx }, rx)
    }

    /// Startet die lokale Uebertragung und wartet auf das Ergebnis
    pub async fn start_local_broadcast(&self) -> SignalingResult<()> {
        let (antwort_tx, antwort_rx) = oneshot::channel();
        self.senden(Ereignis::Start(antwort_tx)).await?;
        antwort_rx
            .await
            .map_err(|_| SignalingError::CoordinatorStopped)?
    }

    /// Beendet die lokale Uebertragung und wartet auf das Ergebnis
    pub async fn stop_local_broadcast(&self) -> SignalingResult<()> {
        let (antwort_tx, antwort_rx) = oneshot::channel();
        self.senden(Ereignis::Stop(antwort_tx)).await?;
        antwort_rx
            .await
            .map_err(|_| SignalingError::CoordinatorStopped)?
    }

    /// Setzt eine Push-to-Talk-Aktion in Start bzw. Stop um
    pub async fn ptt_aktion(&self, aktion: PttAktion) -> SignalingResult<()> {
        match aktion {
            PttAktion::StartSenden => self.start_local_broadcast().await,
            PttAktion::StopSenden => self.stop_local_broadcast().await,
            PttAktion::Keine => Ok(()),
        }
    }

    /// Reicht einen Roh-Payload vom Relay ein
    pub async fn relay_payload(&self, payload: String) -> SignalingResult<()> {
        self.senden(Ereignis::RelayPayload(payload)).await
    }

    /// Reicht einen bereits geparsten Frame ein
    pub async fn relay_frame(&self, frame: &SignalFrame) -> SignalingResult<()> {
        self.relay_payload(frame.to_json()?).await
    }

    /// Beendet die Event-Schleife
    pub async fn beenden(&self) -> SignalingResult<()> {
        self.senden(Ereignis::Beenden).await
    }

    /// Erstellt den Rueckkanal fuer einen Transport
    pub fn transport_events(&self, key: SessionKey, session_id: SessionId) -> TransportEvents {
        TransportEvents {
            tx: self.tx.clone(),
            key,
            session_id,
        }
    }

    /// Gibt zurueck ob die Event-Schleife noch Ereignisse annimmt
    pub fn ist_aktiv(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn senden(&self, ereignis: Ereignis) -> SignalingResult<()> {
        self.tx
            .send(ereignis)
            .await
            .map_err(|_| SignalingError::CoordinatorStopped)
    }
}

// ---------------------------------------------------------------------------
// TransportEvents
// ---------------------------------------------------------------------------

/// Rueckkanal eines einzelnen Transports
#[derive(Debug, Clone)]
pub struct TransportEvents {
    tx: mpsc::Sender<Ereignis>,
    key: SessionKey,
    session_id: SessionId,
}

impl TransportEvents {
    /// Meldet ein Transport-Ereignis an den Koordinator
    ///
    /// Ist die Event-Schleife bereits beendet, wird das Ereignis verworfen.
    pub async fn melden(&self, kind: TransportEventKind) {
        let event = TransportEvent {
            key: self.key.clone(),
            session_id: self.session_id,
            kind,
        };
        if self.tx.send(Ereignis::Transport(event)).await.is_err() {
            tracing::debug!(
                session = %self.session_id,
                "Transport-Ereignis nach Ende des Koordinators verworfen"
            );
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }
}
