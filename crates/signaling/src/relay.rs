//! Relay-Anschluss – Publish/Subscribe-Kanal zu allen Clients der Lobby
//!
//! Das Relay stellt jeden veroeffentlichten Payload allen Abonnenten zu,
//! den Absender eingeschlossen. Reihenfolge zwischen verschiedenen
//! Absendern ist nicht garantiert. Eingehende Payloads reicht die
//! Implementierung ueber einen [`CoordinatorHandle`] in die Event-Queue.
//!
//! Wiederverbinden ist Sache der Relay-Implementierung; der Koordinator
//! sieht nur `is_ready()` bzw. wartet auf `ready()`.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use stranded_protocol::wire::FrameCodec;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use crate::error::{RelayError, RelayResult};
use crate::events::CoordinatorHandle;

/// Ausgehende Seite eines Relays
#[async_trait]
pub trait Relay: Send + Sync + 'static {
    /// Veroeffentlicht einen UTF-8-JSON-Payload an alle Abonnenten
    async fn publish(&self, payload: String) -> RelayResult<()>;

    /// Ist das Relay gerade verbunden?
    fn is_ready(&self) -> bool;

    /// Wartet bis das Relay verbunden ist
    async fn ready(&self);
}

// ---------------------------------------------------------------------------
// TcpRelay
// ---------------------------------------------------------------------------

/// Groesse der Ausgangs-Queue zum Schreib-Task
const AUSGANG_QUEUE: usize = 256;

type Verbindung = Framed<TcpStream, FrameCodec>;

/// Relay-Client fuer den `stranded-relay`-Server
///
/// Ein Hintergrund-Task haelt die TCP-Verbindung (laengen-praefixierte
/// Frames via [`FrameCodec`]). Lesen und Schreiben laufen getrennt: der
/// Leser darf auf die Event-Queue des Koordinators warten, ohne dass
/// dessen `publish` auf eine volle Ausgangs-Queue auflaeuft.
pub struct TcpRelay {
    ausgang: mpsc::Sender<String>,
    bereit: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl TcpRelay {
    /// Startet den Verbindungs-Task zu `adresse` (`host:port`)
    ///
    /// Kehrt sofort zurueck; `ready()` wird erfuellt sobald die Verbindung steht.
    pub fn starten(
        adresse: impl Into<String>,
        max_frame: usize,
        handle: CoordinatorHandle,
    ) -> Self {
        let (ausgang_tx, ausgang_rx) = mpsc::channel(AUSGANG_QUEUE);
        let (bereit_tx, bereit_rx) = watch::channel(false);
        let task = tokio::spawn(verbindung_betreiben(
            adresse.into(),
            max_frame,
            handle,
            ausgang_rx,
            bereit_tx,
        ));
        Self {
            ausgang: ausgang_tx,
            bereit: bereit_rx,
            task,
        }
    }
}

impl Drop for TcpRelay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl Relay for TcpRelay {
    async fn publish(&self, payload: String) -> RelayResult<()> {
        if !self.is_ready() {
            return Err(RelayError::NichtVerbunden);
        }
        self.ausgang
            .send(payload)
            .await
            .map_err(|_| RelayError::Geschlossen)
    }

    fn is_ready(&self) -> bool {
        *self.bereit.borrow()
    }

    async fn ready(&self) {
        let mut bereit = self.bereit.clone();
        if bereit.wait_for(|b| *b).await.is_err() {
            tracing::warn!("Relay-Task beendet bevor die Verbindung stand");
        }
    }
}

/// Verbindungs-Task: verbinden, dann lesen und schreiben bis zum Abbruch
async fn verbindung_betreiben(
    adresse: String,
    max_frame: usize,
    handle: CoordinatorHandle,
    ausgang_rx: mpsc::Receiver<String>,
    bereit_tx: watch::Sender<bool>,
) {
    let stream = match TcpStream::connect(&adresse).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(adresse = %adresse, fehler = %e, "Relay nicht erreichbar");
            return;
        }
    };
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(fehler = %e, "TCP_NODELAY nicht gesetzt");
    }

    let (sink, eingang) =
        Framed::new(stream, FrameCodec::with_max_size(max_frame)).split();
    bereit_tx.send_replace(true);
    tracing::info!(adresse = %adresse, "Relay verbunden");

    // Endet der Schreiber, ist die Verbindung unbrauchbar; endet der Leser,
    // wird der Schreiber abgebrochen
    let mut schreiber = tokio::spawn(schreiben(sink, ausgang_rx));
    tokio::select! {
        () = lesen(eingang, handle) => schreiber.abort(),
        _ = &mut schreiber => {}
    }

    bereit_tx.send_replace(false);
    tracing::info!(adresse = %adresse, "Relay getrennt");
}

/// Reicht eingehende Payloads in die Event-Queue weiter
async fn lesen(mut eingang: SplitStream<Verbindung>, handle: CoordinatorHandle) {
    while let Some(frame) = eingang.next().await {
        match frame {
            Ok(payload) => {
                if handle.relay_payload(payload).await.is_err() {
                    tracing::debug!("Koordinator beendet, Relay-Task endet");
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(fehler = %e, "Relay-Frame fehlerhaft, Verbindung wird getrennt");
                return;
            }
        }
    }
    tracing::info!("Relay hat die Verbindung geschlossen");
}

/// Schreibt die Ausgangs-Queue auf die Verbindung
async fn schreiben(
    mut sink: SplitSink<Verbindung, String>,
    mut ausgang_rx: mpsc::Receiver<String>,
) {
    while let Some(payload) = ausgang_rx.recv().await {
        if let Err(e) = sink.send(payload).await {
            tracing::warn!(fehler = %e, "Senden an Relay fehlgeschlagen");
            return;
        }
    }
    tracing::debug!("Ausgangs-Queue geschlossen");
}
