//! stranded-relay – Bibliotheks-Root
//!
//! Das Relay ist bewusst dumm: es haelt keinen Signalisierungszustand und
//! interpretiert die Payloads nicht. Jeder empfangene Frame geht an alle
//! verbundenen Clients, den Absender eingeschlossen.

pub mod config;
pub mod verteiler;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use stranded_observability::{HealthState, RelayMetrics};
use stranded_protocol::wire::FrameCodec;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;

use config::RelayConfig;
use verteiler::{ClientId, Verteiler};

/// Haelt den laufenden Relay-Zustand zusammen
#[derive(Clone)]
pub struct RelayServer {
    config: Arc<RelayConfig>,
    verteiler: Arc<Verteiler>,
    metriken: RelayMetrics,
    health: HealthState,
}

impl RelayServer {
    /// Erstellt ein Relay aus der gegebenen Konfiguration
    pub fn neu(config: RelayConfig, metriken: RelayMetrics, health: HealthState) -> Self {
        let verteiler = Arc::new(Verteiler::neu(config.relay.sende_queue_groesse));
        Self {
            config: Arc::new(config),
            verteiler,
            metriken,
            health,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Anzahl aktuell registrierter Clients
    pub fn clients(&self) -> usize {
        self.verteiler.anzahl()
    }

    /// Accept-Loop: nimmt Verbindungen an bis `shutdown_rx` auf `true` wechselt
    ///
    /// Jede Verbindung laeuft in einem eigenen tokio-Task. Verbindungen
    /// jenseits von `max_clients` werden sofort wieder geschlossen.
    pub async fn betreiben(
        self,
        listener: TcpListener,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        let lokal = listener.local_addr()?;
        tracing::info!(
            adresse = %lokal,
            max_clients = self.config.relay.max_clients,
            "Relay-Listener gestartet"
        );
        self.health.listener_status_setzen(true);
        self.clients_melden();

        loop {
            tokio::select! {
                ergebnis = listener.accept() => {
                    match ergebnis {
                        Ok((stream, peer_addr)) => {
                            self.annehmen(stream, peer_addr, shutdown_rx.clone());
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "Accept-Fehler");
                            // Kurze Pause um Busy-Loop bei wiederholten Fehlern zu vermeiden
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Relay-Listener wird heruntergefahren");
                        break;
                    }
                }
            }
        }

        self.health.listener_status_setzen(false);
        Ok(())
    }

    fn annehmen(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
        shutdown_rx: watch::Receiver<bool>,
    ) {
        let max = self.config.relay.max_clients;
        if self.verteiler.anzahl() >= max {
            tracing::warn!(
                peer = %peer_addr,
                max = max,
                "Verbindungslimit erreicht, Verbindung abgelehnt"
            );
            return;
        }
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer = %peer_addr, fehler = %e, "TCP_NODELAY nicht gesetzt");
        }

        // Limit-Pruefung und Registrierung bleiben im Accept-Task
        let (id, sende_rx) = self.verteiler.registrieren();
        self.clients_melden();
        tracing::info!(peer = %peer_addr, client = %id, "Client verbunden");

        let server = self.clone();
        tokio::spawn(async move {
            server
                .verbindung_verarbeiten(stream, peer_addr, id, sende_rx, shutdown_rx)
                .await;
        });
    }

    /// Liest Frames eines Clients und verteilt sie; schreibt dessen Send-Queue
    async fn verbindung_verarbeiten(
        self,
        stream: TcpStream,
        peer_addr: SocketAddr,
        id: ClientId,
        mut sende_rx: mpsc::Receiver<String>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let codec = FrameCodec::with_max_size(self.config.relay.max_frame_groesse);
        let (mut sink, mut eingang) = Framed::new(stream, codec).split();

        loop {
            tokio::select! {
                frame = eingang.next() => match frame {
                    Some(Ok(payload)) => {
                        self.metriken.frame_empfangen(payload.len());
                        tracing::trace!(client = %id, bytes = payload.len(), "Frame empfangen");
                        let zustellung = self.verteiler.an_alle(&payload);
                        if zustellung.verworfen > 0 {
                            self.metriken
                                .frames_dropped_total
                                .inc_by(zustellung.verworfen as u64);
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(client = %id, fehler = %e, "Frame-Lesefehler");
                        break;
                    }
                    None => {
                        tracing::info!(client = %id, "Verbindung vom Client getrennt");
                        break;
                    }
                },

                ausgehend = sende_rx.recv() => match ausgehend {
                    Some(payload) => {
                        if let Err(e) = sink.send(payload).await {
                            tracing::warn!(client = %id, fehler = %e, "Senden fehlgeschlagen");
                            break;
                        }
                    }
                    None => break,
                },

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.verteiler.abmelden(id);
        self.clients_melden();
        tracing::debug!(peer = %peer_addr, client = %id, "Verbindung beendet");
    }

    fn clients_melden(&self) {
        let anzahl = self.verteiler.anzahl();
        self.metriken.clients_connected.set(anzahl as i64);
        self.health
            .clients_setzen(anzahl as u64, anzahl >= self.config.relay.max_clients);
    }
}
