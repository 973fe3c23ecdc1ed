//! In-Process-Relay
//!
//! `MemoryHub` verhaelt sich wie der `stranded-relay`-Server: jeder
//! veroeffentlichte Payload geht an alle verbundenen Clients, den Absender
//! eingeschlossen. Gedacht fuer Tests und lokale Demos ohne Netzwerk.

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::error::{RelayError, RelayResult};
use crate::events::CoordinatorHandle;
use crate::relay::Relay;

/// Gemeinsamer Verteiler aller In-Process-Clients
#[derive(Debug, Clone)]
pub struct MemoryHub {
    tx: broadcast::Sender<String>,
}

impl MemoryHub {
    /// Erstellt einen Hub mit der gegebenen Puffergroesse pro Abonnent
    pub fn neu(kapazitaet: usize) -> Self {
        let (tx, _) = broadcast::channel(kapazitaet.max(1));
        Self { tx }
    }

    /// Verbindet einen Koordinator mit dem Hub
    pub fn verbinden(&self, handle: CoordinatorHandle) -> MemoryRelay {
        let (bereit_tx, _) = watch::channel(true);
        let mut rx = self.tx.subscribe();
        let bereit_rx = bereit_tx.subscribe();

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => {
                        if !*bereit_rx.borrow() {
                            continue;
                        }
                        if handle.relay_payload(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(anzahl)) => {
                        tracing::warn!(anzahl, "Memory-Relay: Payloads uebersprungen");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        MemoryRelay {
            tx: self.tx.clone(),
            bereit: bereit_tx,
            task,
        }
    }

    /// Eigener Empfaenger, z.B. um den Verkehr in Tests mitzulesen
    pub fn abonnieren(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Anzahl aktiver Empfaenger
    pub fn teilnehmer(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::neu(256)
    }
}

/// Anschluss eines Koordinators an einen [`MemoryHub`]
pub struct MemoryRelay {
    tx: broadcast::Sender<String>,
    bereit: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MemoryRelay {
    /// Simuliert Verbindungsabbruch bzw. Wiederverbinden
    pub fn set_bereit(&self, bereit: bool) {
        self.bereit.send_replace(bereit);
    }
}

impl Drop for MemoryRelay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn publish(&self, payload: String) -> RelayResult<()> {
        if !self.is_ready() {
            return Err(RelayError::NichtVerbunden);
        }
        // Ohne Empfaenger geht der Payload verloren, wie beim echten Relay
        let _ = self.tx.send(payload);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        *self.bereit.borrow()
    }

    async fn ready(&self) {
        let mut rx = self.bereit.subscribe();
        // Der Sender lebt so lange wie self, wait_for endet also nur mit `true`
        let _ = rx.wait_for(|b| *b).await;
    }
}
