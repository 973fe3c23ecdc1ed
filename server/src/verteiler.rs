//! Verteiler – Send-Queues aller verbundenen Clients
//!
//! Jeder eingehende Frame geht unveraendert an alle registrierten Clients,
//! den Absender eingeschlossen. Zugestellt wird nicht-blockierend: ist die
//! Queue eines Clients voll, verliert nur dieser Client den Frame.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Laufende Nummer einer Relay-Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Ergebnis einer Verteilung
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zustellung {
    pub zugestellt: usize,
    pub verworfen: usize,
}

/// Send-Queues aller Clients, indiziert nach [`ClientId`]
pub struct Verteiler {
    clients: Mutex<HashMap<ClientId, mpsc::Sender<String>>>,
    naechste_id: AtomicU64,
    queue_groesse: usize,
}

impl Verteiler {
    pub fn neu(queue_groesse: usize) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            naechste_id: AtomicU64::new(1),
            queue_groesse: queue_groesse.max(1),
        }
    }

    /// Registriert einen Client und liefert dessen Empfangsseite
    pub fn registrieren(&self) -> (ClientId, mpsc::Receiver<String>) {
        let id = ClientId(self.naechste_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.queue_groesse);
        self.clients.lock().insert(id, tx);
        (id, rx)
    }

    /// Entfernt einen Client; gibt `false` zurueck wenn er unbekannt war
    pub fn abmelden(&self, id: ClientId) -> bool {
        self.clients.lock().remove(&id).is_some()
    }

    pub fn anzahl(&self) -> usize {
        self.clients.lock().len()
    }

    /// Stellt `payload` allen Clients zu
    pub fn an_alle(&self, payload: &str) -> Zustellung {
        let clients = self.clients.lock();
        let mut ergebnis = Zustellung::default();
        for (id, tx) in clients.iter() {
            match tx.try_send(payload.to_owned()) {
                Ok(()) => ergebnis.zugestellt += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(client = %id, "Send-Queue voll – Frame verworfen");
                    ergebnis.verworfen += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(client = %id, "Send-Queue geschlossen (Client getrennt)");
                }
            }
        }
        ergebnis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_geht_an_alle_einschliesslich_absender() {
        let verteiler = Verteiler::neu(8);
        let (_a, mut rx_a) = verteiler.registrieren();
        let (_b, mut rx_b) = verteiler.registrieren();

        let zustellung = verteiler.an_alle("{\"type\":\"join\"}");
        assert_eq!(zustellung.zugestellt, 2);
        assert_eq!(zustellung.verworfen, 0);
        assert_eq!(rx_a.try_recv().unwrap(), "{\"type\":\"join\"}");
        assert_eq!(rx_b.try_recv().unwrap(), "{\"type\":\"join\"}");
    }

    #[test]
    fn volle_queue_verwirft_nur_fuer_diesen_client() {
        let verteiler = Verteiler::neu(1);
        let (_langsam, _rx_langsam) = verteiler.registrieren();
        let (_schnell, mut rx_schnell) = verteiler.registrieren();

        assert_eq!(verteiler.an_alle("eins").zugestellt, 2);
        assert_eq!(rx_schnell.try_recv().unwrap(), "eins");

        let zweite = verteiler.an_alle("zwei");
        assert_eq!(zweite.zugestellt, 1);
        assert_eq!(zweite.verworfen, 1);
        assert_eq!(rx_schnell.try_recv().unwrap(), "zwei");
    }

    #[test]
    fn abmelden_entfernt_client() {
        let verteiler = Verteiler::neu(4);
        let (a, _rx) = verteiler.registrieren();
        let (b, _rx_b) = verteiler.registrieren();
        assert_ne!(a, b);
        assert_eq!(verteiler.anzahl(), 2);

        assert!(verteiler.abmelden(a));
        assert!(!verteiler.abmelden(a));
        assert_eq!(verteiler.anzahl(), 1);
        assert_eq!(verteiler.an_alle("x").zugestellt, 1);
    }

    #[test]
    fn geschlossene_queue_zaehlt_nicht() {
        let verteiler = Verteiler::neu(4);
        let (_a, rx) = verteiler.registrieren();
        drop(rx);
        assert_eq!(verteiler.an_alle("x"), Zustellung::default());
    }
}
