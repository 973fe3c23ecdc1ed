//! Signal-Router – Zustellpruefung und Verteilung eingehender Frames
//!
//! ## Entscheidungstabelle
//! 1. `senderId == localId`            -> verwerfen (Eigenecho des Relays)
//! 2. `targetId` gesetzt und `!= localId` -> verwerfen (fuer andere bestimmt)
//! 3. nach Tag an den passenden Handler
//!
//! Anwesenheit lernt der Koordinator nur aus zugestellten Frames.
//!
//! Fehler der Handler werden hier protokolliert und nie weitergereicht.

use stranded_audio::AudioDevice;
use stranded_core::types::PeerId;
use stranded_protocol::{SignalFrame, SignalPayload};
use tokio::time::Instant;

use crate::coordinator::SignalingCoordinator;
use crate::relay::Relay;
use crate::transport::TransportFactory;

/// Ergebnis der Zustellpruefung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zustellung {
    /// Eigener Frame, vom Relay zurueckgespiegelt
    Eigenecho,
    /// Gezielt an eine andere Gegenstelle
    FremdesZiel,
    /// Fuer uns bestimmt (gezielt oder Broadcast)
    Zustellen,
}

/// Zustellpruefung fuer einen lokalen Client
#[derive(Debug, Clone)]
pub struct SignalRouter {
    local_id: PeerId,
}

impl SignalRouter {
    pub fn neu(local_id: PeerId) -> Self {
        Self { local_id }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    /// Entscheidet ob ein Frame verarbeitet wird
    pub fn pruefen(&self, frame: &SignalFrame) -> Zustellung {
        if frame.sender_id == self.local_id {
            return Zustellung::Eigenecho;
        }
        match &frame.target_id {
            Some(ziel) if *ziel != self.local_id => Zustellung::FremdesZiel,
            _ => Zustellung::Zustellen,
        }
    }
}

impl<R, A, F> SignalingCoordinator<R, A, F>
where
    R: Relay,
    A: AudioDevice,
    F: TransportFactory<A::Capture>,
{
    /// Prueft und verteilt einen eingehenden Frame
    pub async fn route(&mut self, frame: SignalFrame) {
        match self.router.pruefen(&frame) {
            Zustellung::Eigenecho => {
                tracing::trace!(typ = %frame.tag(), "Eigenecho verworfen");
                return;
            }
            Zustellung::FremdesZiel => {
                tracing::trace!(
                    typ = %frame.tag(),
                    von = %frame.sender_id,
                    "Frame fuer andere Gegenstelle"
                );
                return;
            }
            Zustellung::Zustellen => {}
        }

        tracing::debug!(typ = %frame.tag(), von = %frame.sender_id, "Signal empfangen");
        let neu_anwesend = self.anwesenheit_merken(&frame.sender_id);
        let gezielt = frame.target_id.is_some();
        let von = frame.sender_id;

        match frame.payload {
            SignalPayload::Offer { offer } => self.handle_offer(von, offer).await,
            SignalPayload::Answer { answer } => self.handle_answer(von, answer).await,
            SignalPayload::Candidate { candidate } => {
                self.handle_candidate(von, candidate).await;
            }
            SignalPayload::Join => self.handle_join(von, gezielt, neu_anwesend).await,
            SignalPayload::Hangup => self.handle_hangup(von).await,
        }
    }

    /// Merkt sich eine Gegenstelle; `true` wenn sie neu ist
    ///
    /// Ist die Liste voll, wird die am laengsten stille Gegenstelle vergessen.
    fn anwesenheit_merken(&mut self, peer: &PeerId) -> bool {
        let jetzt = Instant::now();
        if let Some(zuletzt) = self.anwesende.get_mut(peer) {
            *zuletzt = jetzt;
            return false;
        }

        if self.anwesende.len() >= self.config.max_anwesende.max(1) {
            let stillste = self
                .anwesende
                .iter()
                .min_by_key(|(_, zuletzt)| **zuletzt)
                .map(|(p, _)| p.clone());
            if let Some(stillste) = stillste {
                self.anwesende.remove(&stillste);
                tracing::debug!(peer = %stillste, "Anwesenheitsliste voll, Gegenstelle vergessen");
            }
        }
        self.anwesende.insert(peer.clone(), jetzt);
        tracing::debug!(peer = %peer, "Neue Gegenstelle bekannt");
        true
    }
}
