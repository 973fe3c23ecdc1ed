//! Hangup-Handler – Gegenstelle beendet ihre Sessions
//!
//! Schliesst die Session des Absenders, den an ihn gebundenen
//! Broadcast-Slot und verwirft seine Waisen-Kandidaten. Fuer unbekannte
//! Gegenstellen wirkungslos.

use stranded_audio::AudioDevice;
use stranded_core::types::PeerId;

use crate::coordinator::SignalingCoordinator;
use crate::relay::Relay;
use crate::session::SessionKey;
use crate::transport::TransportFactory;

impl<R, A, F> SignalingCoordinator<R, A, F>
where
    R: Relay,
    A: AudioDevice,
    F: TransportFactory<A::Capture>,
{
    pub(crate) async fn handle_hangup(&mut self, von: PeerId) {
        let eigene = self.session_schliessen(&SessionKey::Peer(von.clone())).await;

        let slot = self.registry.slot_gebunden_an(&von);
        if slot {
            self.session_schliessen(&SessionKey::Broadcast).await;
        }
        let waisen = self.registry.waise_verwerfen(&von);

        if !(eigene || slot || waisen) {
            tracing::debug!(peer = %von, "Hangup fuer unbekannte Gegenstelle ignoriert");
            return;
        }
        tracing::info!(peer = %von, slot, "Gegenstelle hat aufgelegt");

        // Die Gegenstelle hoert nicht mehr zu; neues Angebot fuer den Rest der Lobby
        if slot {
            self.broadcast_erneuern().await;
        }
    }
}
