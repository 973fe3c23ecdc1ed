//! Candidate-Handler – Kandidat der Gegenstelle zuordnen
//!
//! In Frage kommen die Session des Absenders und der an ihn gebundene
//! Broadcast-Slot. Traegt der Kandidat ein ICE-Benutzerfragment, entscheidet
//! die Remote-Beschreibung mit demselben Fragment; ohne passende Session landet
//! er im Waisen-Puffer des Absenders. Ohne Remote-Beschreibung puffert die
//! Session selbst.

use stranded_audio::AudioDevice;
use stranded_core::types::PeerId;
use stranded_protocol::IceCandidate;

use crate::coordinator::SignalingCoordinator;
use crate::relay::Relay;
use crate::session::KandidatStatus;
use crate::transport::TransportFactory;

impl<R, A, F> SignalingCoordinator<R, A, F>
where
    R: Relay,
    A: AudioDevice,
    F: TransportFactory<A::Capture>,
{
    pub(crate) async fn handle_candidate(&mut self, von: PeerId, kandidat: IceCandidate) {
        let ufrag = kandidat.username_fragment.as_deref();
        let Some(key) = self.registry.kandidaten_session(&von, ufrag) else {
            tracing::debug!(peer = %von, ufrag, "Kandidat ohne Session gepuffert");
            self.registry.waise_puffern(&von, kandidat);
            return;
        };
        let Some(session) = self.registry.get_mut(&key) else {
            return;
        };

        match session.add_candidate(kandidat).await {
            Ok(KandidatStatus::Gepuffert) => {
                tracing::trace!(peer = %von, key = %key, "Kandidat gepuffert");
            }
            Ok(KandidatStatus::Angewendet) => {
                tracing::trace!(peer = %von, key = %key, "Kandidat angewendet");
            }
            // Ein abgelehnter Kandidat beendet die Aushandlung nicht
            Err(e) => {
                tracing::warn!(peer = %von, key = %key, fehler = %e, "Kandidat abgelehnt");
            }
        }
    }
}
