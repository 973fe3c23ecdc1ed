//! Answer-Handler – Antwort auf ein eigenes Angebot anwenden
//!
//! Gesucht wird die Session, die auf eine Antwort wartet: die eigene
//! Initiator-Session zum Absender, sonst der Broadcast-Slot. Fehlt sie oder
//! steht sie nicht in `OfferSent`, ist die Antwort doppelt oder veraltet und
//! wird verworfen. Die erste angenommene Antwort bindet den Slot an ihren
//! Absender.

use stranded_audio::AudioDevice;
use stranded_core::types::PeerId;
use stranded_protocol::SessionDescription;

use crate::coordinator::SignalingCoordinator;
use crate::error::SignalingError;
use crate::relay::Relay;
use crate::session::{ConnectionState, Rolle, SessionKey};
use crate::transport::TransportFactory;

impl<R, A, F> SignalingCoordinator<R, A, F>
where
    R: Relay,
    A: AudioDevice,
    F: TransportFactory<A::Capture>,
{
    pub(crate) async fn handle_answer(&mut self, von: PeerId, answer: SessionDescription) {
        let eigene = SessionKey::Peer(von.clone());
        let key = match self.registry.get(&eigene) {
            Some(s) if s.rolle() == Rolle::Initiator => eigene,
            _ => SessionKey::Broadcast,
        };

        let wartet = self
            .registry
            .get(&key)
            .is_some_and(|s| s.zustand() == ConnectionState::OfferSent);
        if !wartet {
            let fehler = SignalingError::unerwartet(format!(
                "keine Session wartet auf eine Antwort von {von}"
            ));
            tracing::debug!(peer = %von, key = %key, fehler = %fehler, "Antwort verworfen");
            return;
        }

        let waise = self.registry.waise_nehmen_fuer(&von, answer.ice_ufrag());
        let Some(session) = self.registry.get_mut(&key) else {
            return;
        };
        if let Some(waise) = waise {
            session.kandidaten_uebernehmen(waise).await;
        }

        match session.accept_answer(&von, answer).await {
            Ok(()) => {
                tracing::info!(
                    peer = %von,
                    key = %key,
                    session = %session.id(),
                    "Antwort angenommen"
                );
            }
            Err(SignalingError::UnexpectedSignalingState(grund)) => {
                tracing::debug!(peer = %von, grund = %grund, "Antwort verworfen");
            }
            Err(e) => {
                tracing::warn!(
                    peer = %von,
                    key = %key,
                    fehler = %e,
                    "Antwort abgelehnt, Session wird geschlossen"
                );
                self.session_schliessen(&key).await;
                if key == SessionKey::Broadcast {
                    self.broadcast_erneuern().await;
                }
            }
        }
    }
}
