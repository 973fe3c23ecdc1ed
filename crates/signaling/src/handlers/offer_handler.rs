//! Offer-Handler – fremdes Angebot beantworten
//!
//! Legt eine Responder-Session fuer den Absender an (eine bestehende wird
//! vorher geschlossen), wendet das Angebot an, uebernimmt verfruehte
//! Kandidaten und veroeffentlicht die Antwort gezielt an den Absender.
//!
//! ## Glare (Mesh)
//! Haben beide Seiten gleichzeitig ein Angebot geschickt, behaelt die
//! Seite mit der lexikografisch groesseren ID ihr eigenes Angebot und
//! ignoriert das fremde. Die kleinere ID gibt nach und antwortet.

use stranded_audio::AudioDevice;
use stranded_core::types::{PeerId, SessionId};
use stranded_protocol::{SessionDescription, SignalFrame};

use crate::config::AdressierungsModus;
use crate::coordinator::SignalingCoordinator;
use crate::error::SignalingResult;
use crate::relay::Relay;
use crate::session::{ConnectionState, PeerSession, Rolle, SessionKey};
use crate::transport::TransportFactory;

impl<R, A, F> SignalingCoordinator<R, A, F>
where
    R: Relay,
    A: AudioDevice,
    F: TransportFactory<A::Capture>,
{
    pub(crate) async fn handle_offer(&mut self, von: PeerId, offer: SessionDescription) {
        let key = SessionKey::Peer(von.clone());

        if let Some(bestehend) = self.registry.get(&key) {
            let glare = bestehend.rolle() == Rolle::Initiator
                && bestehend.zustand() == ConnectionState::OfferSent;
            if glare && self.local_id > von {
                tracing::debug!(peer = %von, "Glare: eigenes Angebot hat Vorrang");
                return;
            }
            tracing::debug!(
                peer = %von,
                alt = %bestehend.id(),
                glare,
                "Bestehende Session wird durch neues Angebot ersetzt"
            );
            self.session_schliessen(&key).await;
        }

        // Im Mesh traegt jede Session beide Richtungen
        let capture = match self.config.modus {
            AdressierungsModus::Mesh => self.aktuelle_capture(),
            AdressierungsModus::Broadcast => None,
        };

        let session_id = SessionId::new();
        let transport = match self.transport_erzeugen(&key, session_id, capture).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(peer = %von, fehler = %e, "Transport fuer Angebot nicht erzeugt");
                return;
            }
        };
        let mut session = PeerSession::neu(
            session_id,
            key.clone(),
            Rolle::Responder,
            transport,
            self.config.max_gepufferte_kandidaten,
        );
        if let Some(waise) = self.registry.waise_nehmen_fuer(&von, offer.ice_ufrag()) {
            tracing::debug!(peer = %von, anzahl = waise.len(), "Waisen-Kandidaten uebernommen");
            session.kandidaten_uebernehmen(waise).await;
        }

        let answer = match angebot_beantworten(&mut session, &von, offer).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(peer = %von, fehler = %e, "Angebot konnte nicht angewendet werden");
                session.close().await;
                return;
            }
        };

        if let Some(mut alt) = self.registry.einfuegen(session) {
            alt.close().await;
        }

        let frame = SignalFrame::answer(self.local_id.clone(), Some(von.clone()), answer);
        match self.publizieren(&frame).await {
            Ok(()) => tracing::info!(peer = %von, session = %session_id, "Antwort gesendet"),
            // Session bleibt; ohne Antwort laeuft sie ueber den Timeout ab
            Err(e) => tracing::warn!(peer = %von, fehler = %e, "Antwort nicht veroeffentlicht"),
        }
    }
}

async fn angebot_beantworten<T: crate::transport::PeerTransport>(
    session: &mut PeerSession<T>,
    von: &PeerId,
    offer: SessionDescription,
) -> SignalingResult<SessionDescription> {
    session.accept_offer(von, offer).await?;
    session.create_answer().await
}
