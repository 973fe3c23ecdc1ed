//! Join-Handler – Anwesenheit
//!
//! Im Broadcast-Modus nur ein Hinweis. Im Mesh-Modus wird ein
//! ungezieltes `join` mit einem gezielten beantwortet, damit der Neuling
//! uns kennt, und waehrend einer Uebertragung bekommt eine Gegenstelle
//! ohne Session sofort ein Angebot.

use stranded_audio::AudioDevice;
use stranded_core::types::PeerId;
use stranded_protocol::SignalFrame;

use crate::config::AdressierungsModus;
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
    pub(crate) async fn handle_join(&mut self, von: PeerId, gezielt: bool, neu: bool) {
        tracing::info!(peer = %von, neu, "Gegenstelle anwesend");
        if self.config.modus != AdressierungsModus::Mesh {
            return;
        }

        if !gezielt {
            let antwort = SignalFrame::join(self.local_id.clone(), Some(von.clone()));
            if let Err(e) = self.publizieren(&antwort).await {
                tracing::warn!(peer = %von, fehler = %e, "Join-Antwort nicht veroeffentlicht");
            }
        }

        let key = SessionKey::Peer(von.clone());
        let Some(capture) = self.aktuelle_capture() else {
            return;
        };
        if self.registry.enthaelt(&key) {
            return;
        }
        if let Err(e) = self.angebot_senden(key, Some(capture)).await {
            tracing::warn!(peer = %von, fehler = %e, "Angebot an neue Gegenstelle fehlgeschlagen");
        }
    }
}
