//! Peer-Session – Zustandsmaschine einer einzelnen Aushandlung
//!
//! ## State Machine
//! ```text
//! New --create_offer--> OfferSent --accept_answer--> AnswerReceived --+
//!  |                                                                  +--> Connected
//!  +--accept_offer--> OfferReceived --create_answer--> AnswerSent ----+
//!
//! jeder Zustand --close--> Closed (absorbierend)
//! ```
//!
//! Jede andere Transition wird mit `UnexpectedSignalingState` abgelehnt.
//! Eine geschlossene Session wird nie wieder geoeffnet; ein spaeteres Signal
//! derselben Gegenstelle fuehrt zu einer neuen Session mit neuer `SessionId`.

use stranded_core::types::{PeerId, SessionId};
use stranded_protocol::{IceCandidate, SessionDescription};
use tokio::time::Instant;

use crate::candidate_buffer::CandidateBuffer;
use crate::error::{SignalingError, SignalingResult, TransportError};
use crate::transport::PeerTransport;

// ---------------------------------------------------------------------------
// SessionKey
// ---------------------------------------------------------------------------

/// Schluessel einer Session in der Registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SessionKey {
    /// Reservierter Slot fuer die ausgehende Broadcast-Session
    Broadcast,
    /// Session mit genau einer Gegenstelle
    Peer(PeerId),
}

impl SessionKey {
    /// Gegenstelle des Schluessels (nur bei `Peer`)
    pub fn peer(&self) -> Option<&PeerId> {
        match self {
            SessionKey::Broadcast => None,
            SessionKey::Peer(id) => Some(id),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionKey::Broadcast => f.write_str("broadcast"),
            SessionKey::Peer(id) => write!(f, "{id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Rolle und Zustand
// ---------------------------------------------------------------------------

/// Rolle der lokalen Seite in der Aushandlung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rolle {
    /// Lokale Seite hat das Angebot erstellt
    Initiator,
    /// Lokale Seite beantwortet ein fremdes Angebot
    Responder,
}

/// Verbindungszustand einer Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    OfferSent,
    OfferReceived,
    AnswerSent,
    AnswerReceived,
    Connected,
    Closed,
}

impl ConnectionState {
    /// Prueft ob die Transition `self -> ziel` erlaubt ist
    pub fn darf_wechseln_zu(self, ziel: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, ziel),
            (New, OfferSent)
                | (New, OfferReceived)
                | (OfferReceived, AnswerSent)
                | (OfferSent, AnswerReceived)
                | (AnswerSent, Connected)
                | (AnswerReceived, Connected)
        ) || (ziel == Closed && self != Closed)
    }

    /// Aushandlung begonnen aber noch nicht verbunden
    pub fn verhandelt(self) -> bool {
        use ConnectionState::*;
        matches!(self, New | OfferSent | OfferReceived | AnswerSent | AnswerReceived)
    }
}

/// Was mit einem eingereichten Kandidaten passiert ist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KandidatStatus {
    /// Remote-Beschreibung fehlt noch, Kandidat wartet im Puffer
    Gepuffert,
    /// Direkt an den Transport gegeben
    Angewendet,
}

// ---------------------------------------------------------------------------
// PeerSession
// ---------------------------------------------------------------------------

/// Eine Aushandlung mit einer Gegenstelle bzw. im Broadcast-Slot
pub struct PeerSession<T: PeerTransport> {
    id: SessionId,
    key: SessionKey,
    rolle: Rolle,
    zustand: ConnectionState,
    remote_description_set: bool,
    /// `None` nach dem Schliessen – der Transport wird genau einmal geschlossen
    transport: Option<T>,
    puffer: CandidateBuffer,
    /// Gegenstelle deren Beschreibung angewendet wurde (bindet den Broadcast-Slot)
    remote_peer: Option<PeerId>,
    /// ICE-Benutzerfragment der Remote-Beschreibung, ordnet eingehende Kandidaten zu
    remote_ufrag: Option<String>,
    /// Zeitpunkt der letzten Transition
    seit: Instant,
}

impl<T: PeerTransport> PeerSession<T> {
    /// Erstellt eine neue Session im Zustand `New`
    pub fn neu(
        id: SessionId,
        key: SessionKey,
        rolle: Rolle,
        transport: T,
        max_kandidaten: usize,
    ) -> Self {
        let remote_peer = key.peer().cloned();
        Self {
            id,
            key,
            rolle,
            zustand: ConnectionState::New,
            remote_description_set: false,
            transport: Some(transport),
            puffer: CandidateBuffer::neu(max_kandidaten),
            remote_peer,
            remote_ufrag: None,
            seit: Instant::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn rolle(&self) -> Rolle {
        self.rolle
    }

    pub fn zustand(&self) -> ConnectionState {
        self.zustand
    }

    pub fn remote_description_set(&self) -> bool {
        self.remote_description_set
    }

    pub fn remote_peer(&self) -> Option<&PeerId> {
        self.remote_peer.as_ref()
    }

    pub fn remote_ufrag(&self) -> Option<&str> {
        self.remote_ufrag.as_deref()
    }

    pub fn seit(&self) -> Instant {
        self.seit
    }

    pub fn gepufferte_kandidaten(&self) -> usize {
        self.puffer.len()
    }

    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Ziel fuer eigene Kandidaten: die Gegenstelle, beim ungebundenen Slot niemand
    pub fn kandidaten_ziel(&self) -> Option<PeerId> {
        self.remote_peer.clone()
    }

    /// Initiator: erzeugt das Angebot (`New -> OfferSent`)
    pub async fn create_offer(&mut self) -> SignalingResult<SessionDescription> {
        self.pruefen(Rolle::Initiator, ConnectionState::OfferSent, "Angebot erstellen")?;
        let offer = self.aktiver_transport()?.create_offer().await?;
        self.wechseln(ConnectionState::OfferSent)?;
        Ok(offer)
    }

    /// Responder: wendet das Angebot von `von` an (`New -> OfferReceived`)
    /// und wendet danach gepufferte Kandidaten an
    pub async fn accept_offer(
        &mut self,
        von: &PeerId,
        offer: SessionDescription,
    ) -> SignalingResult<()> {
        self.pruefen(
            Rolle::Responder,
            ConnectionState::OfferReceived,
            "Angebot annehmen",
        )?;
        let ufrag = offer.ice_ufrag().map(str::to_owned);
        self.aktiver_transport()?
            .set_remote_description(von, offer)
            .await?;
        self.wechseln(ConnectionState::OfferReceived)?;
        self.remote_gesetzt(von, ufrag).await;
        Ok(())
    }

    /// Responder: erzeugt die Antwort (`OfferReceived -> AnswerSent`)
    pub async fn create_answer(&mut self) -> SignalingResult<SessionDescription> {
        self.pruefen(Rolle::Responder, ConnectionState::AnswerSent, "Antwort erstellen")?;
        let answer = self.aktiver_transport()?.create_answer().await?;
        self.wechseln(ConnectionState::AnswerSent)?;
        Ok(answer)
    }

    /// Initiator: wendet die Antwort von `von` an (`OfferSent -> AnswerReceived`)
    /// und wendet danach gepufferte Kandidaten an
    pub async fn accept_answer(
        &mut self,
        von: &PeerId,
        answer: SessionDescription,
    ) -> SignalingResult<()> {
        self.pruefen(
            Rolle::Initiator,
            ConnectionState::AnswerReceived,
            "Antwort annehmen",
        )?;
        let ufrag = answer.ice_ufrag().map(str::to_owned);
        self.aktiver_transport()?
            .set_remote_description(von, answer)
            .await?;
        self.wechseln(ConnectionState::AnswerReceived)?;
        self.remote_gesetzt(von, ufrag).await;
        Ok(())
    }

    /// Reicht einen Kandidaten der Gegenstelle ein
    ///
    /// Ohne Remote-Beschreibung wird gepuffert, sonst direkt angewendet.
    pub async fn add_candidate(
        &mut self,
        kandidat: IceCandidate,
    ) -> SignalingResult<KandidatStatus> {
        if self.zustand == ConnectionState::Closed {
            return Err(SignalingError::unerwartet(format!(
                "Kandidat fuer geschlossene {}",
                self.id
            )));
        }
        if !self.remote_description_set {
            self.puffer.puffern(kandidat);
            return Ok(KandidatStatus::Gepuffert);
        }
        self.aktiver_transport()?.add_ice_candidate(kandidat).await?;
        Ok(KandidatStatus::Angewendet)
    }

    /// Uebernimmt einen Waisen-Puffer derselben Gegenstelle
    pub async fn kandidaten_uebernehmen(&mut self, waise: CandidateBuffer) {
        if self.remote_description_set {
            let mut waise = waise;
            for kandidat in waise.entnehmen() {
                if let Err(e) = self.add_candidate(kandidat).await {
                    tracing::warn!(session = %self.id, fehler = %e, "Kandidat abgelehnt");
                }
            }
        } else {
            self.puffer.anhaengen(waise);
        }
    }

    /// Transport meldet fliessende Medien (`Answer* -> Connected`)
    pub fn mark_connected(&mut self) -> SignalingResult<()> {
        self.wechseln(ConnectionState::Connected)
    }

    /// Schliesst die Session; weitere Aufrufe sind wirkungslos
    pub async fn close(&mut self) {
        if self.zustand == ConnectionState::Closed {
            return;
        }
        self.zustand = ConnectionState::Closed;
        self.seit = Instant::now();
        self.puffer.verwerfen();
        if let Some(transport) = self.transport.take() {
            transport.close().await;
        }
        tracing::debug!(session = %self.id, key = %self.key, "Session geschlossen");
    }

    // -----------------------------------------------------------------------
    // Intern
    // -----------------------------------------------------------------------

    fn pruefen(&self, rolle: Rolle, ziel: ConnectionState, aktion: &str) -> SignalingResult<()> {
        if self.rolle != rolle || !self.zustand.darf_wechseln_zu(ziel) {
            return Err(SignalingError::unerwartet(format!(
                "{aktion} nicht moeglich: {} ist {:?} im Zustand {:?}",
                self.id, self.rolle, self.zustand
            )));
        }
        Ok(())
    }

    fn wechseln(&mut self, ziel: ConnectionState) -> SignalingResult<()> {
        if !self.zustand.darf_wechseln_zu(ziel) {
            return Err(SignalingError::unerwartet(format!(
                "{:?} -> {:?} fuer {}",
                self.zustand, ziel, self.id
            )));
        }
        tracing::trace!(session = %self.id, von = ?self.zustand, nach = ?ziel, "Transition");
        self.zustand = ziel;
        self.seit = Instant::now();
        Ok(())
    }

    fn aktiver_transport(&self) -> Result<&T, TransportError> {
        self.transport.as_ref().ok_or(TransportError::Geschlossen)
    }

    /// Remote-Beschreibung steht: Gegenstelle binden, Puffer genau einmal leeren
    async fn remote_gesetzt(&mut self, von: &PeerId, ufrag: Option<String>) {
        self.remote_description_set = true;
        self.remote_ufrag = ufrag;
        if self.remote_peer.is_none() {
            self.remote_peer = Some(von.clone());
        }
        let gepuffert = self.puffer.entnehmen();
        if gepuffert.is_empty() {
            return;
        }
        tracing::debug!(
            session = %self.id,
            anzahl = gepuffert.len(),
            "Gepufferte Kandidaten werden angewendet"
        );
        let Some(transport) = self.transport.as_ref() else {
            return;
        };
        for kandidat in gepuffert {
            // Einzelne fehlerhafte Kandidaten beenden die Aushandlung nicht
            if let Err(e) = transport.add_ice_candidate(kandidat).await {
                tracing::warn!(session = %self.id, fehler = %e, "Gepufferter Kandidat abgelehnt");
            }
        }
    }
}

impl<T: PeerTransport> std::fmt::Debug for PeerSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("rolle", &self.rolle)
            .field("zustand", &self.zustand)
            .field("remote_description_set", &self.remote_description_set)
            .field("remote_peer", &self.remote_peer)
            .field("remote_ufrag", &self.remote_ufrag)
            .field("gepuffert", &self.puffer.len())
            .finish()
    }
}
