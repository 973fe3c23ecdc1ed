//! Peer-Registry – Besitz aller Sessions eines Clients
//!
//! Eine Registry gehoert genau einem Koordinator und wird nur aus dessen
//! Event-Schleife veraendert; daher kein internes Locking.
//!
//! Neben den Sessions verwaltet sie Waisen-Puffer: Kandidaten einer
//! Gegenstelle, fuer die noch keine Session existiert. Sie werden von der
//! Session uebernommen, die spaeter fuer diese Gegenstelle angelegt oder an
//! sie gebunden wird.

use std::collections::HashMap;
use std::time::Duration;

use stranded_core::types::PeerId;
use stranded_protocol::IceCandidate;
use tokio::time::Instant;

use crate::candidate_buffer::CandidateBuffer;
use crate::session::{PeerSession, SessionKey};
use crate::transport::PeerTransport;

/// Alle Sessions und Waisen-Puffer eines Clients
pub struct PeerRegistry<T: PeerTransport> {
    sessions: HashMap<SessionKey, PeerSession<T>>,
    waisen: HashMap<PeerId, CandidateBuffer>,
    max_kandidaten: usize,
}

impl<T: PeerTransport> PeerRegistry<T> {
    /// Erstellt eine leere Registry
    pub fn neu(max_kandidaten: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            waisen: HashMap::new(),
            max_kandidaten,
        }
    }

    /// Traegt eine Session ein
    ///
    /// Eine bestehende Session mit gleichem Schluessel wird zurueckgegeben;
    /// der Aufrufer muss sie schliessen.
    #[must_use]
    pub fn einfuegen(&mut self, session: PeerSession<T>) -> Option<PeerSession<T>> {
        let key = session.key().clone();
        tracing::debug!(key = %key, session = %session.id(), "Session eingetragen");
        self.sessions.insert(key, session)
    }

    /// Nimmt eine Session aus der Registry
    pub fn entfernen(&mut self, key: &SessionKey) -> Option<PeerSession<T>> {
        self.sessions.remove(key)
    }

    /// Nimmt alle Sessions heraus und verwirft alle Waisen-Puffer
    pub fn alle_entfernen(&mut self) -> Vec<PeerSession<T>> {
        self.waisen.clear();
        self.sessions.drain().map(|(_, s)| s).collect()
    }

    pub fn get(&self, key: &SessionKey) -> Option<&PeerSession<T>> {
        self.sessions.get(key)
    }

    pub fn get_mut(&mut self, key: &SessionKey) -> Option<&mut PeerSession<T>> {
        self.sessions.get_mut(key)
    }

    pub fn enthaelt(&self, key: &SessionKey) -> bool {
        self.sessions.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Alle Schluessel (sortiert, fuer stabile Ausgaben)
    pub fn keys(&self) -> Vec<SessionKey> {
        let mut keys: Vec<_> = self.sessions.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Ist der Broadcast-Slot an `peer` gebunden?
    pub fn slot_gebunden_an(&self, peer: &PeerId) -> bool {
        self.sessions
            .get(&SessionKey::Broadcast)
            .and_then(|s| s.remote_peer())
            .is_some_and(|p| p == peer)
    }

    /// Session, die Kandidaten von `peer` entgegennimmt
    ///
    /// In Frage kommen die eigene Session der Gegenstelle und der an sie
    /// gebundene Broadcast-Slot. Mit `ufrag` gewinnt die Session, deren
    /// Remote-Beschreibung dasselbe ICE-Benutzerfragment traegt, sonst eine
    /// mit noch unbekanntem Fragment. Passt keine, ist der Kandidat eine Waise.
    /// Ohne `ufrag` hat die eigene Session Vorrang.
    pub fn kandidaten_session(
        &self,
        peer: &PeerId,
        ufrag: Option<&str>,
    ) -> Option<SessionKey> {
        let mut moeglich: Vec<(SessionKey, Option<&str>)> = Vec::with_capacity(2);
        let eigene = SessionKey::Peer(peer.clone());
        if let Some(session) = self.sessions.get(&eigene) {
            moeglich.push((eigene, session.remote_ufrag()));
        }
        if self.slot_gebunden_an(peer) {
            if let Some(slot) = self.sessions.get(&SessionKey::Broadcast) {
                moeglich.push((SessionKey::Broadcast, slot.remote_ufrag()));
            }
        }

        let Some(ufrag) = ufrag else {
            return moeglich.into_iter().next().map(|(key, _)| key);
        };
        if let Some(pos) = moeglich.iter().position(|(_, u)| *u == Some(ufrag)) {
            return Some(moeglich.swap_remove(pos).0);
        }
        moeglich
            .into_iter()
            .find(|(_, u)| u.is_none())
            .map(|(key, _)| key)
    }

    // -----------------------------------------------------------------------
    // Waisen-Puffer
    // -----------------------------------------------------------------------

    /// Puffert einen Kandidaten einer Gegenstelle ohne Session
    pub fn waise_puffern(&mut self, peer: &PeerId, kandidat: IceCandidate) {
        let max = self.max_kandidaten;
        self.waisen
            .entry(peer.clone())
            .or_insert_with(|| CandidateBuffer::neu(max))
            .puffern(kandidat);
    }

    /// Gibt den Waisen-Puffer einer Gegenstelle zur Uebernahme heraus
    pub fn waise_nehmen(&mut self, peer: &PeerId) -> Option<CandidateBuffer> {
        self.waisen.remove(peer)
    }

    /// Gibt die Waisen-Kandidaten heraus, die zu `ufrag` passen
    ///
    /// Kandidaten mit anderem Fragment gehoeren zu einer anderen Session
    /// derselben Gegenstelle und bleiben liegen.
    pub fn waise_nehmen_fuer(
        &mut self,
        peer: &PeerId,
        ufrag: Option<&str>,
    ) -> Option<CandidateBuffer> {
        let puffer = self.waisen.get_mut(peer)?;
        let passend = puffer.abtrennen(ufrag);
        if puffer.is_empty() {
            self.waisen.remove(peer);
        }
        (!passend.is_empty()).then_some(passend)
    }

    /// Verwirft den Waisen-Puffer einer Gegenstelle
    pub fn waise_verwerfen(&mut self, peer: &PeerId) -> bool {
        self.waisen.remove(peer).is_some()
    }

    pub fn waisen_anzahl(&self, peer: &PeerId) -> usize {
        self.waisen.get(peer).map_or(0, CandidateBuffer::len)
    }

    // -----------------------------------------------------------------------
    // Timeout
    // -----------------------------------------------------------------------

    /// Schluessel aller Sessions, deren Aushandlung laenger als `timeout` haengt
    pub fn abgelaufene(&self, jetzt: Instant, timeout: Duration) -> Vec<SessionKey> {
        let mut keys: Vec<_> = self
            .sessions
            .iter()
            .filter(|(_, s)| {
                s.zustand().verhandelt() && jetzt.saturating_duration_since(s.seit()) > timeout
            })
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Verwirft Waisen-Puffer, die aelter als `timeout` sind
    pub fn waisen_ablaufen(&mut self, jetzt: Instant, timeout: Duration) -> usize {
        let vorher = self.waisen.len();
        self.waisen
            .retain(|_, puffer| jetzt.saturating_duration_since(puffer.erstellt()) <= timeout);
        vorher - self.waisen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Rolle;
    use crate::testutil::{kandidat, TestTransport};
    use stranded_core::types::SessionId;
    use stranded_protocol::SessionDescription;

    fn session(key: SessionKey, rolle: Rolle) -> PeerSession<TestTransport> {
        PeerSession::neu(SessionId::new(), key, rolle, TestTransport::default(), 8)
    }

    #[test]
    fn einfuegen_gibt_vorgaenger_zurueck() {
        let mut reg = PeerRegistry::neu(8);
        let key = SessionKey::Peer(PeerId::from("x"));
        let erste = session(key.clone(), Rolle::Responder);
        let erste_id = erste.id();
        assert!(reg.einfuegen(erste).is_none());
        let alt = reg.einfuegen(session(key.clone(), Rolle::Responder));
        assert_eq!(alt.map(|s| s.id()), Some(erste_id));
        assert_eq!(reg.len(), 1, "Hoechstens eine Session pro Gegenstelle");
    }

    #[tokio::test]
    async fn kandidaten_session_reihenfolge() {
        let mut reg = PeerRegistry::neu(8);
        let x = PeerId::from("x");
        assert!(reg.kandidaten_session(&x, None).is_none());

        let mut slot = session(SessionKey::Broadcast, Rolle::Initiator);
        slot.create_offer().await.unwrap();
        slot.accept_answer(&x, SessionDescription::answer("a"))
            .await
            .unwrap();
        let _ = reg.einfuegen(slot);
        assert!(reg.slot_gebunden_an(&x));
        assert_eq!(reg.kandidaten_session(&x, None), Some(SessionKey::Broadcast));

        let _ = reg.einfuegen(session(SessionKey::Peer(x.clone()), Rolle::Responder));
        assert_eq!(
            reg.kandidaten_session(&x, None),
            Some(SessionKey::Peer(x.clone())),
            "Ohne Fragment hat die eigene Session Vorrang vor dem Slot"
        );
    }

    #[tokio::test]
    async fn kandidaten_session_nach_ufrag() {
        let mut reg = PeerRegistry::neu(8);
        let x = PeerId::from("x");

        // x ist Zuhoerer unseres Slots und sendet selbst
        let mut slot = session(SessionKey::Broadcast, Rolle::Initiator);
        slot.create_offer().await.unwrap();
        let antwort = SessionDescription::answer("a=ice-ufrag:x-antwort\r\n");
        slot.accept_answer(&x, antwort).await.unwrap();
        let _ = reg.einfuegen(slot);
        let mut responder = session(SessionKey::Peer(x.clone()), Rolle::Responder);
        responder
            .accept_offer(&x, SessionDescription::offer("a=ice-ufrag:x-slot\r\n"))
            .await
            .unwrap();
        let _ = reg.einfuegen(responder);

        assert_eq!(
            reg.kandidaten_session(&x, Some("x-antwort")),
            Some(SessionKey::Broadcast)
        );
        assert_eq!(
            reg.kandidaten_session(&x, Some("x-slot")),
            Some(SessionKey::Peer(x.clone()))
        );
        assert_eq!(
            reg.kandidaten_session(&x, Some("unbekannt")),
            None,
            "Kein passendes Fragment: Waise"
        );
    }

    #[test]
    fn waisen_nach_ufrag_uebernehmen() {
        let mut reg: PeerRegistry<TestTransport> = PeerRegistry::neu(8);
        let x = PeerId::from("x");
        reg.waise_puffern(&x, kandidat(1).mit_ufrag("eins"));
        reg.waise_puffern(&x, kandidat(2).mit_ufrag("zwei"));

        let eins = reg.waise_nehmen_fuer(&x, Some("eins")).unwrap();
        assert_eq!(eins.len(), 1);
        assert_eq!(reg.waisen_anzahl(&x), 1, "Fremdes Fragment bleibt liegen");
        assert!(reg.waise_nehmen_fuer(&x, Some("eins")).is_none());
        assert_eq!(reg.waise_nehmen_fuer(&x, None).map(|p| p.len()), Some(1));
        assert_eq!(reg.waisen_anzahl(&x), 0);
    }

    #[test]
    fn waisen_werden_uebergeben_und_verworfen() {
        let mut reg: PeerRegistry<TestTransport> = PeerRegistry::neu(8);
        let x = PeerId::from("x");
        reg.waise_puffern(&x, kandidat(1));
        reg.waise_puffern(&x, kandidat(2));
        assert_eq!(reg.waisen_anzahl(&x), 2);
        let mut puffer = reg.waise_nehmen(&x).unwrap();
        assert_eq!(puffer.entnehmen(), vec![kandidat(1), kandidat(2)]);
        assert!(reg.waise_nehmen(&x).is_none());

        reg.waise_puffern(&x, kandidat(3));
        assert!(reg.waise_verwerfen(&x));
        assert!(!reg.waise_verwerfen(&x));
    }

    #[tokio::test]
    async fn abgelaufene_nur_waehrend_aushandlung() {
        let mut reg = PeerRegistry::neu(8);
        let mut haengend = session(SessionKey::Broadcast, Rolle::Initiator);
        haengend.create_offer().await.unwrap();
        let _ = reg.einfuegen(haengend);

        let x = PeerId::from("x");
        let mut verbunden = session(SessionKey::Peer(x.clone()), Rolle::Responder);
        verbunden
            .accept_offer(&x, SessionDescription::offer("o"))
            .await
            .unwrap();
        verbunden.create_answer().await.unwrap();
        verbunden.mark_connected().unwrap();
        let _ = reg.einfuegen(verbunden);

        let timeout = Duration::from_secs(15);
        assert!(reg.abgelaufene(Instant::now(), timeout).is_empty());
        let spaeter = Instant::now() + Duration::from_secs(16);
        assert_eq!(reg.abgelaufene(spaeter, timeout), vec![SessionKey::Broadcast]);
    }

    #[test]
    fn alte_waisen_laufen_ab() {
        let mut reg: PeerRegistry<TestTransport> = PeerRegistry::neu(8);
        reg.waise_puffern(&PeerId::from("x"), kandidat(1));
        let timeout = Duration::from_secs(15);
        assert_eq!(reg.waisen_ablaufen(Instant::now(), timeout), 0);
        let spaeter = Instant::now() + Duration::from_secs(16);
        assert_eq!(reg.waisen_ablaufen(spaeter, timeout), 1);
        assert_eq!(reg.waisen_anzahl(&PeerId::from("x")), 0);
    }

    #[test]
    fn alle_entfernen_leert_auch_waisen() {
        let mut reg = PeerRegistry::neu(8);
        let _ = reg.einfuegen(session(SessionKey::Broadcast, Rolle::Initiator));
        reg.waise_puffern(&PeerId::from("y"), kandidat(1));
        assert_eq!(reg.alle_entfernen().len(), 1);
        assert!(reg.is_empty());
        assert_eq!(reg.waisen_anzahl(&PeerId::from("y")), 0);
    }
}
