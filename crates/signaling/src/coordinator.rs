//! Signaling-Koordinator – oeffentlicher Einstiegspunkt pro Client
//!
//! Der Koordinator besitzt Registry, Mikrofon-Guard und Anwesenheitsliste
//! und ist deren einziger Schreiber. Alle Operationen laufen entweder
//! direkt ueber `&mut self` oder ueber die Event-Schleife [`run`], die
//! Ereignisse aus einer einzigen Queue nacheinander abarbeitet.
//!
//! ## Event-Schleife
//! 1. Auf `Relay::ready()` warten
//! 2. Anwesenheit mit einem `join` ankuendigen
//! 3. Ereignisse seriell verarbeiten, periodisch abgelaufene Aushandlungen schliessen
//! 4. Bei `Beenden`: Uebertragung stoppen, alle Sessions schliessen
//!
//! [`run`]: SignalingCoordinator::run

use std::collections::BTreeMap;
use std::sync::Arc;

use stranded_audio::{AudioDevice, CaptureGuard};
use stranded_core::types::{PeerId, SessionId};
use stranded_protocol::SignalFrame;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::{AdressierungsModus, SignalingConfig};
use crate::error::{RelayError, SignalingError, SignalingResult};
use crate::events::{CoordinatorHandle, Ereignis, TransportEvent, TransportEventKind};
use crate::registry::PeerRegistry;
use crate::relay::Relay;
use crate::router::SignalRouter;
use crate::session::{ConnectionState, PeerSession, Rolle, SessionKey};
use crate::transport::{TransportFactory, TransportKontext};

/// Koordinator der Sprach-Signalisierung eines Clients
pub struct SignalingCoordinator<R, A, F>
where
    R: Relay,
    A: AudioDevice,
    F: TransportFactory<A::Capture>,
{
    pub(crate) local_id: PeerId,
    pub(crate) config: SignalingConfig,
    pub(crate) relay: R,
    pub(crate) audio: Arc<A>,
    pub(crate) factory: F,
    pub(crate) registry: PeerRegistry<F::Transport>,
    pub(crate) router: SignalRouter,
    /// Gesetzt genau solange eine lokale Uebertragung laeuft
    pub(crate) capture: Option<CaptureGuard<A>>,
    /// Gegenstellen, von denen ein zugestellter Frame kam, mit Zeitpunkt des letzten
    pub(crate) anwesende: BTreeMap<PeerId, Instant>,
    pub(crate) handle: CoordinatorHandle,
}

impl<R, A, F> SignalingCoordinator<R, A, F>
where
    R: Relay,
    A: AudioDevice,
    F: TransportFactory<A::Capture>,
{
    /// Erstellt einen neuen Koordinator
    ///
    /// `handle` muss zur Queue gehoeren, die spaeter an [`run`](Self::run)
    /// uebergeben wird; Transporte melden sich darueber zurueck.
    pub fn neu(
        local_id: PeerId,
        config: SignalingConfig,
        relay: R,
        audio: Arc<A>,
        factory: F,
        handle: CoordinatorHandle,
    ) -> Self {
        tracing::info!(peer = %local_id, modus = ?config.modus, "Signaling-Koordinator erstellt");
        Self {
            router: SignalRouter::neu(local_id.clone()),
            registry: PeerRegistry::neu(config.max_gepufferte_kandidaten),
            local_id,
            config,
            relay,
            audio,
            factory,
            capture: None,
            anwesende: BTreeMap::new(),
            handle,
        }
    }

    // -----------------------------------------------------------------------
    // Abfragen
    // -----------------------------------------------------------------------

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn config(&self) -> &SignalingConfig {
        &self.config
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    pub fn registry(&self) -> &PeerRegistry<F::Transport> {
        &self.registry
    }

    /// Laeuft gerade eine lokale Uebertragung?
    pub fn is_broadcasting(&self) -> bool {
        self.capture.is_some()
    }

    /// Bekannte Gegenstellen (sortiert)
    pub fn anwesende(&self) -> impl Iterator<Item = &PeerId> {
        self.anwesende.keys()
    }

    // -----------------------------------------------------------------------
    // Lokale Uebertragung
    // -----------------------------------------------------------------------

    /// Startet die lokale Uebertragung
    ///
    /// Erwirbt das Mikrofon, legt die ausgehende(n) Session(s) an und
    /// veroeffentlicht das Angebot. Schlaegt ein Schritt fehl, ist danach
    /// weder eine Session eingetragen noch das Mikrofon belegt.
    /// Waehrend einer laufenden Uebertragung wirkungslos.
    pub async fn start_local_broadcast(&mut self) -> SignalingResult<()> {
        if self.capture.is_some() {
            tracing::debug!("Uebertragung laeuft bereits");
            return Ok(());
        }
        if !self.relay.is_ready() {
            return Err(RelayError::NichtVerbunden.into());
        }

        let guard = CaptureGuard::erwerben(Arc::clone(&self.audio), &self.config.capture).await?;
        let capture = guard.capture().cloned();

        match self.config.modus {
            AdressierungsModus::Broadcast => {
                // Bei Fehler faellt `guard` hier und gibt das Mikrofon frei
                self.angebot_senden(SessionKey::Broadcast, capture).await?;
            }
            AdressierungsModus::Mesh => {
                let ziele: Vec<PeerId> = self.anwesende.keys().cloned().collect();
                for peer in ziele {
                    if let Err(e) = self
                        .angebot_senden(SessionKey::Peer(peer.clone()), capture.clone())
                        .await
                    {
                        tracing::warn!(
                            peer = %peer,
                            fehler = %e,
                            "Angebot an Gegenstelle fehlgeschlagen"
                        );
                    }
                }
            }
        }

        self.capture = Some(guard);
        tracing::info!(peer = %self.local_id, "Lokale Uebertragung gestartet");
        Ok(())
    }

    /// Beendet die lokale Uebertragung
    ///
    /// Gibt das Mikrofon frei, schliesst alle Sessions (ausgehende und
    /// eingehende), verwirft alle Kandidaten-Puffer und veroeffentlicht ein
    /// `hangup`. Ohne laufende Uebertragung wirkungslos.
    pub async fn stop_local_broadcast(&mut self) -> SignalingResult<()> {
        let Some(guard) = self.capture.take() else {
            tracing::debug!("Keine Uebertragung aktiv, Stop ignoriert");
            return Ok(());
        };

        self.alle_sessions_schliessen().await;
        guard.freigeben();

        let hangup = SignalFrame::hangup(self.local_id.clone(), None);
        if let Err(e) = self.publizieren(&hangup).await {
            tracing::warn!(fehler = %e, "Hangup konnte nicht veroeffentlicht werden");
        }
        tracing::info!(peer = %self.local_id, "Lokale Uebertragung beendet");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Eingehende Ereignisse
    // -----------------------------------------------------------------------

    /// Verarbeitet einen Roh-Payload vom Relay
    ///
    /// Nicht lesbare Payloads werden protokolliert und verworfen.
    pub async fn on_relay_payload(&mut self, payload: &str) {
        match SignalFrame::from_json(payload) {
            Ok(frame) => self.on_relay_frame(frame).await,
            Err(e) => {
                let fehler = SignalingError::InvalidFrame(e);
                tracing::warn!(fehler = %fehler, "Relay-Payload verworfen");
            }
        }
    }

    /// Verarbeitet einen Frame vom Relay; Fehler bleiben intern
    pub async fn on_relay_frame(&mut self, frame: SignalFrame) {
        self.route(frame).await;
    }

    /// Verarbeitet eine Rueckmeldung eines Transports
    ///
    /// Events einer inzwischen ersetzten oder geschlossenen Session werden verworfen.
    pub async fn on_transport_event(&mut self, event: TransportEvent) {
        let Some(session) = self.registry.get_mut(&event.key) else {
            tracing::debug!(
                key = %event.key,
                session = %event.session_id,
                "Event ohne Session verworfen"
            );
            return;
        };
        if session.id() != event.session_id {
            tracing::debug!(
                key = %event.key,
                session = %event.session_id,
                aktuell = %session.id(),
                "Veraltetes Transport-Event verworfen"
            );
            return;
        }

        match event.kind {
            TransportEventKind::LocalCandidate(kandidat) => {
                let frame = SignalFrame::candidate(
                    self.local_id.clone(),
                    session.kandidaten_ziel(),
                    kandidat,
                );
                if let Err(e) = self.publizieren(&frame).await {
                    tracing::warn!(key = %event.key, fehler = %e, "Kandidat nicht veroeffentlicht");
                }
            }
            TransportEventKind::Connected => match session.mark_connected() {
                Ok(()) => {
                    tracing::info!(key = %event.key, session = %event.session_id, "Verbunden");
                }
                Err(e) => tracing::debug!(key = %event.key, fehler = %e, "Connected ignoriert"),
            },
            TransportEventKind::Disconnected => {
                tracing::info!(
                    key = %event.key,
                    session = %event.session_id,
                    "Verbindung unterbrochen"
                );
            }
            TransportEventKind::Failed(grund) => {
                tracing::warn!(key = %event.key, grund = %grund, "Transport fehlgeschlagen");
                self.session_schliessen(&event.key).await;
                if event.key == SessionKey::Broadcast {
                    self.broadcast_erneuern().await;
                }
            }
        }
    }

    /// Schliesst Aushandlungen, die laenger als `verhandlungs_timeout` haengen
    ///
    /// Gibt die Anzahl geschlossener Sessions zurueck. Laeuft der
    /// Broadcast-Slot ab, wird ein neues Angebot veroeffentlicht.
    pub async fn expire_stale(&mut self, jetzt: Instant) -> usize {
        let timeout = self.config.verhandlungs_timeout();
        let abgelaufen = self.registry.abgelaufene(jetzt, timeout);
        let slot_abgelaufen = abgelaufen.contains(&SessionKey::Broadcast);

        for key in &abgelaufen {
            tracing::warn!(key = %key, "Aushandlung abgelaufen, Session wird geschlossen");
            self.unbeantwortet_vergessen(key);
            self.session_schliessen(key).await;
        }

        let waisen = self.registry.waisen_ablaufen(jetzt, timeout);
        if waisen > 0 {
            tracing::debug!(anzahl = waisen, "Abgelaufene Waisen-Puffer verworfen");
        }

        if slot_abgelaufen {
            self.broadcast_erneuern().await;
        }
        abgelaufen.len()
    }

    // -----------------------------------------------------------------------
    // Event-Schleife
    // -----------------------------------------------------------------------

    /// Verarbeitet ein einzelnes Queue-Ereignis
    ///
    /// Gibt `false` zurueck wenn die Schleife enden soll.
    pub async fn verarbeiten(&mut self, ereignis: Ereignis) -> bool {
        match ereignis {
            Ereignis::Start(antwort) => {
                let ergebnis = self.start_local_broadcast().await;
                if let Err(e) = &ergebnis {
                    tracing::warn!(fehler = %e, "Start der Uebertragung fehlgeschlagen");
                }
                let _ = antwort.send(ergebnis);
            }
            Ereignis::Stop(antwort) => {
                let _ = antwort.send(self.stop_local_broadcast().await);
            }
            Ereignis::RelayPayload(payload) => self.on_relay_payload(&payload).await,
            Ereignis::Transport(event) => self.on_transport_event(event).await,
            Ereignis::Beenden => return false,
        }
        true
    }

    /// Event-Schleife des Koordinators
    ///
    /// Laeuft bis `Beenden` eintrifft oder alle Handles verworfen sind.
    pub async fn run(mut self, mut events: mpsc::Receiver<Ereignis>) {
        self.relay.ready().await;
        tracing::info!(peer = %self.local_id, "Relay bereit, Anwesenheit wird angekuendigt");

        let join = SignalFrame::join(self.local_id.clone(), None);
        if let Err(e) = self.publizieren(&join).await {
            tracing::warn!(fehler = %e, "Join konnte nicht veroeffentlicht werden");
        }

        let mut sweep = tokio::time::interval(self.config.sweep_intervall());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                ereignis = events.recv() => {
                    let Some(ereignis) = ereignis else { break };
                    if !self.verarbeiten(ereignis).await {
                        break;
                    }
                }
                _ = sweep.tick() => {
                    self.expire_stale(Instant::now()).await;
                }
            }
        }

        if let Err(e) = self.stop_local_broadcast().await {
            tracing::warn!(fehler = %e, "Stop beim Beenden fehlgeschlagen");
        }
        self.alle_sessions_schliessen().await;
        tracing::info!(peer = %self.local_id, "Signaling-Koordinator beendet");
    }

    /// Startet die Event-Schleife als tokio-Task
    pub fn starten(self, events: mpsc::Receiver<Ereignis>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }

    // -----------------------------------------------------------------------
    // Intern (auch von den Handlern genutzt)
    // -----------------------------------------------------------------------

    /// Serialisiert und veroeffentlicht einen Frame
    pub(crate) async fn publizieren(&self, frame: &SignalFrame) -> SignalingResult<()> {
        let payload = frame.to_json()?;
        tracing::debug!(
            typ = %frame.tag(),
            ziel = ?frame.target_id.as_ref().map(PeerId::as_str),
            "Frame wird veroeffentlicht"
        );
        self.relay.publish(payload).await?;
        Ok(())
    }

    /// Aktueller Capture-Handle, falls eine Uebertragung laeuft
    pub(crate) fn aktuelle_capture(&self) -> Option<A::Capture> {
        self.capture.as_ref().and_then(|g| g.capture().cloned())
    }

    /// Erzeugt einen Transport fuer eine neue Session unter `key`
    pub(crate) async fn transport_erzeugen(
        &self,
        key: &SessionKey,
        session_id: SessionId,
        capture: Option<A::Capture>,
    ) -> SignalingResult<F::Transport> {
        let kontext = TransportKontext {
            key: key.clone(),
            session_id,
            events: self.handle.transport_events(key.clone(), session_id),
        };
        Ok(self.factory.create(kontext, capture).await?)
    }

    /// Legt eine Initiator-Session unter `key` an und veroeffentlicht ihr Angebot
    ///
    /// Eine bestehende Session unter `key` wird vorher geschlossen. Schlaegt
    /// Erzeugung oder Veroeffentlichung fehl, bleibt nichts eingetragen.
    pub(crate) async fn angebot_senden(
        &mut self,
        key: SessionKey,
        capture: Option<A::Capture>,
    ) -> SignalingResult<()> {
        self.session_schliessen(&key).await;

        let session_id = SessionId::new();
        let transport = self.transport_erzeugen(&key, session_id, capture).await?;
        let mut session = PeerSession::neu(
            session_id,
            key.clone(),
            Rolle::Initiator,
            transport,
            self.config.max_gepufferte_kandidaten,
        );
        if let SessionKey::Peer(peer) = &key {
            if let Some(waise) = self.registry.waise_nehmen(peer) {
                session.kandidaten_uebernehmen(waise).await;
            }
        }

        let offer = match session.create_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                session.close().await;
                return Err(e);
            }
        };

        let frame = SignalFrame::offer(self.local_id.clone(), key.peer().cloned(), offer);
        if let Err(e) = self.publizieren(&frame).await {
            session.close().await;
            return Err(e);
        }

        tracing::info!(key = %key, session = %session_id, "Angebot veroeffentlicht");
        if let Some(mut alt) = self.registry.einfuegen(session) {
            alt.close().await;
        }
        Ok(())
    }

    /// Erneuert den Broadcast-Slot, falls im Broadcast-Modus uebertragen wird
    pub(crate) async fn broadcast_erneuern(&mut self) {
        if self.config.modus != AdressierungsModus::Broadcast {
            return;
        }
        let Some(capture) = self.aktuelle_capture() else {
            return;
        };
        tracing::info!("Broadcast-Slot wird neu angeboten");
        if let Err(e) = self.angebot_senden(SessionKey::Broadcast, Some(capture)).await {
            tracing::warn!(fehler = %e, "Neues Broadcast-Angebot fehlgeschlagen");
        }
    }

    /// Schliesst und entfernt die Session unter `key`
    pub(crate) async fn session_schliessen(&mut self, key: &SessionKey) -> bool {
        match self.registry.entfernen(key) {
            Some(mut session) => {
                session.close().await;
                true
            }
            None => false,
        }
    }

    async fn alle_sessions_schliessen(&mut self) {
        for mut session in self.registry.alle_entfernen() {
            session.close().await;
        }
    }

    /// Vergisst eine Gegenstelle, die unser gezieltes Angebot nie beantwortet hat
    fn unbeantwortet_vergessen(&mut self, key: &SessionKey) {
        let SessionKey::Peer(peer) = key else {
            return;
        };
        let unbeantwortet = self.registry.get(key).is_some_and(|s| {
            s.rolle() == Rolle::Initiator && s.zustand() == ConnectionState::OfferSent
        });
        if unbeantwortet && self.anwesende.remove(peer).is_some() {
            tracing::info!(peer = %peer, "Gegenstelle antwortet nicht, nicht mehr anwesend");
        }
    }
}
