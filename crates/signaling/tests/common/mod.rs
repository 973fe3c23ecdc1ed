//! Gemeinsame Test-Doubles fuer die Integration-Tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use stranded_audio::{AudioDevice, AudioError, AudioResult, CaptureConstraints};
use stranded_core::types::{PeerId, SessionId};
use stranded_protocol::{IceCandidate, SessionDescription, SignalFrame};
use stranded_signaling::{
    AdressierungsModus, CoordinatorHandle, Ereignis, PeerTransport, Relay, RelayError,
    SessionKey, SignalingConfig, SignalingCoordinator, TransportError, TransportEventKind,
    TransportEvents, TransportFactory, TransportKontext, TransportResult,
};
use tokio::sync::{mpsc, watch};

pub type TestKoordinator = SignalingCoordinator<TestRelay, TestAudio, TestFactory>;

pub fn kandidat(n: u32) -> IceCandidate {
    IceCandidate::neu(format!("candidate:{n} 1 udp 2122260223 10.0.0.{n} 5000 typ host"))
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// Zeichnet veroeffentlichte Payloads auf, stellt nichts zu
#[derive(Clone)]
pub struct TestRelay {
    gesendet: Arc<Mutex<Vec<String>>>,
    bereit: Arc<watch::Sender<bool>>,
}

impl TestRelay {
    pub fn neu() -> Self {
        let (tx, _) = watch::channel(true);
        Self {
            gesendet: Arc::default(),
            bereit: Arc::new(tx),
        }
    }

    pub fn set_bereit(&self, bereit: bool) {
        self.bereit.send_replace(bereit);
    }

    /// Alle bisher veroeffentlichten Frames
    pub fn frames(&self) -> Vec<SignalFrame> {
        self.gesendet
            .lock()
            .unwrap()
            .iter()
            .map(|p| SignalFrame::from_json(p).expect("Koordinator sendet gueltiges JSON"))
            .collect()
    }

    /// Frames veroeffentlicht seit dem letzten Aufruf
    pub fn neue_frames(&self) -> Vec<SignalFrame> {
        let payloads: Vec<String> = self.gesendet.lock().unwrap().drain(..).collect();
        payloads
            .iter()
            .map(|p| SignalFrame::from_json(p).expect("Koordinator sendet gueltiges JSON"))
            .collect()
    }
}

#[async_trait]
impl Relay for TestRelay {
    async fn publish(&self, payload: String) -> Result<(), RelayError> {
        if !self.is_ready() {
            return Err(RelayError::NichtVerbunden);
        }
        self.gesendet.lock().unwrap().push(payload);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        *self.bereit.borrow()
    }

    async fn ready(&self) {
        let mut rx = self.bereit.subscribe();
        let _ = rx.wait_for(|b| *b).await;
    }
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

/// Capture-Handle: laufende Nummer der Erwerbung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestCapture(pub usize);

#[derive(Default)]
pub struct TestAudio {
    erworben: AtomicUsize,
    freigegeben: AtomicUsize,
    verweigern: AtomicBool,
}

impl TestAudio {
    pub fn verweigern(&self, ja: bool) {
        self.verweigern.store(ja, Ordering::SeqCst);
    }

    pub fn erworben(&self) -> usize {
        self.erworben.load(Ordering::SeqCst)
    }

    pub fn freigegeben(&self) -> usize {
        self.freigegeben.load(Ordering::SeqCst)
    }

    /// Erwerbungen ohne Freigabe
    pub fn gehalten(&self) -> usize {
        self.erworben() - self.freigegeben()
    }
}

#[async_trait]
impl AudioDevice for TestAudio {
    type Capture = TestCapture;

    async fn acquire(&self, _constraints: &CaptureConstraints) -> AudioResult<TestCapture> {
        if self.verweigern.load(Ordering::SeqCst) {
            return Err(AudioError::ZugriffVerweigert);
        }
        Ok(TestCapture(self.erworben.fetch_add(1, Ordering::SeqCst)))
    }

    fn release(&self, _capture: TestCapture) {
        self.freigegeben.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Aufzeichnung eines erzeugten Transports
#[derive(Default)]
pub struct TransportLog {
    pub remote_von: Vec<PeerId>,
    pub remote_beschreibungen: Vec<SessionDescription>,
    pub kandidaten: Vec<IceCandidate>,
    pub geschlossen: usize,
}

#[derive(Clone)]
pub struct TestTransport {
    pub key: SessionKey,
    pub session_id: SessionId,
    pub capture: Option<TestCapture>,
    pub events: TransportEvents,
    pub log: Arc<Mutex<TransportLog>>,
    schalter: Arc<Schalter>,
}

impl TestTransport {
    pub fn kandidaten(&self) -> Vec<IceCandidate> {
        self.log.lock().unwrap().kandidaten.clone()
    }

    pub fn remote_von(&self) -> Vec<PeerId> {
        self.log.lock().unwrap().remote_von.clone()
    }

    pub fn geschlossen(&self) -> usize {
        self.log.lock().unwrap().geschlossen
    }

    /// Ereignis, wie es der Transport selbst melden wuerde
    pub fn ereignis(&self, kind: TransportEventKind) -> stranded_signaling::TransportEvent {
        stranded_signaling::TransportEvent {
            key: self.key.clone(),
            session_id: self.session_id,
            kind,
        }
    }
}

#[async_trait]
impl PeerTransport for TestTransport {
    async fn create_offer(&self) -> TransportResult<SessionDescription> {
        if self.schalter.offer_ablehnen.load(Ordering::SeqCst) {
            return Err(TransportError::aushandlung("kein Angebot moeglich"));
        }
        Ok(SessionDescription::offer(format!("v=0 offer {}", self.session_id)))
    }

    async fn create_answer(&self) -> TransportResult<SessionDescription> {
        Ok(SessionDescription::answer(format!("v=0 answer {}", self.session_id)))
    }

    async fn set_remote_description(
        &self,
        remote: &PeerId,
        description: SessionDescription,
    ) -> TransportResult<()> {
        if self.schalter.remote_ablehnen.load(Ordering::SeqCst) {
            return Err(TransportError::aushandlung("SDP ungueltig"));
        }
        let mut log = self.log.lock().unwrap();
        log.remote_von.push(remote.clone());
        log.remote_beschreibungen.push(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> TransportResult<()> {
        self.log.lock().unwrap().kandidaten.push(candidate);
        Ok(())
    }

    async fn close(&self) {
        self.log.lock().unwrap().geschlossen += 1;
    }
}

#[derive(Default)]
struct Schalter {
    offer_ablehnen: AtomicBool,
    remote_ablehnen: AtomicBool,
}

/// Erzeugt `TestTransport`s und merkt sich jeden davon
#[derive(Clone, Default)]
pub struct TestFactory {
    erzeugt: Arc<Mutex<Vec<TestTransport>>>,
    schalter: Arc<Schalter>,
}

impl TestFactory {
    pub fn offer_ablehnen(&self, ja: bool) {
        self.schalter.offer_ablehnen.store(ja, Ordering::SeqCst);
    }

    pub fn remote_ablehnen(&self, ja: bool) {
        self.schalter.remote_ablehnen.store(ja, Ordering::SeqCst);
    }

    pub fn erzeugt(&self) -> Vec<TestTransport> {
        self.erzeugt.lock().unwrap().clone()
    }

    /// Zuletzt erzeugter Transport fuer `key`
    pub fn letzter(&self, key: &SessionKey) -> TestTransport {
        self.erzeugt()
            .into_iter()
            .rev()
            .find(|t| &t.key == key)
            .expect("Transport fuer Key erwartet")
    }
}

#[async_trait]
impl TransportFactory<TestCapture> for TestFactory {
    type Transport = TestTransport;

    async fn create(
        &self,
        kontext: TransportKontext,
        capture: Option<TestCapture>,
    ) -> TransportResult<TestTransport> {
        let transport = TestTransport {
            key: kontext.key,
            session_id: kontext.session_id,
            capture,
            events: kontext.events,
            log: Arc::default(),
            schalter: Arc::clone(&self.schalter),
        };
        self.erzeugt.lock().unwrap().push(transport.clone());
        Ok(transport)
    }
}

// ---------------------------------------------------------------------------
// Aufbau
// ---------------------------------------------------------------------------

/// Koordinator mit allen Doubles
pub struct Umgebung {
    pub koordinator: TestKoordinator,
    pub relay: TestRelay,
    pub audio: Arc<TestAudio>,
    pub factory: TestFactory,
    pub events: mpsc::Receiver<Ereignis>,
}

pub fn umgebung(local: &str, modus: AdressierungsModus) -> Umgebung {
    let config = SignalingConfig {
        modus,
        ..Default::default()
    };
    umgebung_mit(local, config)
}

pub fn umgebung_mit(local: &str, config: SignalingConfig) -> Umgebung {
    let (handle, events) = CoordinatorHandle::kanal(config.event_queue_groesse);
    let relay = TestRelay::neu();
    let audio = Arc::new(TestAudio::default());
    let factory = TestFactory::default();
    let koordinator = SignalingCoordinator::neu(
        PeerId::from(local),
        config,
        relay.clone(),
        Arc::clone(&audio),
        factory.clone(),
        handle,
    );
    Umgebung {
        koordinator,
        relay,
        audio,
        factory,
        events,
    }
}
