//! WebRTC-Transport – eine `RTCPeerConnection` pro Session
//!
//! ## Ablauf
//! - Initiator: Mikrofon-Track anhaengen, dann `create_offer`
//! - Responder: `set_remote_description(offer)`, dann Track anhaengen
//!   (der Transceiver aus dem Angebot wird wiederverwendet), dann `create_answer`
//!
//! Lokale Kandidaten und Zustandswechsel werden ueber [`TransportEvents`]
//! an den Koordinator gemeldet, Remote-Tracks gehen an die Wiedergabe-Senke.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use stranded_audio::PlaybackSink;
use stranded_core::types::{PeerId, SessionId};
use stranded_protocol::{IceCandidate, SdpType, SessionDescription};
use stranded_signaling::{
    PeerTransport, SessionKey, TransportError, TransportEventKind, TransportEvents,
    TransportFactory, TransportKontext, TransportResult,
};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::config::RtcConfig;
use crate::error::{RtcError, RtcResult};

/// Senke fuer eingehende Remote-Tracks
pub type Wiedergabe = Arc<dyn PlaybackSink<Arc<TrackRemote>>>;

/// Lokaler Mikrofon-Track
pub type LokaleSpur = Arc<TrackLocalStaticSample>;

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Erzeugt fuer jede Session eine eigene Peer-Verbindung
pub struct WebRtcTransportFactory {
    config: RtcConfig,
    wiedergabe: Wiedergabe,
}

impl WebRtcTransportFactory {
    pub fn neu(config: RtcConfig, wiedergabe: Wiedergabe) -> Self {
        Self { config, wiedergabe }
    }

    pub fn config(&self) -> &RtcConfig {
        &self.config
    }
}

/// Baut die WebRTC-API mit Standard-Codecs (Opus) und Interceptoren
fn api_bauen() -> RtcResult<API> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .map_err(RtcError::Aufbau)?;
    let registry = register_default_interceptors(Registry::new(), &mut media_engine)
        .map_err(RtcError::Aufbau)?;
    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

#[async_trait]
impl TransportFactory<LokaleSpur> for WebRtcTransportFactory {
    type Transport = WebRtcTransport;

    async fn create(
        &self,
        kontext: TransportKontext,
        capture: Option<LokaleSpur>,
    ) -> TransportResult<WebRtcTransport> {
        let api = api_bauen()?;
        let rtc_config = RTCConfiguration {
            ice_servers: self.config.rtc_ice_servers(),
            ..Default::default()
        };
        let pc = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(RtcError::Aufbau)?,
        );

        let remote = Arc::new(Mutex::new(None));
        let lokal_ufrag = Arc::new(Mutex::new(None));
        rueckmeldungen_verdrahten(
            &pc,
            kontext.events,
            Rueckmeldung {
                remote: Arc::clone(&remote),
                lokal_ufrag: Arc::clone(&lokal_ufrag),
                wiedergabe: Arc::clone(&self.wiedergabe),
            },
        );

        tracing::debug!(
            key = %kontext.key,
            session = %kontext.session_id,
            sendet = capture.is_some(),
            "Peer-Verbindung erstellt"
        );

        Ok(WebRtcTransport {
            pc,
            key: kontext.key,
            session_id: kontext.session_id,
            capture,
            capture_angehaengt: AtomicBool::new(false),
            remote,
            lokal_ufrag,
            wiedergabe: Arc::clone(&self.wiedergabe),
            geschlossen: AtomicBool::new(false),
        })
    }
}

/// Geteilter Zustand zwischen Transport und Callbacks
struct Rueckmeldung {
    remote: Arc<Mutex<Option<PeerId>>>,
    /// ICE-Benutzerfragment der eigenen Beschreibung
    lokal_ufrag: Arc<Mutex<Option<String>>>,
    wiedergabe: Wiedergabe,
}

/// Verbindet die Callbacks der Peer-Verbindung mit Koordinator und Wiedergabe
fn rueckmeldungen_verdrahten(
    pc: &RTCPeerConnection,
    events: TransportEvents,
    rueckmeldung: Rueckmeldung,
) {
    let Rueckmeldung {
        remote,
        lokal_ufrag,
        wiedergabe,
    } = rueckmeldung;

    let kandidaten = events.clone();
    pc.on_ice_candidate(Box::new(move |kandidat: Option<RTCIceCandidate>| {
        let events = kandidaten.clone();
        let ufrag = lokal_ufrag.lock().clone();
        Box::pin(async move {
            let Some(kandidat) = kandidat else {
                tracing::debug!(key = %events.key(), "ICE-Sammlung abgeschlossen");
                return;
            };
            match kandidat.to_json() {
                Ok(init) => {
                    let mut kandidat = kandidat_aus_init(init);
                    // Die Gegenstelle ordnet Kandidaten ueber das Fragment zu
                    if kandidat.username_fragment.is_none() {
                        kandidat.username_fragment = ufrag;
                    }
                    events
                        .melden(TransportEventKind::LocalCandidate(kandidat))
                        .await
                }
                Err(e) => {
                    tracing::warn!(
                        key = %events.key(),
                        fehler = %e,
                        "Lokaler Kandidat unbrauchbar"
                    );
                }
            }
        })
    }));

    let zustand = events.clone();
    pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
        let events = zustand.clone();
        Box::pin(async move {
            tracing::debug!(
                key = %events.key(),
                session = %events.session_id(),
                zustand = ?s,
                "Verbindungszustand"
            );
            let kind = match s {
                RTCPeerConnectionState::Connected => TransportEventKind::Connected,
                RTCPeerConnectionState::Disconnected => TransportEventKind::Disconnected,
                RTCPeerConnectionState::Failed => {
                    TransportEventKind::Failed("Peer-Verbindung fehlgeschlagen".to_owned())
                }
                _ => return,
            };
            events.melden(kind).await;
        })
    }));

    let session = events.session_id();
    pc.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
        let peer = remote.lock().clone();
        match peer {
            Some(peer) => wiedergabe.play(&peer, session, track),
            None => tracing::warn!("Remote-Track ohne bekannte Gegenstelle verworfen"),
        }
        Box::pin(async {})
    }));
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Peer-Verbindung einer einzelnen Session
pub struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
    key: SessionKey,
    session_id: SessionId,
    capture: Option<LokaleSpur>,
    capture_angehaengt: AtomicBool,
    /// Gegenstelle, sobald ihre Beschreibung gesetzt wurde (fuer `on_track`)
    remote: Arc<Mutex<Option<PeerId>>>,
    lokal_ufrag: Arc<Mutex<Option<String>>>,
    wiedergabe: Wiedergabe,
    geschlossen: AtomicBool,
}

impl WebRtcTransport {
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Sendet diese Verbindung das eigene Mikrofon?
    pub fn sendet(&self) -> bool {
        self.capture.is_some()
    }

    pub fn verbindungszustand(&self) -> RTCPeerConnectionState {
        self.pc.connection_state()
    }

    fn offen(&self) -> TransportResult<()> {
        if self.geschlossen.load(Ordering::SeqCst) {
            return Err(TransportError::Geschlossen);
        }
        Ok(())
    }

    /// Haengt den Mikrofon-Track genau einmal an
    async fn capture_anhaengen(&self) -> RtcResult<()> {
        let Some(spur) = &self.capture else {
            return Ok(());
        };
        if self.capture_angehaengt.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let sender = self
            .pc
            .add_track(Arc::clone(spur) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(RtcError::bei("Mikrofon-Track anhaengen"))?;

        // RTCP muss gelesen werden, sonst laufen die Interceptoren nicht
        tokio::spawn(async move {
            let mut puffer = vec![0u8; 1500];
            while sender.read(&mut puffer).await.is_ok() {}
        });
        tracing::debug!(key = %self.key, "Mikrofon-Track angehaengt");
        Ok(())
    }

    /// Merkt sich das Fragment, bevor die ICE-Sammlung beginnt
    fn lokal_setzen(&self, beschreibung: &SessionDescription) {
        *self.lokal_ufrag.lock() = beschreibung.ice_ufrag().map(str::to_owned);
    }

    /// Ohne Mikrofon trotzdem Audio empfangen koennen
    async fn empfang_vorbereiten(&self) -> RtcResult<()> {
        if self.capture.is_some() || !self.pc.get_transceivers().await.is_empty() {
            return Ok(());
        }
        self.pc
            .add_transceiver_from_kind(
                RTPCodecType::Audio,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(RtcError::bei("Empfangs-Transceiver anlegen"))?;
        Ok(())
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn create_offer(&self) -> TransportResult<SessionDescription> {
        self.offen()?;
        self.capture_anhaengen().await?;
        self.empfang_vorbereiten().await?;

        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(RtcError::bei("Angebot erstellen"))?;
        let beschreibung = SessionDescription::offer(offer.sdp.clone());
        self.lokal_setzen(&beschreibung);
        self.pc
            .set_local_description(offer)
            .await
            .map_err(RtcError::bei("Lokale Beschreibung setzen"))?;
        Ok(beschreibung)
    }

    async fn create_answer(&self) -> TransportResult<SessionDescription> {
        self.offen()?;
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(RtcError::bei("Antwort erstellen"))?;
        let beschreibung = SessionDescription::answer(answer.sdp.clone());
        self.lokal_setzen(&beschreibung);
        self.pc
            .set_local_description(answer)
            .await
            .map_err(RtcError::bei("Lokale Beschreibung setzen"))?;
        Ok(beschreibung)
    }

    async fn set_remote_description(
        &self,
        remote: &PeerId,
        description: SessionDescription,
    ) -> TransportResult<()> {
        self.offen()?;
        let kind = description.kind;
        let rtc = beschreibung_nach_rtc(description)?;

        *self.remote.lock() = Some(remote.clone());
        self.pc
            .set_remote_description(rtc)
            .await
            .map_err(RtcError::bei("Remote-Beschreibung setzen"))?;

        if kind == SdpType::Offer {
            self.capture_anhaengen().await?;
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> TransportResult<()> {
        self.offen()?;
        self.pc
            .add_ice_candidate(kandidat_nach_init(candidate))
            .await
            .map_err(RtcError::bei("Kandidat anwenden"))?;
        Ok(())
    }

    async fn close(&self) {
        if self.geschlossen.swap(true, Ordering::SeqCst) {
            return;
        }
        let peer = self.remote.lock().take();
        if let Some(peer) = peer {
            self.wiedergabe.stop(&peer, self.session_id);
        }
        if let Err(e) = self.pc.close().await {
            tracing::warn!(
                key = %self.key,
                fehler = %e,
                "Peer-Verbindung nicht sauber geschlossen"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Umwandlungen
// ---------------------------------------------------------------------------

fn beschreibung_nach_rtc(description: SessionDescription) -> RtcResult<RTCSessionDescription> {
    let SessionDescription { kind, sdp } = description;
    match kind {
        SdpType::Offer => RTCSessionDescription::offer(sdp),
        SdpType::Answer => RTCSessionDescription::answer(sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(sdp),
        SdpType::Rollback => return Err(RtcError::NichtUnterstuetzt("rollback")),
    }
    .map_err(RtcError::bei("SDP lesen"))
}

pub(crate) fn kandidat_aus_init(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_mline_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

pub(crate) fn kandidat_nach_init(kandidat: IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: kandidat.candidate,
        sdp_mid: kandidat.sdp_mid,
        sdp_mline_index: kandidat.sdp_mline_index,
        username_fragment: kandidat.username_fragment,
    }
}
