//! Lokale und entfernte Audio-Spuren
//!
//! [`SpurGeraet`] stellt das Mikrofon als lokalen Opus-Track bereit,
//! [`RtpEmpfaenger`] nimmt Remote-Tracks ohne Ausgabegeraet entgegen.
//! Das eigentliche Kodieren und Abspielen liegt beim Client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use stranded_audio::{AudioDevice, AudioError, AudioResult, CaptureConstraints, PlaybackSink};
use stranded_core::types::{PeerId, SessionId};
use tokio::task::JoinHandle;
use webrtc::api::media_engine::MIME_TYPE_OPUS;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

/// Erstellt einen lokalen Opus-Track (48 kHz, Stereo-Signalisierung wie im Browser)
pub fn opus_spur(
    id: impl Into<String>,
    stream_id: impl Into<String>,
) -> Arc<TrackLocalStaticSample> {
    Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
            rtcp_feedback: vec![],
        },
        id.into(),
        stream_id.into(),
    ))
}

// ---------------------------------------------------------------------------
// SpurGeraet
// ---------------------------------------------------------------------------

/// Mikrofon als lokaler WebRTC-Track
///
/// Jede Erwerbung liefert einen frischen Track; solange er nicht
/// freigegeben ist, wird jede weitere Erwerbung mit `GeraetBelegt` abgelehnt.
#[derive(Debug)]
pub struct SpurGeraet {
    stream_id: String,
    belegt: AtomicBool,
    erwerbungen: AtomicU64,
}

impl SpurGeraet {
    pub fn neu(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            belegt: AtomicBool::new(false),
            erwerbungen: AtomicU64::new(0),
        }
    }

    pub fn ist_belegt(&self) -> bool {
        self.belegt.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioDevice for SpurGeraet {
    type Capture = Arc<TrackLocalStaticSample>;

    async fn acquire(&self, constraints: &CaptureConstraints) -> AudioResult<Self::Capture> {
        if self.belegt.swap(true, Ordering::SeqCst) {
            return Err(AudioError::GeraetBelegt);
        }
        let nr = self.erwerbungen.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            stream = %self.stream_id,
            nr,
            echo_cancellation = constraints.echo_cancellation,
            noise_suppression = constraints.noise_suppression,
            auto_gain_control = constraints.auto_gain_control,
            "Mikrofon-Track erstellt"
        );
        Ok(opus_spur(format!("mikrofon-{nr}"), self.stream_id.clone()))
    }

    fn release(&self, _capture: Self::Capture) {
        self.belegt.store(false, Ordering::SeqCst);
        tracing::debug!(stream = %self.stream_id, "Mikrofon-Track freigegeben");
    }
}

// ---------------------------------------------------------------------------
// RtpEmpfaenger
// ---------------------------------------------------------------------------

struct Empfang {
    session: SessionId,
    task: JoinHandle<()>,
    pakete: Arc<AtomicU64>,
}

/// Wiedergabe-Senke ohne Ausgabegeraet
///
/// Liest jeden Remote-Track in einem eigenen Task leer und zaehlt die
/// empfangenen RTP-Pakete. Pro Gegenstelle laeuft hoechstens ein Empfang;
/// beenden darf ihn nur die Session, die ihn gestartet hat.
#[derive(Default)]
pub struct RtpEmpfaenger {
    laufend: Mutex<HashMap<PeerId, Empfang>>,
}

impl RtpEmpfaenger {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Bisher empfangene Pakete von `peer`, falls ein Empfang laeuft
    pub fn pakete(&self, peer: &PeerId) -> Option<u64> {
        self.laufend
            .lock()
            .get(peer)
            .map(|e| e.pakete.load(Ordering::Relaxed))
    }

    /// Session, der der laufende Empfang von `peer` gehoert
    pub fn session(&self, peer: &PeerId) -> Option<SessionId> {
        self.laufend.lock().get(peer).map(|e| e.session)
    }

    /// Anzahl laufender Empfaenge
    pub fn aktive(&self) -> usize {
        self.laufend.lock().len()
    }

    fn eintragen(&self, peer: &PeerId, empfang: Empfang) {
        let alt = self.laufend.lock().insert(peer.clone(), empfang);
        if let Some(alt) = alt {
            alt.task.abort();
            tracing::debug!(peer = %peer, alt = %alt.session, "Vorheriger Empfang ersetzt");
        }
    }
}

impl PlaybackSink<Arc<TrackRemote>> for RtpEmpfaenger {
    fn play(&self, peer: &PeerId, session: SessionId, track: Arc<TrackRemote>) {
        let pakete = Arc::new(AtomicU64::new(0));
        let zaehler = Arc::clone(&pakete);
        let von = peer.clone();

        let task = tokio::spawn(async move {
            while let Ok((paket, _)) = track.read_rtp().await {
                zaehler.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(peer = %von, seq = paket.header.sequence_number, "RTP empfangen");
            }
            tracing::debug!(peer = %von, "Remote-Track beendet");
        });

        tracing::info!(peer = %peer, session = %session, "Wiedergabe gestartet");
        self.eintragen(
            peer,
            Empfang {
                session,
                task,
                pakete,
            },
        );
    }

    fn stop(&self, peer: &PeerId, session: SessionId) {
        let mut laufend = self.laufend.lock();
        if laufend.get(peer).is_some_and(|e| e.session != session) {
            tracing::debug!(peer = %peer, session = %session, "Empfang gehoert anderer Session");
            return;
        }
        if let Some(empfang) = laufend.remove(peer) {
            empfang.task.abort();
            tracing::info!(peer = %peer, session = %session, "Wiedergabe beendet");
        }
    }
}
