//! stranded-rtc – WebRTC-Anbindung der Sprach-Signalisierung
//!
//! Implementiert [`stranded_signaling::TransportFactory`] auf Basis von
//! `webrtc`: jede Session bekommt eine eigene `RTCPeerConnection`. Das
//! Mikrofon ist ein lokaler Opus-Track ([`SpurGeraet`]), eingehende Tracks
//! gehen an eine [`stranded_audio::PlaybackSink`].

pub mod config;
pub mod error;
pub mod track;
pub mod transport;

pub use config::{IceServerEintrag, RtcConfig};
pub use error::{RtcError, RtcResult};
pub use track::{opus_spur, RtpEmpfaenger, SpurGeraet};
pub use transport::{LokaleSpur, Wiedergabe, WebRtcTransport, WebRtcTransportFactory};
