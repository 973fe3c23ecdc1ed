//! stranded-protocol – Signal-Frames und Wire-Format
//!
//! Dieses Crate definiert die JSON-Frames, die Clients ueber das Relay
//! austauschen, sowie den laengen-praefixierten Codec fuer TCP-Relays.

pub mod signal;
pub mod wire;

pub use signal::{IceCandidate, SdpType, SessionDescription, SignalFrame, SignalPayload, SignalTag};
pub use wire::FrameCodec;
