//! stranded-audio – Audio-Grenzen des Voice-Clients
//!
//! Die eigentliche Audio-Hardware liegt ausserhalb dieses Workspaces.
//! Dieses Crate beschreibt nur die Schnittstellen, ueber die die
//! Signalisierung mit ihr spricht:
//! - Mikrofon-Zugriff (`AudioDevice`) mit Capture-Constraints
//! - Scoped Freigabe des Mikrofons (`CaptureGuard`)
//! - Wiedergabe entfernter Streams (`PlaybackSink`)
//! - Push-to-Talk (Hold, Toggle)

pub mod device;
pub mod error;
pub mod ptt;

// Bequeme Re-Exporte der wichtigsten Typen
pub use device::{AudioDevice, CaptureConstraints, CaptureGuard, PlaybackSink};
pub use error::{AudioError, AudioResult};
pub use ptt::{PttAktion, PttConfig, PttController, PttMode};
