//! stranded-core – Gemeinsame Identifikationstypen
//!
//! Dieses Crate stellt die Bausteine bereit, die von Protokoll, Signaling
//! und Audio gemeinsam genutzt werden.

pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use types::{PeerId, SessionId};
