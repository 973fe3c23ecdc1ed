//! stranded-signaling – Sprach-Signalisierung fuer die Spiel-Lobby
//!
//! Dieser Crate handelt WebRTC-Sessions zwischen Clients ueber ein
//! gemeinsames Publish/Subscribe-Relay aus. Pro Client gibt es genau einen
//! `SignalingCoordinator`, der alle Ereignisse seriell verarbeitet.
//!
//! ## Architektur
//!
//! ```text
//! Relay (TcpRelay / MemoryRelay)       Transport-Callbacks
//!     |  JSON-Payloads                      |  TransportEvent
//!     v                                     v
//! CoordinatorHandle ---- mpsc-Queue ----> SignalingCoordinator::run
//!                                           |
//!                                           +-- SignalRouter  (Eigenecho, Ziel-Filter)
//!                                           |     +-- Offer / Answer / Candidate / Join / Hangup
//!                                           +-- PeerRegistry  (SessionKey -> PeerSession)
//!                                           |     +-- CandidateBuffer je Session + Waisen-Puffer
//!                                           +-- CaptureGuard  (Mikrofon, max. eine Uebertragung)
//! ```

pub mod candidate_buffer;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod handlers;
pub mod memory;
pub mod registry;
pub mod relay;
pub mod router;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

// Bequeme Re-Exporte
pub use candidate_buffer::CandidateBuffer;
pub use config::{AdressierungsModus, SignalingConfig};
pub use coordinator::SignalingCoordinator;
pub use error::{
    RelayError, RelayResult, SignalingError, SignalingResult, TransportError, TransportResult,
};
pub use events::{CoordinatorHandle, Ereignis, TransportEvent, TransportEventKind, TransportEvents};
pub use memory::{MemoryHub, MemoryRelay};
pub use registry::PeerRegistry;
pub use relay::{Relay, TcpRelay};
pub use router::{SignalRouter, Zustellung};
pub use session::{ConnectionState, KandidatStatus, PeerSession, Rolle, SessionKey};
pub use transport::{PeerTransport, TransportFactory, TransportKontext};
