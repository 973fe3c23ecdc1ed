//! Gemeinsame Identifikationstypen fuer Stranded Voice
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! Peer-Kennungen und Session-Kennungen zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Praefix aller lokal generierten Peer-IDs
const PEER_PRAEFIX: &str = "peer_";

/// Kennung eines Clients auf dem Relay
///
/// Wird einmal beim Start des Clients erzeugt und fuer seine gesamte
/// Lebensdauer gehalten. Auf dem Draht ein einfacher String (`senderId`,
/// `targetId`), daher `#[serde(transparent)]`. Fremde IDs werden nicht
/// validiert – jede Zeichenkette ist eine gueltige Gegenstelle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Erzeugt eine neue zufaellige lokale Peer-ID (`peer_<uuid>`)
    pub fn generieren() -> Self {
        Self(format!("{PEER_PRAEFIX}{}", Uuid::new_v4().simple()))
    }

    /// Gibt die ID als String-Slice zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kennung einer einzelnen Peer-Session
///
/// Jede neu angelegte Session bekommt eine frische ID. Transport-Events
/// tragen diese ID, damit Events einer bereits geschlossenen Session
/// erkannt und verworfen werden koennen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Erstellt eine neue zufaellige SessionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}
