//! Signal-Frames (Relay-Protokoll)
//!
//! Definiert die Nachrichten, die Clients ueber das Publish/Subscribe-Relay
//! austauschen, um WebRTC-Sessions auszuhandeln.
//!
//! ## Design
//! - UTF-8 JSON, Feldnamen fest fuer Interoperabilitaet mit Browser-Clients
//! - `type` als Tag, Payload je nach Tag in `offer`, `answer` oder `candidate`
//! - `targetId` fehlt bei Broadcast-Frames
//!
//! ```text
//! { "type": "offer", "senderId": "peer_a", "offer": { "type": "offer", "sdp": "v=0..." } }
//! { "type": "candidate", "senderId": "peer_b", "targetId": "peer_a",
//!   "candidate": { "candidate": "candidate:1 ...", "sdpMid": "0", "sdpMLineIndex": 0 } }
//! ```

use serde::{Deserialize, Serialize};
use stranded_core::types::PeerId;

// ---------------------------------------------------------------------------
// Session-Beschreibung
// ---------------------------------------------------------------------------

/// Art einer Session-Beschreibung (`RTCSdpType`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Session-Beschreibung (`{type, sdp}`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    /// Erstellt eine Offer-Beschreibung
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Erstellt eine Answer-Beschreibung
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    /// ICE-Benutzerfragment (`a=ice-ufrag:`) der Beschreibung
    ///
    /// Kandidaten derselben Gegenseite tragen es als `usernameFragment`.
    /// Bei mehreren Media-Abschnitten gilt das erste Vorkommen.
    pub fn ice_ufrag(&self) -> Option<&str> {
        self.sdp
            .lines()
            .find_map(|zeile| zeile.trim_end().strip_prefix("a=ice-ufrag:"))
            .filter(|ufrag| !ufrag.is_empty())
    }
}

// ---------------------------------------------------------------------------
// ICE-Kandidat
// ---------------------------------------------------------------------------

/// Netzwerk-Kandidat (`RTCIceCandidateInit`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    /// Erstellt einen Kandidaten ohne Media-Zuordnung
    pub fn neu(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }

    /// Setzt das ICE-Benutzerfragment der sendenden Verbindung
    pub fn mit_ufrag(mut self, ufrag: impl Into<String>) -> Self {
        self.username_fragment = Some(ufrag.into());
        self
    }
}

// ---------------------------------------------------------------------------
// SignalFrame
// ---------------------------------------------------------------------------

/// Tag-spezifischer Inhalt eines Frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalPayload {
    Offer { offer: SessionDescription },
    Answer { answer: SessionDescription },
    Candidate { candidate: IceCandidate },
    /// Anwesenheits-Hinweis, keine Zustandsaenderung noetig
    Join,
    /// Gegenstelle beendet ihre Sessions
    Hangup,
}

/// Tag eines Frames ohne Payload (fuer Logging und Entscheidungstabellen)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalTag {
    Offer,
    Answer,
    Candidate,
    Join,
    Hangup,
}

impl std::fmt::Display for SignalTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SignalTag::Offer => "offer",
            SignalTag::Answer => "answer",
            SignalTag::Candidate => "candidate",
            SignalTag::Join => "join",
            SignalTag::Hangup => "hangup",
        };
        f.write_str(name)
    }
}

/// Ein Signal-Frame auf dem Relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalFrame {
    /// Absender (Pflichtfeld)
    pub sender_id: PeerId,
    /// Empfaenger – `None` bedeutet Broadcast
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<PeerId>,
    #[serde(flatten)]
    pub payload: SignalPayload,
}

impl SignalFrame {
    /// Erstellt einen Frame mit beliebigem Payload
    pub fn new(sender_id: PeerId, target_id: Option<PeerId>, payload: SignalPayload) -> Self {
        Self {
            sender_id,
            target_id,
            payload,
        }
    }

    /// Offer-Frame
    pub fn offer(
        sender_id: PeerId,
        target_id: Option<PeerId>,
        offer: SessionDescription,
    ) -> Self {
        Self::new(sender_id, target_id, SignalPayload::Offer { offer })
    }

    /// Answer-Frame
    pub fn answer(
        sender_id: PeerId,
        target_id: Option<PeerId>,
        answer: SessionDescription,
    ) -> Self {
        Self::new(sender_id, target_id, SignalPayload::Answer { answer })
    }

    /// Candidate-Frame
    pub fn candidate(
        sender_id: PeerId,
        target_id: Option<PeerId>,
        candidate: IceCandidate,
    ) -> Self {
        Self::new(sender_id, target_id, SignalPayload::Candidate { candidate })
    }

    /// Join-Frame
    pub fn join(sender_id: PeerId, target_id: Option<PeerId>) -> Self {
        Self::new(sender_id, target_id, SignalPayload::Join)
    }

    /// Hangup-Frame
    pub fn hangup(sender_id: PeerId, target_id: Option<PeerId>) -> Self {
        Self::new(sender_id, target_id, SignalPayload::Hangup)
    }

    /// Gibt den Tag des Frames zurueck
    pub fn tag(&self) -> SignalTag {
        match self.payload {
            SignalPayload::Offer { .. } => SignalTag::Offer,
            SignalPayload::Answer { .. } => SignalTag::Answer,
            SignalPayload::Candidate { .. } => SignalTag::Candidate,
            SignalPayload::Join => SignalTag::Join,
            SignalPayload::Hangup => SignalTag::Hangup,
        }
    }

    /// Serialisiert den Frame als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert einen Frame aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
