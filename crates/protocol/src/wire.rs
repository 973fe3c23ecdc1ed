//! Wire-Format fuer TCP-Relay-Verbindungen
//!
//! Frame-basiertes Protokoll: Length(u32 big-endian) + UTF-8-Payload.
//! Das Relay interpretiert den Payload nicht; Clients legen dort
//! serialisierte [`SignalFrame`](crate::signal::SignalFrame)s ab.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE) | 4 Bytes        | Payload    |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Die Laenge gibt die Anzahl der Payload-Bytes an (ohne die 4 Laengen-Bytes).
//! Maximale Frame-Groesse ist konfigurierbar (Standard: 64 KiB).

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (64 KiB – SDPs sind wenige KiB gross)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer Relay-Verbindungen
///
/// Implementiert `Encoder<String>` und `Decoder<Item = String>` fuer
/// `tokio_util::codec::Framed`.
///
/// # Beispiel
///
/// ```rust,no_run
/// use tokio_util::codec::Framed;
/// use stranded_protocol::wire::FrameCodec;
///
/// // let stream = TcpStream::connect(...).await?;
/// // let framed = Framed::new(stream, FrameCodec::new());
/// ```
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Maximale erlaubte Frame-Groesse in Bytes
    max_frame_size: usize,
}

impl FrameCodec {
    /// Erstellt einen neuen `FrameCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Erstellt einen `FrameCodec` mit benutzerdefinierter maximaler Frame-Groesse
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Gibt die konfigurierte maximale Frame-Groesse zurueck
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl Decoder for FrameCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Warte auf mindestens 4 Bytes fuer das Laengen-Feld
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        // Laenge lesen ohne den Buffer zu veraendern
        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

        if length > self.max_frame_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Frame zu gross: {} Bytes (Maximum: {} Bytes)",
                    length, self.max_frame_size
                ),
            ));
        }

        let total_size = LENGTH_FIELD_SIZE + length;
        if src.len() < total_size {
            // Speicher vorbelegen um Reallocations zu vermeiden
            src.reserve(total_size - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_SIZE);
        let payload = src.split_to(length);

        let text = String::from_utf8(payload.to_vec()).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Payload ist kein gueltiges UTF-8: {}", e),
            )
        })?;

        Ok(Some(text))
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierung
// ---------------------------------------------------------------------------

impl Encoder<String> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = item.as_bytes();

        if bytes.len() > self.max_frame_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Nachricht zu gross: {} Bytes (Maximum: {} Bytes)",
                    bytes.len(),
                    self.max_frame_size
                ),
            ));
        }

        dst.reserve(LENGTH_FIELD_SIZE + bytes.len());
        dst.put_u32(bytes.len() as u32);
        dst.put_slice(bytes);

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn laengenfeld_ist_big_endian() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("hallo".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..4], &[0, 0, 0, 5]);
        assert_eq!(&buf[4..], b"hallo");
    }

    #[test]
    fn unvollstaendiger_frame_wartet() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("{\"type\":\"join\"}".to_string(), &mut buf).unwrap();

        let mut teil = buf.split_to(6);
        assert!(codec.decode(&mut teil).unwrap().is_none());
        teil.unsplit(buf);
        assert_eq!(codec.decode(&mut teil).unwrap().unwrap(), "{\"type\":\"join\"}");
        assert!(teil.is_empty());
    }

    #[test]
    fn mehrere_frames_im_buffer() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("a".to_string(), &mut buf).unwrap();
        codec.encode("bc".to_string(), &mut buf).unwrap();
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "a");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "bc");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn zu_grosser_frame_wird_abgelehnt() {
        let mut codec = FrameCodec::with_max_size(8);
        let mut buf = BytesMut::new();
        buf.put_u32(9);
        buf.put_slice(b"123456789");
        let fehler = codec.decode(&mut buf).unwrap_err();
        assert_eq!(fehler.kind(), io::ErrorKind::InvalidData);

        let mut out = BytesMut::new();
        assert!(codec.encode("123456789".to_string(), &mut out).is_err());
    }

    #[test]
    fn ungueltiges_utf8_wird_abgelehnt() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(2);
        buf.put_slice(&[0xff, 0xfe]);
        assert!(codec.decode(&mut buf).is_err());
    }
}
