//! Mikrofon-Zugriff und Wiedergabe-Senke
//!
//! `AudioDevice` liefert einen Capture-Handle fuer das lokale Mikrofon,
//! `PlaybackSink` nimmt entfernte Medienstroeme entgegen. Beide werden von
//! der Signalisierung nur ueber diese Traits angesprochen.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stranded_core::types::{PeerId, SessionId};
use tracing::debug;

use crate::error::AudioResult;

// ---------------------------------------------------------------------------
// Capture-Constraints
// ---------------------------------------------------------------------------

/// Anforderungen an den Mikrofon-Stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Lokales Eingabegeraet
///
/// `acquire` darf fehlschlagen (kein Geraet, Zugriff verweigert). Jeder
/// erfolgreich erworbene Capture-Handle muss genau einmal mit `release`
/// zurueckgegeben werden; [`CaptureGuard`] erledigt das automatisch.
#[async_trait]
pub trait AudioDevice: Send + Sync + 'static {
    /// Handle auf den laufenden Mikrofon-Stream (z.B. ein lokaler Track)
    type Capture: Clone + Send + Sync + 'static;

    /// Oeffnet das Mikrofon mit den gegebenen Constraints
    async fn acquire(&self, constraints: &CaptureConstraints) -> AudioResult<Self::Capture>;

    /// Gibt das Mikrofon wieder frei
    fn release(&self, capture: Self::Capture);
}

/// Senke fuer entfernte Medienstroeme
///
/// `M` ist der Medientyp des Transports (bei WebRTC der Remote-Track).
/// Pro Gegenstelle spielt hoechstens ein Stream; er gehoert der Session,
/// die ihn gestartet hat.
pub trait PlaybackSink<M>: Send + Sync + 'static {
    /// Startet die Wiedergabe des Streams von `peer` fuer `session`
    ///
    /// Ein laufender Stream derselben Gegenstelle wird ersetzt.
    fn play(&self, peer: &PeerId, session: SessionId, media: M);

    /// Beendet die Wiedergabe fuer `peer`, sofern sie zu `session` gehoert
    ///
    /// Idempotent. Gehoert der Stream inzwischen einer anderen Session,
    /// bleibt er unberuehrt.
    fn stop(&self, peer: &PeerId, session: SessionId);
}

// ---------------------------------------------------------------------------
// CaptureGuard
// ---------------------------------------------------------------------------

/// Besitzt einen erworbenen Capture-Handle und gibt ihn beim Drop frei
///
/// Wird der Guard auf einem Fehlerpfad (oder durch Abbruch des umgebenden
/// Futures) fallengelassen, ist das Mikrofon danach wieder frei.
pub struct CaptureGuard<A: AudioDevice> {
    device: Arc<A>,
    capture: Option<A::Capture>,
}

impl<A: AudioDevice> CaptureGuard<A> {
    /// Erwirbt das Mikrofon und verpackt den Handle in einen Guard
    pub async fn erwerben(device: Arc<A>, constraints: &CaptureConstraints) -> AudioResult<Self> {
        let capture = device.acquire(constraints).await?;
        debug!(?constraints, "Mikrofon erworben");
        Ok(Self {
            device,
            capture: Some(capture),
        })
    }

    /// Gibt den Capture-Handle zurueck
    pub fn capture(&self) -> Option<&A::Capture> {
        self.capture.as_ref()
    }

    /// Gibt das Mikrofon explizit frei
    pub fn freigeben(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(capture) = self.capture.take() {
            self.device.release(capture);
            debug!("Mikrofon freigegeben");
        }
    }
}

impl<A: AudioDevice> Drop for CaptureGuard<A> {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl<A: AudioDevice> std::fmt::Debug for CaptureGuard<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureGuard")
            .field("aktiv", &self.capture.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AudioError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct ZaehlGeraet {
        erworben: AtomicUsize,
        freigegeben: AtomicUsize,
        verweigern: AtomicBool,
    }

    #[async_trait]
    impl AudioDevice for ZaehlGeraet {
        type Capture = u32;

        async fn acquire(&self, _constraints: &CaptureConstraints) -> AudioResult<u32> {
            if self.verweigern.load(Ordering::SeqCst) {
                return Err(AudioError::ZugriffVerweigert);
            }
            Ok(self.erworben.fetch_add(1, Ordering::SeqCst) as u32)
        }

        fn release(&self, _capture: u32) {
            self.freigegeben.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn constraints_standardmaessig_alle_aktiv() {
        let c = CaptureConstraints::default();
        assert!(c.echo_cancellation && c.noise_suppression && c.auto_gain_control);
    }

    #[test]
    fn constraints_teilweise_aus_toml() {
        let c: CaptureConstraints = toml::from_str("noise_suppression = false").unwrap();
        assert!(c.echo_cancellation);
        assert!(!c.noise_suppression);
    }

    #[tokio::test]
    async fn guard_gibt_beim_drop_frei() {
        let geraet = Arc::new(ZaehlGeraet::default());
        {
            let guard = CaptureGuard::erwerben(geraet.clone(), &CaptureConstraints::default())
                .await
                .unwrap();
            assert_eq!(guard.capture(), Some(&0));
        }
        assert_eq!(geraet.freigegeben.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn explizite_freigabe_nur_einmal() {
        let geraet = Arc::new(ZaehlGeraet::default());
        let guard = CaptureGuard::erwerben(geraet.clone(), &CaptureConstraints::default())
            .await
            .unwrap();
        guard.freigeben();
        assert_eq!(geraet.freigegeben.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn verweigerter_zugriff_haelt_nichts() {
        let geraet = Arc::new(ZaehlGeraet::default());
        geraet.verweigern.store(true, Ordering::SeqCst);
        let ergebnis =
            CaptureGuard::erwerben(geraet.clone(), &CaptureConstraints::default()).await;
        assert!(matches!(ergebnis, Err(AudioError::ZugriffVerweigert)));
        assert_eq!(geraet.freigegeben.load(Ordering::SeqCst), 0);
    }
}
