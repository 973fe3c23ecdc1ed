//! Test-Doubles fuer die Modultests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use stranded_core::types::PeerId;
use stranded_protocol::{IceCandidate, SessionDescription};

use crate::error::{TransportError, TransportResult};
use crate::transport::PeerTransport;

pub(crate) fn kandidat(n: u32) -> IceCandidate {
    IceCandidate::neu(format!("candidate:{n} 1 udp 2122260223 10.0.0.{n} 5000 typ host"))
}

#[derive(Default)]
struct Inner {
    remote_von: Vec<PeerId>,
    kandidaten: Vec<IceCandidate>,
    geschlossen: usize,
    remote_ablehnen: bool,
}

/// Zeichnet alle Aufrufe auf, klonbar fuer Assertions nach der Uebergabe
#[derive(Clone, Default)]
pub(crate) struct TestTransport {
    inner: Arc<Mutex<Inner>>,
}

impl TestTransport {
    pub(crate) fn remote_ablehnen(&self) {
        self.inner.lock().unwrap().remote_ablehnen = true;
    }

    pub(crate) fn remote_von(&self) -> Vec<PeerId> {
        self.inner.lock().unwrap().remote_von.clone()
    }

    pub(crate) fn kandidaten(&self) -> Vec<IceCandidate> {
        self.inner.lock().unwrap().kandidaten.clone()
    }

    pub(crate) fn geschlossen(&self) -> usize {
        self.inner.lock().unwrap().geschlossen
    }
}

#[async_trait]
impl PeerTransport for TestTransport {
    async fn create_offer(&self) -> TransportResult<SessionDescription> {
        Ok(SessionDescription::offer("v=0 test-offer"))
    }

    async fn create_answer(&self) -> TransportResult<SessionDescription> {
        Ok(SessionDescription::answer("v=0 test-answer"))
    }

    async fn set_remote_description(
        &self,
        remote: &PeerId,
        _description: SessionDescription,
    ) -> TransportResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.remote_ablehnen {
            return Err(TransportError::aushandlung("SDP ungueltig"));
        }
        inner.remote_von.push(remote.clone());
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> TransportResult<()> {
        self.inner.lock().unwrap().kandidaten.push(candidate);
        Ok(())
    }

    async fn close(&self) {
        self.inner.lock().unwrap().geschlossen += 1;
    }
}
