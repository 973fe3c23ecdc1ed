//! Puffer fuer verfruehte ICE-Kandidaten
//!
//! Kandidaten treffen regelmaessig vor dem Offer bzw. der Answer ein. Sie
//! werden hier in Ankunftsreihenfolge gehalten und genau einmal entnommen,
//! sobald die Remote-Beschreibung der Session gesetzt ist.

use std::collections::VecDeque;

use stranded_protocol::IceCandidate;
use tokio::time::Instant;

/// FIFO-Puffer mit fester Obergrenze
///
/// Bei Ueberlauf wird der aelteste Kandidat verworfen.
#[derive(Debug, Clone)]
pub struct CandidateBuffer {
    kandidaten: VecDeque<IceCandidate>,
    max: usize,
    erstellt: Instant,
}

impl CandidateBuffer {
    /// Erstellt einen leeren Puffer
    pub fn neu(max: usize) -> Self {
        Self {
            kandidaten: VecDeque::new(),
            max: max.max(1),
            erstellt: Instant::now(),
        }
    }

    /// Haengt einen Kandidaten an
    ///
    /// Gibt den verdraengten Kandidaten zurueck, falls der Puffer voll war.
    pub fn puffern(&mut self, kandidat: IceCandidate) -> Option<IceCandidate> {
        let verdraengt = if self.kandidaten.len() >= self.max {
            self.kandidaten.pop_front()
        } else {
            None
        };
        self.kandidaten.push_back(kandidat);
        if verdraengt.is_some() {
            tracing::warn!(max = self.max, "Kandidaten-Puffer voll, aeltester verworfen");
        }
        verdraengt
    }

    /// Uebernimmt alle Kandidaten eines anderen Puffers (hinten angehaengt)
    pub fn anhaengen(&mut self, anderer: CandidateBuffer) {
        for kandidat in anderer.kandidaten {
            self.puffern(kandidat);
        }
    }

    /// Entnimmt alle Kandidaten in Ankunftsreihenfolge; der Puffer ist danach leer
    pub fn entnehmen(&mut self) -> Vec<IceCandidate> {
        self.kandidaten.drain(..).collect()
    }

    /// Trennt die Kandidaten ab, die zum ICE-Benutzerfragment `ufrag` passen
    ///
    /// Kandidaten ohne Fragment passen immer, ohne `ufrag` passen alle.
    /// Der Rest bleibt in `self`, die Reihenfolge bleibt in beiden erhalten.
    pub fn abtrennen(&mut self, ufrag: Option<&str>) -> CandidateBuffer {
        let mut passend = CandidateBuffer {
            kandidaten: VecDeque::new(),
            max: self.max,
            erstellt: self.erstellt,
        };
        let mut rest = VecDeque::new();
        for kandidat in self.kandidaten.drain(..) {
            let passt = match (ufrag, kandidat.username_fragment.as_deref()) {
                (Some(gesucht), Some(eigenes)) => gesucht == eigenes,
                _ => true,
            };
            if passt {
                passend.kandidaten.push_back(kandidat);
            } else {
                rest.push_back(kandidat);
            }
        }
        self.kandidaten = rest;
        passend
    }

    /// Verwirft alle Kandidaten
    pub fn verwerfen(&mut self) {
        self.kandidaten.clear();
    }

    pub fn len(&self) -> usize {
        self.kandidaten.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kandidaten.is_empty()
    }

    /// Zeitpunkt, zu dem der Puffer angelegt wurde
    pub fn erstellt(&self) -> Instant {
        self.erstellt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kandidat(n: u32) -> IceCandidate {
        IceCandidate::neu(format!("candidate:{n} 1 udp 2122260223 10.0.0.{n} 5000 typ host"))
    }

    #[test]
    fn entnahme_in_ankunftsreihenfolge() {
        let mut puffer = CandidateBuffer::neu(8);
        for n in 1..=3 {
            puffer.puffern(kandidat(n));
        }
        let alle = puffer.entnehmen();
        assert_eq!(alle, vec![kandidat(1), kandidat(2), kandidat(3)]);
        assert!(puffer.is_empty(), "Nach der Entnahme muss der Puffer leer sein");
        assert!(puffer.entnehmen().is_empty(), "Zweite Entnahme liefert nichts");
    }

    #[test]
    fn abtrennen_nach_ufrag() {
        let mut puffer = CandidateBuffer::neu(8);
        puffer.puffern(kandidat(1).mit_ufrag("slot"));
        puffer.puffern(kandidat(2).mit_ufrag("antwort"));
        puffer.puffern(kandidat(3));
        puffer.puffern(kandidat(4).mit_ufrag("slot"));

        let mut passend = puffer.abtrennen(Some("slot"));
        assert_eq!(
            passend.entnehmen(),
            vec![
                kandidat(1).mit_ufrag("slot"),
                kandidat(3),
                kandidat(4).mit_ufrag("slot")
            ],
            "Passende und fragmentlose Kandidaten in Ankunftsreihenfolge"
        );
        assert_eq!(puffer.len(), 1, "Fremdes Fragment bleibt zurueck");
        assert_eq!(puffer.abtrennen(None).len(), 1, "Ohne Fragment passt alles");
        assert!(puffer.is_empty());
    }

    #[test]
    fn ueberlauf_verdraengt_aeltesten() {
        let mut puffer = CandidateBuffer::neu(2);
        assert!(puffer.puffern(kandidat(1)).is_none());
        assert!(puffer.puffern(kandidat(2)).is_none());
        assert_eq!(puffer.puffern(kandidat(3)), Some(kandidat(1)));
        assert_eq!(puffer.entnehmen(), vec![kandidat(2), kandidat(3)]);
    }

    #[test]
    fn anhaengen_behaelt_reihenfolge() {
        let mut waise = CandidateBuffer::neu(8);
        waise.puffern(kandidat(1));
        waise.puffern(kandidat(2));
        let mut puffer = CandidateBuffer::neu(8);
        puffer.anhaengen(waise);
        puffer.puffern(kandidat(3));
        assert_eq!(puffer.entnehmen(), vec![kandidat(1), kandidat(2), kandidat(3)]);
    }

    #[test]
    fn verwerfen_leert() {
        let mut puffer = CandidateBuffer::neu(4);
        puffer.puffern(kandidat(1));
        puffer.verwerfen();
        assert_eq!(puffer.len(), 0);
    }
}
