//! Handler fuer alle Signal-Typen
//!
//! Jeder Handler ist fuer genau einen Tag zustaendig und laeuft als
//! Methode des Koordinators innerhalb der seriellen Event-Schleife.
//! Protokoll-Anomalien werden protokolliert und verworfen.

mod answer_handler;
mod candidate_handler;
mod hangup_handler;
mod offer_handler;
mod presence_handler;
