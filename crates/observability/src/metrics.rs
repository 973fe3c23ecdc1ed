//! Prometheus-kompatible Metriken des Relays
//!
//! Registrierte Metriken:
//! - `stranded_relay_clients_connected` – Gauge: Aktuell verbundene Clients
//! - `stranded_relay_frames_total` – Counter: Empfangene und verteilte Frames
//! - `stranded_relay_bytes_total` – Counter: Payload-Bytes empfangener Frames
//! - `stranded_relay_frames_dropped_total` – Counter: Verworfene Zustellungen
//!   (volle Sende-Queue oder zu langsamer Client)
//! - `process_*` – CPU, Speicher, Dateideskriptoren (nur Linux)

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle Relay-Metriken
#[derive(Clone)]
pub struct RelayMetrics {
    pub registry: Arc<Registry>,

    pub clients_connected: IntGauge,
    pub frames_total: IntCounter,
    pub bytes_total: IntCounter,
    pub frames_dropped_total: IntCounter,
}

impl RelayMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let clients_connected = IntGauge::with_opts(Opts::new(
            "stranded_relay_clients_connected",
            "Anzahl aktuell verbundener Clients",
        ))?;
        registry.register(Box::new(clients_connected.clone()))?;

        let frames_total = IntCounter::with_opts(Opts::new(
            "stranded_relay_frames_total",
            "Gesamtanzahl empfangener Frames",
        ))?;
        registry.register(Box::new(frames_total.clone()))?;

        let bytes_total = IntCounter::with_opts(Opts::new(
            "stranded_relay_bytes_total",
            "Payload-Bytes aller empfangenen Frames",
        ))?;
        registry.register(Box::new(bytes_total.clone()))?;

        let frames_dropped_total = IntCounter::with_opts(Opts::new(
            "stranded_relay_frames_dropped_total",
            "Zustellungen, die wegen voller Sende-Queues verworfen wurden",
        ))?;
        registry.register(Box::new(frames_dropped_total.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry: Arc::new(registry),
            clients_connected,
            frames_total,
            bytes_total,
            frames_dropped_total,
        })
    }

    /// Zaehlt einen empfangenen Frame
    pub fn frame_empfangen(&self, bytes: usize) {
        self.frames_total.inc();
        self.bytes_total.inc_by(bytes as u64);
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: RelayMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<RelayMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metriken_erstellen_erfolgreich() {
        let metriken = RelayMetrics::neu().unwrap();
        assert!(!metriken.registry.gather().is_empty());
    }

    #[test]
    fn frame_zaehlt_frames_und_bytes() {
        let metriken = RelayMetrics::neu().unwrap();
        metriken.frame_empfangen(120);
        metriken.frame_empfangen(30);
        assert_eq!(metriken.frames_total.get(), 2);
        assert_eq!(metriken.bytes_total.get(), 150);
    }

    #[test]
    fn clients_gauge_steigt_und_faellt() {
        let metriken = RelayMetrics::neu().unwrap();
        metriken.clients_connected.inc();
        metriken.clients_connected.inc();
        metriken.clients_connected.dec();
        assert_eq!(metriken.clients_connected.get(), 1);
    }

    #[test]
    fn metriken_export_prometheus_format() {
        let metriken = RelayMetrics::neu().unwrap();
        metriken.frames_dropped_total.inc();

        let output = metriken.exportieren().unwrap();
        for name in [
            "stranded_relay_clients_connected",
            "stranded_relay_frames_total",
            "stranded_relay_bytes_total",
            "stranded_relay_frames_dropped_total",
        ] {
            assert!(output.contains(name), "{name} fehlt im Export");
        }
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn registries_sind_unabhaengig() {
        let a = RelayMetrics::neu().unwrap();
        let b = RelayMetrics::neu().unwrap();
        a.frames_total.inc();
        assert_eq!(b.frames_total.get(), 0);
    }
}
