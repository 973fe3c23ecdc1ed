//! Health-Check-Endpunkt des Relays
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Anzahl verbundener Clients

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub clients_connected: u64,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    start_time: Arc<Instant>,
    /// Nimmt der Relay-Listener Verbindungen an?
    listener_aktiv: Arc<AtomicBool>,
    /// Client-Limit erreicht, neue Verbindungen werden abgewiesen
    voll: Arc<AtomicBool>,
    clients: Arc<AtomicU64>,
}

impl HealthState {
    pub fn neu() -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            listener_aktiv: Arc::new(AtomicBool::new(false)),
            voll: Arc::new(AtomicBool::new(false)),
            clients: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn listener_status_setzen(&self, aktiv: bool) {
        self.listener_aktiv.store(aktiv, Ordering::Relaxed);
    }

    pub fn clients_setzen(&self, anzahl: u64, voll: bool) {
        self.clients.store(anzahl, Ordering::Relaxed);
        self.voll.store(voll, Ordering::Relaxed);
    }

    /// Aktueller Status samt HTTP-Code
    pub fn bewerten(&self) -> (StatusCode, HealthResponse) {
        let status = if !self.listener_aktiv.load(Ordering::Relaxed) {
            HealthStatus::Unhealthy
        } else if self.voll.load(Ordering::Relaxed) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        let http_status = match status {
            // 200 auch bei degraded, die Probe soll nicht fehlschlagen
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        };

        let response = HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            clients_connected: self.clients.load(Ordering::Relaxed),
        };
        (http_status, response)
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::neu()
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let (http_status, response) = state.bewerten();
    (http_status, Json(response))
}
