//! Stranded Relay – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet Relay
//! und Observability-Server.

use anyhow::Result;
use std::net::SocketAddr;
use stranded_observability::{
    logging_initialisieren, observability_server_starten, HealthState, RelayMetrics,
};
use stranded_relay::{config::RelayConfig, RelayServer};
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Umgebungsvariable mit dem Pfad der Konfigurationsdatei
const CONFIG_ENV: &str = "STRANDED_RELAY_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    let config_pfad = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "relay.toml".into());

    // Standardwerte falls Datei fehlt
    let config = RelayConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Stranded Relay wird initialisiert"
    );

    let metriken = RelayMetrics::neu()?;
    let health = HealthState::neu();

    if config.observability.aktiviert {
        let adresse: SocketAddr = config.observability_bind_adresse().parse()?;
        let (m, h) = (metriken.clone(), health.clone());
        tokio::spawn(async move {
            if let Err(e) = observability_server_starten(adresse, m, h).await {
                tracing::error!(fehler = %e, "Observability-Server beendet");
            }
        });
    }

    let listener = TcpListener::bind(config.relay_bind_adresse()).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = RelayServer::neu(config, metriken, health);
    let relay = tokio::spawn(server.betreiben(listener, shutdown_rx));

    tracing::info!("Relay laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown-Signal empfangen, Relay wird beendet");
    shutdown_tx.send_replace(true);

    relay.await??;
    Ok(())
}
