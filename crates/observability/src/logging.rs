//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `STRANDED_LOG_LEVEL`: Log-Level oder Filter-Direktive, Standard aus der Config
//! - `STRANDED_LOG_FORMAT`: Format (text/json), Standard aus der Config

use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_LEVEL_ENV: &str = "STRANDED_LOG_LEVEL";
pub const LOG_FORMAT_ENV: &str = "STRANDED_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Umgebungsvariablen haben Vorrang vor `level` / `format`.
/// Ungueltige Filter fallen auf `info` zurueck.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = format_waehlen(std::env::var(LOG_FORMAT_ENV).ok(), format);

    match format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Waehlt das Format: Umgebung vor Config, ungueltige Werte ergeben `text`
pub fn format_waehlen(aus_env: Option<String>, standard: &str) -> String {
    let gewaehlt = aus_env.unwrap_or_else(|| standard.to_string());
    if log_format_gueltig(&gewaehlt) {
        gewaehlt
    } else {
        "text".to_string()
    }
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
