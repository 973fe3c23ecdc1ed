//! Fehlertypen fuer die Audio-Grenzen

use thiserror::Error;

/// Alle moeglichen Fehler beim Zugriff auf Audio-Geraete
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Kein Eingabegeraet verfuegbar: {0}")]
    GeraetNichtVerfuegbar(String),

    #[error("Zugriff auf das Mikrofon verweigert")]
    ZugriffVerweigert,

    #[error("Eingabegeraet wird bereits verwendet")]
    GeraetBelegt,

    #[error("Wiedergabe-Fehler: {0}")]
    Wiedergabe(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unerwarteter Fehler: {0}")]
    Anyhow(#[from] anyhow::Error),
}

pub type AudioResult<T> = Result<T, AudioError>;
