//! Push-to-Talk Steuerung
//!
//! Unterstuetzt zwei Modi: Hold (Taste halten) und Toggle (Taste umschalten).
//! Jede Eingabe liefert eine [`PttAktion`], die nur bei einem Wechsel des
//! Sendezustands etwas anderes als `Keine` ist. Wiederholte Tastendruecke
//! der Tastatur-Autorepeat-Funktion werden ignoriert.

use serde::{Deserialize, Serialize};

/// Betriebsmodus fuer Push-to-Talk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PttMode {
    /// Taste halten um zu senden – loslassen stoppt Uebertragung
    #[default]
    Hold,
    /// Einmal druecken zum Aktivieren, nochmals zum Deaktivieren
    Toggle,
}

/// Ergebnis einer Eingabe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PttAktion {
    /// Uebertragung beginnen
    StartSenden,
    /// Uebertragung beenden
    StopSenden,
    /// Kein Zustandswechsel
    Keine,
}

/// Push-to-Talk Konfiguration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PttConfig {
    pub modus: PttMode,
    /// Name der Taste (Vergleich ohne Gross-/Kleinschreibung)
    pub taste: String,
}

impl Default for PttConfig {
    fn default() -> Self {
        Self {
            modus: PttMode::Hold,
            taste: "v".to_string(),
        }
    }
}

impl PttConfig {
    /// Prueft ob `taste` die konfigurierte Push-to-Talk-Taste ist
    pub fn ist_ptt_taste(&self, taste: &str) -> bool {
        self.taste.eq_ignore_ascii_case(taste)
    }
}

/// Push-to-Talk Controller
pub struct PttController {
    mode: PttMode,
    /// Hold-Modus: Taste aktuell gedrueckt?
    key_held: bool,
    /// Toggle-Modus: Aktuell aktiv?
    toggle_active: bool,
    /// Globales Mute (ueberschreibt alles)
    muted: bool,
}

impl PttController {
    pub fn new(mode: PttMode) -> Self {
        Self {
            mode,
            key_held: false,
            toggle_active: false,
            muted: false,
        }
    }

    /// Taste gedrueckt
    ///
    /// `repeat` ist gesetzt wenn das Ereignis vom Autorepeat stammt.
    pub fn key_down(&mut self, repeat: bool) -> PttAktion {
        if repeat {
            return PttAktion::Keine;
        }
        self.uebergang(|ptt| match ptt.mode {
            PttMode::Hold => ptt.key_held = true,
            PttMode::Toggle => ptt.toggle_active = !ptt.toggle_active,
        })
    }

    /// Taste losgelassen
    pub fn key_up(&mut self) -> PttAktion {
        self.uebergang(|ptt| ptt.key_held = false)
    }

    /// Modus wechseln – setzt alle Zustaende zurueck
    pub fn set_mode(&mut self, mode: PttMode) -> PttAktion {
        self.uebergang(|ptt| {
            ptt.mode = mode;
            ptt.key_held = false;
            ptt.toggle_active = false;
        })
    }

    /// Globales Mute setzen
    pub fn set_muted(&mut self, muted: bool) -> PttAktion {
        self.uebergang(|ptt| ptt.muted = muted)
    }

    /// Gibt zurueck ob aktuell gesendet wird
    pub fn is_transmitting(&self) -> bool {
        if self.muted {
            return false;
        }
        match self.mode {
            PttMode::Hold => self.key_held,
            PttMode::Toggle => self.toggle_active,
        }
    }

    /// Gibt den aktuellen Modus zurueck
    pub fn mode(&self) -> PttMode {
        self.mode
    }

    /// Gibt zurueck ob global gemutet
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    fn uebergang(&mut self, aenderung: impl FnOnce(&mut Self)) -> PttAktion {
        let vorher = self.is_transmitting();
        aenderung(self);
        match (vorher, self.is_transmitting()) {
            (false, true) => PttAktion::StartSenden,
            (true, false) => PttAktion::StopSenden,
            _ => PttAktion::Keine,
        }
    }
}
