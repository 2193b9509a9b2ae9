//! Audio output: Bluetooth sink discovery and ordered playback fallback.
//!
//! Components:
//! - `sink`: finds a Bluetooth sink via `pactl`, re-resolved on every playback
//! - `backend`: playback strategies (external players, in-process rodio)
//! - `player`: walks the backends in order until one succeeds

pub mod backend;
pub mod player;
pub mod sink;

/// Platform family, which decides the available backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Other
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linux => write!(f, "linux"),
            Self::MacOs => write!(f, "macos"),
            Self::Other => write!(f, "other"),
        }
    }
}
