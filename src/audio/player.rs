//! Ordered playback fallback.
//!
//! 1. Missing file: fail at once, no backend is touched.
//! 2. A resolved sink: try the routed backend, fall through on failure.
//! 3. Walk the default chain; first success wins.
//! 4. Nothing left: report whether anything ran at all.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::backend::{CommandBackend, PlaybackBackend, RodioBackend};
use super::sink::SinkHandle;
use super::Platform;
use crate::config::PlaybackConfig;
use crate::error::{Error, Exhausted, Result};

pub struct AudioPlayer {
    routed: Option<Box<dyn PlaybackBackend>>,
    chain: Vec<Box<dyn PlaybackBackend>>,
}

impl AudioPlayer {
    pub fn new(routed: Option<Box<dyn PlaybackBackend>>, chain: Vec<Box<dyn PlaybackBackend>>) -> Self {
        Self { routed, chain }
    }

    /// Backends for this platform family.
    ///
    /// - Linux: `aplay`, then `paplay`, then `mpv`; `paplay --device` for sinks
    /// - macOS: `afplay` only
    /// - anything else: in-process rodio
    pub fn for_platform(platform: Platform, config: &PlaybackConfig) -> Self {
        match platform {
            Platform::Linux => Self::new(
                Some(Box::new(CommandBackend::routed("paplay", &[], "--device"))),
                vec![
                    Box::new(CommandBackend::new("aplay", &["-q"])),
                    Box::new(CommandBackend::new("paplay", &[])),
                    Box::new(CommandBackend::new("mpv", &["--no-video"])),
                ],
            ),
            Platform::MacOs => Self::new(None, vec![Box::new(CommandBackend::new("afplay", &[]))]),
            Platform::Other => Self::new(
                None,
                vec![Box::new(RodioBackend::new(Duration::from_secs(
                    config.library_timeout_secs,
                )))],
            ),
        }
    }

    #[cfg(test)]
    fn backend_names(&self) -> Vec<&str> {
        self.chain.iter().map(|b| b.name()).collect()
    }

    /// Play `file`, preferring `sink` when one was resolved.
    pub async fn play(&self, file: &Path, sink: Option<&SinkHandle>) -> Result<()> {
        if !file.exists() {
            warn!("Audio file not found: {}", file.display());
            return Err(Error::InputMissing(file.to_path_buf()));
        }

        let mut failures = Vec::new();

        if let Some(sink) = sink {
            match &self.routed {
                Some(backend) => match backend.attempt(file, Some(sink)).await {
                    Ok(()) => {
                        info!("Played {} on {sink} via {}", file.display(), backend.name());
                        return Ok(());
                    }
                    Err(e) => {
                        warn!("Failed to play via sink {sink}: {e}; falling back to default output");
                        if !matches!(e, Error::BackendUnavailable { .. }) {
                            failures.push(e.to_string());
                        }
                    }
                },
                None => debug!("No routed backend on this platform, ignoring sink {sink}"),
            }
        }

        for backend in &self.chain {
            match backend.attempt(file, None).await {
                Ok(()) => {
                    info!("Played {} via {}", file.display(), backend.name());
                    return Ok(());
                }
                Err(e @ Error::BackendUnavailable { .. }) => debug!("{e}"),
                Err(e) => {
                    warn!("{e}");
                    failures.push(e.to_string());
                }
            }
        }

        let exhausted = if failures.is_empty() {
            Exhausted::NothingAvailable
        } else {
            Exhausted::AllFailed(failures)
        };
        error!("{exhausted}");
        Err(Error::NoBackendLeft(exhausted))
    }
}
