//! Bluetooth sink discovery through PulseAudio/PipeWire (`pactl`).

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::Platform;
use crate::error::{Error, Result};

/// Marker that PulseAudio puts in every Bluetooth sink line.
const BLUETOOTH_MARKER: &str = "bluez";

/// Identifier of an output device, as accepted by `paplay --device`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkHandle(String);

impl SinkHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of the line-oriented sink listing.
#[async_trait]
pub trait SinkEnumerator: Send + Sync {
    async fn list_sinks(&self) -> Result<String>;
}

/// Runs `pactl list short sinks`.
pub struct PactlEnumerator;

#[async_trait]
impl SinkEnumerator for PactlEnumerator {
    async fn list_sinks(&self) -> Result<String> {
        let output = Command::new("pactl")
            .args(["list", "short", "sinks"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::BackendUnavailable {
                backend: "pactl".into(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(Error::BackendFailed {
                backend: "pactl".into(),
                reason: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Pick a sink from a `pactl list short sinks` listing.
///
/// A line matching both `target` and the Bluetooth marker wins; otherwise the
/// first Bluetooth line. Matching is case-insensitive. The handle is the
/// second whitespace-separated column.
pub fn select_sink(listing: &str, target: Option<&str>) -> Option<SinkHandle> {
    let lines: Vec<(String, &str)> = listing
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| (l.to_lowercase(), l))
        .collect();

    let handle = |line: &str| line.split_whitespace().nth(1).map(SinkHandle::new);

    if let Some(target) = target.map(str::trim).filter(|t| !t.is_empty()) {
        let target = target.to_lowercase();
        let found = lines
            .iter()
            .filter(|(lower, _)| lower.contains(&target) && lower.contains(BLUETOOTH_MARKER))
            .find_map(|(_, line)| handle(line));
        if found.is_some() {
            return found;
        }
        debug!("No Bluetooth sink matches '{target}', trying any Bluetooth sink");
    }

    lines
        .iter()
        .filter(|(lower, _)| lower.contains(BLUETOOTH_MARKER))
        .find_map(|(_, line)| handle(line))
}

pub struct SinkResolver {
    platform: Platform,
    target: Option<String>,
    enumerator: Box<dyn SinkEnumerator>,
}

impl SinkResolver {
    pub fn new(platform: Platform, target: Option<String>, enumerator: Box<dyn SinkEnumerator>) -> Self {
        Self {
            platform,
            target,
            enumerator,
        }
    }

    pub fn pactl(platform: Platform, target: Option<String>) -> Self {
        Self::new(platform, target, Box::new(PactlEnumerator))
    }

    /// Find a Bluetooth sink right now. `None` means "use the default output".
    pub async fn resolve(&self) -> Option<SinkHandle> {
        if self.platform != Platform::Linux {
            debug!("Sink enumeration not supported on {}, using default output", self.platform);
            return None;
        }

        let listing = match self.enumerator.list_sinks().await {
            Ok(listing) => listing,
            Err(e) => {
                warn!("Failed to list audio sinks: {e}");
                return None;
            }
        };

        match select_sink(&listing, self.target.as_deref()) {
            Some(sink) => {
                info!("Using Bluetooth sink {sink}");
                Some(sink)
            }
            None => {
                info!("No Bluetooth audio device found, using default output");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const LISTING: &str = "\
0\talsa_output.pci-0000_00_1f.3.analog-stereo\tmodule-alsa-card.c\ts16le 2ch 44100Hz\tSUSPENDED
1\tbluez_output.AC_12_2F_6A_D2_8B.1\tmodule-bluez5-device.c\ts16le 2ch 48000Hz\tRUNNING
2\tbluez_output.00_1B_66_C0_FF_EE.a2dp-sink\tmodule-bluez5-device.c\ts16le 2ch 44100Hz\tIDLE
";

    struct FakeEnumerator {
        listing: Option<&'static str>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SinkEnumerator for FakeEnumerator {
        async fn list_sinks(&self) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.listing.map(String::from).ok_or_else(|| Error::BackendUnavailable {
                backend: "pactl".into(),
                reason: "not installed".into(),
            })
        }
    }

    fn resolver(platform: Platform, target: Option<&str>, listing: Option<&'static str>) -> (SinkResolver, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let enumerator = FakeEnumerator {
            listing,
            calls: calls.clone(),
        };
        (
            SinkResolver::new(platform, target.map(String::from), Box::new(enumerator)),
            calls,
        )
    }

    #[test]
    fn first_bluetooth_sink_wins_without_target() {
        let sink = select_sink(LISTING, None).unwrap();
        assert_eq!(sink.as_str(), "bluez_output.AC_12_2F_6A_D2_8B.1");
    }

    #[test]
    fn target_substring_is_preferred() {
        let sink = select_sink(LISTING, Some("00_1b_66")).unwrap();
        assert_eq!(sink.as_str(), "bluez_output.00_1B_66_C0_FF_EE.a2dp-sink");
    }

    #[test]
    fn target_must_also_be_bluetooth() {
        // "analog" only matches the wired sink, so the first Bluetooth sink is used
        let sink = select_sink(LISTING, Some("analog")).unwrap();
        assert_eq!(sink.as_str(), "bluez_output.AC_12_2F_6A_D2_8B.1");
    }

    #[test]
    fn blank_target_is_ignored() {
        let sink = select_sink(LISTING, Some("  ")).unwrap();
        assert_eq!(sink.as_str(), "bluez_output.AC_12_2F_6A_D2_8B.1");
    }

    #[test]
    fn no_bluetooth_sink_yields_none() {
        let wired = "0\talsa_output.pci.analog-stereo\tmodule-alsa-card.c\ts16le 2ch 44100Hz\tRUNNING\n";
        assert_eq!(select_sink(wired, None), None);
        assert_eq!(select_sink(wired, Some("alsa")), None);
        assert_eq!(select_sink("", None), None);
    }

    #[tokio::test]
    async fn resolver_enumerates_every_time() {
        let (resolver, calls) = resolver(Platform::Linux, None, Some(LISTING));
        assert!(resolver.resolve().await.is_some());
        assert!(resolver.resolve().await.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn enumeration_failure_means_default_output() {
        let (resolver, calls) = resolver(Platform::Linux, Some("Soundcore"), None);
        assert_eq!(resolver.resolve().await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn other_platforms_skip_enumeration() {
        let (resolver, calls) = resolver(Platform::MacOs, None, Some(LISTING));
        assert_eq!(resolver.resolve().await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
