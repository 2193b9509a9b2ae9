//! Playback strategies.
//!
//! Each backend reports `BackendUnavailable` when it cannot start at all
//! (missing binary, no output device) and `BackendFailed` when it ran and
//! reported an error. The player treats both as "try the next one".

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rodio::{Decoder, OutputStreamBuilder, Sink};
use tokio::process::Command;
use tracing::debug;

use super::sink::SinkHandle;
use crate::error::{Error, Result};

const POLL_TICK: Duration = Duration::from_millis(100);

#[async_trait]
pub trait PlaybackBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Play `file` to completion, on `sink` if the backend supports routing.
    async fn attempt(&self, file: &Path, sink: Option<&SinkHandle>) -> Result<()>;
}

/// An external command-line player, e.g. `aplay -q <file>`.
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
    /// Flag placed before the sink id, e.g. `--device` for paplay.
    device_flag: Option<String>,
}

impl CommandBackend {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            device_flag: None,
        }
    }

    /// A player that can target a specific sink.
    pub fn routed(program: &str, args: &[&str], device_flag: &str) -> Self {
        Self {
            device_flag: Some(device_flag.into()),
            ..Self::new(program, args)
        }
    }

    fn command(&self, file: &Path, sink: Option<&SinkHandle>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let (Some(flag), Some(sink)) = (&self.device_flag, sink) {
            cmd.arg(flag).arg(sink.as_str());
        }
        cmd.arg(file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl PlaybackBackend for CommandBackend {
    fn name(&self) -> &str {
        &self.program
    }

    async fn attempt(&self, file: &Path, sink: Option<&SinkHandle>) -> Result<()> {
        let mut cmd = self.command(file, sink);
        debug!("Running {:?}", cmd);

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::BackendUnavailable {
                    backend: self.program.clone(),
                    reason: "command not found".into(),
                }
            } else {
                Error::BackendFailed {
                    backend: self.program.clone(),
                    reason: format!("failed to start: {e}"),
                }
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            return Err(Error::BackendFailed {
                backend: self.program.clone(),
                reason: if stderr.is_empty() {
                    output.status.to_string()
                } else {
                    format!("{}: {stderr}", output.status)
                },
            });
        }

        Ok(())
    }
}

/// In-process playback on the default device via rodio.
pub struct RodioBackend {
    timeout: Duration,
}

impl RodioBackend {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl PlaybackBackend for RodioBackend {
    fn name(&self) -> &str {
        "rodio"
    }

    async fn attempt(&self, file: &Path, sink: Option<&SinkHandle>) -> Result<()> {
        if let Some(sink) = sink {
            debug!("rodio cannot route to {sink}, using default device");
        }
        let path = file.to_path_buf();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || play_blocking(&path, timeout))
            .await
            .map_err(|e| Error::BackendFailed {
                backend: "rodio".into(),
                reason: format!("playback task panicked: {e}"),
            })?
    }
}

/// Play until the sink drains, polling every tick, bounded by `timeout`.
fn play_blocking(path: &Path, timeout: Duration) -> Result<()> {
    let failed = |reason: String| Error::BackendFailed {
        backend: "rodio".into(),
        reason,
    };

    let stream = OutputStreamBuilder::open_default_stream().map_err(|e| Error::BackendUnavailable {
        backend: "rodio".into(),
        reason: format!("no audio output: {e}"),
    })?;

    let file = File::open(path).map_err(|e| failed(format!("cannot open {}: {e}", path.display())))?;
    let source = Decoder::new(BufReader::new(file)).map_err(|e| failed(format!("cannot decode: {e}")))?;

    let sink = Sink::connect_new(stream.mixer());
    sink.append(source);

    let deadline = Instant::now() + timeout;
    while !sink.empty() {
        if Instant::now() >= deadline {
            sink.stop();
            return Err(failed(format!("playback did not finish within {}s", timeout.as_secs())));
        }
        std::thread::sleep(POLL_TICK);
    }

    Ok(())
}
