//! Seed-VC voice conversion, run as an out-of-process Python task.
//!
//! Pipeline:
//! 1. Resolve the Seed-VC checkout and the reference sample
//! 2. Cloud TTS into a temp source WAV
//! 3. `python inference.py --source .. --target .. --output ..` (bounded by a timeout)
//! 4. Newest WAV in the output directory is the result
//!
//! The temp source is removed on every path out.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::tts::OpenAiSpeech;
use super::{AudioArtifact, SpeechSynthesizer};
use crate::config::{Config, VoiceConversionConfig};
use crate::error::{Error, Result};

const STDERR_TAIL_LINES: usize = 20;

pub struct SeedVcSynthesizer {
    tts: OpenAiSpeech,
    config: VoiceConversionConfig,
    output_dir: PathBuf,
}

impl SeedVcSynthesizer {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            tts: OpenAiSpeech::new(&config.openai)?,
            config: config.voice_conversion.clone(),
            output_dir: absolute(&config.output_dir),
        })
    }

    /// Configured checkout, else `./seed-vc` when present.
    fn tool_dir(&self) -> Result<PathBuf> {
        let dir = match &self.config.tool_path {
            Some(path) => absolute(path),
            None => {
                let local = absolute(Path::new("seed-vc"));
                if !local.is_dir() {
                    return Err(Error::ConfigurationMissing(
                        "Seed-VC path not found; set VOICE_CONVERTER_PATH or place seed-vc/ in the working directory".into(),
                    ));
                }
                local
            }
        };

        if !dir.is_dir() {
            return Err(Error::ConfigurationMissing(format!(
                "Seed-VC directory does not exist: {}",
                dir.display()
            )));
        }
        Ok(dir)
    }

    fn reference_audio(&self, tool: &Path, explicit: Option<&Path>) -> Result<PathBuf> {
        let reference = match explicit.or(self.config.reference_audio.as_deref()) {
            Some(path) => absolute(path),
            None => {
                let speaker_dir = tool.join("data").join(&self.config.speaker);
                find_reference(&speaker_dir, &self.config.speaker).unwrap_or_else(|| {
                    speaker_dir.join(format!("{}_ref.wav", capitalize(&self.config.speaker)))
                })
            }
        };

        if !reference.is_file() {
            return Err(Error::InputMissing(reference));
        }
        Ok(reference)
    }

    async fn convert(&self, tool: &Path, script: &Path, source: &Path, reference: &Path) -> Result<()> {
        let flag = |on: bool| if on { "1" } else { "0" };
        let mut cmd = Command::new(&self.config.python);
        cmd.arg(script)
            .arg("--source")
            .arg(source)
            .arg("--target")
            .arg(reference)
            .arg("--output")
            .arg(&self.output_dir)
            .arg("--diffusion-steps")
            .arg(self.config.diffusion_steps.to_string())
            .arg("--inference-cfg-rate")
            .arg(self.config.inference_cfg_rate.to_string())
            .arg("--f0-condition")
            .arg(flag(self.config.f0_condition))
            .arg("--auto-f0-adjust")
            .arg(flag(self.config.auto_f0_adjust))
            .arg("--fp16")
            .arg(if self.config.fp16 { "True" } else { "False" })
            .current_dir(tool)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running voice conversion: {:?}", cmd);

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| {
                Error::UpstreamFailure(format!("failed to start {}: {e}", self.config.python))
            })?,
            Err(_) => {
                return Err(Error::UpstreamFailure(format!(
                    "voice conversion timed out after {}s",
                    timeout.as_secs()
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::UpstreamFailure(format!(
                "voice conversion failed ({}): {}",
                output.status,
                tail(&stderr, STDERR_TAIL_LINES)
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl SpeechSynthesizer for SeedVcSynthesizer {
    async fn synthesize(&self, text: &str, reference_voice: Option<&Path>) -> Result<AudioArtifact> {
        let tool = self.tool_dir()?;
        let reference = self.reference_audio(&tool, reference_voice)?;
        let script = tool.join("inference.py");
        if !script.is_file() {
            return Err(Error::ConfigurationMissing(format!(
                "inference.py not found: {}",
                script.display()
            )));
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;

        // Deleted when dropped, whichever way this function returns.
        let source = tempfile::Builder::new()
            .prefix("welcome-back-")
            .suffix(".wav")
            .tempfile()?;

        let t_start = std::time::Instant::now();
        self.tts.synthesize_to(text, source.path()).await?;
        let tts_ms = t_start.elapsed().as_millis();

        let before = wav_snapshot(&self.output_dir)?;
        info!("Converting voice with reference {}", reference.display());
        self.convert(&tool, &script, source.path(), &reference).await?;
        let total_ms = t_start.elapsed().as_millis();

        let output = newest_wav(&self.output_dir, &before)?
            .ok_or_else(|| Error::UpstreamFailure("no output produced".into()))?;
        info!("Synthesized {} (tts={tts_ms}ms total={total_ms}ms)", output.display());

        Ok(AudioArtifact::new(output))
    }
}

/// Pick a reference sample inside `dir`.
///
/// Preferred names first (`Speaker_ref_enhanced.wav`, `_ref_long`, `_ref_rebuild`,
/// `_ref`, `Speaker.wav`), then any WAV naming "ref" or the speaker, then the
/// first WAV in name order.
pub fn find_reference(dir: &Path, speaker: &str) -> Option<PathBuf> {
    let name = capitalize(speaker);
    let preferred = [
        format!("{name}_ref_enhanced.wav"),
        format!("{name}_ref_long.wav"),
        format!("{name}_ref_rebuild.wav"),
        format!("{name}_ref.wav"),
        format!("{name}.wav"),
    ];
    if let Some(found) = preferred.iter().map(|f| dir.join(f)).find(|p| p.is_file()) {
        return Some(found);
    }

    let mut wavs = wav_files(dir).ok()?;
    wavs.sort();
    let speaker = speaker.to_lowercase();
    wavs.iter()
        .find(|p| {
            let file = file_name_lower(p);
            file.contains("ref") || file.contains(&speaker)
        })
        .or_else(|| wavs.first())
        .cloned()
}

/// Modification time of every `.wav` directly inside `dir`.
pub fn wav_snapshot(dir: &Path) -> Result<HashMap<PathBuf, SystemTime>> {
    let snapshot = wav_files(dir)?
        .into_iter()
        .filter_map(|p| modified(&p).map(|t| (p, t)))
        .collect();
    Ok(snapshot)
}

/// Most recently modified `.wav` in `dir` that is new or changed since `before`.
pub fn newest_wav(dir: &Path, before: &HashMap<PathBuf, SystemTime>) -> Result<Option<PathBuf>> {
    let newest = wav_files(dir)?
        .into_iter()
        .filter_map(|p| Some((modified(&p)?, p)))
        .filter(|(t, p)| before.get(p) != Some(t))
        .max_by_key(|(t, _)| *t)
        .map(|(_, p)| p);
    Ok(newest)
}

fn modified(path: &Path) -> Option<SystemTime> {
    path.metadata().and_then(|m| m.modified()).ok()
}

fn wav_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let files = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && file_name_lower(p).ends_with(".wav"))
        .collect();
    Ok(files)
}

fn file_name_lower(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Relative paths are taken from the working directory, since the converter runs elsewhere.
fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim().lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
