//! Configuration management for welcome-back.
//!
//! Loads config from YAML files in standard locations, then lets
//! environment variables override credentials, Bluetooth routing and paths.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::schedule::MAX_INTERVAL_HOURS;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Lower bound of the random wake interval, in hours.
    pub min_interval_hours: f64,
    /// Upper bound (exclusive) of the random wake interval, in hours.
    pub max_interval_hours: f64,
    /// How often the loop wakes up to check the trigger time.
    pub poll_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            min_interval_hours: 1.0,
            max_interval_hours: 3.0,
            poll_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub temperature: f32,
    /// Messages requested per generation; one is picked at random.
    pub candidates: usize,
    pub tts_model: String,
    pub tts_voice: String,
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".into(),
            chat_model: "gpt-4o".into(),
            temperature: 0.7,
            candidates: 5,
            tts_model: "tts-1".into(),
            tts_voice: "alloy".into(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Who is speaking, e.g. "grandfather".
    pub relation: String,
    /// Language the messages are written in.
    pub language: String,
    /// Pet names the speaker may use now and then.
    pub nicknames: Vec<String>,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            relation: "grandfather".into(),
            language: "natural, modern Chinese".into(),
            nicknames: vec!["你小子".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceConversionConfig {
    /// Seed-VC checkout containing `inference.py`.
    pub tool_path: Option<PathBuf>,
    pub python: String,
    /// Explicit reference sample; searched under `data/<speaker>` when unset.
    pub reference_audio: Option<PathBuf>,
    pub speaker: String,
    pub diffusion_steps: u32,
    pub inference_cfg_rate: f32,
    pub f0_condition: bool,
    pub auto_f0_adjust: bool,
    pub fp16: bool,
    pub timeout_secs: u64,
}

impl Default for VoiceConversionConfig {
    fn default() -> Self {
        Self {
            tool_path: None,
            python: "python3".into(),
            reference_audio: None,
            speaker: "grandfather".into(),
            diffusion_steps: 40,
            inference_cfg_rate: 0.7,
            f0_condition: false,
            auto_f0_adjust: true,
            fp16: false,
            timeout_secs: 900,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub bluetooth_output: bool,
    /// Substring matched against sink descriptions.
    pub bluetooth_target_device: Option<String>,
    /// Upper bound for in-process playback before giving up.
    pub library_timeout_secs: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            bluetooth_output: false,
            bluetooth_target_device: None,
            library_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schedule: ScheduleConfig,
    pub openai: OpenAiConfig,
    pub persona: PersonaConfig,
    pub voice_conversion: VoiceConversionConfig,
    pub playback: PlaybackConfig,
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schedule: ScheduleConfig::default(),
            openai: OpenAiConfig::default(),
            persona: PersonaConfig::default(),
            voice_conversion: VoiceConversionConfig::default(),
            playback: PlaybackConfig::default(),
            output_dir: PathBuf::from("outputs"),
        }
    }
}

impl Config {
    /// Load configuration from YAML file, then apply environment overrides.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/welcome-back/config.yaml
    /// 3. /etc/welcome-back/config.yaml
    ///
    /// An unreadable or malformed file is reported and replaced by defaults,
    /// so environment overrides still apply.
    pub fn load(path: Option<&Path>) -> Self {
        let mut config = match path.map(PathBuf::from).or_else(Self::search) {
            Some(file) => Self::from_file(&file).unwrap_or_else(|e| {
                warn!("{e}, using defaults");
                Self::default()
            }),
            None => {
                info!("No config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    fn search() -> Option<PathBuf> {
        [
            std::env::current_dir().ok().map(|d| d.join("config.yaml")),
            dirs::home_dir().map(|h| h.join(".config/welcome-back/config.yaml")),
            Some(PathBuf::from("/etc/welcome-back/config.yaml")),
        ]
        .into_iter()
        .flatten()
        .find(|p| p.is_file())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidConfig {
            path: path.to_path_buf(),
            reason,
        };
        let contents = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let config = serde_yml::from_str(&contents).map_err(|e| invalid(e.to_string()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Override file settings from the environment. `lookup` is `std::env::var` in production.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let first = |keys: &[&str]| {
            keys.iter()
                .filter_map(|&k| lookup(k))
                .find(|v| !v.trim().is_empty())
        };

        if let Some(key) = first(&["OPENAI_API_KEY", "TEXT_GEN_API_KEY", "SPEECH_API_KEY"]) {
            self.openai.api_key = Some(key);
        }
        if let Some(flag) = lookup("BLUETOOTH_OUTPUT") {
            self.playback.bluetooth_output = flag.trim().eq_ignore_ascii_case("true");
        }
        if let Some(device) = first(&["BLUETOOTH_TARGET_DEVICE_NAME"]) {
            self.playback.bluetooth_target_device = Some(device);
        }
        if let Some(path) = first(&["VOICE_CONVERTER_PATH", "SEED_VC_PATH"]) {
            self.voice_conversion.tool_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = first(&["WELCOME_BACK_OUTPUT_DIR"]) {
            self.output_dir = PathBuf::from(dir);
        }
    }

    /// Startup checks. Failing here aborts the process before the loop starts.
    pub fn validate(&self) -> Result<()> {
        if self.api_key().is_none() {
            return Err(Error::ConfigurationMissing(
                "OpenAI API key not found; set OPENAI_API_KEY or openai.api_key".into(),
            ));
        }

        let ScheduleConfig {
            min_interval_hours: min,
            max_interval_hours: max,
            poll_secs,
        } = self.schedule;
        if !(min > 0.0 && min <= max && max <= MAX_INTERVAL_HOURS) {
            return Err(Error::ConfigurationMissing(format!(
                "invalid interval range: min={min} max={max} hours"
            )));
        }
        if poll_secs == 0 {
            return Err(Error::ConfigurationMissing("schedule.poll_secs must be > 0".into()));
        }

        Ok(())
    }

    pub fn api_key(&self) -> Option<&str> {
        self.openai
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
    }
}

/// Load `KEY=value` pairs from a `.env` file into the process environment.
///
/// Without `path`, `.env` is searched from the working directory upward.
/// Variables already set in the environment win. A missing file is fine.
pub fn load_env_file(path: Option<&Path>) -> Result<Option<PathBuf>> {
    let loaded = match path {
        Some(p) => dotenvy::from_path(p).map(|()| p.to_path_buf()),
        None => dotenvy::dotenv(),
    };

    match loaded {
        Ok(file) => {
            info!("Loaded environment from {}", file.display());
            Ok(Some(file))
        }
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(Error::InvalidConfig {
            path: path.map_or_else(|| PathBuf::from(".env"), Path::to_path_buf),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn valid() -> Config {
        let mut config = Config::default();
        config.openai.api_key = Some("sk-test".into());
        config
    }

    #[test]
    fn parses_partial_yaml_with_defaults() {
        let yaml = "schedule:\n  min_interval_hours: 0.01\n  max_interval_hours: 0.02\nplayback:\n  bluetooth_output: true\n";
        let config: Config = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.schedule.min_interval_hours, 0.01);
        assert_eq!(config.schedule.poll_secs, 60);
        assert!(config.playback.bluetooth_output);
        assert_eq!(config.openai.chat_model, "gpt-4o");
        assert_eq!(config.voice_conversion.diffusion_steps, 40);
        assert_eq!(config.output_dir, PathBuf::from("outputs"));
    }

    #[test]
    fn load_falls_back_to_defaults_on_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "schedule: [not, a, map").unwrap();
        assert!(matches!(Config::from_file(&path), Err(Error::InvalidConfig { .. })));
        let config = Config::load(Some(&path));
        assert_eq!(config.schedule.max_interval_hours, 3.0);
    }

    #[test]
    fn env_file_feeds_process_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "WELCOME_BACK_TEST_ENV_FILE_KEY=sk-from-file\n").unwrap();

        let loaded = load_env_file(Some(&path)).unwrap();

        assert_eq!(loaded, Some(path));
        assert_eq!(
            std::env::var("WELCOME_BACK_TEST_ENV_FILE_KEY").as_deref(),
            Ok("sk-from-file")
        );
    }

    #[test]
    fn missing_env_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_env_file(Some(&dir.path().join(".env"))).unwrap();
        assert_eq!(loaded, None);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("OPENAI_API_KEY", "sk-env"),
            ("BLUETOOTH_OUTPUT", "TRUE"),
            ("BLUETOOTH_TARGET_DEVICE_NAME", "Soundcore"),
            ("VOICE_CONVERTER_PATH", "/opt/seed-vc"),
            ("WELCOME_BACK_OUTPUT_DIR", "/var/tmp/wb"),
        ]));
        assert_eq!(config.api_key(), Some("sk-env"));
        assert!(config.playback.bluetooth_output);
        assert_eq!(config.playback.bluetooth_target_device.as_deref(), Some("Soundcore"));
        assert_eq!(config.voice_conversion.tool_path, Some(PathBuf::from("/opt/seed-vc")));
        assert_eq!(config.output_dir, PathBuf::from("/var/tmp/wb"));
    }

    #[test]
    fn bluetooth_flag_only_true_enables() {
        let mut config = Config::default();
        config.playback.bluetooth_output = true;
        config.apply_env(env(&[("BLUETOOTH_OUTPUT", "yes")]));
        assert!(!config.playback.bluetooth_output);
    }

    #[test]
    fn seed_vc_path_is_an_alias() {
        let mut config = Config::default();
        config.apply_env(env(&[("SEED_VC_PATH", "/srv/seed-vc")]));
        assert_eq!(config.voice_conversion.tool_path, Some(PathBuf::from("/srv/seed-vc")));
    }

    #[test]
    fn validate_requires_api_key() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(Error::ConfigurationMissing(_))));

        let mut blank = Config::default();
        blank.openai.api_key = Some("   ".into());
        assert!(blank.validate().is_err());

        assert!(valid().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_intervals() {
        let mut config = valid();
        config.schedule.min_interval_hours = 0.0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.schedule.min_interval_hours = 3.0;
        config.schedule.max_interval_hours = 1.0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.schedule.min_interval_hours = 2.0;
        config.schedule.max_interval_hours = 2.0;
        assert!(config.validate().is_ok());

        let mut config = valid();
        config.schedule.max_interval_hours = 1e300;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.schedule.max_interval_hours = f64::NAN;
        assert!(config.validate().is_err());
    }
}
