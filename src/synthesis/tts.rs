//! OpenAI text-to-speech (`/audio/speech`).

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::config::OpenAiConfig;
use crate::error::{Error, Result};

pub struct OpenAiSpeech {
    api_key: String,
    base_url: String,
    model: String,
    voice: String,
    client: Client,
}

impl OpenAiSpeech {
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::ConfigurationMissing("OpenAI API key".into()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.tts_model.clone(),
            voice: config.tts_voice.clone(),
            client,
        })
    }

    /// Synthesize `text` as WAV into `output`.
    pub async fn synthesize_to(&self, text: &str, output: &Path) -> Result<()> {
        if text.trim().is_empty() {
            return Err(Error::UpstreamFailure("cannot synthesize empty text".into()));
        }

        let body = json!({
            "model": self.model,
            "voice": self.voice,
            "input": text,
            "response_format": "wav",
        });

        let resp = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::UpstreamFailure(format!("TTS request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::UpstreamFailure(format!(
                "TTS returned status {status}: {}",
                text.trim()
            )));
        }

        let audio = resp
            .bytes()
            .await
            .map_err(|e| Error::UpstreamFailure(format!("TTS response read failed: {e}")))?;
        if audio.is_empty() {
            return Err(Error::UpstreamFailure("TTS returned empty audio".into()));
        }

        tokio::fs::write(output, &audio).await?;
        debug!("Wrote {} bytes of TTS audio to {}", audio.len(), output.display());
        Ok(())
    }
}
