//! Message generation via the OpenAI chat completions API.
//!
//! Asks for a small batch of short messages in the configured persona and
//! speaks one of them, chosen at random.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::{OpenAiConfig, PersonaConfig};
use crate::error::{Error, Result};
use crate::schedule::TimeOfDay;

const SYSTEM_PROMPT: &str = "You are a helpful assistant that generates JSON arrays.";

const PROMPT_TEMPLATE: &str = r#"You are writing as a loving {relation} talking to their grandchild.

Current datetime: {datetime}
Time period: {period}

Task:
- Generate {count} short, warm, everyday messages this {relation} might naturally say to the grandchild at this time of day.
- Write them in {language}.
- Each message is 1-2 sentences, gentle and caring, like a voice message from family.
- Never mention AI, programs, or that the {relation} has passed away. Speak as if alive and talking normally.
- Fit the time period: {topics}.
- Mix simple greetings, small life reminders (health, meals, sleep, clothing, safety) and emotional support (proud of you, miss you, take it slowly, tell me if anything is wrong).
- Keep it close and warm.{nicknames}

Output format:
- Return ONLY a JSON array of strings, e.g. ["sentence1", "sentence2"]"#;

#[async_trait]
pub trait MessageGenerator: Send + Sync {
    /// One short message suited to `category` at `now`.
    async fn generate(&self, category: TimeOfDay, now: DateTime<Local>) -> Result<String>;
}

pub struct OpenAiMessageGenerator {
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    candidates: usize,
    persona: PersonaConfig,
    client: Client,
}

impl OpenAiMessageGenerator {
    pub fn new(config: &OpenAiConfig, persona: &PersonaConfig) -> Result<Self> {
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
            model: config.chat_model.clone(),
            temperature: config.temperature,
            candidates: config.candidates.max(1),
            persona: persona.clone(),
            client,
        })
    }

    fn prompt(&self, category: TimeOfDay, now: DateTime<Local>) -> String {
        let nicknames = if self.persona.nicknames.is_empty() {
            String::new()
        } else {
            format!(
                " Now and then use a pet name such as {}, without overdoing it.",
                self.persona.nicknames.join(", ")
            )
        };

        PROMPT_TEMPLATE
            .replace("{relation}", &self.persona.relation)
            .replace("{datetime}", &now.format("%Y-%m-%d %H:%M").to_string())
            .replace("{period}", &category.to_string())
            .replace("{count}", &self.candidates.to_string())
            .replace("{language}", &self.persona.language)
            .replace("{topics}", category.topics())
            .replace("{nicknames}", &nicknames)
    }
}

#[async_trait]
impl MessageGenerator for OpenAiMessageGenerator {
    async fn generate(&self, category: TimeOfDay, now: DateTime<Local>) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": self.prompt(category, now)},
            ],
            "temperature": self.temperature,
        });

        let url = format!("{}/chat/completions", self.base_url);
        debug!("Requesting {} messages for {category} from {}", self.candidates, self.model);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::UpstreamFailure(format!("chat completion request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::UpstreamFailure(format!(
                "chat completion returned status {status}: {}",
                text.trim()
            )));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| Error::UpstreamFailure(format!("invalid chat completion response: {e}")))?;

        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();
        if content.is_empty() {
            return Err(Error::UpstreamFailure("chat completion returned no content".into()));
        }

        let message = pick_message(&content, &mut rand::thread_rng());
        info!("Generated {category} message: {message}");
        Ok(message)
    }
}

/// Remove a surrounding ```json fence if the model added one.
fn strip_code_fence(content: &str) -> &str {
    let s = content.trim();
    let s = s.strip_prefix("```json").unwrap_or(s);
    let s = s.strip_prefix("```").unwrap_or(s);
    let s = s.strip_suffix("```").unwrap_or(s);
    s.trim()
}

/// Uniform pick from a JSON array reply; anything else is spoken verbatim.
pub fn pick_message(content: &str, rng: &mut impl Rng) -> String {
    let stripped = strip_code_fence(content);
    match serde_json::from_str::<Value>(stripped) {
        Ok(Value::Array(items)) if !items.is_empty() => match items.choose(rng) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(other) => other.to_string(),
            None => stripped.to_string(),
        },
        _ => stripped.to_string(),
    }
}
