//! Gemini text generation for the writing stage.
//!
//! Requests are plain `generateContent` calls made with a blocking client on
//! the stage worker thread. Several API keys may be configured; each request
//! takes the next one in round-robin order to spread quota.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::errors::StageError;

/// A model that turns a system prompt and a user prompt into text.
pub trait TextModel: Send + Sync {
    /// Model identifier, for progress messages and logs.
    fn name(&self) -> &str;

    fn generate(&self, system: &str, prompt: &str) -> Result<String, StageError>;
}

/// Round-robin over a fixed, non-empty set of API keys.
pub struct KeyRotator {
    keys: Vec<String>,
    next: AtomicUsize,
}

impl KeyRotator {
    /// Returns `None` when no usable key is given.
    pub fn new(keys: Vec<String>) -> Option<Self> {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return None;
        }
        Some(Self {
            keys,
            next: AtomicUsize::new(0),
        })
    }

    /// The next key and its zero-based slot.
    pub fn next_key(&self) -> (usize, &str) {
        let slot = self.next.fetch_add(1, Ordering::SeqCst) % self.keys.len();
        (slot, &self.keys[slot])
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

pub struct GeminiClient {
    api_url: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    timeout: Duration,
    keys: KeyRotator,
}

impl GeminiClient {
    /// `None` when the config carries no API key.
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        let keys = KeyRotator::new(config.api_keys.clone())?;
        tracing::info!(model = %config.model, keys = keys.len(), "Gemini writer enabled");
        Some(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
            keys,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_url, self.model)
    }
}

impl TextModel for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    fn generate(&self, system: &str, prompt: &str) -> Result<String, StageError> {
        let (slot, key) = self.keys.next_key();
        tracing::debug!(model = %self.model, key_slot = slot + 1, "Sending request to Gemini");

        let client = Client::builder().timeout(self.timeout).build()?;
        let request = GeminiRequest::new(system, prompt, self.temperature, self.max_output_tokens);
        // Header auth keeps the key out of the URL that transport errors echo.
        let response = client
            .post(self.endpoint())
            .header("x-goog-api-key", key)
            .json(&request)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            tracing::warn!(status = %status, "Gemini API error response");
            return Err(StageError::Model(error_message(status.as_u16(), &body)));
        }
        let parsed: GeminiResponse = serde_json::from_str(&body).map_err(|source| StageError::Decode {
            what: "Gemini response",
            source,
        })?;
        parsed
            .text()
            .ok_or_else(|| StageError::Model("Gemini returned no text".to_string()))
    }
}

fn error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<GeminiError>(body) {
        Ok(e) => format!("{} ({} {})", e.error.message, e.error.code, e.error.status),
        Err(_) => format!("Gemini API returned HTTP {}", status),
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    system_instruction: GeminiContent,
    generation_config: GenerationConfig,
}

impl GeminiRequest {
    fn new(system: &str, prompt: &str, temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart { text: prompt.to_string() }],
            }],
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: system.to_string() }],
            },
            generation_config: GenerationConfig {
                temperature,
                max_output_tokens,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GeminiResponse {
    /// Text parts of the first candidate, joined. `None` if there is no text.
    fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let text: String = candidate.content.parts.iter().map(|p| p.text.as_str()).collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}
