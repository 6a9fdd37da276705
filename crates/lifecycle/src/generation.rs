//! Generation clients: the external text-generation call made when a
//! teacher approves a run.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error type for generation calls.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Network or HTTP transport error.
    #[error("generation network error: {0}")]
    Network(String),

    /// The provider answered with an error status.
    #[error("generation API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The provider's response could not be understood.
    #[error("generation parse error: {0}")]
    Parse(String),

    /// No provider is configured.
    #[error("generation unavailable: {0}")]
    Unconfigured(String),
}

/// Privilege level a generation call runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Student,
    /// Reserved for runs a teacher has approved.
    Teacher,
}

impl ExecutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::Student => "student",
            ExecutionMode::Teacher => "teacher",
        }
    }

    /// System prompt sent along with the user's prompt.
    pub fn system_prompt(self) -> &'static str {
        match self {
            ExecutionMode::Student => {
                "You are a patient tutor talking to a student. Guide them toward the answer \
                 with questions and hints instead of handing it over."
            }
            ExecutionMode::Teacher => {
                "You are assisting a teacher who approved this request. Produce a complete, \
                 classroom-ready proposal. If you also assess the request, append the \
                 assessment as a single fenced ```json block at the very end."
            }
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    /// Structured analysis returned alongside the text, if any.
    #[serde(default)]
    pub analysis: Option<serde_json::Value>,
}

impl Generation {
    /// Split a raw completion into text and a trailing fenced JSON analysis.
    pub fn from_completion(raw: &str) -> Self {
        let (text, analysis) = split_analysis(raw);
        Generation {
            text: text.to_string(),
            analysis,
        }
    }
}

/// Client for the external generation service.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate a response to `prompt` under `mode`.
    async fn generate(
        &self,
        prompt: &str,
        mode: ExecutionMode,
    ) -> Result<Generation, GenerationError>;

    /// Provenance tag recorded on artefacts this client produced.
    fn provider(&self) -> &str;

    /// Model identifier, when the provider reports one.
    fn model(&self) -> Option<&str> {
        None
    }
}

/// Stand-in used when no provider is configured. Every call fails, so an
/// approval still ends with the run in `failed` and an explanatory note.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredClient;

#[async_trait]
impl GenerationClient for UnconfiguredClient {
    async fn generate(
        &self,
        _prompt: &str,
        _mode: ExecutionMode,
    ) -> Result<Generation, GenerationError> {
        Err(GenerationError::Unconfigured(
            "no generation provider configured (set ANTHROPIC_API_KEY)".to_string(),
        ))
    }

    fn provider(&self) -> &str {
        "unconfigured"
    }
}

/// Separate a trailing ```` ```json ```` block from the text before it.
///
/// The block is only taken when it closes the completion and parses as
/// JSON; otherwise the whole completion is text.
pub(crate) fn split_analysis(raw: &str) -> (&str, Option<serde_json::Value>) {
    let trimmed = raw.trim_end();
    let Some(body) = trimmed.strip_suffix("```") else {
        return (trimmed, None);
    };
    let Some(open) = body.rfind("```json") else {
        return (trimmed, None);
    };
    let inner = &body[open + "```json".len()..];
    match serde_json::from_str(inner.trim()) {
        Ok(value) => (body[..open].trim_end(), Some(value)),
        Err(_) => (trimmed, None),
    }
}

// -- AnthropicClient (feature-gated) --

#[cfg(feature = "anthropic")]
pub const ENV_API_KEY: &str = "ANTHROPIC_API_KEY";
#[cfg(feature = "anthropic")]
pub const ENV_MODEL: &str = "RUNLEDGER_MODEL";
#[cfg(feature = "anthropic")]
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

#[cfg(feature = "anthropic")]
/// Generation client for the Anthropic Messages API.
///
/// Uses `ureq` for HTTP on a blocking worker thread.
pub struct AnthropicClient {
    api_key: String,
    /// Base URL (default: https://api.anthropic.com).
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
}

#[cfg(feature = "anthropic")]
impl AnthropicClient {
    /// Create a client from `ANTHROPIC_API_KEY`, with the model taken from
    /// `RUNLEDGER_MODEL` when set.
    pub fn from_env() -> Result<Self, GenerationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GenerationError> {
        let api_key = lookup(ENV_API_KEY)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                GenerationError::Unconfigured(format!("{ENV_API_KEY} environment variable not set"))
            })?;
        let mut client = Self::new(api_key);
        if let Some(model) = lookup(ENV_MODEL).filter(|m| !m.trim().is_empty()) {
            client.model = model;
        }
        Ok(client)
    }

    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: "https://api.anthropic.com".to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 2048,
        }
    }

    fn request_body(&self, prompt: &str, mode: ExecutionMode) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": mode.system_prompt(),
            "messages": [{"role": "user", "content": prompt}],
        })
    }
}

#[cfg(feature = "anthropic")]
#[async_trait]
impl GenerationClient for AnthropicClient {
    async fn generate(
        &self,
        prompt: &str,
        mode: ExecutionMode,
    ) -> Result<Generation, GenerationError> {
        let api_key = self.api_key.clone();
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.request_body(prompt, mode);
        tracing::debug!(model = %self.model, %mode, "calling generation provider");

        let raw = tokio::task::spawn_blocking(move || -> Result<String, GenerationError> {
            let agent = ureq::Agent::new_with_defaults();
            let response = agent
                .post(&url)
                .header("x-api-key", &api_key)
                .header("anthropic-version", "2023-06-01")
                .header("content-type", "application/json")
                .send_json(body);

            let mut response = match response {
                Ok(resp) => resp,
                Err(ureq::Error::StatusCode(status)) => {
                    return Err(GenerationError::Api {
                        status,
                        message: "provider rejected the request".to_string(),
                    })
                }
                Err(e) => return Err(GenerationError::Network(e.to_string())),
            };
            let json: serde_json::Value = response.body_mut().read_json().map_err(|e| {
                GenerationError::Parse(format!("failed to parse provider response: {e}"))
            })?;
            json["content"]
                .as_array()
                .map(|blocks| {
                    blocks
                        .iter()
                        .filter_map(|c| c["text"].as_str())
                        .collect::<Vec<_>>()
                        .join("")
                })
                .filter(|text| !text.is_empty())
                .ok_or_else(|| GenerationError::Parse("no text content in response".to_string()))
        })
        .await
        .map_err(|e| GenerationError::Network(format!("task join error: {e}")))??;

        Ok(Generation::from_completion(&raw))
    }

    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> Option<&str> {
        Some(&self.model)
    }
}
