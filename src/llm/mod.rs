//! External LLM client abstraction for the Batch Extractor (L3, spec §4.3).
//!
//! Membria talks to exactly one configured LLM endpoint, reached through an
//! `OpenAI`-compatible chat completions API (satisfied by `OpenAI` itself,
//! and by local gateways such as Ollama or LM Studio run in compatibility
//! mode). There is deliberately no per-provider client zoo here: the
//! extractor only ever asks for one thing — decisions parsed out of a batch
//! of signals — so the trait surface stays narrow.

use crate::config::LlmConfig;
use crate::models::Module;
use crate::queue::Signal;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One extracted candidate decision, positionally aligned with the signal
/// batch passed to [`LlmClient::extract_batch`] (spec §4.3: "a JSON array,
/// one object per signal").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractionResult {
    /// The decision statement as phrased by the model.
    pub decision_statement: String,
    /// Alternatives the model says were considered.
    #[serde(default)]
    pub alternatives: Vec<String>,
    /// Model-declared confidence in `[0, 1]`.
    pub confidence: f32,
    /// Model's stated reasoning.
    #[serde(default)]
    pub reasoning: String,
    /// Module tag, parsed via [`Module::parse`] so free-form model output
    /// never fails extraction outright.
    #[serde(default, deserialize_with = "deserialize_module")]
    pub module: Module,
}

fn deserialize_module<'de, D>(deserializer: D) -> std::result::Result<Module, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(Module::parse(&raw))
}

/// A configured external LLM endpoint used for batch extraction.
pub trait LlmClient: Send + Sync {
    /// Sends one batch of signals to the model and returns one slot per
    /// signal, in the same order: `Some(result)` for an element that parsed
    /// and validated, `None` for an element the model returned but that
    /// failed schema validation (spec §9: "validate each element against a
    /// schema and discard (mark `failed`) malformed elements without
    /// aborting the batch").
    ///
    /// # Errors
    ///
    /// Returns [`Error::LlmUnavailable`] on network/connection failure,
    /// [`Error::LlmQuota`] on rate-limit/quota responses, and
    /// [`Error::LlmMalformed`] only when the response isn't a JSON array at
    /// all — a per-element validation failure never aborts the whole batch.
    fn extract_batch(&self, signals: &[Signal]) -> Result<Vec<Option<ExtractionResult>>>;
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

const SYSTEM_PROMPT: &str = "You extract software engineering decisions from AI coding assistant \
transcripts. You will be given a numbered list of excerpts. Respond with ONLY a JSON array, one \
object per excerpt in the same order, each with fields: decision_statement (string), \
alternatives (array of strings), confidence (number 0-1), reasoning (string), module (one of \
auth, database, api, infra, frontend, backend, other). No prose outside the JSON array.";

/// `OpenAI`-compatible HTTP client for the configured LLM endpoint.
pub struct HttpLlmClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl HttpLlmClient {
    /// Builds a client from the daemon's `[llm]` configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::OperationFailed {
                operation: "build_llm_http_client".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string()),
            client,
        })
    }

    fn build_prompt(signals: &[Signal]) -> String {
        let mut prompt = String::new();
        for (i, signal) in signals.iter().enumerate() {
            prompt.push_str(&format!(
                "Excerpt {}:\nprompt: {}\nresponse: {}\n\n",
                i + 1,
                signal.source_prompt,
                signal.source_response
            ));
        }
        prompt
    }
}

impl LlmClient for HttpLlmClient {
    fn extract_batch(&self, signals: &[Signal]) -> Result<Vec<Option<ExtractionResult>>> {
        if signals.is_empty() {
            return Ok(Vec::new());
        }

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: Self::build_prompt(signals),
                },
            ],
            temperature: 0.2,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("llm request timed out: {e}"))
                } else {
                    Error::LlmUnavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(Error::LlmQuota("rate limited by llm endpoint".to_string()));
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::LlmUnavailable(format!("status {status}: {body}")));
        }

        let body: ChatCompletionResponse = response.json().map_err(|e| {
            Error::LlmMalformed(format!("could not parse chat completion envelope: {e}"))
        })?;

        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| Error::LlmMalformed("no choices in llm response".to_string()))?;

        let elements: Vec<serde_json::Value> = serde_json::from_str(extract_json_array(content))
            .map_err(|e| Error::LlmMalformed(format!("response was not the expected JSON array: {e}")))?;

        let results = signals
            .iter()
            .enumerate()
            .map(|(i, _)| match elements.get(i) {
                Some(value) => match serde_json::from_value::<ExtractionResult>(value.clone()) {
                    Ok(result) => Some(result),
                    Err(e) => {
                        tracing::warn!(index = i, error = %e, "extraction element failed schema validation");
                        None
                    }
                },
                None => {
                    tracing::warn!(index = i, "llm response array shorter than signal batch");
                    None
                }
            })
            .collect();

        Ok(results)
    }
}

/// Extracts a JSON array from a model response that may be wrapped in a
/// markdown code fence or surrounded by prose.
fn extract_json_array(response: &str) -> &str {
    let trimmed = response.trim();
    if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) {
        if end >= start {
            return &trimmed[start..=end];
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_array_strips_markdown_fence() {
        let wrapped = "```json\n[{\"a\": 1}]\n```";
        assert_eq!(extract_json_array(wrapped), "[{\"a\": 1}]");
    }

    #[test]
    fn extract_json_array_strips_surrounding_prose() {
        let wrapped = "Here you go: [{\"a\": 1}] hope that helps";
        assert_eq!(extract_json_array(wrapped), "[{\"a\": 1}]");
    }

    #[test]
    fn extraction_result_parses_unknown_module_as_other() {
        let json = r#"[{"decision_statement":"x","alternatives":[],"confidence":0.5,"reasoning":"y","module":"nonsense"}]"#;
        let results: Vec<ExtractionResult> = serde_json::from_str(json).unwrap();
        assert_eq!(results[0].module, Module::Other);
    }
}
