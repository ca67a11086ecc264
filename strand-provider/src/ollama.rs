//! Ollama provider.
//!
//! Talks to the `/api/generate` endpoint of a local Ollama server. Streaming
//! responses are newline-delimited JSON, one object per line.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use strand_core::error::AiError;
use strand_core::provider::Provider;
use strand_core::types::*;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.2";

const GENERATE_PATH: &str = "/api/generate";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Map::is_empty")]
    options: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

impl GenerateChunk {
    fn usage(&self) -> Option<Usage> {
        if self.prompt_eval_count.is_none() && self.eval_count.is_none() {
            return None;
        }
        let prompt_tokens = self.prompt_eval_count.unwrap_or_default();
        let completion_tokens = self.eval_count.unwrap_or_default();
        Some(Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        })
    }
}

/// Ollama provider
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
    model: String,
    info: Arc<ProviderInfo>,
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl OllamaProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self::builder().model(model).build()
    }

    pub fn builder() -> OllamaBuilder {
        OllamaBuilder::default()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Map generic options onto Ollama's `options` object.
    ///
    /// `max_tokens` becomes `num_predict`; unknown keys are passed through.
    fn model_options(options: &Options) -> Map<String, Value> {
        options
            .iter()
            .filter(|(key, _)| {
                key.as_str() != option_keys::MODEL && key.as_str() != option_keys::TOOLS
            })
            .map(|(key, value)| {
                let key = match key.as_str() {
                    option_keys::MAX_TOKENS => "num_predict".to_string(),
                    _ => key.clone(),
                };
                (key, value.clone())
            })
            .collect()
    }

    fn encode(&self, prompt: &str, options: &Options, stream: bool) -> Result<Vec<u8>, AiError> {
        let request = GenerateRequest {
            model: options.model().unwrap_or(&self.model),
            prompt,
            stream,
            options: Self::model_options(options),
        };
        Ok(serde_json::to_vec(&request)?)
    }
}

impl Provider for OllamaProvider {
    fn info(&self) -> Arc<ProviderInfo> {
        self.info.clone()
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, GENERATE_PATH)
    }

    fn headers(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    fn prepare_request(&self, prompt: &str, options: &Options) -> Result<Vec<u8>, AiError> {
        self.encode(prompt, options, false)
    }

    fn prepare_stream_request(
        &self,
        prompt: &str,
        options: &Options,
    ) -> Result<Vec<u8>, AiError> {
        self.encode(prompt, options, true)
    }

    fn parse_response(&self, body: &[u8]) -> Result<String, AiError> {
        let chunk: GenerateChunk = serde_json::from_slice(body)?;
        match chunk.error {
            Some(error) => Err(AiError::response(error)),
            None => Ok(chunk.response),
        }
    }

    fn parse_stream_response(&self, event: &RawEvent) -> Result<StreamPayload, AiError> {
        let chunk: GenerateChunk = serde_json::from_slice(&event.payload)?;
        if let Some(error) = chunk.error {
            return Ok(StreamPayload::Token(
                TokenDelta::text(error).with_kind(TokenKind::Error),
            ));
        }

        let usage = chunk.usage();
        if chunk.done && chunk.response.is_empty() && usage.is_none() {
            return Ok(StreamPayload::Done);
        }
        if !chunk.done && chunk.response.is_empty() {
            return Ok(StreamPayload::Skip);
        }

        let mut delta = TokenDelta::text(chunk.response);
        if let Some(usage) = usage {
            delta = delta.with_usage(usage);
        }
        if let Some(reason) = chunk.done_reason {
            delta = delta.with_metadata("done_reason", reason);
        }
        Ok(StreamPayload::Token(delta))
    }

    fn stream_format(&self) -> StreamFormat {
        StreamFormat::NewlineDelimited
    }
}

/// Builder for [`OllamaProvider`]
#[derive(Debug, Default)]
pub struct OllamaBuilder {
    base_url: Option<String>,
    model: Option<String>,
}

impl OllamaBuilder {
    /// Server address, e.g. `http://gpu-box:11434`
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Model used when a request does not name one
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn build(self) -> OllamaProvider {
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        OllamaProvider {
            base_url,
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            info: Arc::new(ProviderInfo {
                id: "ollama".to_string(),
                name: "Ollama".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token(payload: StreamPayload) -> TokenDelta {
        match payload {
            StreamPayload::Token(delta) => delta,
            other => panic!("expected token, got {other:?}"),
        }
    }

    #[test]
    fn request_maps_options() {
        let provider = OllamaProvider::builder()
            .base_url("http://gpu-box:11434/")
            .model("qwen2.5")
            .build();
        assert_eq!(provider.endpoint(), "http://gpu-box:11434/api/generate");

        let options = Options::new().with_max_tokens(32).with_temperature(0.5);
        let body: Value =
            serde_json::from_slice(&provider.prepare_stream_request("Hi", &options).expect("body"))
                .expect("json");

        assert_eq!(body["model"], "qwen2.5");
        assert_eq!(body["prompt"], "Hi");
        assert_eq!(body["stream"], true);
        assert_eq!(body["options"]["num_predict"], 32);
        assert_eq!(body["options"]["temperature"], 0.5);
        assert!(body["options"].get("max_tokens").is_none());
    }

    #[test]
    fn request_without_options_omits_object() {
        let provider = OllamaProvider::default();
        let body: Value = serde_json::from_slice(
            &provider
                .prepare_request("Hi", &Options::new().with_model("phi3"))
                .expect("body"),
        )
        .expect("json");
        assert_eq!(body["model"], "phi3");
        assert_eq!(body["stream"], false);
        assert!(body.get("options").is_none());
    }

    #[test]
    fn parses_complete_response() {
        let provider = OllamaProvider::default();
        let body = json!({ "model": "llama3.2", "response": "Hello", "done": true });
        assert_eq!(
            provider
                .parse_response(body.to_string().as_bytes())
                .expect("text"),
            "Hello"
        );

        let failed = json!({ "error": "model not found" });
        let err = provider
            .parse_response(failed.to_string().as_bytes())
            .unwrap_err();
        assert!(matches!(err, AiError::Response(_)));
    }

    #[test]
    fn stream_lines_map_to_payloads() {
        let provider = OllamaProvider::default();
        assert_eq!(provider.stream_format(), StreamFormat::NewlineDelimited);

        let delta = token(
            provider
                .parse_stream_response(&RawEvent::new("json", r#"{"response":"Hel","done":false}"#))
                .expect("token"),
        );
        assert_eq!(delta.text, "Hel");
        assert!(delta.usage.is_none());

        let last = token(
            provider
                .parse_stream_response(&RawEvent::new(
                    "json",
                    r#"{"response":"","done":true,"done_reason":"stop","prompt_eval_count":7,"eval_count":2}"#,
                ))
                .expect("final"),
        );
        assert_eq!(last.usage.map(|u| u.total_tokens), Some(9));
        assert_eq!(last.metadata["done_reason"], "stop");

        assert_eq!(
            provider
                .parse_stream_response(&RawEvent::new("json", r#"{"done":true}"#))
                .expect("done"),
            StreamPayload::Done
        );
    }

    #[test]
    fn stream_error_line_becomes_error_token() {
        let provider = OllamaProvider::default();
        let delta = token(
            provider
                .parse_stream_response(&RawEvent::new("json", r#"{"error":"out of memory"}"#))
                .expect("error token"),
        );
        assert_eq!(delta.kind, TokenKind::Error);
        assert_eq!(delta.text, "out of memory");
    }

    #[test]
    fn oversized_usage_counts_saturate() {
        let provider = OllamaProvider::default();
        let line = json!({
            "response": "",
            "done": true,
            "prompt_eval_count": u32::MAX,
            "eval_count": 5,
        });
        let delta = token(
            provider
                .parse_stream_response(&RawEvent::new("json", line.to_string()))
                .expect("final"),
        );
        let usage = delta.usage.expect("usage");
        assert_eq!(usage.prompt_tokens, u32::MAX);
        assert_eq!(usage.total_tokens, u32::MAX);
    }
}
