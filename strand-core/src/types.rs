//! Core types for generation, streaming and memory.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    /// Parse a role name, case-insensitively
    pub fn parse(role: &str) -> Option<Self> {
        match role.to_ascii_lowercase().as_str() {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "tool" => Some(Role::Tool),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

/// Tool definition offered to the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Tool invocation recorded on a conversation turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Well-known option keys understood by the bundled providers.
pub mod option_keys {
    pub const MODEL: &str = "model";
    pub const TEMPERATURE: &str = "temperature";
    pub const MAX_TOKENS: &str = "max_tokens";
    pub const TOP_P: &str = "top_p";
    pub const STOP: &str = "stop";
    pub const TOOLS: &str = "tools";
}

/// Provider options attached to a request.
///
/// Keys are kept ordered so that encoded request bodies are stable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Options(BTreeMap<String, serde_json::Value>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an arbitrary option
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    /// Set the target model
    pub fn with_model(self, model: impl Into<String>) -> Self {
        self.with(option_keys::MODEL, model.into())
    }

    /// Set temperature
    pub fn with_temperature(self, temperature: f32) -> Self {
        self.with(option_keys::TEMPERATURE, f64::from(temperature))
    }

    /// Set max tokens
    pub fn with_max_tokens(self, max_tokens: u32) -> Self {
        self.with(option_keys::MAX_TOKENS, max_tokens)
    }

    /// Set tools
    pub fn with_tools(self, tools: Vec<Tool>) -> Self {
        let tools = serde_json::to_value(tools).unwrap_or(serde_json::Value::Null);
        self.with(option_keys::TOOLS, tools)
    }

    pub fn model(&self) -> Option<&str> {
        self.get(option_keys::MODEL).and_then(|v| v.as_str())
    }

    pub fn temperature(&self) -> Option<f32> {
        self.get(option_keys::TEMPERATURE)
            .and_then(|v| v.as_f64())
            .map(|v| v as f32)
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.get(option_keys::MAX_TOKENS)
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
    }

    pub fn tools(&self) -> Option<Vec<Tool>> {
        self.get(option_keys::TOOLS)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Layer these options over `defaults`; keys present here win.
    pub fn merged_over(&self, defaults: &Options) -> Options {
        let mut merged = defaults.clone();
        for (key, value) in &self.0 {
            merged.0.insert(key.clone(), value.clone());
        }
        merged
    }
}

impl FromIterator<(String, serde_json::Value)> for Options {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A prompt plus the per-call options to send it with.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub options: Options,
}

impl GenerationRequest {
    /// Create a new request with no per-call options
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            options: Options::new(),
        }
    }

    /// Replace the per-call options
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Set a single per-call option
    pub fn with_option(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.options.insert(key, value);
        self
    }
}

/// Usage statistics
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Completed generation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationResult {
    pub text: String,
    /// Attempts used, including the successful one
    pub attempts: u32,
    pub provider: String,
}

/// Kind of a streamed token
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    #[default]
    Text,
    FunctionCall,
    Error,
    Other(String),
}

/// One decoded unit of streamed output, as produced by a provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenDelta {
    pub text: String,
    pub kind: TokenKind,
    /// Usage reported alongside this delta, if any
    pub usage: Option<Usage>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TokenDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: TokenKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Provider verdict on one raw stream event
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPayload {
    Token(TokenDelta),
    /// Keep-alive or decorative event; move on to the next one
    Skip,
    /// Provider-signalled end of stream
    Done,
}

/// A token handed to the caller of a [`TokenStream`](crate::stream::TokenStream).
#[derive(Debug, Clone, PartialEq)]
pub struct StreamToken {
    pub text: String,
    pub kind: TokenKind,
    pub sequence_index: u64,
    pub input_tokens_so_far: i64,
    pub output_tokens_so_far: i64,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// One undecoded unit pulled from a streaming byte feed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: String,
    pub payload: Vec<u8>,
}

impl RawEvent {
    pub fn new(kind: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
        }
    }

    /// Payload as UTF-8, replacing invalid sequences
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Framing used by a provider's streaming endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamFormat {
    /// Named blocks separated by blank lines (server-sent events)
    #[default]
    EventDelimited,
    /// One JSON object per line
    NewlineDelimited,
}

/// Provider information
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
}

/// Optional provider features, read once when an executor is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub supports_streaming: bool,
    pub supports_structured_messages: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supports_streaming: true,
            supports_structured_messages: false,
        }
    }
}

/// Per-call context used to correlate log records
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub provider_id: String,
}

impl RequestContext {
    /// Create a new request context
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            provider_id: provider_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn per_call_options_win_on_collision() {
        let defaults = Options::new()
            .with_model("base-model")
            .with_temperature(0.2)
            .with("seed", 7);
        let overrides = Options::new().with_temperature(0.9).with("user", "abc");

        let merged = overrides.merged_over(&defaults);

        assert_eq!(merged.model(), Some("base-model"));
        assert_eq!(merged.temperature(), Some(0.9));
        assert_eq!(merged.get("seed"), Some(&json!(7)));
        assert_eq!(merged.get("user"), Some(&json!("abc")));
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn tools_round_trip_through_options() {
        let tool = Tool {
            name: "lookup".to_string(),
            description: "Look something up".to_string(),
            parameters: json!({"type": "object"}),
        };
        let options = Options::new().with_tools(vec![tool.clone()]);
        assert_eq!(options.tools(), Some(vec![tool]));
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!(Role::parse("Assistant"), Some(Role::Assistant));
        assert_eq!(Role::parse("narrator"), None);
        assert_eq!(String::from(Role::User), "user");
    }
}
