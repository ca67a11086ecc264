//! OpenAI-compatible chat provider.
//!
//! Request and response bodies use the `async-openai` wire types; the network
//! call itself belongs to the runtime. Works against any endpoint speaking the
//! chat completions protocol (OpenAI, DeepSeek, vLLM, ...).

use async_openai::config::{Config, OpenAIConfig};
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType, CompletionUsage,
    CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    CreateChatCompletionStreamResponse, FunctionCall, FunctionObjectArgs,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use strand_core::error::AiError;
use strand_core::memory::MemoryMessage;
use strand_core::provider::Provider;
use strand_core::types::*;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";
const DONE_MARKER: &str = "[DONE]";

/// Metadata key carrying the id of the call a tool turn answers
pub const TOOL_CALL_ID_KEY: &str = "tool_call_id";

/// Options consumed by the typed request builder; everything else is passed
/// through to the request body untouched.
const TYPED_OPTIONS: &[&str] = &[
    option_keys::MODEL,
    option_keys::TEMPERATURE,
    option_keys::MAX_TOKENS,
    option_keys::TOP_P,
    option_keys::TOOLS,
];

/// OpenAI-compatible provider
#[derive(Clone)]
pub struct OpenAiProvider {
    config: OpenAIConfig,
    model: String,
    info: Arc<ProviderInfo>,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("info", &self.info)
            .field("api_base", &self.config.api_base())
            .field("model", &self.model)
            .finish()
    }
}

/// Error envelope some servers send in place of a chunk
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenAiProvider {
    /// Create a provider for the public OpenAI API
    pub fn new(api_key: impl Into<String>) -> Result<Self, AiError> {
        Self::builder().api_key(api_key).build()
    }

    /// Create a builder for more configuration options
    pub fn builder() -> OpenAiBuilder {
        OpenAiBuilder::default()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn convert_message(message: &MemoryMessage) -> Result<ChatCompletionRequestMessage, AiError> {
        let content = message.content.clone();
        let built = match Role::parse(&message.role).unwrap_or(Role::User) {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(content)
                .build()
                .map(ChatCompletionRequestMessage::System),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(content)
                .build()
                .map(ChatCompletionRequestMessage::User),
            Role::Assistant => {
                let mut args = ChatCompletionRequestAssistantMessageArgs::default();
                if !content.is_empty() || message.tool_calls.is_empty() {
                    args.content(content);
                }
                if !message.tool_calls.is_empty() {
                    args.tool_calls(
                        message
                            .tool_calls
                            .iter()
                            .map(Self::convert_tool_call)
                            .collect::<Vec<_>>(),
                    );
                }
                args.build().map(ChatCompletionRequestMessage::Assistant)
            }
            Role::Tool => {
                let tool_call_id = message
                    .metadata
                    .get(TOOL_CALL_ID_KEY)
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        AiError::configuration(format!(
                            "tool turn is missing the `{TOOL_CALL_ID_KEY}` metadata entry"
                        ))
                    })?;
                ChatCompletionRequestToolMessageArgs::default()
                    .content(content)
                    .tool_call_id(tool_call_id)
                    .build()
                    .map(ChatCompletionRequestMessage::Tool)
            }
        };

        built.map_err(|e| {
            AiError::configuration(format!("Failed to build {} message: {e}", message.role))
        })
    }

    fn convert_tool_call(call: &ToolCall) -> ChatCompletionMessageToolCall {
        let arguments = match &call.arguments {
            Value::String(raw) => raw.clone(),
            other => other.to_string(),
        };
        ChatCompletionMessageToolCall {
            id: call.id.clone(),
            r#type: ChatCompletionToolType::Function,
            function: FunctionCall {
                name: call.name.clone(),
                arguments,
            },
        }
    }

    fn convert_tool(tool: &Tool) -> Result<ChatCompletionTool, AiError> {
        let function = FunctionObjectArgs::default()
            .name(tool.name.clone())
            .description(tool.description.clone())
            .parameters(tool.parameters.clone())
            .build()
            .map_err(|e| AiError::configuration(format!("Failed to build tool: {e}")))?;

        ChatCompletionToolArgs::default()
            .r#type(ChatCompletionToolType::Function)
            .function(function)
            .build()
            .map_err(|e| AiError::configuration(format!("Failed to build tool: {e}")))
    }

    /// Encode a chat completion body from conversation turns
    fn build_request(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        options: &Options,
        stream: bool,
    ) -> Result<Vec<u8>, AiError> {
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(options.model().unwrap_or(&self.model))
            .messages(messages);

        if let Some(max_tokens) = options.max_tokens() {
            builder.max_tokens(max_tokens);
        }
        if let Some(temperature) = options.temperature() {
            builder.temperature(temperature);
        }
        if let Some(top_p) = options
            .get(option_keys::TOP_P)
            .and_then(Value::as_f64)
        {
            builder.top_p(top_p as f32);
        }
        if let Some(tools) = options.tools() {
            let tools: Result<Vec<_>, _> = tools.iter().map(Self::convert_tool).collect();
            builder.tools(tools?);
        }
        if stream {
            builder.stream(true);
        }

        let request = builder
            .build()
            .map_err(|e| AiError::configuration(format!("Failed to build request: {e}")))?;

        let mut body = serde_json::to_value(&request)?;
        if let Value::Object(fields) = &mut body {
            pass_through(fields, options);
            if stream {
                fields
                    .entry("stream_options")
                    .or_insert_with(|| serde_json::json!({ "include_usage": true }));
            }
        }

        Ok(serde_json::to_vec(&body)?)
    }

    fn prompt_messages(prompt: &str) -> Result<Vec<ChatCompletionRequestMessage>, AiError> {
        Ok(vec![Self::convert_message(&MemoryMessage::new(
            Role::User,
            prompt,
        ))?])
    }
}

/// Copy caller options the typed builder does not know about into the body
fn pass_through(fields: &mut Map<String, Value>, options: &Options) {
    for (key, value) in options.iter() {
        if !TYPED_OPTIONS.contains(&key.as_str()) {
            fields.insert(key.clone(), value.clone());
        }
    }
}

fn usage_of(usage: &CompletionUsage) -> Usage {
    Usage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    }
}

impl Provider for OpenAiProvider {
    fn info(&self) -> Arc<ProviderInfo> {
        self.info.clone()
    }

    fn endpoint(&self) -> String {
        self.config.url(CHAT_COMPLETIONS_PATH)
    }

    fn headers(&self) -> HashMap<String, String> {
        self.config
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                let value = value.to_str().ok()?;
                Some((name.as_str().to_string(), value.to_string()))
            })
            .collect()
    }

    fn prepare_request(&self, prompt: &str, options: &Options) -> Result<Vec<u8>, AiError> {
        self.build_request(Self::prompt_messages(prompt)?, options, false)
    }

    fn prepare_stream_request(
        &self,
        prompt: &str,
        options: &Options,
    ) -> Result<Vec<u8>, AiError> {
        self.build_request(Self::prompt_messages(prompt)?, options, true)
    }

    fn prepare_structured_request(
        &self,
        messages: &[MemoryMessage],
        options: &Options,
    ) -> Result<Vec<u8>, AiError> {
        let messages: Result<Vec<_>, _> = messages.iter().map(Self::convert_message).collect();
        self.build_request(messages?, options, false)
    }

    fn prepare_structured_stream_request(
        &self,
        messages: &[MemoryMessage],
        options: &Options,
    ) -> Result<Vec<u8>, AiError> {
        let messages: Result<Vec<_>, _> = messages.iter().map(Self::convert_message).collect();
        self.build_request(messages?, options, true)
    }

    fn parse_response(&self, body: &[u8]) -> Result<String, AiError> {
        let response: CreateChatCompletionResponse = serde_json::from_slice(body)?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AiError::response("response contained no choices"))?;

        if let Some(content) = choice.message.content {
            return Ok(content);
        }

        // Tool-only replies are returned as a JSON array of calls
        match choice.message.tool_calls {
            Some(calls) if !calls.is_empty() => {
                let calls: Vec<ToolCall> = calls
                    .into_iter()
                    .map(|call| ToolCall {
                        arguments: serde_json::from_str(&call.function.arguments)
                            .unwrap_or(Value::String(call.function.arguments)),
                        id: call.id,
                        name: call.function.name,
                    })
                    .collect();
                Ok(serde_json::to_string(&calls)?)
            }
            _ => Ok(String::new()),
        }
    }

    fn parse_stream_response(&self, event: &RawEvent) -> Result<StreamPayload, AiError> {
        let payload = event.payload_str();
        let payload = payload.trim();
        if payload.is_empty() {
            return Ok(StreamPayload::Skip);
        }
        if payload == DONE_MARKER {
            return Ok(StreamPayload::Done);
        }

        let chunk: CreateChatCompletionStreamResponse = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(err) => {
                if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(payload) {
                    return Ok(StreamPayload::Token(
                        TokenDelta::text(envelope.error.message).with_kind(TokenKind::Error),
                    ));
                }
                return Err(err.into());
            }
        };

        let usage = chunk.usage.as_ref().map(usage_of);
        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(match usage {
                Some(usage) => StreamPayload::Token(TokenDelta::text("").with_usage(usage)),
                None => StreamPayload::Skip,
            });
        };

        let mut delta = match (choice.delta.content, choice.delta.tool_calls) {
            (Some(content), _) if !content.is_empty() => TokenDelta::text(content),
            (_, Some(calls)) if !calls.is_empty() => {
                let mut delta = TokenDelta::text("").with_kind(TokenKind::FunctionCall);
                for call in calls {
                    delta = delta.with_metadata("tool_index", call.index);
                    if let Some(id) = call.id {
                        delta = delta.with_metadata("tool_call_id", id);
                    }
                    if let Some(function) = call.function {
                        if let Some(name) = function.name {
                            delta = delta.with_metadata("name", name);
                        }
                        delta.text.push_str(&function.arguments.unwrap_or_default());
                    }
                }
                delta
            }
            _ if choice.finish_reason.is_some() || usage.is_some() => TokenDelta::text(""),
            _ => return Ok(StreamPayload::Skip),
        };

        if let Some(reason) = choice.finish_reason {
            delta = delta.with_metadata("finish_reason", serde_json::to_value(reason)?);
        }
        if let Some(usage) = usage {
            delta = delta.with_usage(usage);
        }
        Ok(StreamPayload::Token(delta))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_streaming: true,
            supports_structured_messages: true,
        }
    }

    fn stream_format(&self) -> StreamFormat {
        StreamFormat::EventDelimited
    }
}

/// Builder for OpenAI provider with custom configuration
#[derive(Default)]
pub struct OpenAiBuilder {
    api_key: Option<String>,
    api_base: Option<String>,
    org_id: Option<String>,
    model: Option<String>,
}

impl OpenAiBuilder {
    /// Set API key
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set API base URL (for OpenAI-compatible APIs like DeepSeek)
    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    /// Set organization ID
    pub fn organization(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    /// Model used when a request does not name one
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Build the provider
    pub fn build(self) -> Result<OpenAiProvider, AiError> {
        self.build_with_id("openai", "OpenAI")
    }

    /// Build a provider with a custom provider ID and name
    ///
    /// This is useful for OpenAI-compatible APIs like DeepSeek that use
    /// the same protocol but different endpoints.
    pub fn build_with_id(
        self,
        provider_id: impl Into<String>,
        provider_name: impl Into<String>,
    ) -> Result<OpenAiProvider, AiError> {
        let api_key = self
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AiError::authentication("API key is required"))?;

        let mut config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(
                self.api_base
                    .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                    .trim_end_matches('/'),
            );

        if let Some(org_id) = self.org_id {
            config = config.with_org_id(org_id);
        }

        Ok(OpenAiProvider {
            config,
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            info: Arc::new(ProviderInfo {
                id: provider_id.into(),
                name: provider_name.into(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::builder()
            .api_key("sk-test")
            .api_base("http://localhost:8080/v1/")
            .model("test-model")
            .build()
            .expect("provider")
    }

    fn body(bytes: Vec<u8>) -> Value {
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let err = OpenAiProvider::builder().api_key("  ").build().unwrap_err();
        assert!(matches!(err, AiError::Authentication(_)));
        assert!(OpenAiProvider::builder().build().is_err());
    }

    #[test]
    fn endpoint_and_headers() {
        let provider = provider();
        assert_eq!(provider.endpoint(), "http://localhost:8080/v1/chat/completions");
        assert_eq!(provider.stream_endpoint(), provider.endpoint());

        let headers = provider.headers();
        let auth = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
            .map(|(_, value)| value.as_str());
        assert_eq!(auth, Some("Bearer sk-test"));
    }

    #[test]
    fn prompt_request_uses_default_model_and_options() {
        let options = Options::new()
            .with_temperature(0.25)
            .with_max_tokens(64)
            .with("seed", 7);
        let sent = body(provider().prepare_request("Hello", &options).expect("body"));

        assert_eq!(sent["model"], "test-model");
        assert_eq!(sent["messages"][0]["role"], "user");
        assert_eq!(sent["messages"][0]["content"], "Hello");
        assert_eq!(sent["temperature"], 0.25);
        assert_eq!(sent["max_tokens"], 64);
        assert_eq!(sent["seed"], 7);
        assert!(sent.get("stream").map_or(true, |s| s != true));
    }

    #[test]
    fn stream_request_asks_for_usage() {
        let options = Options::new().with_model("other-model");
        let sent = body(provider().prepare_stream_request("Hi", &options).expect("body"));
        assert_eq!(sent["model"], "other-model");
        assert_eq!(sent["stream"], true);
        assert_eq!(sent["stream_options"]["include_usage"], true);
    }

    #[test]
    fn structured_request_keeps_turns_and_tools() {
        let messages = vec![
            MemoryMessage::new(Role::System, "be brief"),
            MemoryMessage::new(Role::User, "weather?"),
            MemoryMessage::new(Role::Assistant, "").with_tool_calls(vec![ToolCall {
                id: "call_1".to_string(),
                name: "weather".to_string(),
                arguments: json!({ "city": "Oslo" }),
            }]),
            MemoryMessage::new(Role::Tool, "rainy").with_metadata(TOOL_CALL_ID_KEY, "call_1"),
        ];
        let options = Options::new().with_tools(vec![Tool {
            name: "weather".to_string(),
            description: "Look up the weather".to_string(),
            parameters: json!({ "type": "object", "properties": { "city": { "type": "string" } } }),
        }]);

        let sent = body(
            provider()
                .prepare_structured_request(&messages, &options)
                .expect("body"),
        );
        let roles: Vec<_> = sent["messages"]
            .as_array()
            .expect("messages")
            .iter()
            .map(|m| m["role"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(roles, ["system", "user", "assistant", "tool"]);
        assert_eq!(
            sent["messages"][2]["tool_calls"][0]["function"]["arguments"],
            "{\"city\":\"Oslo\"}"
        );
        assert_eq!(sent["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(sent["tools"][0]["function"]["name"], "weather");
    }

    #[test]
    fn structured_stream_request_keeps_roles() {
        let messages = vec![
            MemoryMessage::new(Role::System, "be brief"),
            MemoryMessage::new(Role::User, "hello"),
            MemoryMessage::new(Role::Assistant, "hi"),
            MemoryMessage::new(Role::User, "and now?"),
        ];
        let sent = body(
            provider()
                .prepare_structured_stream_request(&messages, &Options::new())
                .expect("body"),
        );

        assert_eq!(sent["stream"], true);
        assert_eq!(sent["stream_options"]["include_usage"], true);
        let turns: Vec<_> = sent["messages"]
            .as_array()
            .expect("messages")
            .iter()
            .map(|m| m["role"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(turns, ["system", "user", "assistant", "user"]);
        assert_eq!(sent["messages"][3]["content"], "and now?");
    }

    #[test]
    fn tool_turn_without_call_id_is_rejected() {
        let messages = vec![MemoryMessage::new(Role::Tool, "orphan")];
        let err = provider()
            .prepare_structured_request(&messages, &Options::new())
            .unwrap_err();
        assert!(matches!(err, AiError::Configuration(_)));
    }

    #[test]
    fn parses_completion_text() {
        let response = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "test-model",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "Hello there" },
                "finish_reason": "stop",
                "logprobs": null
            }],
            "usage": { "prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5 }
        });
        let text = provider()
            .parse_response(response.to_string().as_bytes())
            .expect("text");
        assert_eq!(text, "Hello there");
    }

    #[test]
    fn malformed_completion_is_a_response_error() {
        let err = provider().parse_response(b"<html>").unwrap_err();
        assert!(matches!(err, AiError::Response(_)));
    }

    #[test]
    fn stream_events_map_to_payloads() {
        let provider = provider();
        let chunk = |delta: Value, finish: Value| {
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion.chunk",
                "created": 1_700_000_000,
                "model": "test-model",
                "choices": [{ "index": 0, "delta": delta, "finish_reason": finish }]
            })
            .to_string()
        };

        let role_only = RawEvent::new(
            "message",
            chunk(json!({ "role": "assistant" }), Value::Null),
        );
        assert_eq!(
            provider.parse_stream_response(&role_only).expect("skip"),
            StreamPayload::Skip
        );

        let text = RawEvent::new("message", chunk(json!({ "content": "Hel" }), Value::Null));
        match provider.parse_stream_response(&text).expect("token") {
            StreamPayload::Token(delta) => {
                assert_eq!(delta.text, "Hel");
                assert_eq!(delta.kind, TokenKind::Text);
            }
            other => panic!("unexpected payload: {other:?}"),
        }

        let done = RawEvent::new("message", "[DONE]\n");
        assert_eq!(
            provider.parse_stream_response(&done).expect("done"),
            StreamPayload::Done
        );
    }

    #[test]
    fn stream_usage_chunk_carries_counts() {
        let usage_only = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1_700_000_000,
            "model": "test-model",
            "choices": [],
            "usage": { "prompt_tokens": 9, "completion_tokens": 4, "total_tokens": 13 }
        });
        let event = RawEvent::new("message", usage_only.to_string());
        match provider().parse_stream_response(&event).expect("usage") {
            StreamPayload::Token(delta) => {
                assert!(delta.text.is_empty());
                assert_eq!(delta.usage.map(|u| u.prompt_tokens), Some(9));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn stream_error_envelope_becomes_error_token() {
        let event = RawEvent::new("message", r#"{"error":{"message":"overloaded"}}"#);
        match provider().parse_stream_response(&event).expect("error token") {
            StreamPayload::Token(delta) => {
                assert_eq!(delta.kind, TokenKind::Error);
                assert_eq!(delta.text, "overloaded");
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
