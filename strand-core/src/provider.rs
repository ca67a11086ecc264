//! Provider trait and core abstractions.

use crate::error::AiError;
use crate::memory::MemoryMessage;
use crate::types::*;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Vendor-specific request encoding and response decoding.
///
/// Providers never perform I/O. The runtime owns the network call, the retry
/// loop and stream framing; a provider only turns prompts into request bodies
/// and response bodies back into text or tokens.
pub trait Provider: Send + Sync + Debug + 'static {
    /// Get provider information
    fn info(&self) -> Arc<ProviderInfo>;

    /// Endpoint for non-streaming requests
    fn endpoint(&self) -> String;

    /// Endpoint for streaming requests, when it differs from [`Provider::endpoint`]
    fn stream_endpoint(&self) -> String {
        self.endpoint()
    }

    /// Headers sent with every request, credentials included
    fn headers(&self) -> HashMap<String, String>;

    /// Encode a non-streaming request body
    fn prepare_request(&self, prompt: &str, options: &Options) -> Result<Vec<u8>, AiError>;

    /// Encode a streaming request body
    fn prepare_stream_request(&self, prompt: &str, options: &Options)
        -> Result<Vec<u8>, AiError>;

    /// Encode a request from individual conversation turns.
    ///
    /// Only called when [`Capabilities::supports_structured_messages`] is set.
    fn prepare_structured_request(
        &self,
        _messages: &[MemoryMessage],
        _options: &Options,
    ) -> Result<Vec<u8>, AiError> {
        Err(AiError::unsupported(format!(
            "{} does not accept structured messages",
            self.info().name
        )))
    }

    /// Encode a streaming request from individual conversation turns
    fn prepare_structured_stream_request(
        &self,
        _messages: &[MemoryMessage],
        _options: &Options,
    ) -> Result<Vec<u8>, AiError> {
        Err(AiError::unsupported(format!(
            "{} does not stream structured messages",
            self.info().name
        )))
    }

    /// Decode a complete response body into generated text
    fn parse_response(&self, body: &[u8]) -> Result<String, AiError>;

    /// Decode one raw stream event
    fn parse_stream_response(&self, event: &RawEvent) -> Result<StreamPayload, AiError>;

    /// Optional features offered by this provider
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Framing used by the streaming endpoint
    fn stream_format(&self) -> StreamFormat {
        StreamFormat::EventDelimited
    }
}

impl<P: Provider + ?Sized> Provider for Arc<P> {
    fn info(&self) -> Arc<ProviderInfo> {
        (**self).info()
    }

    fn endpoint(&self) -> String {
        (**self).endpoint()
    }

    fn stream_endpoint(&self) -> String {
        (**self).stream_endpoint()
    }

    fn headers(&self) -> HashMap<String, String> {
        (**self).headers()
    }

    fn prepare_request(&self, prompt: &str, options: &Options) -> Result<Vec<u8>, AiError> {
        (**self).prepare_request(prompt, options)
    }

    fn prepare_stream_request(
        &self,
        prompt: &str,
        options: &Options,
    ) -> Result<Vec<u8>, AiError> {
        (**self).prepare_stream_request(prompt, options)
    }

    fn prepare_structured_request(
        &self,
        messages: &[MemoryMessage],
        options: &Options,
    ) -> Result<Vec<u8>, AiError> {
        (**self).prepare_structured_request(messages, options)
    }

    fn prepare_structured_stream_request(
        &self,
        messages: &[MemoryMessage],
        options: &Options,
    ) -> Result<Vec<u8>, AiError> {
        (**self).prepare_structured_stream_request(messages, options)
    }

    fn parse_response(&self, body: &[u8]) -> Result<String, AiError> {
        (**self).parse_response(body)
    }

    fn parse_stream_response(&self, event: &RawEvent) -> Result<StreamPayload, AiError> {
        (**self).parse_stream_response(event)
    }

    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    fn stream_format(&self) -> StreamFormat {
        (**self).stream_format()
    }
}
