//! Logging layer for provider operations.
//!
//! Records sizes and timings of every encode/decode step. Prompt and
//! response content is never logged.

use std::time::Instant;
use strand_core::error::AiError;
use strand_core::layer::{Layer, LayeredProvider};
use strand_core::memory::MemoryMessage;
use strand_core::provider::Provider;
use strand_core::types::*;

/// Logging layer that logs provider operations.
#[derive(Debug, Clone)]
pub struct LoggingLayer {
    prefix: String,
}

impl LoggingLayer {
    /// Create a new logging layer
    pub fn new() -> Self {
        Self {
            prefix: "[strand]".to_string(),
        }
    }

    /// Create a logging layer with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for LoggingLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Provider> Layer<P> for LoggingLayer {
    type LayeredProvider = LoggingProvider<P>;

    fn layer(&self, inner: P) -> Self::LayeredProvider {
        LoggingProvider {
            inner,
            prefix: self.prefix.clone(),
        }
    }
}

/// Provider wrapped with logging
#[derive(Debug)]
pub struct LoggingProvider<P> {
    inner: P,
    prefix: String,
}

impl<P: Provider> LoggingProvider<P> {
    fn log_encode(
        &self,
        operation: &str,
        input: usize,
        started: Instant,
        result: &Result<Vec<u8>, AiError>,
    ) {
        let provider = self.inner.info().id.clone();
        match result {
            Ok(body) => tracing::debug!(
                provider = %provider,
                operation,
                input,
                body_bytes = body.len(),
                elapsed = ?started.elapsed(),
                "{} request encoded",
                self.prefix
            ),
            Err(e) => tracing::error!(
                provider = %provider,
                operation,
                error = %e,
                elapsed = ?started.elapsed(),
                "{} request encoding failed",
                self.prefix
            ),
        }
    }
}

impl<P: Provider> LayeredProvider for LoggingProvider<P> {
    type Inner = P;

    fn inner(&self) -> &Self::Inner {
        &self.inner
    }

    fn layered_prepare_request(
        &self,
        prompt: &str,
        options: &Options,
    ) -> Result<Vec<u8>, AiError> {
        let started = Instant::now();
        let result = self.inner.prepare_request(prompt, options);
        self.log_encode("prepare_request", prompt.len(), started, &result);
        result
    }

    fn layered_prepare_stream_request(
        &self,
        prompt: &str,
        options: &Options,
    ) -> Result<Vec<u8>, AiError> {
        let started = Instant::now();
        let result = self.inner.prepare_stream_request(prompt, options);
        self.log_encode("prepare_stream_request", prompt.len(), started, &result);
        result
    }

    fn layered_prepare_structured_request(
        &self,
        messages: &[MemoryMessage],
        options: &Options,
    ) -> Result<Vec<u8>, AiError> {
        let started = Instant::now();
        let result = self.inner.prepare_structured_request(messages, options);
        self.log_encode("prepare_structured_request", messages.len(), started, &result);
        result
    }

    fn layered_prepare_structured_stream_request(
        &self,
        messages: &[MemoryMessage],
        options: &Options,
    ) -> Result<Vec<u8>, AiError> {
        let started = Instant::now();
        let result = self
            .inner
            .prepare_structured_stream_request(messages, options);
        self.log_encode(
            "prepare_structured_stream_request",
            messages.len(),
            started,
            &result,
        );
        result
    }

    fn layered_parse_response(&self, body: &[u8]) -> Result<String, AiError> {
        let started = Instant::now();
        let result = self.inner.parse_response(body);
        let provider = self.inner.info().id.clone();

        match &result {
            Ok(text) => tracing::debug!(
                provider = %provider,
                body_bytes = body.len(),
                text_bytes = text.len(),
                elapsed = ?started.elapsed(),
                "{} response parsed",
                self.prefix
            ),
            Err(e) => tracing::error!(
                provider = %provider,
                body_bytes = body.len(),
                error = %e,
                "{} response parsing failed",
                self.prefix
            ),
        }

        result
    }

    fn layered_parse_stream_response(&self, event: &RawEvent) -> Result<StreamPayload, AiError> {
        let result = self.inner.parse_stream_response(event);

        match &result {
            Ok(payload) => tracing::trace!(
                kind = %event.kind,
                payload_bytes = event.payload.len(),
                outcome = match payload {
                    StreamPayload::Token(_) => "token",
                    StreamPayload::Skip => "skip",
                    StreamPayload::Done => "done",
                },
                "{} stream event",
                self.prefix
            ),
            Err(e) => tracing::error!(
                kind = %event.kind,
                payload_bytes = event.payload.len(),
                error = %e,
                "{} stream event parsing failed",
                self.prefix
            ),
        }

        result
    }
}

strand_core::impl_layered_provider!(impl<P> for LoggingProvider<P>);
