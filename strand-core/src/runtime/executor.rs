//! RuntimeExecutor implementation.
//!
//! The executor owns the request/response cycle: it builds the outgoing
//! context (optionally from conversation memory), lets the provider encode
//! it, sends it through the transport and retries the whole exchange on
//! transient failures.

use crate::config::RuntimeConfig;
use crate::error::AiError;
use crate::layer::Layer;
use crate::memory::{ConversationMemory, MemoryMessage};
use crate::provider::Provider;
use crate::retry::sleep_or_cancel;
use crate::stream::TokenStream;
use crate::transport::{
    HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, StreamingResponse,
    MAX_ERROR_BODY_BYTES,
};
use crate::types::*;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Type-erased provider that can be shared across threads
type BoxedProvider = Arc<dyn Provider>;

/// Builder for composing a provider with layers, memory and settings.
///
/// # Example
///
/// ```ignore
/// let executor = RuntimeExecutor::builder(openai_provider)
///     .layer(LoggingLayer::new())
///     .config(RuntimeConfig::new().with_max_retries(2))
///     .memory(Arc::new(memory))
///     .finish();
/// ```
pub struct RuntimeExecutorBuilder<P> {
    provider: P,
    config: RuntimeConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    memory: Option<Arc<ConversationMemory>>,
    default_options: Options,
}

impl<P: Provider> RuntimeExecutorBuilder<P> {
    /// Create a new builder with a provider
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: RuntimeConfig::default(),
            transport: None,
            memory: None,
            default_options: Options::new(),
        }
    }

    /// Add a layer to wrap the provider
    ///
    /// Each call wraps the previous provider in a new concrete type.
    pub fn layer<L>(self, layer: L) -> RuntimeExecutorBuilder<L::LayeredProvider>
    where
        L: Layer<P>,
    {
        RuntimeExecutorBuilder {
            provider: layer.layer(self.provider),
            config: self.config,
            transport: self.transport,
            memory: self.memory,
            default_options: self.default_options,
        }
    }

    /// Set runtime settings
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the HTTP transport
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Attach conversation memory
    pub fn memory(mut self, memory: Arc<ConversationMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Options applied to every call unless overridden per call
    pub fn default_options(mut self, options: Options) -> Self {
        self.default_options = options;
        self
    }

    /// Set a single default option
    pub fn default_option(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.default_options.insert(key, value);
        self
    }

    /// Finish building and create a RuntimeExecutor
    pub fn finish(self) -> RuntimeExecutor {
        let provider: BoxedProvider = Arc::new(self.provider);
        let info = provider.info();
        let capabilities = provider.capabilities();
        let stream_format = provider.stream_format();

        RuntimeExecutor {
            provider,
            info,
            capabilities,
            stream_format,
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(ReqwestTransport::new())),
            memory: self.memory,
            default_options: self.default_options,
            config: self.config,
        }
    }
}

/// Runtime executor.
///
/// Main entry point for making generation requests. Provider capabilities
/// are captured once when the executor is built.
pub struct RuntimeExecutor {
    provider: BoxedProvider,
    info: Arc<ProviderInfo>,
    capabilities: Capabilities,
    stream_format: StreamFormat,
    transport: Arc<dyn HttpTransport>,
    memory: Option<Arc<ConversationMemory>>,
    default_options: Options,
    config: RuntimeConfig,
}

impl std::fmt::Debug for RuntimeExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeExecutor")
            .field("provider", &self.info.id)
            .field("capabilities", &self.capabilities)
            .field("memory", &self.memory.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl RuntimeExecutor {
    /// Create a new builder
    pub fn builder<P: Provider>(provider: P) -> RuntimeExecutorBuilder<P> {
        RuntimeExecutorBuilder::new(provider)
    }

    /// Get provider information
    pub fn info(&self) -> Arc<ProviderInfo> {
        self.info.clone()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Attached conversation memory, if any
    pub fn memory(&self) -> Option<&Arc<ConversationMemory>> {
        self.memory.as_ref()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Generate text for a bare prompt with default options
    pub async fn generate_text(
        &self,
        prompt: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, AiError> {
        self.generate(GenerationRequest::new(prompt), cancel).await
    }

    /// Run one logical generation, retrying transient failures.
    ///
    /// With memory attached, the prompt is recorded as a user turn before the
    /// context is built, and the reply is recorded as an assistant turn only
    /// after it has been parsed successfully.
    pub async fn generate(
        &self,
        request: GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, AiError> {
        let ctx = RequestContext::new(self.info.id.clone());
        let options = request.options.merged_over(&self.default_options);
        let body = self.encode_request(&request.prompt, &options)?;
        let http_request = self.http_request(self.provider.endpoint(), body);

        let (text, attempts) = self
            .execute_with_retry(&ctx, "generate", &http_request.url, cancel, || {
                self.attempt(&http_request, cancel)
            })
            .await?;

        if let Some(memory) = &self.memory {
            memory.add(Role::Assistant, text.clone());
        }

        Ok(GenerationResult {
            text,
            attempts,
            provider: self.info.id.clone(),
        })
    }

    /// Open a token stream for `request`.
    ///
    /// Memory, when attached, contributes context but is not modified;
    /// record the exchange with [`RuntimeExecutor::record_exchange`] once the
    /// stream completes.
    pub async fn stream(
        &self,
        request: GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<TokenStream, AiError> {
        if !self.capabilities.supports_streaming {
            return Err(AiError::unsupported(format!(
                "{} does not support streaming",
                self.info.name
            )));
        }

        let ctx = RequestContext::new(self.info.id.clone());
        let options = request.options.merged_over(&self.default_options);
        let body = self.encode_stream_request(&request.prompt, &options)?;
        let http_request = self.http_request(self.provider.stream_endpoint(), body);

        let (response, _) = self
            .execute_with_retry(&ctx, "stream", &http_request.url, cancel, || {
                self.open(&http_request, cancel)
            })
            .await?;

        Ok(TokenStream::from_body(
            response.body,
            self.stream_format,
            self.provider.clone(),
            self.config.retry_policy(),
        ))
    }

    /// Record a completed exchange in memory, e.g. after draining a stream
    pub fn record_exchange(&self, prompt: impl Into<String>, reply: impl Into<String>) {
        if let Some(memory) = &self.memory {
            memory.add(Role::User, prompt);
            memory.add(Role::Assistant, reply);
        }
    }

    fn encode_request(&self, prompt: &str, options: &Options) -> Result<Vec<u8>, AiError> {
        let Some(memory) = &self.memory else {
            return self.provider.prepare_request(prompt, options);
        };

        memory.add(Role::User, prompt);
        if self.capabilities.supports_structured_messages {
            self.provider
                .prepare_structured_request(&memory.messages(), options)
        } else {
            self.provider
                .prepare_request(&memory.render_as_text(), options)
        }
    }

    /// Like [`encode_request`](Self::encode_request) but leaves memory
    /// untouched; the prompt is only a transient last turn.
    fn encode_stream_request(&self, prompt: &str, options: &Options) -> Result<Vec<u8>, AiError> {
        let Some(memory) = &self.memory else {
            return self.provider.prepare_stream_request(prompt, options);
        };

        if self.capabilities.supports_structured_messages {
            let mut messages = memory.messages();
            messages.push(MemoryMessage::new(Role::User, prompt));
            return self
                .provider
                .prepare_structured_stream_request(&messages, options);
        }

        let prompt = if memory.is_empty() {
            format!("{}: {}", Role::User, prompt)
        } else {
            format!("{}\n{}: {}", memory.render_as_text(), Role::User, prompt)
        };
        self.provider.prepare_stream_request(&prompt, options)
    }

    fn http_request(&self, url: String, body: Vec<u8>) -> HttpRequest {
        let mut headers = self.provider.headers();
        headers
            .entry("content-type".to_string())
            .or_insert_with(|| "application/json".to_string());
        HttpRequest { url, headers, body }
    }

    /// Execute `operation` until it succeeds, fails permanently or the retry
    /// budget is spent. Returns the value and the number of attempts used.
    async fn execute_with_retry<T, F, Fut>(
        &self,
        ctx: &RequestContext,
        operation: &str,
        target: &str,
        cancel: &CancellationToken,
        mut execute: F,
    ) -> Result<(T, u32), AiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AiError>>,
    {
        let mut retry = self.config.retry_policy();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            tracing::debug!(
                request_id = %ctx.request_id,
                provider = %ctx.provider_id,
                operation,
                target,
                attempt,
                "generation attempted"
            );

            match execute().await {
                Ok(value) => return Ok((value, attempt)),
                Err(AiError::Cancelled) => return Err(AiError::Cancelled),
                Err(err) => {
                    if retry.should_retry(&err) {
                        let delay = retry.next_delay();
                        tracing::warn!(
                            request_id = %ctx.request_id,
                            operation,
                            attempt,
                            ?delay,
                            error = %err,
                            "attempt failed, retrying"
                        );
                        sleep_or_cancel(delay, cancel).await?;
                        continue;
                    }

                    tracing::debug!(
                        request_id = %ctx.request_id,
                        operation,
                        attempt,
                        error = %err,
                        "giving up"
                    );
                    return Err(AiError::exhausted(err, attempt));
                }
            }
        }
    }

    /// Race `call` against cancellation and the request timeout
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, AiError>>,
        cancel: &CancellationToken,
    ) -> Result<T, AiError> {
        let timeout = self.config.request_timeout();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AiError::Cancelled),
            outcome = tokio::time::timeout(timeout, call) => match outcome {
                Ok(result) => result,
                Err(_) => Err(AiError::request(format!("request timed out after {timeout:?}"))),
            },
        }
    }

    async fn attempt(
        &self,
        request: &HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<String, AiError> {
        let response = self
            .bounded(self.transport.send(request.clone()), cancel)
            .await?;
        check_status(&response)?;
        self.provider.parse_response(&response.body)
    }

    async fn open(
        &self,
        request: &HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<StreamingResponse, AiError> {
        self.bounded(
            async {
                let response = self.transport.open_stream(request.clone()).await?;
                if response.is_success() {
                    return Ok(response);
                }
                let status = response.status;
                Err(status_error(status, response.read_capped_body().await))
            },
            cancel,
        )
        .await
    }
}

fn check_status(response: &HttpResponse) -> Result<(), AiError> {
    if response.is_success() {
        return Ok(());
    }
    let message = String::from_utf8_lossy(&response.body);
    Err(status_error(response.status, capped_message(&message)))
}

fn capped_message(message: &str) -> String {
    if message.len() <= MAX_ERROR_BODY_BYTES {
        return message.to_string();
    }
    let mut cut = MAX_ERROR_BODY_BYTES;
    while !message.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...(truncated)", &message[..cut])
}

fn status_error(status: u16, message: String) -> AiError {
    match status {
        401 | 403 => AiError::authentication(format!("status {status}: {message}")),
        _ => AiError::api(status, message),
    }
}
