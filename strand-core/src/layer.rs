//! Layer trait and abstractions.
//!
//! Layers wrap a provider with cross-cutting concerns (logging, header
//! injection, ...) while keeping the wrapped value a [`Provider`], so they
//! stack freely on the executor builder.

use crate::error::AiError;
use crate::memory::MemoryMessage;
use crate::provider::Provider;
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Layer trait for wrapping providers.
///
/// Each layer wraps an inner provider and returns a new provider with
/// enhanced behavior.
pub trait Layer<P: Provider> {
    /// The type of the layered provider
    type LayeredProvider: Provider;

    /// Wrap the inner provider with this layer
    fn layer(&self, inner: P) -> Self::LayeredProvider;
}

/// Helper trait for layered providers.
///
/// Provides forwarding implementations for every provider method.
/// Implementers override only the methods they want to intercept and then
/// use [`impl_layered_provider!`](crate::impl_layered_provider) to derive
/// [`Provider`].
pub trait LayeredProvider: Sized + Send + Sync + std::fmt::Debug + 'static {
    /// The inner provider type
    type Inner: Provider;

    /// Get a reference to the inner provider
    fn inner(&self) -> &Self::Inner;

    fn layered_info(&self) -> Arc<ProviderInfo> {
        self.inner().info()
    }

    fn layered_endpoint(&self) -> String {
        self.inner().endpoint()
    }

    fn layered_stream_endpoint(&self) -> String {
        self.inner().stream_endpoint()
    }

    fn layered_headers(&self) -> HashMap<String, String> {
        self.inner().headers()
    }

    fn layered_prepare_request(
        &self,
        prompt: &str,
        options: &Options,
    ) -> Result<Vec<u8>, AiError> {
        self.inner().prepare_request(prompt, options)
    }

    fn layered_prepare_stream_request(
        &self,
        prompt: &str,
        options: &Options,
    ) -> Result<Vec<u8>, AiError> {
        self.inner().prepare_stream_request(prompt, options)
    }

    fn layered_prepare_structured_request(
        &self,
        messages: &[MemoryMessage],
        options: &Options,
    ) -> Result<Vec<u8>, AiError> {
        self.inner().prepare_structured_request(messages, options)
    }

    fn layered_prepare_structured_stream_request(
        &self,
        messages: &[MemoryMessage],
        options: &Options,
    ) -> Result<Vec<u8>, AiError> {
        self.inner()
            .prepare_structured_stream_request(messages, options)
    }

    fn layered_parse_response(&self, body: &[u8]) -> Result<String, AiError> {
        self.inner().parse_response(body)
    }

    fn layered_parse_stream_response(&self, event: &RawEvent) -> Result<StreamPayload, AiError> {
        self.inner().parse_stream_response(event)
    }

    fn layered_capabilities(&self) -> Capabilities {
        self.inner().capabilities()
    }

    fn layered_stream_format(&self) -> StreamFormat {
        self.inner().stream_format()
    }
}

/// Macro to implement Provider trait by forwarding to LayeredProvider methods.
#[macro_export]
macro_rules! impl_layered_provider {
    (@methods) => {
        fn info(&self) -> std::sync::Arc<$crate::types::ProviderInfo> {
            $crate::layer::LayeredProvider::layered_info(self)
        }

        fn endpoint(&self) -> String {
            $crate::layer::LayeredProvider::layered_endpoint(self)
        }

        fn stream_endpoint(&self) -> String {
            $crate::layer::LayeredProvider::layered_stream_endpoint(self)
        }

        fn headers(&self) -> std::collections::HashMap<String, String> {
            $crate::layer::LayeredProvider::layered_headers(self)
        }

        fn prepare_request(
            &self,
            prompt: &str,
            options: &$crate::types::Options,
        ) -> Result<Vec<u8>, $crate::error::AiError> {
            $crate::layer::LayeredProvider::layered_prepare_request(self, prompt, options)
        }

        fn prepare_stream_request(
            &self,
            prompt: &str,
            options: &$crate::types::Options,
        ) -> Result<Vec<u8>, $crate::error::AiError> {
            $crate::layer::LayeredProvider::layered_prepare_stream_request(self, prompt, options)
        }

        fn prepare_structured_request(
            &self,
            messages: &[$crate::memory::MemoryMessage],
            options: &$crate::types::Options,
        ) -> Result<Vec<u8>, $crate::error::AiError> {
            $crate::layer::LayeredProvider::layered_prepare_structured_request(
                self, messages, options,
            )
        }

        fn prepare_structured_stream_request(
            &self,
            messages: &[$crate::memory::MemoryMessage],
            options: &$crate::types::Options,
        ) -> Result<Vec<u8>, $crate::error::AiError> {
            $crate::layer::LayeredProvider::layered_prepare_structured_stream_request(
                self, messages, options,
            )
        }

        fn parse_response(&self, body: &[u8]) -> Result<String, $crate::error::AiError> {
            $crate::layer::LayeredProvider::layered_parse_response(self, body)
        }

        fn parse_stream_response(
            &self,
            event: &$crate::types::RawEvent,
        ) -> Result<$crate::types::StreamPayload, $crate::error::AiError> {
            $crate::layer::LayeredProvider::layered_parse_stream_response(self, event)
        }

        fn capabilities(&self) -> $crate::types::Capabilities {
            $crate::layer::LayeredProvider::layered_capabilities(self)
        }

        fn stream_format(&self) -> $crate::types::StreamFormat {
            $crate::layer::LayeredProvider::layered_stream_format(self)
        }
    };
    (impl<$generic:ident> for $type:ty) => {
        impl<$generic: $crate::provider::Provider> $crate::provider::Provider for $type {
            $crate::impl_layered_provider!(@methods);
        }
    };
    ($type:ty) => {
        impl $crate::provider::Provider for $type {
            $crate::impl_layered_provider!(@methods);
        }
    };
}

/// Layer that adds fixed headers to every request.
#[derive(Debug, Clone, Default)]
pub struct HeadersLayer {
    headers: HashMap<String, String>,
}

impl HeadersLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header; later values for the same name win
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

impl<P: Provider> Layer<P> for HeadersLayer {
    type LayeredProvider = HeadersProvider<P>;

    fn layer(&self, inner: P) -> Self::LayeredProvider {
        HeadersProvider {
            inner,
            headers: self.headers.clone(),
        }
    }
}

/// Provider wrapped with extra headers
#[derive(Debug)]
pub struct HeadersProvider<P> {
    inner: P,
    headers: HashMap<String, String>,
}

impl<P: Provider> LayeredProvider for HeadersProvider<P> {
    type Inner = P;

    fn inner(&self) -> &Self::Inner {
        &self.inner
    }

    fn layered_headers(&self) -> HashMap<String, String> {
        let mut headers = self.inner.headers();
        headers.extend(self.headers.clone());
        headers
    }
}

crate::impl_layered_provider!(impl<P> for HeadersProvider<P>);
