//! HTTP transport seam.
//!
//! The executor talks to the network only through [`HttpTransport`], which
//! keeps retry, timeout and cancellation logic independent of the HTTP client
//! and lets tests script responses.

use crate::error::AiError;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::fmt::Debug;

/// Upper bound on how much of an error body is kept for diagnostics
pub const MAX_ERROR_BODY_BYTES: usize = 8 * 1024;

/// Raw body chunks of a streaming response
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, AiError>>;

/// Outgoing request, already encoded by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Fully buffered response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Response whose body is consumed incrementally
pub struct StreamingResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl StreamingResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the body for an error message, keeping at most
    /// [`MAX_ERROR_BODY_BYTES`].
    pub async fn read_capped_body(self) -> String {
        let mut body = Vec::new();
        let mut stream = self.body;
        while let Some(chunk) = stream.next().await {
            let Ok(chunk) = chunk else { break };
            body.extend_from_slice(&chunk);
            if body.len() > MAX_ERROR_BODY_BYTES {
                body.truncate(MAX_ERROR_BODY_BYTES);
                let text = String::from_utf8_lossy(&body);
                return format!("{text}...(truncated)");
            }
        }
        String::from_utf8_lossy(&body).into_owned()
    }
}

/// Network boundary used by the executor.
#[async_trait]
pub trait HttpTransport: Send + Sync + Debug {
    /// Send a request and buffer the whole response
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AiError>;

    /// Send a request and hand back the body as a byte stream
    async fn open_stream(&self, request: HttpRequest) -> Result<StreamingResponse, AiError>;
}

/// Default transport backed by `reqwest`.
///
/// No client-level timeout is set; the executor bounds each call itself so
/// long-lived streaming bodies are not cut off.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (proxies, TLS settings, ...)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder.body(request.body)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AiError> {
        let response = self.build(request).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse { status, body })
    }

    async fn open_stream(&self, request: HttpRequest) -> Result<StreamingResponse, AiError> {
        let response = self.build(request).send().await?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(AiError::from))
            .boxed();
        Ok(StreamingResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(chunks: Vec<String>) -> ByteStream {
        futures::stream::iter(chunks.into_iter().map(|chunk| Ok(chunk.into_bytes()))).boxed()
    }

    #[tokio::test]
    async fn capped_body_reads_small_bodies_whole() {
        let response = StreamingResponse {
            status: 500,
            body: body_of(vec!["internal ".to_string(), "error".to_string()]),
        };
        assert!(!response.is_success());
        assert_eq!(response.read_capped_body().await, "internal error");
    }

    #[tokio::test]
    async fn capped_body_truncates_large_bodies() {
        let response = StreamingResponse {
            status: 502,
            body: body_of(vec!["x".repeat(MAX_ERROR_BODY_BYTES + 10)]),
        };
        let text = response.read_capped_body().await;
        assert!(text.ends_with("...(truncated)"));
        assert_eq!(text.len(), MAX_ERROR_BODY_BYTES + "...(truncated)".len());
    }

    #[test]
    fn success_range_is_2xx() {
        let ok = HttpResponse {
            status: 204,
            body: Vec::new(),
        };
        let redirect = HttpResponse {
            status: 302,
            body: Vec::new(),
        };
        assert!(ok.is_success());
        assert!(!redirect.is_success());
    }
}
