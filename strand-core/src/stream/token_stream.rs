//! Pull-based token stream over a decoded response body.

use crate::error::AiError;
use crate::provider::Provider;
use crate::retry::{sleep_or_cancel, RetryPolicy};
use crate::stream::decoder::{decoder_for, EventDecoder};
use crate::transport::ByteStream;
use crate::types::{StreamFormat, StreamPayload, StreamToken};
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Ordered sequence of tokens decoded from one streaming response.
///
/// Each call to [`TokenStream::next`] advances the underlying decoder by one
/// event. Feed interruptions are retried internally according to the bound
/// [`RetryPolicy`]; everything else is surfaced to the caller.
pub struct TokenStream {
    decoder: Option<Box<dyn EventDecoder>>,
    provider: Arc<dyn Provider>,
    retry: RetryPolicy,
    next_index: u64,
    input_tokens: i64,
    output_tokens: i64,
}

impl std::fmt::Debug for TokenStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStream")
            .field("provider", &self.provider.info().id)
            .field("closed", &self.decoder.is_none())
            .field("next_index", &self.next_index)
            .finish()
    }
}

impl TokenStream {
    pub fn new(
        decoder: Box<dyn EventDecoder>,
        provider: Arc<dyn Provider>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            decoder: Some(decoder),
            provider,
            retry,
            next_index: 0,
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    /// Stream over a raw body framed as `format`
    pub fn from_body(
        body: ByteStream,
        format: StreamFormat,
        provider: Arc<dyn Provider>,
        retry: RetryPolicy,
    ) -> Self {
        Self::new(decoder_for(format, body), provider, retry)
    }

    /// Pull the next token; `Ok(None)` marks the end of the stream.
    pub async fn next(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<StreamToken>, AiError> {
        loop {
            if cancel.is_cancelled() {
                return Err(AiError::Cancelled);
            }
            let Some(decoder) = self.decoder.as_mut() else {
                return Ok(None);
            };

            let advanced = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AiError::Cancelled),
                advanced = decoder.advance() => advanced,
            };

            if !advanced {
                let Some(error) = decoder.last_error().cloned() else {
                    self.close();
                    return Ok(None);
                };

                if self.retry.should_retry(&error) {
                    let delay = self.retry.next_delay();
                    tracing::warn!(
                        provider = %self.provider.info().id,
                        retry = self.retry.attempts_so_far(),
                        ?delay,
                        error = %error,
                        "stream interrupted, resuming"
                    );
                    sleep_or_cancel(delay, cancel).await?;
                    continue;
                }

                let attempts = self.retry.attempts_so_far() + 1;
                self.close();
                return Err(AiError::exhausted(error, attempts));
            }

            match self.provider.parse_stream_response(decoder.current())? {
                StreamPayload::Skip => continue,
                StreamPayload::Done => {
                    self.close();
                    return Ok(None);
                }
                StreamPayload::Token(delta) => {
                    if let Some(usage) = delta.usage {
                        self.input_tokens = self.input_tokens.max(i64::from(usage.prompt_tokens));
                        self.output_tokens =
                            self.output_tokens.max(i64::from(usage.completion_tokens));
                    }

                    let token = StreamToken {
                        text: delta.text,
                        kind: delta.kind,
                        sequence_index: self.next_index,
                        input_tokens_so_far: self.input_tokens,
                        output_tokens_so_far: self.output_tokens,
                        metadata: delta.metadata,
                    };
                    self.next_index += 1;
                    return Ok(Some(token));
                }
            }
        }
    }

    /// Release the underlying connection. Safe to call more than once.
    pub fn close(&mut self) {
        if self.decoder.take().is_some() {
            tracing::debug!(
                provider = %self.provider.info().id,
                tokens = self.next_index,
                "token stream closed"
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.decoder.is_none()
    }

    /// Drain the remaining tokens into one string
    pub async fn collect_text(mut self, cancel: &CancellationToken) -> Result<String, AiError> {
        let mut text = String::new();
        while let Some(token) = self.next(cancel).await? {
            text.push_str(&token.text);
        }
        Ok(text)
    }

    /// Adapt into a [`futures::Stream`]; the stream ends after the first error.
    pub fn into_stream(
        mut self,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Result<StreamToken, AiError>> {
        async_stream::stream! {
            loop {
                match self.next(&cancel).await {
                    Ok(Some(token)) => yield Ok(token),
                    Ok(None) => break,
                    Err(err) => {
                        self.close();
                        yield Err(err);
                        break;
                    }
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Treats each payload as plain text; `[DONE]` ends, `ping` is skipped.
    #[derive(Debug)]
    struct EchoProvider;

    impl Provider for EchoProvider {
        fn info(&self) -> Arc<ProviderInfo> {
            Arc::new(ProviderInfo {
                id: "echo".to_string(),
                name: "Echo".to_string(),
            })
        }

        fn endpoint(&self) -> String {
            "http://localhost/echo".to_string()
        }

        fn headers(&self) -> HashMap<String, String> {
            HashMap::new()
        }

        fn prepare_request(&self, prompt: &str, _options: &Options) -> Result<Vec<u8>, AiError> {
            Ok(prompt.as_bytes().to_vec())
        }

        fn prepare_stream_request(
            &self,
            prompt: &str,
            options: &Options,
        ) -> Result<Vec<u8>, AiError> {
            self.prepare_request(prompt, options)
        }

        fn parse_response(&self, body: &[u8]) -> Result<String, AiError> {
            Ok(String::from_utf8_lossy(body).into_owned())
        }

        fn parse_stream_response(&self, event: &RawEvent) -> Result<StreamPayload, AiError> {
            if event.kind == "ping" {
                return Ok(StreamPayload::Skip);
            }
            let text = event.payload_str().trim_end_matches('\n').to_string();
            match text.as_str() {
                "[DONE]" => Ok(StreamPayload::Done),
                "!bad" => Err(AiError::response("unparsable event")),
                _ => {
                    let usage = Usage {
                        prompt_tokens: 3,
                        completion_tokens: text.len() as u32,
                        total_tokens: 3 + text.len() as u32,
                    };
                    Ok(StreamPayload::Token(TokenDelta::text(text).with_usage(usage)))
                }
            }
        }
    }

    fn stream_of(chunks: Vec<Result<&str, AiError>>, retry: RetryPolicy) -> TokenStream {
        let chunks: Vec<Result<Vec<u8>, AiError>> = chunks
            .into_iter()
            .map(|chunk| chunk.map(|text| text.as_bytes().to_vec()))
            .collect();
        TokenStream::from_body(
            futures::stream::iter(chunks).boxed(),
            StreamFormat::EventDelimited,
            Arc::new(EchoProvider),
            retry,
        )
    }

    #[tokio::test]
    async fn tokens_arrive_in_order_and_skip_keepalives() {
        let cancel = CancellationToken::new();
        let mut stream = stream_of(
            vec![Ok(
                "data: Hel\n\nevent: ping\ndata: {}\n\ndata: lo\n\ndata: [DONE]\n\ndata: ignored\n\n",
            )],
            RetryPolicy::none(),
        );

        let first = stream.next(&cancel).await.expect("first").expect("token");
        let second = stream.next(&cancel).await.expect("second").expect("token");
        assert_eq!((first.text.as_str(), first.sequence_index), ("Hel", 0));
        assert_eq!((second.text.as_str(), second.sequence_index), ("lo", 1));
        assert_eq!(second.input_tokens_so_far, 3);
        assert_eq!(second.output_tokens_so_far, 3);

        assert!(stream.next(&cancel).await.expect("end").is_none());
        assert!(stream.is_closed());
        assert!(stream.next(&cancel).await.expect("still ended").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn interruptions_are_retried_internally() {
        let cancel = CancellationToken::new();
        let retry = RetryPolicy::new(2, Duration::from_millis(50), Duration::from_secs(1));
        let stream = stream_of(
            vec![
                Ok("data: a\n\n"),
                Err(AiError::request("reset")),
                Err(AiError::request("reset again")),
                Ok("data: b\n\n"),
            ],
            retry,
        );

        assert_eq!(stream.collect_text(&cancel).await.expect("text"), "ab");
    }

    #[tokio::test(start_paused = true)]
    async fn interruption_beyond_budget_is_surfaced() {
        let cancel = CancellationToken::new();
        let retry = RetryPolicy::new(1, Duration::from_millis(50), Duration::from_secs(1));
        let mut stream = stream_of(
            vec![
                Err(AiError::request("reset")),
                Err(AiError::request("reset again")),
            ],
            retry,
        );

        let err = stream.next(&cancel).await.expect_err("should fail");
        assert_eq!(err.kind(), crate::error::ErrorKind::Request);
        assert_eq!(err.attempts(), Some(2));
        assert!(stream.is_closed());
    }

    #[tokio::test]
    async fn parse_errors_are_not_retried() {
        let cancel = CancellationToken::new();
        let retry = RetryPolicy::new(5, Duration::ZERO, Duration::ZERO);
        let mut stream = stream_of(vec![Ok("data: !bad\n\ndata: ok\n\n")], retry);

        let err = stream.next(&cancel).await.expect_err("parse error");
        assert!(matches!(err, AiError::Response(_)));
        let next = stream.next(&cancel).await.expect("next").expect("token");
        assert_eq!(next.text, "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_stream_backoff() {
        let cancel = CancellationToken::new();
        let retry = RetryPolicy::new(3, Duration::from_secs(30), Duration::from_secs(30));
        let mut stream = stream_of(vec![Err(AiError::request("reset"))], retry);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = stream.next(&cancel).await.expect_err("cancelled");
        assert!(matches!(err, AiError::Cancelled));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let cancel = CancellationToken::new();
        let mut stream = stream_of(vec![Ok("data: x\n\n")], RetryPolicy::none());
        stream.close();
        stream.close();
        assert!(stream.is_closed());
        assert!(stream.next(&cancel).await.expect("closed").is_none());
    }

    #[tokio::test]
    async fn into_stream_yields_tokens() {
        let stream = stream_of(vec![Ok("data: x\n\ndata: y\n\n")], RetryPolicy::none());
        let tokens: Vec<_> = stream
            .into_stream(CancellationToken::new())
            .map(|token| token.expect("token").text)
            .collect()
            .await;
        assert_eq!(tokens, vec!["x", "y"]);
    }
}
