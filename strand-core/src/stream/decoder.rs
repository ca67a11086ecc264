//! Raw event decoders for streaming response bodies.
//!
//! Two framings are supported:
//! - event-delimited (server-sent events): `event:`/`data:` lines grouped into
//!   blocks that end at a blank line
//! - newline-delimited: one JSON document per non-blank line
//!
//! Both expose the same pull interface through [`EventDecoder`].

use crate::error::AiError;
use crate::transport::ByteStream;
use crate::types::{RawEvent, StreamFormat};
use async_trait::async_trait;
use futures::StreamExt;

/// Event kind used when a block carries no `event:` line
pub const DEFAULT_EVENT_KIND: &str = "message";

/// Kind assigned to every newline-delimited record
pub const NDJSON_EVENT_KIND: &str = "json";

/// Pull interface over a framed byte feed.
///
/// `advance` moves to the next event and returns `false` when none is
/// available. A `false` with [`EventDecoder::last_error`] unset means the feed
/// is exhausted; with it set, the feed was interrupted and `advance` may be
/// called again to resume.
#[async_trait]
pub trait EventDecoder: Send {
    async fn advance(&mut self) -> bool;

    /// Event produced by the last successful `advance`
    fn current(&self) -> &RawEvent;

    fn last_error(&self) -> Option<&AiError>;
}

/// Build the decoder matching `format`
pub fn decoder_for(format: StreamFormat, body: ByteStream) -> Box<dyn EventDecoder> {
    match format {
        StreamFormat::EventDelimited => Box::new(SseDecoder::new(body)),
        StreamFormat::NewlineDelimited => Box::new(NdjsonDecoder::new(body)),
    }
}

/// Splits a chunked byte feed into lines without the trailing `\n` / `\r\n`.
struct LineReader {
    body: ByteStream,
    buffer: Vec<u8>,
    /// Bytes of `buffer` already handed out as lines
    consumed: usize,
    eof: bool,
}

impl LineReader {
    fn new(body: ByteStream) -> Self {
        Self {
            body,
            buffer: Vec::new(),
            consumed: 0,
            eof: false,
        }
    }

    async fn next_line(&mut self) -> Result<Option<Vec<u8>>, AiError> {
        loop {
            let pending = &self.buffer[self.consumed..];
            if let Some(pos) = pending.iter().position(|byte| *byte == b'\n') {
                let line = trim_cr(&pending[..pos]).to_vec();
                self.consumed += pos + 1;
                return Ok(Some(line));
            }

            if self.eof {
                if pending.is_empty() {
                    return Ok(None);
                }
                let line = trim_cr(pending).to_vec();
                self.buffer.clear();
                self.consumed = 0;
                return Ok(Some(line));
            }

            match self.body.next().await {
                Some(Ok(chunk)) => {
                    self.buffer.drain(..self.consumed);
                    self.consumed = 0;
                    self.buffer.extend_from_slice(&chunk);
                }
                Some(Err(err)) => return Err(err),
                None => self.eof = true,
            }
        }
    }
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Decoder for server-sent-event framing.
///
/// `event:` and `kind:` set the event kind; every `data:` or `payload:` value
/// is appended to the payload followed by `\n`. A single space after the
/// colon is stripped. Comment lines (leading `:`) and unknown fields are
/// ignored. A block still open when the feed ends is emitted if it carries a
/// payload.
pub struct SseDecoder {
    lines: LineReader,
    current: RawEvent,
    pending_kind: Option<String>,
    pending_payload: Vec<u8>,
    pending_fields: bool,
    last_error: Option<AiError>,
}

impl SseDecoder {
    pub fn new(body: ByteStream) -> Self {
        Self {
            lines: LineReader::new(body),
            current: RawEvent::default(),
            pending_kind: None,
            pending_payload: Vec::new(),
            pending_fields: false,
            last_error: None,
        }
    }

    fn take_pending(&mut self) -> RawEvent {
        self.pending_fields = false;
        RawEvent {
            kind: self
                .pending_kind
                .take()
                .unwrap_or_else(|| DEFAULT_EVENT_KIND.to_string()),
            payload: std::mem::take(&mut self.pending_payload),
        }
    }

    fn apply_line(&mut self, line: &[u8]) {
        if line.starts_with(b":") {
            return;
        }

        let (field, value) = match line.iter().position(|byte| *byte == b':') {
            Some(pos) => {
                let value = &line[pos + 1..];
                (&line[..pos], value.strip_prefix(b" ").unwrap_or(value))
            }
            None => (line, &[][..]),
        };

        match field {
            b"event" | b"kind" => {
                self.pending_kind = Some(String::from_utf8_lossy(value).into_owned());
                self.pending_fields = true;
            }
            b"data" | b"payload" => {
                self.pending_payload.extend_from_slice(value);
                self.pending_payload.push(b'\n');
                self.pending_fields = true;
            }
            _ => {}
        }
    }
}

#[async_trait]
impl EventDecoder for SseDecoder {
    async fn advance(&mut self) -> bool {
        self.last_error = None;

        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) if line.is_empty() => {
                    if self.pending_fields {
                        self.current = self.take_pending();
                        return true;
                    }
                }
                Ok(Some(line)) => self.apply_line(&line),
                Ok(None) => {
                    if self.pending_fields && !self.pending_payload.is_empty() {
                        self.current = self.take_pending();
                        return true;
                    }
                    self.pending_fields = false;
                    return false;
                }
                Err(err) => {
                    self.last_error = Some(err);
                    return false;
                }
            }
        }
    }

    fn current(&self) -> &RawEvent {
        &self.current
    }

    fn last_error(&self) -> Option<&AiError> {
        self.last_error.as_ref()
    }
}

/// Decoder for newline-delimited records.
///
/// Blank lines between records are skipped in a loop, so feeds with long
/// runs of empty lines cost constant stack.
pub struct NdjsonDecoder {
    lines: LineReader,
    kind: String,
    current: RawEvent,
    last_error: Option<AiError>,
}

impl NdjsonDecoder {
    pub fn new(body: ByteStream) -> Self {
        Self::with_kind(body, NDJSON_EVENT_KIND)
    }

    /// Tag every record with `kind` instead of [`NDJSON_EVENT_KIND`]
    pub fn with_kind(body: ByteStream, kind: impl Into<String>) -> Self {
        Self {
            lines: LineReader::new(body),
            kind: kind.into(),
            current: RawEvent::default(),
            last_error: None,
        }
    }
}

#[async_trait]
impl EventDecoder for NdjsonDecoder {
    async fn advance(&mut self) -> bool {
        self.last_error = None;

        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    self.current = RawEvent {
                        kind: self.kind.clone(),
                        payload: line,
                    };
                    return true;
                }
                Ok(None) => return false,
                Err(err) => {
                    self.last_error = Some(err);
                    return false;
                }
            }
        }
    }

    fn current(&self) -> &RawEvent {
        &self.current
    }

    fn last_error(&self) -> Option<&AiError> {
        self.last_error.as_ref()
    }
}
