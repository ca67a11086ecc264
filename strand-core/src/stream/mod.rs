//! Streaming transport.
//!
//! A streaming response body flows through two stages:
//! - an [`EventDecoder`] splits the raw byte feed into [`RawEvent`](crate::types::RawEvent)s
//! - a [`TokenStream`] hands each event to the provider and yields
//!   [`StreamToken`](crate::types::StreamToken)s to the caller, one pull at a time

pub mod decoder;
pub mod token_stream;

pub use decoder::{decoder_for, EventDecoder, NdjsonDecoder, SseDecoder};
pub use token_stream::TokenStream;
