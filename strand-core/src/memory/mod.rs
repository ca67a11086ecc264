//! Token-bounded conversation memory.
//!
//! A [`ConversationMemory`] keeps prior turns in insertion order and evicts
//! the oldest ones once their combined token count exceeds the budget. The
//! newest turn always survives, even when it alone is over budget.

pub mod encoder;

pub use encoder::{TiktokenEncoder, TokenEncoder, DEFAULT_ENCODING};

use crate::config::RuntimeConfig;
use crate::error::AiError;
use crate::types::ToolCall;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One conversation turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryMessage {
    pub role: String,
    pub content: String,
    /// Memory-token cost; zero means "compute with the bound encoder"
    #[serde(default)]
    pub token_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl MemoryMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    /// Preset the token cost instead of computing it on insertion
    pub fn with_token_count(mut self, token_count: usize) -> Self {
        self.token_count = token_count;
        self
    }

    pub fn with_cache_hint(mut self, hint: impl Into<String>) -> Self {
        self.cache_hint = Some(hint.into());
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
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

#[derive(Debug, Default)]
struct MemoryState {
    messages: VecDeque<MemoryMessage>,
    total_tokens: usize,
}

impl MemoryState {
    fn push(&mut self, message: MemoryMessage, budget: usize) {
        self.total_tokens += message.token_count;
        self.messages.push_back(message);

        while self.total_tokens > budget && self.messages.len() > 1 {
            let Some(evicted) = self.messages.pop_front() else {
                break;
            };
            self.total_tokens -= evicted.token_count;
            tracing::debug!(
                role = %evicted.role,
                tokens = evicted.token_count,
                remaining = self.total_tokens,
                budget,
                "evicted oldest memory message"
            );
        }
    }
}

/// Ordered, token-bounded log of conversation turns.
///
/// All operations go through one lock. Readers get deep copies, so returned
/// messages can be inspected or modified without touching the memory.
#[derive(Debug)]
pub struct ConversationMemory {
    state: Mutex<MemoryState>,
    budget: usize,
    encoder: Arc<dyn TokenEncoder>,
}

impl ConversationMemory {
    /// Create a memory with a fixed budget and encoder
    pub fn new(budget: usize, encoder: Arc<dyn TokenEncoder>) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            budget,
            encoder,
        }
    }

    /// Create a memory sized with the tokenizer of `model`
    pub fn for_model(budget: usize, model: &str) -> Result<Self, AiError> {
        let encoder = TiktokenEncoder::for_model(model)?;
        Ok(Self::new(budget, Arc::new(encoder)))
    }

    /// Create a memory from runtime settings
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, AiError> {
        let encoder = match config.encoder_model.as_deref() {
            Some(model) => TiktokenEncoder::for_model(model)?,
            None => TiktokenEncoder::default_encoding()?,
        };
        Ok(Self::new(config.token_budget, Arc::new(encoder)))
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a plain turn
    pub fn add(&self, role: impl Into<String>, content: impl Into<String>) {
        self.add_structured(MemoryMessage::new(role, content));
    }

    /// Append a turn, computing its token count unless one is preset
    pub fn add_structured(&self, mut message: MemoryMessage) {
        if message.token_count == 0 {
            message.token_count = self.encoder.count(&message.content);
        }
        self.lock().push(message, self.budget);
    }

    /// Drop every turn
    pub fn clear(&self) {
        let mut state = self.lock();
        state.messages.clear();
        state.total_tokens = 0;
    }

    /// Deep copy of the current turns, oldest first
    pub fn messages(&self) -> Vec<MemoryMessage> {
        self.lock().messages.iter().cloned().collect()
    }

    /// Render every turn as `"<role>: <content>"`, one per line
    pub fn render_as_text(&self) -> String {
        self.lock()
            .messages
            .iter()
            .map(|message| format!("{}: {}", message.role, message.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn total_tokens(&self) -> usize {
        self.lock().total_tokens
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }
}
