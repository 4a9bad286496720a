//! Model backend seam
//!
//! Agents and the intent classifier consume language-model backends only
//! through the narrow [`ModelClient`] trait: initialize, health check,
//! chat completion, cleanup. Which concrete backend sits behind it (and
//! any failover wrapping) is the composition root's business, not the
//! core's.

use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One message in a chat exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn system<S: Into<String>>(content: S) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// A chat-completion request in the common OpenAI shape
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl ChatRequest {
    /// Single user message with the given sampling settings
    pub fn user_prompt<S: Into<String>>(content: S, max_tokens: u32, temperature: f64) -> Self {
        Self {
            messages: vec![ChatMessage::user(content)],
            max_tokens,
            temperature,
        }
    }
}

/// A chat-completion response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

impl ChatResponse {
    pub fn new<S1: Into<String>, S2: Into<String>>(content: S1, model: S2) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            created_at: Utc::now(),
        }
    }
}

/// Capability interface every agent's backing model client implements
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Prepare the client; false means the backend is unusable
    async fn initialize(&self) -> Result<bool>;

    /// Probe the backend
    async fn health_check(&self) -> Result<bool>;

    /// If the client is cooling down after failed probes, when the
    /// cooldown ends. Agents skip their own probe while this is set.
    fn cooldown_until(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Execute a chat completion
    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Release any resources held by the client
    async fn cleanup(&self) -> Result<()>;
}

/// Deterministic in-memory client for tests and local composition.
///
/// Replies are scripted in FIFO order; when the script is empty the
/// client echoes a canned acknowledgement. Health and completion
/// failures can be injected.
#[derive(Default)]
pub struct MockModelClient {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    replies: VecDeque<String>,
    healthy: Option<bool>,
    cooldown_until: Option<DateTime<Utc>>,
    next_completion_error: Option<Error>,
    completions_served: u64,
}

impl MockModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a scripted reply
    pub fn with_reply<S: Into<String>>(self, reply: S) -> Self {
        self.push_reply(reply);
        self
    }

    /// Queue a scripted reply on an existing client
    pub fn push_reply<S: Into<String>>(&self, reply: S) {
        self.state.lock().replies.push_back(reply.into());
    }

    /// Force the next health checks to report the given state
    pub fn set_healthy(&self, healthy: bool) {
        self.state.lock().healthy = Some(healthy);
    }

    /// Put the client into cooldown until the given time
    pub fn set_cooldown_until(&self, until: Option<DateTime<Utc>>) {
        self.state.lock().cooldown_until = until;
    }

    /// Make the next chat completion fail with the given error
    pub fn fail_next_completion(&self, error: Error) {
        self.state.lock().next_completion_error = Some(error);
    }

    /// Number of completions served so far
    pub fn completions_served(&self) -> u64 {
        self.state.lock().completions_served
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn initialize(&self) -> Result<bool> {
        Ok(true)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.state.lock().healthy.unwrap_or(true))
    }

    fn cooldown_until(&self) -> Option<DateTime<Utc>> {
        self.state.lock().cooldown_until
    }

    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
        let mut state = self.state.lock();
        if let Some(error) = state.next_completion_error.take() {
            return Err(error);
        }
        state.completions_served += 1;
        let content = state.replies.pop_front().unwrap_or_else(|| {
            let prompt = request
                .messages
                .last()
                .map(|m| m.content.as_str())
                .unwrap_or_default();
            format!("Acknowledged: {}", prompt.chars().take(60).collect::<String>())
        });
        Ok(ChatResponse::new(content, "mock-model"))
    }

    async fn cleanup(&self) -> Result<()> {
        self.state.lock().replies.clear();
        Ok(())
    }
}
