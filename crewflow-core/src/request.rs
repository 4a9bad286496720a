//! Request and response models shared across the routing pipeline
//!
//! A [`UserRequest`] enters the system, is classified and routed, and is
//! answered by an agent with an [`AgentResponse`]. Requests are immutable
//! once built; agents communicate degradation through [`ProcessOutcome`]
//! instead of raising errors for expected fallback paths.
//!
//! # Examples
//!
//! ```rust
//! use crewflow_core::request::*;
//!
//! let request = UserRequest::builder()
//!     .content("How much does the enterprise plan cost?")
//!     .user_id("user-42")
//!     .priority(Priority::High)
//!     .context("channel", "web")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(request.priority, Priority::High);
//! ```

use crate::agent::AgentType;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Priority attached to an inbound request
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Whether this priority should receive expedited handling
    pub fn is_elevated(&self) -> bool {
        matches!(self, Priority::High | Priority::Urgent)
    }
}

/// An inbound natural-language request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRequest {
    pub request_id: Uuid,
    pub user_id: Option<String>,
    pub content: String,
    pub context: HashMap<String, String>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

impl UserRequest {
    /// Create a new request with validation
    pub fn new(content: String) -> Result<Self> {
        if content.trim().is_empty() {
            return Err(Error::validation("Request content cannot be empty"));
        }
        Ok(Self {
            request_id: Uuid::new_v4(),
            user_id: None,
            content,
            context: HashMap::new(),
            priority: Priority::Normal,
            created_at: Utc::now(),
        })
    }

    /// Create a builder for constructing a UserRequest
    pub fn builder() -> UserRequestBuilder {
        UserRequestBuilder::new()
    }

    /// Derive a follow-up request carrying extra context, used by the
    /// coordinator when staging sequential collaboration
    pub fn with_context(&self, context: HashMap<String, String>) -> Self {
        let mut derived = self.clone();
        derived.context = context;
        derived
    }
}

/// Builder for constructing UserRequest instances
#[derive(Debug, Clone, Default)]
pub struct UserRequestBuilder {
    user_id: Option<String>,
    content: Option<String>,
    context: HashMap<String, String>,
    priority: Priority,
}

impl UserRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request content
    pub fn content<S: Into<String>>(mut self, content: S) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set the originating user
    pub fn user_id<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Add a context entry
    pub fn context<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Set the priority
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Build the UserRequest instance
    pub fn build(self) -> Result<UserRequest> {
        let content = self
            .content
            .ok_or_else(|| Error::validation("Request content is required"))?;
        let mut request = UserRequest::new(content)?;
        request.user_id = self.user_id;
        request.context = self.context;
        request.priority = self.priority;
        Ok(request)
    }
}

/// A follow-up action an agent recommends after answering
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    pub action_type: String,
    pub parameters: HashMap<String, String>,
    pub description: Option<String>,
}

impl Action {
    pub fn new<S: Into<String>>(action_type: S) -> Self {
        Self {
            action_type: action_type.into(),
            parameters: HashMap::new(),
            description: None,
        }
    }

    pub fn with_parameter<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// An agent's answer to a request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentResponse {
    pub agent_id: String,
    pub agent_type: AgentType,
    pub content: String,
    pub confidence: f64,
    pub next_actions: Vec<Action>,
    pub collaboration_needed: bool,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl AgentResponse {
    /// Create a response with the common fields; confidence is clamped to [0, 1]
    pub fn new<S1: Into<String>, S2: Into<String>>(
        agent_id: S1,
        agent_type: AgentType,
        content: S2,
        confidence: f64,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_type,
            content: content.into(),
            confidence: confidence.clamp(0.0, 1.0),
            next_actions: Vec::new(),
            collaboration_needed: false,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.next_actions = actions;
        self
    }

    pub fn with_collaboration_needed(mut self, needed: bool) -> Self {
        self.collaboration_needed = needed;
        self
    }

    pub fn with_metadata<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Outcome of one `Agent::process` call.
///
/// Fallback behavior is a normal branch, not exception-driven control
/// flow: an agent that cannot confidently answer, or whose handler
/// failed, still yields a user-presentable response here. Only
/// admission rejection travels through the error channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// The agent handled the request normally
    Completed(AgentResponse),
    /// The agent answered with a fallback response
    Degraded {
        response: AgentResponse,
        reason: String,
    },
}

impl ProcessOutcome {
    /// The response, regardless of degradation
    pub fn response(&self) -> &AgentResponse {
        match self {
            ProcessOutcome::Completed(response) => response,
            ProcessOutcome::Degraded { response, .. } => response,
        }
    }

    /// Consume the outcome and take the response
    pub fn into_response(self) -> AgentResponse {
        match self {
            ProcessOutcome::Completed(response) => response,
            ProcessOutcome::Degraded { response, .. } => response,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ProcessOutcome::Degraded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = UserRequest::builder()
            .content("需要了解产品价格")
            .user_id("user-1")
            .priority(Priority::Urgent)
            .context("channel", "wechat")
            .build()
            .unwrap();

        assert_eq!(request.content, "需要了解产品价格");
        assert_eq!(request.user_id.as_deref(), Some("user-1"));
        assert!(request.priority.is_elevated());
        assert_eq!(request.context.get("channel").unwrap(), "wechat");
    }

    #[test]
    fn test_request_content_required() {
        assert!(UserRequest::builder().build().is_err());
        assert!(UserRequest::builder().content("   ").build().is_err());
    }

    #[test]
    fn test_response_confidence_clamped() {
        let response = AgentResponse::new("sales-001", AgentType::Sales, "hi", 1.7);
        assert_eq!(response.confidence, 1.0);

        let response = AgentResponse::new("sales-001", AgentType::Sales, "hi", -0.2);
        assert_eq!(response.confidence, 0.0);
    }

    #[test]
    fn test_outcome_accessors() {
        let response = AgentResponse::new("support-001", AgentType::CustomerSupport, "ok", 0.8);
        let completed = ProcessOutcome::Completed(response.clone());
        assert!(!completed.is_degraded());
        assert_eq!(completed.response().agent_id, "support-001");

        let degraded = ProcessOutcome::Degraded {
            response,
            reason: "low confidence".to_string(),
        };
        assert!(degraded.is_degraded());
        assert_eq!(degraded.into_response().agent_id, "support-001");
    }

    #[test]
    fn test_priority_serde_naming() {
        let json = serde_json::to_string(&Priority::Urgent).unwrap();
        assert_eq!(json, "\"urgent\"");
        let parsed: Priority = serde_json::from_str("\"normal\"").unwrap();
        assert_eq!(parsed, Priority::Normal);
    }
}
