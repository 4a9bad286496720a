//! Configuration models for agents, routing, and health checking
//!
//! All tunables live here as plain immutable structs created at process
//! startup by the composition root and handed to the components by
//! reference. The numeric defaults mirror the values the routing and
//! health heuristics were tuned with; treat them as knobs, not truths.
//!
//! # Examples
//!
//! ```rust
//! use crewflow_core::agent::AgentType;
//! use crewflow_core::config::AgentConfig;
//!
//! let config = AgentConfig::builder()
//!     .agent_id("sales-001")
//!     .agent_type(AgentType::Sales)
//!     .name("sales-rep")
//!     .description("Handles pricing and product inquiries")
//!     .capability("pricing")
//!     .capability("product-introduction")
//!     .max_concurrent_tasks(5)
//!     .prompt_template("You are a sales representative. {input}")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.max_concurrent_tasks, 5);
//! ```

use crate::intent::IntentType;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::agent::AgentType;

/// Immutable per-agent configuration, created at startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub agent_id: String,
    pub agent_type: AgentType,
    pub name: String,
    pub description: String,
    pub capabilities: Vec<String>,
    pub max_concurrent_tasks: u32,
    pub prompt_template: String,
    /// Scheduling weight, 1 (lowest) to 10 (highest)
    pub priority: u8,
    /// Below this `can_handle` confidence the agent answers with a
    /// generic fallback instead of its domain handler
    pub low_confidence_floor: f64,
    /// Interval of the agent's own background health-check loop
    pub health_check_interval_secs: u64,
}

impl AgentConfig {
    /// Create a builder for constructing an AgentConfig
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::new()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.agent_id.trim().is_empty() {
            return Err(Error::validation("Agent id cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(Error::validation("Agent name cannot be empty"));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(Error::validation("Max concurrent tasks must be positive"));
        }
        if !(1..=10).contains(&self.priority) {
            return Err(Error::validation("Priority must be between 1 and 10"));
        }
        if !(0.0..=1.0).contains(&self.low_confidence_floor) {
            return Err(Error::validation(
                "Low confidence floor must be within [0, 1]",
            ));
        }
        if self.health_check_interval_secs == 0 {
            return Err(Error::validation(
                "Health check interval must be at least one second",
            ));
        }
        Ok(())
    }
}

/// Builder for constructing AgentConfig instances with validation
#[derive(Debug, Clone)]
pub struct AgentConfigBuilder {
    agent_id: Option<String>,
    agent_type: Option<AgentType>,
    name: Option<String>,
    description: String,
    capabilities: Vec<String>,
    max_concurrent_tasks: u32,
    prompt_template: String,
    priority: u8,
    low_confidence_floor: f64,
    health_check_interval_secs: u64,
}

impl AgentConfigBuilder {
    pub fn new() -> Self {
        Self {
            agent_id: None,
            agent_type: None,
            name: None,
            description: String::new(),
            capabilities: Vec::new(),
            max_concurrent_tasks: 5,
            prompt_template: String::new(),
            priority: 1,
            low_confidence_floor: 0.1,
            health_check_interval_secs: 30,
        }
    }

    pub fn agent_id<S: Into<String>>(mut self, agent_id: S) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn agent_type(mut self, agent_type: AgentType) -> Self {
        self.agent_type = Some(agent_type);
        self
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    /// Add a capability tag
    pub fn capability<S: Into<String>>(mut self, capability: S) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    pub fn max_concurrent_tasks(mut self, max: u32) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    pub fn prompt_template<S: Into<String>>(mut self, template: S) -> Self {
        self.prompt_template = template.into();
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn low_confidence_floor(mut self, floor: f64) -> Self {
        self.low_confidence_floor = floor;
        self
    }

    pub fn health_check_interval_secs(mut self, secs: u64) -> Self {
        self.health_check_interval_secs = secs;
        self
    }

    /// Build the AgentConfig instance
    pub fn build(self) -> Result<AgentConfig> {
        let config = AgentConfig {
            agent_id: self
                .agent_id
                .ok_or_else(|| Error::validation("Agent id is required"))?,
            agent_type: self
                .agent_type
                .ok_or_else(|| Error::validation("Agent type is required"))?,
            name: self
                .name
                .ok_or_else(|| Error::validation("Agent name is required"))?,
            description: self.description,
            capabilities: self.capabilities,
            max_concurrent_tasks: self.max_concurrent_tasks,
            prompt_template: self.prompt_template,
            priority: self.priority,
            low_confidence_floor: self.low_confidence_floor,
            health_check_interval_secs: self.health_check_interval_secs,
        };
        config.validate()?;
        Ok(config)
    }
}

impl Default for AgentConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Router tunables: confidence adjustments, collaboration thresholds,
/// and the content-complexity keyword list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouterConfig {
    /// Confidence factor applied when a primary agent is selected
    pub primary_confidence_factor: f64,
    /// Confidence factor applied when routing falls back
    pub fallback_confidence_factor: f64,
    /// Confidence assigned when no configured agent is available
    pub default_route_confidence: f64,
    /// Factor applied on top of capability confidence by the
    /// load-balanced strategy
    pub load_balanced_factor: f64,
    /// Boost applied by the priority strategy for elevated requests,
    /// capped at 1.0
    pub priority_boost_factor: f64,
    /// Per-intent collaboration score thresholds
    pub collaboration_thresholds: HashMap<IntentType, f64>,
    /// Threshold used when an intent has no configured entry
    pub default_collaboration_threshold: f64,
    /// Keywords that raise the content-complexity score: requirement
    /// connectors, urgency/complexity adjectives, cross-department terms
    pub complexity_keywords: Vec<String>,
    /// Timeout applied to each collaboration fan-out call
    pub collaboration_call_timeout_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        let collaboration_thresholds = HashMap::from([
            (IntentType::ManagementDecision, 0.8),
            (IntentType::CollaborationRequired, 0.6),
            (IntentType::SalesInquiry, 0.6),
            (IntentType::TechnicalService, 0.7),
            (IntentType::CustomerSupport, 0.5),
            (IntentType::GeneralInquiry, 0.3),
        ]);
        Self {
            primary_confidence_factor: 0.9,
            fallback_confidence_factor: 0.6,
            default_route_confidence: 0.2,
            load_balanced_factor: 0.95,
            priority_boost_factor: 1.1,
            collaboration_thresholds,
            default_collaboration_threshold: 0.5,
            complexity_keywords: default_complexity_keywords(),
            collaboration_call_timeout_secs: 30,
        }
    }
}

fn default_complexity_keywords() -> Vec<String> {
    [
        // requirement connectors
        "and also",
        "at the same time",
        "in addition",
        "as well as",
        "并且",
        "同时",
        "另外",
        "还有",
        "以及",
        // urgency / complexity adjectives
        "complex",
        "difficult",
        "urgent",
        "important",
        "复杂",
        "困难",
        "紧急",
        "重要",
        // breadth / diversity
        "multiple",
        "various",
        "comprehensive",
        "多个",
        "各种",
        "不同",
        "综合",
        // cross-department terms
        "cross-department",
        "collaborate",
        "coordinate",
        "joint",
        "跨部门",
        "协作",
        "配合",
        "联合",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Health-check manager tunables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthConfig {
    /// Base probe interval per tracked service
    pub base_interval_secs: u64,
    /// Deadline for a single probe call
    pub probe_timeout_secs: u64,
    /// Cooldown after connection/timeout-class failures
    pub retry_cooldown_secs: u64,
    /// Cooldown after auth-class failures; long, these do not heal by
    /// retrying
    pub auth_cooldown_secs: u64,
    /// Tick of the global scheduling loop
    pub scheduler_tick_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            base_interval_secs: 30,
            probe_timeout_secs: 10,
            retry_cooldown_secs: 60,
            auth_cooldown_secs: 300,
            scheduler_tick_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> AgentConfigBuilder {
        AgentConfig::builder()
            .agent_id("sales-001")
            .agent_type(AgentType::Sales)
            .name("sales-rep")
            .capability("pricing")
    }

    #[test]
    fn test_agent_config_builder() {
        let config = builder().max_concurrent_tasks(3).priority(2).build().unwrap();
        assert_eq!(config.agent_id, "sales-001");
        assert_eq!(config.max_concurrent_tasks, 3);
        assert_eq!(config.low_confidence_floor, 0.1);
        assert_eq!(config.health_check_interval_secs, 30);
    }

    #[test]
    fn test_agent_config_validation() {
        assert!(builder().max_concurrent_tasks(0).build().is_err());
        assert!(builder().priority(0).build().is_err());
        assert!(builder().priority(11).build().is_err());
        assert!(builder().low_confidence_floor(1.5).build().is_err());
        assert!(AgentConfig::builder().build().is_err());
    }

    #[test]
    fn test_router_config_defaults() {
        let config = RouterConfig::default();
        assert_eq!(config.primary_confidence_factor, 0.9);
        assert_eq!(config.fallback_confidence_factor, 0.6);
        assert_eq!(
            config.collaboration_thresholds[&IntentType::ManagementDecision],
            0.8
        );
        assert!(config
            .complexity_keywords
            .iter()
            .any(|k| k == "cross-department"));
    }

    #[test]
    fn test_health_config_defaults() {
        let config = HealthConfig::default();
        assert_eq!(config.base_interval_secs, 30);
        assert!(config.auth_cooldown_secs > config.retry_cooldown_secs);
    }
}
