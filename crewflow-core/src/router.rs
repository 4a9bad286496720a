//! Request routing
//!
//! The router turns a classified request into a concrete agent choice.
//! Three strategies are supported: capability-based (the default, driven
//! by the intent rule table), load-balanced (capability candidates
//! re-ranked by current load), and priority-based (elevated requests are
//! escalated to the most experienced available specialization).
//! Routing never fails outright; when nothing configured is available
//! the router degrades to the customer-support default with a low
//! confidence score.

use crate::agent::AgentType;
use crate::config::RouterConfig;
use crate::intent::{IntentClassifier, IntentResult, IntentType};
use crate::registry::AgentRegistry;
use crate::request::UserRequest;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Strategy used to pick among candidate agents
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RouteStrategy {
    #[default]
    CapabilityBased,
    LoadBalanced,
    PriorityBased,
}

/// Outcome of routing one request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteResult {
    pub selected_agent: AgentType,
    pub confidence: f64,
    pub alternative_agents: Vec<AgentType>,
    pub requires_collaboration: bool,
    pub reasoning: String,
    pub estimated_processing_time_secs: Option<u64>,
}

/// Aggregate routing counters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingStats {
    pub total_routes: u64,
    pub collaboration_routes: u64,
    pub average_confidence: f64,
    pub agent_distribution: HashMap<String, u64>,
    pub intent_distribution: HashMap<String, u64>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Default)]
struct StatsAccumulator {
    total_routes: u64,
    collaboration_routes: u64,
    confidence_sum: f64,
    agent_distribution: HashMap<String, u64>,
    intent_distribution: HashMap<String, u64>,
}

/// Routes requests to agents based on intent classification
pub struct Router {
    classifier: IntentClassifier,
    registry: Arc<AgentRegistry>,
    config: RouterConfig,
    stats: Mutex<StatsAccumulator>,
}

impl Router {
    pub fn new(classifier: IntentClassifier, registry: Arc<AgentRegistry>) -> Self {
        Self::with_config(classifier, registry, RouterConfig::default())
    }

    pub fn with_config(
        classifier: IntentClassifier,
        registry: Arc<AgentRegistry>,
        config: RouterConfig,
    ) -> Self {
        Self {
            classifier,
            registry,
            config,
            stats: Mutex::new(StatsAccumulator::default()),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    /// Classify the request and pick an agent with the given strategy
    pub async fn route(
        &self,
        request: &UserRequest,
        strategy: RouteStrategy,
    ) -> (RouteResult, IntentResult) {
        info!(request_id = %request.request_id, ?strategy, "Routing request");

        let mut intent = self.classifier.analyze(request).await;
        if !self.classifier.validate(&intent) {
            warn!(request_id = %request.request_id, "Intent result failed validation, using default");
            intent = IntentResult::default_route();
        }

        let mut route = match strategy {
            RouteStrategy::CapabilityBased => self.capability_route(&intent).await,
            RouteStrategy::LoadBalanced => self.load_balanced_route(&intent).await,
            RouteStrategy::PriorityBased => self.priority_route(&intent, request).await,
        };
        route.requires_collaboration = self.collaboration_needed(&intent, request);

        info!(
            request_id = %request.request_id,
            selected = %route.selected_agent,
            confidence = route.confidence,
            collaboration = route.requires_collaboration,
            "Routing complete"
        );
        self.record_route(&route, &intent);
        (route, intent)
    }

    async fn capability_route(&self, intent: &IntentResult) -> RouteResult {
        let Some(rule) = self.classifier.rules().get(&intent.intent_type).cloned() else {
            warn!(intent = %intent.intent_type, "No routing rule for intent");
            return RouteResult {
                selected_agent: AgentType::CustomerSupport,
                confidence: 0.3,
                alternative_agents: Vec::new(),
                requires_collaboration: false,
                reasoning: "no matching routing rule".to_string(),
                estimated_processing_time_secs: None,
            };
        };

        let available_primary = self.available_types(&rule.primary_agents).await;
        let (selected, confidence, alternatives, reasoning) = if let Some((&first, rest)) =
            available_primary.split_first()
        {
            let mut alternatives: Vec<AgentType> = rest.to_vec();
            alternatives.extend(rule.fallback_agents.iter().copied());
            (
                first,
                intent.confidence * self.config.primary_confidence_factor,
                alternatives,
                format!("capability match selected {}", first),
            )
        } else {
            let available_fallback = self.available_types(&rule.fallback_agents).await;
            if let Some((&first, rest)) = available_fallback.split_first() {
                (
                    first,
                    intent.confidence * self.config.fallback_confidence_factor,
                    rest.to_vec(),
                    format!("primary unavailable, fallback selected {}", first),
                )
            } else {
                (
                    AgentType::CustomerSupport,
                    self.config.default_route_confidence,
                    Vec::new(),
                    "no configured agent available, using default".to_string(),
                )
            }
        };

        RouteResult {
            selected_agent: selected,
            confidence,
            alternative_agents: alternatives,
            requires_collaboration: rule.requires_collaboration,
            reasoning,
            estimated_processing_time_secs: Some(estimate_processing_time(
                intent.intent_type,
                selected,
            )),
        }
    }

    async fn load_balanced_route(&self, intent: &IntentResult) -> RouteResult {
        let base = self.capability_route(intent).await;

        let mut candidates = vec![base.selected_agent];
        candidates.extend(base.alternative_agents.iter().copied());

        match self.least_loaded_type(&candidates).await {
            Some(best) => {
                let alternatives = candidates.into_iter().filter(|t| *t != best).collect();
                RouteResult {
                    selected_agent: best,
                    confidence: base.confidence * self.config.load_balanced_factor,
                    alternative_agents: alternatives,
                    requires_collaboration: base.requires_collaboration,
                    reasoning: format!("load balancing selected {}", best),
                    estimated_processing_time_secs: base.estimated_processing_time_secs,
                }
            }
            None => base,
        }
    }

    async fn priority_route(&self, intent: &IntentResult, request: &UserRequest) -> RouteResult {
        let base = self.capability_route(intent).await;
        if !request.priority.is_elevated() {
            return base;
        }

        let mut candidates = vec![base.selected_agent];
        candidates.extend(base.alternative_agents.iter().copied());

        match self.most_experienced_type(&candidates).await {
            Some(experienced) => {
                let mut alternatives: Vec<AgentType> = base
                    .alternative_agents
                    .iter()
                    .copied()
                    .filter(|t| *t != experienced)
                    .collect();
                if base.selected_agent != experienced {
                    alternatives.insert(0, base.selected_agent);
                }
                RouteResult {
                    selected_agent: experienced,
                    confidence: (base.confidence * self.config.priority_boost_factor).min(1.0),
                    alternative_agents: alternatives,
                    requires_collaboration: base.requires_collaboration,
                    reasoning: format!(
                        "elevated priority escalated to experienced {}",
                        experienced
                    ),
                    estimated_processing_time_secs: base.estimated_processing_time_secs,
                }
            }
            None => base,
        }
    }

    /// Decide whether a request should be handled collaboratively.
    ///
    /// The score combines low classification confidence, entity-type
    /// spread, content complexity, and request priority, then compares
    /// against the per-intent threshold.
    pub fn collaboration_needed(&self, intent: &IntentResult, request: &UserRequest) -> bool {
        if intent.requires_collaboration {
            return true;
        }

        let threshold = self
            .config
            .collaboration_thresholds
            .get(&intent.intent_type)
            .copied()
            .unwrap_or(self.config.default_collaboration_threshold);

        let mut score = 0.0;
        if intent.confidence < 0.7 {
            score += 0.3;
        }
        if intent.distinct_entity_types() > 3 {
            score += 0.2;
        }
        score += self.content_complexity(&request.content) * 0.3;
        if request.priority.is_elevated() {
            score += 0.2;
        }

        debug!(
            intent = %intent.intent_type,
            score,
            threshold,
            "Collaboration evaluation"
        );
        score >= threshold
    }

    /// Score content complexity in [0.0, 1.0] from length and keyword
    /// density. Lengths are counted in characters, not bytes, so
    /// non-ASCII content scores the same as ASCII of equal length.
    pub fn content_complexity(&self, content: &str) -> f64 {
        let matches = self
            .config
            .complexity_keywords
            .iter()
            .filter(|keyword| content.contains(keyword.as_str()))
            .count();
        let length_score = (content.chars().count() as f64 / 200.0).min(1.0);
        let keyword_score = (matches as f64 / 3.0).min(1.0);
        length_score * 0.3 + keyword_score * 0.7
    }

    /// Snapshot of the routing counters
    pub fn stats(&self) -> RoutingStats {
        let acc = self.stats.lock();
        RoutingStats {
            total_routes: acc.total_routes,
            collaboration_routes: acc.collaboration_routes,
            average_confidence: if acc.total_routes == 0 {
                0.0
            } else {
                acc.confidence_sum / acc.total_routes as f64
            },
            agent_distribution: acc.agent_distribution.clone(),
            intent_distribution: acc.intent_distribution.clone(),
            last_updated: Utc::now(),
        }
    }

    fn record_route(&self, route: &RouteResult, intent: &IntentResult) {
        let mut acc = self.stats.lock();
        acc.total_routes += 1;
        acc.confidence_sum += route.confidence;
        if route.requires_collaboration {
            acc.collaboration_routes += 1;
        }
        *acc
            .agent_distribution
            .entry(route.selected_agent.to_string())
            .or_insert(0) += 1;
        *acc
            .intent_distribution
            .entry(intent.intent_type.to_string())
            .or_insert(0) += 1;
    }

    /// Filter agent types down to those with at least one agent that is
    /// neither offline nor in error
    async fn available_types(&self, types: &[AgentType]) -> Vec<AgentType> {
        let mut available = Vec::new();
        for &agent_type in types {
            let agents = self.registry.get_by_type(agent_type).await;
            if agents.iter().any(|a| a.status().is_available()) {
                available.push(agent_type);
            }
        }
        available
    }

    /// Candidate type whose first agent carries the lowest load ratio
    async fn least_loaded_type(&self, types: &[AgentType]) -> Option<AgentType> {
        let mut best: Option<(AgentType, f64)> = None;
        for &agent_type in types {
            let Some(info) = self.registry.info_by_type(agent_type).await else {
                continue;
            };
            if !info.status.is_available() || info.max_load == 0 {
                continue;
            }
            let ratio = info.current_load as f64 / info.max_load as f64;
            if best.map_or(true, |(_, lowest)| ratio < lowest) {
                best = Some((agent_type, ratio));
            }
        }
        best.map(|(t, _)| t)
    }

    /// Most experienced candidate type that is still available
    async fn most_experienced_type(&self, types: &[AgentType]) -> Option<AgentType> {
        let mut ranked: Vec<AgentType> = types.to_vec();
        ranked.sort_by_key(|t| std::cmp::Reverse(t.experience_rank()));
        ranked.dedup();
        for agent_type in ranked {
            if !self.available_types(&[agent_type]).await.is_empty() {
                return Some(agent_type);
            }
        }
        types.first().copied()
    }
}

/// Expected handling time for an intent when handled by the given
/// specialization
pub fn estimate_processing_time(intent_type: IntentType, agent_type: AgentType) -> u64 {
    (intent_type.base_processing_time() as f64 * agent_type.processing_time_multiplier()) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, AgentBehavior, AgentStatus};
    use crate::config::AgentConfig;
    use crate::intent::Entity;
    use crate::model::MockModelClient;
    use crate::request::{AgentResponse, Priority};
    use crate::Result;
    use async_trait::async_trait;

    struct NullBehavior;

    #[async_trait]
    impl AgentBehavior for NullBehavior {
        async fn can_handle(&self, _request: &UserRequest) -> f64 {
            0.8
        }

        fn capabilities(&self) -> Vec<String> {
            vec!["general".to_string()]
        }

        async fn process(&self, _request: &UserRequest) -> Result<AgentResponse> {
            Ok(AgentResponse::new("null", AgentType::Sales, "ok", 0.8))
        }
    }

    async fn registry_with(types: &[AgentType]) -> Arc<AgentRegistry> {
        let registry = Arc::new(AgentRegistry::new());
        for (i, &agent_type) in types.iter().enumerate() {
            let config = AgentConfig::builder()
                .agent_id(format!("{}-{}", agent_type, i))
                .agent_type(agent_type)
                .name(format!("{} agent", agent_type))
                .description("test agent")
                .max_concurrent_tasks(3)
                .build()
                .unwrap();
            let agent =
                Agent::new(config, Arc::new(NullBehavior), Arc::new(MockModelClient::new()))
                    .unwrap();
            registry.register(Arc::new(agent)).await.unwrap();
        }
        registry
    }

    fn router_with_reply(registry: Arc<AgentRegistry>, reply: &str) -> Router {
        let classifier = IntentClassifier::new(Arc::new(MockModelClient::new().with_reply(reply)));
        Router::new(classifier, registry)
    }

    fn request(content: &str, priority: Priority) -> UserRequest {
        UserRequest::builder()
            .content(content)
            .priority(priority)
            .build()
            .unwrap()
    }

    const SALES_REPLY: &str = r#"{
        "intent_type": "sales_inquiry",
        "confidence": 0.92,
        "entities": [],
        "suggested_agents": ["sales"],
        "requires_collaboration": false,
        "reasoning": "price question"
    }"#;

    #[tokio::test]
    async fn test_capability_route_selects_primary() {
        let registry = registry_with(&[AgentType::Sales, AgentType::CustomerSupport]).await;
        let router = router_with_reply(registry, SALES_REPLY);

        let (route, intent) = router
            .route(
                &request("how much does it cost?", Priority::Normal),
                RouteStrategy::CapabilityBased,
            )
            .await;

        assert_eq!(intent.intent_type, IntentType::SalesInquiry);
        assert_eq!(route.selected_agent, AgentType::Sales);
        assert!((route.confidence - 0.92 * 0.9).abs() < 1e-9);
        assert!(route.alternative_agents.contains(&AgentType::CustomerSupport));
        // 60s base for sales inquiries, 1.2x for the sales agent.
        assert_eq!(route.estimated_processing_time_secs, Some(72));
    }

    #[tokio::test]
    async fn test_capability_route_falls_back_when_primary_offline() {
        let registry = registry_with(&[AgentType::Sales, AgentType::CustomerSupport]).await;
        for agent in registry.get_by_type(AgentType::Sales).await {
            agent.stop().await;
        }
        let router = router_with_reply(Arc::clone(&registry), SALES_REPLY);

        let (route, _) = router
            .route(
                &request("how much does it cost?", Priority::Normal),
                RouteStrategy::CapabilityBased,
            )
            .await;

        assert_eq!(route.selected_agent, AgentType::CustomerSupport);
        assert!((route.confidence - 0.92 * 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_capability_route_default_when_nothing_available() {
        let registry = registry_with(&[]).await;
        let router = router_with_reply(registry, SALES_REPLY);

        let (route, _) = router
            .route(
                &request("how much does it cost?", Priority::Normal),
                RouteStrategy::CapabilityBased,
            )
            .await;

        assert_eq!(route.selected_agent, AgentType::CustomerSupport);
        assert!((route.confidence - 0.2).abs() < 1e-9);
        assert!(route.alternative_agents.is_empty());
    }

    #[tokio::test]
    async fn test_error_agents_not_routable() {
        let registry = registry_with(&[AgentType::Sales, AgentType::CustomerSupport]).await;
        for agent in registry.get_by_type(AgentType::Sales).await {
            agent.set_status(AgentStatus::Error);
        }
        let router = router_with_reply(Arc::clone(&registry), SALES_REPLY);

        let (route, _) = router
            .route(
                &request("price?", Priority::Normal),
                RouteStrategy::CapabilityBased,
            )
            .await;
        assert_eq!(route.selected_agent, AgentType::CustomerSupport);
    }

    #[tokio::test]
    async fn test_load_balanced_applies_factor() {
        let registry = registry_with(&[AgentType::Sales, AgentType::CustomerSupport]).await;
        let router = router_with_reply(registry, SALES_REPLY);

        let (route, _) = router
            .route(
                &request("how much does it cost?", Priority::Normal),
                RouteStrategy::LoadBalanced,
            )
            .await;

        // Loads are equal, so the capability pick survives with the
        // load-balanced factor applied.
        assert_eq!(route.selected_agent, AgentType::Sales);
        assert!((route.confidence - 0.92 * 0.9 * 0.95).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_priority_route_escalates_elevated_requests() {
        let registry = registry_with(&[AgentType::Manager, AgentType::Sales]).await;
        let reply = r#"{
            "intent_type": "management_decision",
            "confidence": 0.9,
            "entities": [],
            "suggested_agents": ["manager"],
            "requires_collaboration": true,
            "reasoning": "strategy question"
        }"#;
        let router = router_with_reply(registry, reply);

        let (route, _) = router
            .route(
                &request("we need a decision on the budget", Priority::Urgent),
                RouteStrategy::PriorityBased,
            )
            .await;

        assert_eq!(route.selected_agent, AgentType::Manager);
        // Capped boost: 0.9 * 0.9 * 1.1.
        assert!((route.confidence - (0.9 * 0.9 * 1.1_f64).min(1.0)).abs() < 1e-9);
        assert!(route.requires_collaboration);
    }

    #[tokio::test]
    async fn test_priority_route_ignores_normal_priority() {
        let registry = registry_with(&[AgentType::Sales]).await;
        let router = router_with_reply(registry, SALES_REPLY);

        let (route, _) = router
            .route(
                &request("how much?", Priority::Normal),
                RouteStrategy::PriorityBased,
            )
            .await;
        assert!((route.confidence - 0.92 * 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_invalid_intent_uses_default_route() {
        // Confidence 0.4 is below the sales threshold of 0.7, so the
        // classification is discarded.
        let registry = registry_with(&[AgentType::CustomerSupport]).await;
        let reply = r#"{
            "intent_type": "sales_inquiry",
            "confidence": 0.4,
            "entities": [],
            "suggested_agents": ["sales"],
            "requires_collaboration": false,
            "reasoning": ""
        }"#;
        let router = router_with_reply(registry, reply);

        let (route, intent) = router
            .route(&request("hmm", Priority::Normal), RouteStrategy::CapabilityBased)
            .await;
        assert_eq!(intent.intent_type, IntentType::GeneralInquiry);
        assert!((intent.confidence - 0.5).abs() < 1e-9);
        assert_eq!(route.selected_agent, AgentType::CustomerSupport);
    }

    #[tokio::test]
    async fn test_collaboration_scoring() {
        let registry = registry_with(&[]).await;
        let router = router_with_reply(registry, SALES_REPLY);

        let mut intent = IntentResult::default_route();
        intent.intent_type = IntentType::GeneralInquiry;
        intent.confidence = 0.5;

        // Low confidence alone scores 0.3, meeting the 0.3 threshold for
        // general inquiries.
        let req = request("hello", Priority::Normal);
        assert!(router.collaboration_needed(&intent, &req));

        // A confident sales inquiry with simple content stays solo.
        intent.intent_type = IntentType::SalesInquiry;
        intent.confidence = 0.95;
        assert!(!router.collaboration_needed(&intent, &req));

        // Entity spread, urgency, and complex content push it over the
        // 0.6 sales threshold.
        intent.entities = vec![
            Entity::new("a", "1", "PRODUCT", 0.9),
            Entity::new("b", "2", "DATE", 0.9),
            Entity::new("c", "3", "LOCATION", 0.9),
            Entity::new("d", "4", "PRICE", 0.9),
        ];
        let req = request(
            "urgent: multiple departments need to coordinate a complex comprehensive rollout",
            Priority::Urgent,
        );
        assert!(router.collaboration_needed(&intent, &req));
    }

    #[tokio::test]
    async fn test_explicit_collaboration_flag_wins() {
        let registry = registry_with(&[]).await;
        let router = router_with_reply(registry, SALES_REPLY);
        let mut intent = IntentResult::default_route();
        intent.requires_collaboration = true;
        intent.confidence = 0.99;
        assert!(router.collaboration_needed(&intent, &request("hi", Priority::Low)));
    }

    #[tokio::test]
    async fn test_content_complexity() {
        let registry = registry_with(&[]).await;
        let router = router_with_reply(registry, SALES_REPLY);

        assert_eq!(router.content_complexity(""), 0.0);
        assert!(router.content_complexity("hi") < 0.05);

        // Three keyword hits saturate the keyword component.
        let complex = "this is complex and urgent, multiple teams must collaborate";
        let score = router.content_complexity(complex);
        assert!(score > 0.7);

        // Three distinct keywords plus 200 characters saturate both
        // components, pinning the score at the top of the range.
        let saturated = format!("complex and urgent, multiple {}", "x".repeat(200));
        assert!((router.content_complexity(&saturated) - 1.0).abs() <= f64::EPSILON);

        // Character counting keeps short non-ASCII text from saturating
        // the length component.
        let zh = "复杂的跨部门协作";
        let zh_score = router.content_complexity(zh);
        assert!(zh_score > 0.7);
        assert!((router.content_complexity("你好") - 2.0 / 200.0 * 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_routing_stats_accumulate() {
        let registry = registry_with(&[AgentType::Sales]).await;
        let router = router_with_reply(registry, SALES_REPLY);

        let (_, _) = router
            .route(&request("price?", Priority::Normal), RouteStrategy::CapabilityBased)
            .await;

        let stats = router.stats();
        assert_eq!(stats.total_routes, 1);
        assert_eq!(stats.agent_distribution["sales"], 1);
        assert_eq!(stats.intent_distribution["sales_inquiry"], 1);
        assert!((stats.average_confidence - 0.92 * 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_table() {
        assert_eq!(
            estimate_processing_time(IntentType::GeneralInquiry, AgentType::CustomerSupport),
            30
        );
        assert_eq!(
            estimate_processing_time(IntentType::CollaborationRequired, AgentType::Coordinator),
            750
        );
    }
}
