//! Intent classification
//!
//! The classifier asks a language-model backend to label a request with
//! one of the known intents and to extract entities from it. Model
//! output is parsed strictly: a payload that does not deserialize into
//! the expected shape, including unknown intent or agent labels, is
//! rejected as a whole and the classifier falls back to a conservative
//! default instead of guessing at partial data.
//!
//! # Examples
//!
//! ```rust
//! use crewflow_core::intent::{default_routing_rules, IntentType};
//!
//! let rules = default_routing_rules();
//! let rule = &rules[&IntentType::SalesInquiry];
//! assert_eq!(rule.confidence_threshold, 0.7);
//! ```

use crate::agent::AgentType;
use crate::model::{ChatRequest, ModelClient};
use crate::request::UserRequest;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Category a user request is classified into
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    SalesInquiry,
    CustomerSupport,
    TechnicalService,
    ManagementDecision,
    GeneralInquiry,
    CollaborationRequired,
}

impl IntentType {
    pub fn all() -> [IntentType; 6] {
        [
            IntentType::SalesInquiry,
            IntentType::CustomerSupport,
            IntentType::TechnicalService,
            IntentType::ManagementDecision,
            IntentType::GeneralInquiry,
            IntentType::CollaborationRequired,
        ]
    }

    /// Baseline handling time in seconds before agent multipliers
    pub fn base_processing_time(&self) -> u64 {
        match self {
            IntentType::GeneralInquiry => 30,
            IntentType::SalesInquiry => 60,
            IntentType::CustomerSupport => 90,
            IntentType::TechnicalService => 120,
            IntentType::ManagementDecision => 180,
            IntentType::CollaborationRequired => 300,
        }
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntentType::SalesInquiry => "sales_inquiry",
            IntentType::CustomerSupport => "customer_support",
            IntentType::TechnicalService => "technical_service",
            IntentType::ManagementDecision => "management_decision",
            IntentType::GeneralInquiry => "general_inquiry",
            IntentType::CollaborationRequired => "collaboration_required",
        };
        write!(f, "{}", name)
    }
}

fn default_entity_confidence() -> f64 {
    0.5
}

/// A structured item extracted from request content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub name: String,
    pub value: String,
    pub entity_type: String,
    #[serde(default = "default_entity_confidence")]
    pub confidence: f64,
}

impl Entity {
    pub fn new<S1, S2, S3>(name: S1, value: S2, entity_type: S3, confidence: f64) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self {
            name: name.into(),
            value: value.into(),
            entity_type: entity_type.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Outcome of classifying one request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentResult {
    pub intent_type: IntentType,
    pub confidence: f64,
    pub entities: Vec<Entity>,
    pub suggested_agents: Vec<AgentType>,
    pub requires_collaboration: bool,
    pub reasoning: String,
}

impl IntentResult {
    /// Conservative result used when the classifier itself failed
    pub fn classifier_failure<S: Into<String>>(reason: S) -> Self {
        Self {
            intent_type: IntentType::GeneralInquiry,
            confidence: 0.1,
            entities: Vec::new(),
            suggested_agents: vec![AgentType::CustomerSupport],
            requires_collaboration: false,
            reasoning: format!("classification failed, defaulting: {}", reason.into()),
        }
    }

    /// Default result substituted when a classification did not pass
    /// validation
    pub fn default_route() -> Self {
        Self {
            intent_type: IntentType::GeneralInquiry,
            confidence: 0.5,
            entities: Vec::new(),
            suggested_agents: vec![AgentType::CustomerSupport],
            requires_collaboration: false,
            reasoning: "default intent result".to_string(),
        }
    }

    /// Number of distinct entity types among the extracted entities
    pub fn distinct_entity_types(&self) -> usize {
        self.entities
            .iter()
            .map(|e| e.entity_type.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Static routing rule for one intent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingRule {
    pub primary_agents: Vec<AgentType>,
    pub fallback_agents: Vec<AgentType>,
    pub keywords: Vec<String>,
    pub confidence_threshold: f64,
    pub requires_collaboration: bool,
}

fn rule(
    primary: &[AgentType],
    fallback: &[AgentType],
    keywords: &[&str],
    threshold: f64,
    requires_collaboration: bool,
) -> RoutingRule {
    RoutingRule {
        primary_agents: primary.to_vec(),
        fallback_agents: fallback.to_vec(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        confidence_threshold: threshold,
        requires_collaboration,
    }
}

/// Built-in routing rule table covering every intent
pub fn default_routing_rules() -> HashMap<IntentType, RoutingRule> {
    let mut rules = HashMap::new();
    rules.insert(
        IntentType::SalesInquiry,
        rule(
            &[AgentType::Sales],
            &[AgentType::CustomerSupport],
            &["price", "buy", "product", "quote", "sales", "discount", "价格", "购买", "报价"],
            0.7,
            false,
        ),
    );
    rules.insert(
        IntentType::CustomerSupport,
        rule(
            &[AgentType::CustomerSupport],
            &[AgentType::FieldService],
            &["problem", "help", "support", "issue", "question", "问题", "帮助", "故障"],
            0.7,
            false,
        ),
    );
    rules.insert(
        IntentType::TechnicalService,
        rule(
            &[AgentType::FieldService],
            &[AgentType::CustomerSupport],
            &["repair", "technical", "on-site", "install", "debug", "维修", "现场", "安装"],
            0.7,
            false,
        ),
    );
    rules.insert(
        IntentType::ManagementDecision,
        rule(
            &[AgentType::Manager],
            &[AgentType::Coordinator],
            &["decision", "management", "strategy", "analysis", "planning", "决策", "策略", "规划"],
            0.8,
            true,
        ),
    );
    rules.insert(
        IntentType::GeneralInquiry,
        rule(
            &[AgentType::CustomerSupport],
            &[AgentType::Sales],
            &["information", "about", "introduction", "what is", "信息", "了解", "介绍"],
            0.6,
            false,
        ),
    );
    rules.insert(
        IntentType::CollaborationRequired,
        rule(
            &[AgentType::Coordinator],
            &[AgentType::CustomerSupport],
            &["complex", "multiple", "collaborate", "comprehensive", "复杂", "协作", "综合"],
            0.8,
            true,
        ),
    );
    rules
}

/// Strict shape the classifier expects back from the model
#[derive(Debug, Deserialize)]
struct IntentPayload {
    intent_type: IntentType,
    confidence: f64,
    #[serde(default)]
    entities: Vec<Entity>,
    suggested_agents: Vec<AgentType>,
    #[serde(default)]
    requires_collaboration: bool,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct EntitiesPayload {
    entities: Vec<Entity>,
}

const INTENT_PROMPT: &str = "You are an intent classification system. \
Analyze the user input, pick exactly one intent type from \
[sales_inquiry, customer_support, technical_service, management_decision, \
general_inquiry, collaboration_required], extract relevant entities, and \
suggest agent types from [sales, customer_support, field_service, manager, \
coordinator].\n\nUser input: {input}\n\nReply with JSON only, in this shape:\n\
{\"intent_type\": \"...\", \"confidence\": 0.95, \"entities\": \
[{\"name\": \"...\", \"value\": \"...\", \"entity_type\": \"...\", \
\"confidence\": 0.9}], \"suggested_agents\": [\"...\"], \
\"requires_collaboration\": false, \"reasoning\": \"...\"}";

const ENTITY_PROMPT: &str = "Extract key entities from the text below. \
Recognized entity types: PRODUCT, SERVICE, PERSON, COMPANY, DATE, LOCATION, \
PROBLEM, FEATURE, PRICE, CONTACT.\n\nText: {input}\n\nReply with JSON only:\n\
{\"entities\": [{\"name\": \"...\", \"value\": \"...\", \
\"entity_type\": \"...\", \"confidence\": 0.9}]}";

/// Model-backed intent classifier
pub struct IntentClassifier {
    model: Arc<dyn ModelClient>,
    rules: HashMap<IntentType, RoutingRule>,
}

impl IntentClassifier {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self {
            model,
            rules: default_routing_rules(),
        }
    }

    /// Replace the built-in routing rule table
    pub fn with_rules(mut self, rules: HashMap<IntentType, RoutingRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules(&self) -> &HashMap<IntentType, RoutingRule> {
        &self.rules
    }

    /// Classify a request. Never fails: any model or parse error yields
    /// the conservative fallback result.
    pub async fn analyze(&self, request: &UserRequest) -> IntentResult {
        info!(request_id = %request.request_id, "Analyzing request intent");
        let prompt = INTENT_PROMPT.replace("{input}", &request.content);

        match self.classify_with_model(&prompt).await {
            Ok(result) => {
                info!(
                    request_id = %request.request_id,
                    intent = %result.intent_type,
                    confidence = result.confidence,
                    "Intent classified"
                );
                result
            }
            Err(e) => {
                warn!(request_id = %request.request_id, error = %e, "Intent classification failed");
                IntentResult::classifier_failure(e.to_string())
            }
        }
    }

    async fn classify_with_model(&self, prompt: &str) -> Result<IntentResult> {
        let response = self
            .model
            .chat_completion(ChatRequest::user_prompt(prompt, 1000, 0.1))
            .await?;
        let payload: IntentPayload = parse_payload(&response.content)?;
        Ok(IntentResult {
            intent_type: payload.intent_type,
            confidence: payload.confidence.clamp(0.0, 1.0),
            entities: payload.entities,
            suggested_agents: payload.suggested_agents,
            requires_collaboration: payload.requires_collaboration,
            reasoning: payload.reasoning,
        })
    }

    /// Extract entities from free text. Failures yield an empty list.
    pub async fn extract_entities(&self, text: &str) -> Vec<Entity> {
        let prompt = ENTITY_PROMPT.replace("{input}", text);
        let result: Result<EntitiesPayload> = async {
            let response = self
                .model
                .chat_completion(ChatRequest::user_prompt(&prompt, 800, 0.1))
                .await?;
            parse_payload(&response.content)
        }
        .await;

        match result {
            Ok(payload) => {
                debug!(count = payload.entities.len(), "Entities extracted");
                payload.entities
            }
            Err(e) => {
                warn!(error = %e, "Entity extraction failed");
                Vec::new()
            }
        }
    }

    /// Check a classification against its routing rule. A result below
    /// the rule's confidence threshold, or one suggesting no agents at
    /// all, is rejected.
    pub fn validate(&self, result: &IntentResult) -> bool {
        if let Some(rule) = self.rules.get(&result.intent_type) {
            if result.confidence < rule.confidence_threshold {
                warn!(
                    intent = %result.intent_type,
                    confidence = result.confidence,
                    threshold = rule.confidence_threshold,
                    "Intent confidence below threshold"
                );
                return false;
            }
        }
        if result.suggested_agents.is_empty() {
            warn!(intent = %result.intent_type, "Intent result suggests no agents");
            return false;
        }
        true
    }
}

/// Parse a model reply into the expected payload type. Tries the whole
/// reply first, then the outermost brace-delimited slice for models that
/// wrap JSON in prose.
fn parse_payload<T: serde::de::DeserializeOwned>(response: &str) -> Result<T> {
    match serde_json::from_str(response) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
                if end > start {
                    if let Ok(value) = serde_json::from_str(&response[start..=end]) {
                        return Ok(value);
                    }
                }
            }
            Err(first_err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MockModelClient;
    use crate::request::Priority;

    fn classifier_with(reply: &str) -> IntentClassifier {
        IntentClassifier::new(Arc::new(MockModelClient::new().with_reply(reply)))
    }

    fn request(content: &str) -> UserRequest {
        UserRequest::builder()
            .content(content)
            .priority(Priority::Normal)
            .build()
            .unwrap()
    }

    const SALES_REPLY: &str = r#"{
        "intent_type": "sales_inquiry",
        "confidence": 0.92,
        "entities": [
            {"name": "product", "value": "Model X", "entity_type": "PRODUCT", "confidence": 0.9}
        ],
        "suggested_agents": ["sales"],
        "requires_collaboration": false,
        "reasoning": "price question"
    }"#;

    #[tokio::test]
    async fn test_analyze_parses_valid_payload() {
        let classifier = classifier_with(SALES_REPLY);
        let result = classifier.analyze(&request("how much is Model X?")).await;

        assert_eq!(result.intent_type, IntentType::SalesInquiry);
        assert!((result.confidence - 0.92).abs() < 1e-9);
        assert_eq!(result.suggested_agents, vec![AgentType::Sales]);
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].entity_type, "PRODUCT");
    }

    #[tokio::test]
    async fn test_analyze_extracts_json_from_prose() {
        let wrapped = format!("Here is the analysis:\n{}\nHope that helps.", SALES_REPLY);
        let classifier = classifier_with(&wrapped);
        let result = classifier.analyze(&request("how much?")).await;
        assert_eq!(result.intent_type, IntentType::SalesInquiry);
    }

    #[tokio::test]
    async fn test_analyze_rejects_unknown_intent_label() {
        let classifier = classifier_with(
            r#"{"intent_type": "world_domination", "confidence": 0.99, "suggested_agents": ["sales"]}"#,
        );
        let result = classifier.analyze(&request("hello")).await;

        assert_eq!(result.intent_type, IntentType::GeneralInquiry);
        assert!((result.confidence - 0.1).abs() < 1e-9);
        assert_eq!(result.suggested_agents, vec![AgentType::CustomerSupport]);
    }

    #[tokio::test]
    async fn test_analyze_falls_back_on_garbage() {
        let classifier = classifier_with("I cannot answer that.");
        let result = classifier.analyze(&request("hello")).await;
        assert_eq!(result.intent_type, IntentType::GeneralInquiry);
        assert!((result.confidence - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_analyze_falls_back_on_model_error() {
        let client = MockModelClient::new();
        client.fail_next_completion(crate::Error::model_backend(
            crate::error::ModelBackendKind::Connection,
            "connection reset",
        ));
        let classifier = IntentClassifier::new(Arc::new(client));
        let result = classifier.analyze(&request("hello")).await;
        assert!((result.confidence - 0.1).abs() < 1e-9);
        assert!(result.reasoning.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_extract_entities() {
        let classifier = classifier_with(
            r#"{"entities": [
                {"name": "company", "value": "Acme", "entity_type": "COMPANY", "confidence": 0.8},
                {"name": "date", "value": "tomorrow", "entity_type": "DATE"}
            ]}"#,
        );
        let entities = classifier.extract_entities("Acme visit tomorrow").await;
        assert_eq!(entities.len(), 2);
        // Missing confidence falls back to the default.
        assert!((entities[1].confidence - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_extract_entities_empty_on_garbage() {
        let classifier = classifier_with("no json here");
        assert!(classifier.extract_entities("text").await.is_empty());
    }

    #[test]
    fn test_validation_thresholds() {
        let classifier = IntentClassifier::new(Arc::new(MockModelClient::new()));

        let mut result = IntentResult {
            intent_type: IntentType::ManagementDecision,
            confidence: 0.75,
            entities: Vec::new(),
            suggested_agents: vec![AgentType::Manager],
            requires_collaboration: true,
            reasoning: String::new(),
        };
        // Management decisions need at least 0.8.
        assert!(!classifier.validate(&result));

        result.confidence = 0.85;
        assert!(classifier.validate(&result));

        result.suggested_agents.clear();
        assert!(!classifier.validate(&result));
    }

    #[test]
    fn test_default_rules_cover_all_intents() {
        let rules = default_routing_rules();
        for intent in IntentType::all() {
            assert!(rules.contains_key(&intent), "missing rule for {}", intent);
        }
        assert_eq!(
            rules[&IntentType::TechnicalService].primary_agents,
            vec![AgentType::FieldService]
        );
        assert!(rules[&IntentType::CollaborationRequired].requires_collaboration);
    }

    #[test]
    fn test_distinct_entity_types() {
        let mut result = IntentResult::default_route();
        result.entities = vec![
            Entity::new("a", "1", "PRODUCT", 0.9),
            Entity::new("b", "2", "PRODUCT", 0.9),
            Entity::new("c", "3", "DATE", 0.9),
        ];
        assert_eq!(result.distinct_entity_types(), 2);
    }

    #[test]
    fn test_base_processing_times() {
        assert_eq!(IntentType::GeneralInquiry.base_processing_time(), 30);
        assert_eq!(IntentType::CollaborationRequired.base_processing_time(), 300);
    }
}
