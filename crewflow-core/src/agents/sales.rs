//! Sales representative behavior
//!
//! Scores inbound requests against a bilingual sales vocabulary, sorts
//! them into a small set of inquiry kinds, and answers price, product,
//! and purchase questions from the built-in catalog. Solution design
//! and unclassified inquiries are delegated to the model with a sales
//! persona prompt.

use crate::agent::{AgentBehavior, AgentType};
use crate::agents::{contains_any, keyword_score, pattern_score};
use crate::config::AgentConfig;
use crate::model::{ChatRequest, ModelClient};
use crate::request::{Action, AgentResponse, UserRequest};
use crate::{Error, Result};
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use std::sync::OnceLock;
use tracing::{debug, warn};

const SALES_KEYWORDS: &[&str] = &[
    "价格", "购买", "产品", "方案", "报价", "优惠", "折扣", "合同", "订购", "咨询",
    "price", "buy", "purchase", "product", "quote", "discount", "contract", "order", "plan",
    "cost", "pricing",
];

const BASE_SALES_WORDS: &[&str] = &[
    "价格", "购买", "产品", "方案", "报价", "多少钱",
    "price", "buy", "product", "quote", "purchase", "cost",
];

const SUPPORT_DOMAIN_WORDS: &[&str] = &[
    "故障", "报错", "bug", "投诉", "维修",
    "broken", "error", "complaint", "repair", "not working",
];

fn sales_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(how much|price of|quote for)|(多少钱|什么价|报个价)",
            r"(want to|plan to|how to) (buy|purchase|order)|(想|打算|如何)(购买|订购|下单)",
            r"(product|plan) (features|details|comparison)|(产品|方案).*(功能|介绍|对比)",
            r"(discount|promotion|special offer)|(优惠|折扣|促销)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static pattern"))
        .collect()
    })
}

/// Sub-type of a sales inquiry, decided by keyword groups in order of
/// specificity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InquiryKind {
    Price,
    Purchase,
    Solution,
    Product,
    General,
}

impl InquiryKind {
    fn classify(content: &str) -> Self {
        if contains_any(content, &["价格", "报价", "多少钱", "price", "quote", "cost", "pricing"]) {
            InquiryKind::Price
        } else if contains_any(content, &["购买", "订购", "下单", "合同", "buy", "purchase", "order", "contract"])
        {
            InquiryKind::Purchase
        } else if contains_any(content, &["方案", "解决", "定制", "集成", "solution", "integrate", "custom"])
        {
            InquiryKind::Solution
        } else if contains_any(content, &["产品", "功能", "介绍", "对比", "product", "feature", "compare"])
        {
            InquiryKind::Product
        } else {
            InquiryKind::General
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            InquiryKind::Price => "price",
            InquiryKind::Purchase => "purchase",
            InquiryKind::Solution => "solution",
            InquiryKind::Product => "product",
            InquiryKind::General => "general",
        }
    }
}

/// Stage of the sales funnel inferred from the request wording, recorded
/// in response metadata for downstream CRM hooks.
fn identify_stage(content: &str) -> &'static str {
    if contains_any(content, &["签约", "合同", "下单", "付款", "sign", "contract", "payment"]) {
        "closing"
    } else if contains_any(content, &["报价", "方案", "对比", "quote", "proposal", "compare"]) {
        "proposal"
    } else if contains_any(content, &["需求", "场景", "规模", "requirement", "use case", "scale"]) {
        "needs_analysis"
    } else {
        "initial_contact"
    }
}

struct Product {
    name: &'static str,
    monthly_price: u32,
    summary: &'static str,
}

const CATALOG: &[Product] = &[
    Product {
        name: "Starter",
        monthly_price: 999,
        summary: "single workspace, standard models, community support",
    },
    Product {
        name: "Professional",
        monthly_price: 2999,
        summary: "multi-workspace, premium models, priority support, usage analytics",
    },
    Product {
        name: "Enterprise",
        monthly_price: 9999,
        summary: "dedicated deployment, custom models, SLA-backed support, audit features",
    },
];

const SALES_PERSONA_PROMPT: &str = "You are a sales representative for an enterprise AI \
service platform. Answer the customer's inquiry helpfully and concisely, and invite \
them to share their requirements so a tailored proposal can follow.\n\nCustomer \
inquiry: {input}";

const GENERAL_FALLBACK: &str = "Thank you for your interest in our platform. Could you \
share a little more about your requirements and use case? I will put together the \
product information and pricing that fits your situation.";

/// Behavior for the sales role. Holds a model client for inquiries the
/// catalog playbooks do not cover.
pub struct SalesBehavior {
    model: Arc<dyn ModelClient>,
}

impl SalesBehavior {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }

    fn price_reply(&self) -> String {
        let mut reply = String::from("Here is our current pricing:\n\n");
        for product in CATALOG {
            reply.push_str(&format!(
                "- {}: {} per month ({})\n",
                product.name, product.monthly_price, product.summary
            ));
        }
        reply.push_str(
            "\nVolume and annual-commitment discounts are available. Tell me about \
             your expected usage and I can prepare a formal quote.",
        );
        reply
    }

    fn product_reply(&self) -> String {
        let mut reply = String::from(
            "We offer an enterprise AI service platform in three editions:\n\n",
        );
        for product in CATALOG {
            reply.push_str(&format!("- {}: {}\n", product.name, product.summary));
        }
        reply.push_str(
            "\nI can arrange a live demo so you can see the edition that matches \
             your scenario.",
        );
        reply
    }

    fn purchase_reply(&self) -> String {
        String::from(
            "Great to hear you are ready to move forward. The purchase process is:\n\n\
             1. Confirm the edition and subscription term\n\
             2. Receive the formal quotation and contract draft\n\
             3. Sign and complete payment\n\
             4. Account provisioning within one business day\n\n\
             Share your company details and preferred edition and I will start the \
             paperwork right away.",
        )
    }

    async fn model_reply(&self, content: &str) -> String {
        let prompt = SALES_PERSONA_PROMPT.replace("{input}", content);
        match self
            .model
            .chat_completion(ChatRequest::user_prompt(prompt, 500, 0.7))
            .await
        {
            Ok(reply) => reply.content,
            Err(error) => {
                warn!(%error, "sales model reply failed, using canned fallback");
                GENERAL_FALLBACK.to_string()
            }
        }
    }

    fn next_actions(&self, kind: InquiryKind) -> Vec<Action> {
        let mut actions = match kind {
            InquiryKind::Price => vec![
                Action::new("send_quotation")
                    .with_parameter("format", "pdf")
                    .with_description("Send a formal quotation"),
                Action::new("schedule_call")
                    .with_parameter("timeframe", "2_days")
                    .with_description("Schedule a pricing call"),
            ],
            InquiryKind::Purchase => vec![
                Action::new("prepare_contract")
                    .with_parameter("template", "standard")
                    .with_description("Prepare the contract draft"),
                Action::new("assign_account_manager")
                    .with_description("Assign a dedicated account manager"),
            ],
            InquiryKind::Solution => vec![
                Action::new("requirements_workshop")
                    .with_parameter("method", "video_call")
                    .with_description("Run a requirements workshop"),
                Action::new("draft_proposal")
                    .with_parameter("lead_time", "3_days")
                    .with_description("Draft a tailored solution proposal"),
            ],
            InquiryKind::Product => vec![Action::new("schedule_demo")
                .with_parameter("duration", "30_minutes")
                .with_description("Schedule a product demo")],
            InquiryKind::General => Vec::new(),
        };
        actions.push(
            Action::new("sales_follow_up")
                .with_parameter("schedule", "24_hours")
                .with_description("Follow up within 24 hours"),
        );
        actions
    }

    fn needs_collaboration(&self, content: &str) -> bool {
        // Deep technical evaluation needs field service input.
        if contains_any(content, &["部署", "集成", "架构", "技术评估", "deploy", "integration", "architecture"])
        {
            return true;
        }
        // Non-standard terms need management sign-off.
        if contains_any(content, &["特批", "大额", "定制合同", "special approval", "custom contract", "exception"])
        {
            return true;
        }
        // Dissatisfied prospects go through support as well.
        contains_any(content, &["投诉", "不满", "complaint", "refund"])
    }
}

#[async_trait]
impl AgentBehavior for SalesBehavior {
    async fn can_handle(&self, request: &UserRequest) -> f64 {
        let content = request.content.to_lowercase();

        let keywords = keyword_score(&content, SALES_KEYWORDS);
        let question = if content.contains('?') || content.contains('？') {
            0.1
        } else {
            0.0
        };
        let patterns = pattern_score(&content, sales_patterns());
        let base = if contains_any(&content, BASE_SALES_WORDS) {
            0.4
        } else {
            0.0
        };

        let mut total = (keywords + question + patterns + base).min(1.0);
        if contains_any(&content, SUPPORT_DOMAIN_WORDS) {
            total *= 0.6;
        }
        total
    }

    fn capabilities(&self) -> Vec<String> {
        [
            "product_consultation",
            "quotation",
            "solution_proposal",
            "order_processing",
            "discount_negotiation",
            "customer_development",
            "demo_arrangement",
            "contract_handling",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn estimate_processing_time(&self, request: &UserRequest) -> u64 {
        match InquiryKind::classify(&request.content.to_lowercase()) {
            InquiryKind::Price => 5,
            InquiryKind::Product => 12,
            InquiryKind::Solution => 25,
            InquiryKind::Purchase | InquiryKind::General => 10,
        }
    }

    async fn process(&self, request: &UserRequest) -> Result<AgentResponse> {
        let content = request.content.to_lowercase();
        let kind = InquiryKind::classify(&content);
        let stage = identify_stage(&content);
        debug!(kind = kind.as_str(), stage, "handling sales inquiry");

        let reply = match kind {
            InquiryKind::Price => self.price_reply(),
            InquiryKind::Product => self.product_reply(),
            InquiryKind::Purchase => self.purchase_reply(),
            InquiryKind::Solution | InquiryKind::General => {
                self.model_reply(&request.content).await
            }
        };

        let needs_collaboration = self.needs_collaboration(&content);
        Ok(
            AgentResponse::new("sales", AgentType::Sales, reply, 0.9)
                .with_actions(self.next_actions(kind))
                .with_collaboration_needed(needs_collaboration)
                .with_metadata("inquiry_kind", kind.as_str())
                .with_metadata("sales_stage", stage),
        )
    }

    fn validate_config(&self, config: &AgentConfig) -> Result<()> {
        if config.agent_type != AgentType::Sales {
            return Err(Error::validation(
                "sales behavior requires a sales agent type",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MockModelClient;
    use crate::request::UserRequest;

    fn behavior() -> SalesBehavior {
        SalesBehavior::new(Arc::new(MockModelClient::new()))
    }

    fn request(content: &str) -> UserRequest {
        UserRequest::new(content.to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_can_handle_pricing_question() {
        let score = behavior()
            .can_handle(&request("How much does the enterprise plan cost?"))
            .await;
        assert!(score > 0.8, "got {score}");
    }

    #[tokio::test]
    async fn test_can_handle_chinese_purchase() {
        let score = behavior().can_handle(&request("我想购买你们的产品")).await;
        assert!(score > 0.7, "got {score}");
    }

    #[tokio::test]
    async fn test_support_content_dampened() {
        let with_fault = behavior()
            .can_handle(&request("price quote for repairing the broken unit"))
            .await;
        let clean = behavior().can_handle(&request("price quote please")).await;
        assert!(with_fault < clean);
    }

    #[tokio::test]
    async fn test_unrelated_content_scores_low() {
        let score = behavior().can_handle(&request("what a nice day")).await;
        assert!(score < 0.2, "got {score}");
    }

    #[test]
    fn test_rejects_mismatched_agent_type() {
        let config = AgentConfig::builder()
            .agent_id("support-1")
            .agent_type(AgentType::CustomerSupport)
            .name("Support")
            .build()
            .unwrap();
        assert!(behavior().validate_config(&config).is_err());

        let config = AgentConfig::builder()
            .agent_id("sales-1")
            .agent_type(AgentType::Sales)
            .name("Sales")
            .build()
            .unwrap();
        assert!(behavior().validate_config(&config).is_ok());
    }

    #[test]
    fn test_inquiry_classification() {
        assert_eq!(InquiryKind::classify("多少钱"), InquiryKind::Price);
        assert_eq!(InquiryKind::classify("i want to order now"), InquiryKind::Purchase);
        assert_eq!(
            InquiryKind::classify("need a custom solution"),
            InquiryKind::Solution
        );
        assert_eq!(InquiryKind::classify("产品功能介绍"), InquiryKind::Product);
        assert_eq!(InquiryKind::classify("hello"), InquiryKind::General);
    }

    #[test]
    fn test_estimate_table() {
        let behavior = behavior();
        assert_eq!(behavior.estimate_processing_time(&request("what is the price")), 5);
        assert_eq!(
            behavior.estimate_processing_time(&request("design a custom solution")),
            25
        );
        assert_eq!(behavior.estimate_processing_time(&request("hello")), 10);
    }

    #[tokio::test]
    async fn test_price_inquiry_uses_catalog() {
        let response = behavior().process(&request("报价多少钱")).await.unwrap();
        assert!(response.content.contains("2999"));
        assert_eq!(response.metadata.get("inquiry_kind").unwrap(), "price");
        assert!(response
            .next_actions
            .iter()
            .any(|a| a.action_type == "send_quotation"));
        assert!(!response.collaboration_needed);
    }

    #[tokio::test]
    async fn test_general_inquiry_goes_through_model() {
        let model = Arc::new(MockModelClient::new().with_reply("Happy to help with that."));
        let behavior = SalesBehavior::new(model.clone());
        let response = behavior.process(&request("tell me about yourselves")).await.unwrap();
        assert_eq!(response.content, "Happy to help with that.");
        assert_eq!(model.completions_served(), 1);
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_canned_reply() {
        let model = Arc::new(MockModelClient::new());
        model.fail_next_completion(crate::Error::model_backend(
            crate::error::ModelBackendKind::Connection,
            "backend down",
        ));
        let behavior = SalesBehavior::new(model);
        let response = behavior.process(&request("tell me about yourselves")).await.unwrap();
        assert!(response.content.contains("requirements"));
    }

    #[tokio::test]
    async fn test_integration_request_flags_collaboration() {
        let response = behavior()
            .process(&request("price for a deployment with deep integration work"))
            .await
            .unwrap();
        assert!(response.collaboration_needed);
    }

    #[test]
    fn test_sales_stage_identification() {
        assert_eq!(identify_stage("ready to sign the contract"), "closing");
        assert_eq!(identify_stage("send me a proposal to compare"), "proposal");
        assert_eq!(identify_stage("our use case is large scale"), "needs_analysis");
        assert_eq!(identify_stage("hi there"), "initial_contact");
    }
}
