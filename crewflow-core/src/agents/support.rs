//! Customer support behavior
//!
//! Sorts requests into issue categories, grades severity, and answers
//! from a small library of troubleshooting playbooks. High-severity
//! issues and complaints are flagged for escalation. Support never
//! fully declines a request, so its can-handle score has a floor.

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

const SUPPORT_KEYWORDS: &[&str] = &[
    "问题", "故障", "错误", "bug", "异常", "不能", "无法", "失败", "帮助", "支持",
    "解决", "修复", "投诉", "建议", "登录", "注册", "密码", "账号", "权限", "连接",
    "problem", "issue", "error", "failure", "help", "support", "solve", "fix",
    "login", "register", "password", "account", "access",
];

const BASE_SUPPORT_WORDS: &[&str] = &[
    "问题", "帮助", "支持", "故障", "错误", "不能", "如何", "投诉",
    "problem", "help", "support", "issue", "error", "cannot", "how", "complaint",
];

const SALES_DOMAIN_WORDS: &[&str] = &[
    "价格", "购买", "报价", "优惠",
    "price", "buy", "purchase", "quote", "discount",
];

fn support_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(problem|issue|error|bug)|(问题|故障|错误|异常)",
            r"(help|support|solve|fix)|(帮助|支持|解决|修复)",
            r"(cannot|can't|unable|fail)|(不能|无法|失败)",
            r"(how to|how can).*(use|operate|set)|(如何|怎么|怎样).*(操作|使用|设置)",
            r"(login|register|password).*(problem|issue|fail)|(登录|注册|密码).*(问题|失败)",
            r"(complaint|suggestion|feedback)|(投诉|建议|反馈)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static pattern"))
        .collect()
    })
}

/// Issue category, checked in priority order so the more specific
/// categories win over the generic technical bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IssueCategory {
    Account,
    Network,
    Complaint,
    Usage,
    Technical,
    General,
}

impl IssueCategory {
    fn classify(content: &str) -> Self {
        if contains_any(content, &["登录", "注册", "密码", "账号", "权限", "login", "password", "account"])
        {
            IssueCategory::Account
        } else if contains_any(content, &["网络", "连接", "超时", "断开", "network", "connection", "timeout"])
        {
            IssueCategory::Network
        } else if contains_any(content, &["投诉", "建议", "反馈", "不满", "complaint", "suggestion", "feedback"])
        {
            IssueCategory::Complaint
        } else if contains_any(content, &["如何", "怎么", "怎样", "操作", "设置", "how to", "how do", "how can"])
        {
            IssueCategory::Usage
        } else if contains_any(content, &["bug", "错误", "故障", "异常", "不能", "无法", "失败", "error", "crash", "broken"])
        {
            IssueCategory::Technical
        } else {
            IssueCategory::General
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            IssueCategory::Account => "account",
            IssueCategory::Network => "network",
            IssueCategory::Complaint => "complaint",
            IssueCategory::Usage => "usage",
            IssueCategory::Technical => "technical",
            IssueCategory::General => "general",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Severity {
    Low,
    Medium,
    High,
    Urgent,
}

impl Severity {
    fn assess(content: &str) -> Self {
        if contains_any(content, &["无法使用", "系统崩溃", "数据丢失", "安全问题", "data loss", "crash", "security"])
        {
            Severity::Urgent
        } else if contains_any(content, &["影响业务", "多人反馈", "blocking", "production down", "business impact"])
        {
            Severity::High
        } else if contains_any(content, &["建议", "咨询", "优化", "suggestion", "minor"]) {
            Severity::Low
        } else {
            Severity::Medium
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Urgent => "urgent",
        }
    }
}

const LOGIN_STEPS: &[&str] = &[
    "Check that the username and password are correct",
    "Confirm the account has been activated",
    "Clear the browser cache and cookies",
    "Try resetting the password",
    "Verify the network connection is stable",
];

const NETWORK_STEPS: &[&str] = &[
    "Check that the network connection is stable",
    "Refresh the page or reconnect",
    "Review firewall settings",
    "Test from a different network",
    "Contact the network administrator if the issue persists",
];

const FUNCTION_STEPS: &[&str] = &[
    "Confirm the operation steps are correct",
    "Check browser compatibility",
    "Clear the cache and retry",
    "Try a different browser",
    "Record the error message and the steps that triggered it",
];

const SUPPORT_PERSONA_PROMPT: &str = "You are a customer support specialist for an \
enterprise AI service platform. Answer the customer's question clearly, ask for any \
missing details, and suggest concrete next steps.\n\nCustomer message: {input}";

const GENERAL_FALLBACK: &str = "Thanks for reaching out. To help you quickly, please \
share a description of the problem, what you were trying to do, anything you have \
already tried, and how urgent this is for you.";

fn steps_reply(intro: &str, steps: &[&str], escalation: &str) -> String {
    let mut reply = format!("{intro}\n\n");
    for (i, step) in steps.iter().enumerate() {
        reply.push_str(&format!("{}. {}\n", i + 1, step));
    }
    reply.push('\n');
    reply.push_str(escalation);
    reply
}

/// Behavior for the customer support role.
pub struct SupportBehavior {
    model: Arc<dyn ModelClient>,
}

impl SupportBehavior {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }

    fn account_reply(&self) -> String {
        steps_reply(
            "Let's get your account access sorted out. Please work through these steps:",
            LOGIN_STEPS,
            "If none of these resolve it, I will verify your identity and reset the \
             credentials from our side.",
        )
    }

    fn network_reply(&self) -> String {
        steps_reply(
            "Let's troubleshoot the connection issue:",
            NETWORK_STEPS,
            "If the problem remains, please tell me the network type you are on, the \
             exact error shown, and whether other devices are affected.",
        )
    }

    fn technical_reply(&self) -> String {
        steps_reply(
            "I can see you hit a technical problem. While I investigate, please try:",
            FUNCTION_STEPS,
            "Please also send the exact error message, the steps to reproduce it, and \
             how often it happens so I can escalate with full details.",
        )
    }

    fn complaint_reply(&self, content: &str) -> String {
        if contains_any(content, &["投诉", "不满", "complaint", "unacceptable"]) {
            String::from(
                "I am sorry about the experience you have had, and I will treat this \
                 complaint seriously. Please share what happened, when it occurred, \
                 any evidence you have, and the outcome you would like. I will pass \
                 it to the responsible team and come back to you with a resolution \
                 within 24 hours.",
            )
        } else {
            String::from(
                "Thank you for the suggestion. User feedback directly shapes our \
                 roadmap. I will record the details, forward them to the product \
                 team for evaluation, and follow up with you on the outcome.",
            )
        }
    }

    fn usage_reply(&self, content: &str) -> String {
        if contains_any(content, &["设置", "配置", "setting", "config"]) {
            String::from(
                "For configuration questions: open the Settings menu, pick the \
                 relevant section, adjust the options you need, then save and verify \
                 the result. Tell me which setting you are after and I can walk you \
                 through it in detail.",
            )
        } else {
            String::from(
                "Happy to walk you through it. The user guide covers the basics, and \
                 I can arrange a walkthrough session if you prefer. Tell me which \
                 feature you want to use and I will give you step-by-step guidance.",
            )
        }
    }

    async fn model_reply(&self, content: &str) -> String {
        let prompt = SUPPORT_PERSONA_PROMPT.replace("{input}", content);
        match self
            .model
            .chat_completion(ChatRequest::user_prompt(prompt, 500, 0.5))
            .await
        {
            Ok(reply) => reply.content,
            Err(error) => {
                warn!(%error, "support model reply failed, using canned fallback");
                GENERAL_FALLBACK.to_string()
            }
        }
    }

    fn next_actions(&self, category: IssueCategory, severity: Severity) -> Vec<Action> {
        let mut actions = match category {
            IssueCategory::Technical => vec![
                Action::new("collect_logs")
                    .with_parameter("type", "error_logs")
                    .with_description("Collect error logs"),
                Action::new("remote_assistance")
                    .with_parameter("method", "screen_share")
                    .with_description("Offer remote assistance"),
            ],
            IssueCategory::Account => vec![
                Action::new("verify_identity")
                    .with_parameter("method", "email_verification")
                    .with_description("Verify user identity"),
                Action::new("reset_credentials")
                    .with_parameter("type", "password_reset")
                    .with_description("Reset login credentials"),
            ],
            IssueCategory::Complaint => vec![
                Action::new("escalate_complaint")
                    .with_parameter("department", "quality_assurance")
                    .with_description("Escalate the complaint"),
                Action::new("schedule_callback")
                    .with_parameter("timeframe", "24_hours")
                    .with_description("Schedule a callback"),
            ],
            _ => Vec::new(),
        };
        if severity >= Severity::High {
            actions.push(
                Action::new("priority_escalation")
                    .with_parameter("priority", "high")
                    .with_description("Escalate handling priority"),
            );
        }
        actions.push(
            Action::new("follow_up")
                .with_parameter("schedule", "2_hours")
                .with_description("Follow up within 2 hours"),
        );
        actions
    }

    fn needs_escalation(&self, content: &str, severity: Severity) -> bool {
        if severity >= Severity::High {
            return true;
        }
        if contains_any(content, &["数据丢失", "安全", "系统崩溃", "data loss", "security", "crash"]) {
            return true;
        }
        if contains_any(content, &["投诉", "退款", "法律", "complaint", "refund", "legal"]) {
            return true;
        }
        // Cross-team requests go through collaboration as well.
        contains_any(content, &["销售", "财务", "法务", "sales team", "billing", "finance"])
    }
}

#[async_trait]
impl AgentBehavior for SupportBehavior {
    async fn can_handle(&self, request: &UserRequest) -> f64 {
        let content = request.content.to_lowercase();

        let keywords = keyword_score(&content, SUPPORT_KEYWORDS);
        let question = if content.contains('?') || content.contains('？') {
            0.15
        } else {
            0.0
        };
        let patterns = pattern_score(&content, support_patterns());
        let base = if contains_any(&content, BASE_SUPPORT_WORDS) {
            0.4
        } else {
            0.0
        };

        let mut total = (keywords + question + patterns + base).min(1.0);
        if contains_any(&content, SALES_DOMAIN_WORDS) {
            total *= 0.6;
        }
        // Support is the catch-all role and never declines outright.
        total.max(0.2)
    }

    fn capabilities(&self) -> Vec<String> {
        [
            "problem_diagnosis",
            "troubleshooting",
            "technical_support",
            "account_assistance",
            "usage_guidance",
            "complaint_handling",
            "feedback_collection",
            "issue_escalation",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn estimate_processing_time(&self, request: &UserRequest) -> u64 {
        let content = request.content.to_lowercase();
        if contains_any(&content, &["如何", "怎么", "操作", "使用", "how to", "how do"]) {
            8
        } else if contains_any(&content, &["故障", "错误", "bug", "异常", "error", "crash"]) {
            20
        } else if contains_any(&content, &["投诉", "不满", "complaint"]) {
            30
        } else {
            15
        }
    }

    async fn process(&self, request: &UserRequest) -> Result<AgentResponse> {
        let content = request.content.to_lowercase();
        let category = IssueCategory::classify(&content);
        let severity = Severity::assess(&content);
        debug!(
            category = category.as_str(),
            severity = severity.as_str(),
            "handling support request"
        );

        let reply = match category {
            IssueCategory::Account => self.account_reply(),
            IssueCategory::Network => self.network_reply(),
            IssueCategory::Technical => self.technical_reply(),
            IssueCategory::Complaint => self.complaint_reply(&content),
            IssueCategory::Usage => self.usage_reply(&content),
            IssueCategory::General => self.model_reply(&request.content).await,
        };

        let needs_escalation = self.needs_escalation(&content, severity);
        Ok(
            AgentResponse::new("support", AgentType::CustomerSupport, reply, 0.9)
                .with_actions(self.next_actions(category, severity))
                .with_collaboration_needed(needs_escalation)
                .with_metadata("issue_category", category.as_str())
                .with_metadata("severity", severity.as_str()),
        )
    }

    fn validate_config(&self, config: &AgentConfig) -> Result<()> {
        if config.agent_type != AgentType::CustomerSupport {
            return Err(Error::validation(
                "support behavior requires a customer support agent type",
            ));
        }
        Ok(())
    }
}
