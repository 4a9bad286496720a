//! Manager behavior
//!
//! Advises on decisions across the classic management areas and tags
//! each answer with the decision type it implies. Strategic and
//! investment decisions get an executive-approval step appended to the
//! recommended actions.

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

const MANAGEMENT_KEYWORDS: &[&str] = &[
    "决策", "战略", "规划", "管理", "领导", "策略", "目标", "预算", "资源", "团队",
    "组织", "流程", "制度", "绩效", "考核", "评估", "指标", "kpi",
    "decision", "strategy", "planning", "management", "leadership", "budget",
    "resource", "team", "organization", "policy", "performance",
];

const BASE_MANAGEMENT_WORDS: &[&str] = &[
    "管理", "决策", "战略", "规划", "领导", "团队", "绩效", "预算",
    "management", "decision", "strategy", "planning", "leadership", "team", "budget",
];

const TECHNICAL_DOMAIN_WORDS: &[&str] = &[
    "技术问题", "bug", "故障", "登录", "密码", "客服",
    "technical problem", "login", "password", "customer support",
];

fn management_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(strategy|planning|management|decision)|(决策|战略|规划|管理)",
            r"(how to|how can).*(manage|lead|decide)|(如何|怎么|怎样).*(管理|领导|决策)",
            r"(develop|establish|design).*(strategy|policy|process)|(制定|建立|设计).*(策略|制度|流程)",
            r"(analyze|evaluate|assess).*(performance|team|business)|(分析|评估|考核).*(绩效|团队|业务)",
            r"(budget|resource|cost).*(allocation|control|optimization)|(预算|资源|成本).*(分配|控制|优化)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static pattern"))
        .collect()
    })
}

/// Management area a request falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManagementArea {
    Strategy,
    Resources,
    Team,
    Process,
    Performance,
    Risk,
    General,
}

impl ManagementArea {
    fn classify(content: &str) -> Self {
        if contains_any(content, &["战略", "规划", "愿景", "使命", "strategy", "vision", "roadmap"]) {
            ManagementArea::Strategy
        } else if contains_any(content, &["预算", "资源", "成本", "投资", "budget", "resource", "investment", "cost"])
        {
            ManagementArea::Resources
        } else if contains_any(content, &["团队", "人员", "激励", "招聘", "team", "staffing", "hiring", "motivation"])
        {
            ManagementArea::Team
        } else if contains_any(content, &["流程", "制度", "政策", "规范", "process", "policy", "procedure"])
        {
            ManagementArea::Process
        } else if contains_any(content, &["绩效", "考核", "指标", "kpi", "performance", "review", "metric"])
        {
            ManagementArea::Performance
        } else if contains_any(content, &["风险", "合规", "审计", "监督", "risk", "compliance", "audit"])
        {
            ManagementArea::Risk
        } else {
            ManagementArea::General
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ManagementArea::Strategy => "strategy",
            ManagementArea::Resources => "resources",
            ManagementArea::Team => "team",
            ManagementArea::Process => "process",
            ManagementArea::Performance => "performance",
            ManagementArea::Risk => "risk",
            ManagementArea::General => "general",
        }
    }
}

/// Type of decision implied by the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecisionType {
    Strategic,
    Investment,
    Personnel,
    Operational,
}

impl DecisionType {
    fn classify(content: &str) -> Self {
        if contains_any(content, &["长期", "战略", "重大", "全局", "strategic", "long-term", "major"]) {
            DecisionType::Strategic
        } else if contains_any(content, &["投资", "预算", "采购", "资金", "investment", "budget", "procurement", "funding"])
        {
            DecisionType::Investment
        } else if contains_any(content, &["招聘", "晋升", "调动", "薪酬", "hiring", "promotion", "compensation"])
        {
            DecisionType::Personnel
        } else {
            DecisionType::Operational
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            DecisionType::Strategic => "strategic",
            DecisionType::Investment => "investment",
            DecisionType::Personnel => "personnel",
            DecisionType::Operational => "operational",
        }
    }

    fn needs_executive_approval(&self) -> bool {
        matches!(self, DecisionType::Strategic | DecisionType::Investment)
    }
}

const MANAGER_PERSONA_PROMPT: &str = "You are a seasoned general manager. Give a \
structured, pragmatic recommendation on the management question below, listing the \
key considerations and a suggested course of action.\n\nQuestion: {input}";

const GENERAL_FALLBACK: &str = "Effective handling starts with clarifying the goal, \
understanding stakeholder needs, balancing short-term results against long-term \
development, and keeping a feedback loop in place. Share more background and the \
specific decision you face and I will give a concrete recommendation.";

/// Behavior for the manager role.
pub struct ManagerBehavior {
    model: Arc<dyn ModelClient>,
}

impl ManagerBehavior {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }

    fn strategy_reply(&self) -> String {
        String::from(
            "For strategic planning I recommend a systematic approach: analyze the \
             external market and internal capabilities, run a SWOT analysis, set \
             measurable strategic goals, design the strategies to reach them, and \
             turn those into an implementation roadmap.\n\n\
             Keep market trends, core competencies, resource allocation, and risk \
             mitigation in view, and review the strategy on a regular cadence so it \
             tracks market change.",
        )
    }

    fn resources_reply(&self) -> String {
        String::from(
            "Resource management comes down to optimal allocation: assess each \
             team's real needs, rank them by strategic importance, maximize \
             utilization, and adjust dynamically as execution data comes in.\n\n\
             On the budget side, establish a clear budgeting process, monitor \
             execution against it, and review variances monthly so corrections \
             happen early rather than at year end.",
        )
    }

    fn team_reply(&self) -> String {
        String::from(
            "For team management, start from a capability assessment so you know \
             the current skill matrix, then build individual development plans \
             against it. Pair clear goal-setting (OKRs work well here) with regular \
             one-on-ones, and make recognition specific and timely. Hiring and \
             promotion decisions should trace back to the same capability matrix.",
        )
    }

    fn process_reply(&self) -> String {
        String::from(
            "Process work is best run as a PDCA loop: document the current process, \
             identify the bottlenecks and failure points, design the improvement, \
             pilot it with one team, measure, and only then roll it out. Keep \
             policies short and auditable, and assign each process a clear owner.",
        )
    }

    fn performance_reply(&self) -> String {
        String::from(
            "For performance management, define a small set of KPIs tied to \
             strategic goals, review them quarterly, and complement the numbers \
             with qualitative assessment. A balanced scorecard keeps financial, \
             customer, process, and growth perspectives in proportion. Coaching \
             conversations matter more than the scoring itself.",
        )
    }

    fn risk_reply(&self) -> String {
        String::from(
            "Risk management needs a standing mechanism, not a one-off review: \
             maintain a risk register with likelihood and impact, assign an owner \
             and mitigation plan per entry, audit compliance on a schedule, and \
             rehearse the response to the top risks. Escalation paths should be \
             written down before they are needed.",
        )
    }

    async fn model_reply(&self, content: &str) -> String {
        let prompt = MANAGER_PERSONA_PROMPT.replace("{input}", content);
        match self
            .model
            .chat_completion(ChatRequest::user_prompt(prompt, 600, 0.6))
            .await
        {
            Ok(reply) => reply.content,
            Err(error) => {
                warn!(%error, "manager model reply failed, using canned fallback");
                GENERAL_FALLBACK.to_string()
            }
        }
    }

    fn next_actions(&self, area: ManagementArea, decision: DecisionType) -> Vec<Action> {
        let mut actions = match area {
            ManagementArea::Strategy => vec![
                Action::new("conduct_swot_analysis")
                    .with_parameter("scope", "organizational")
                    .with_description("Run a SWOT analysis"),
                Action::new("stakeholder_consultation")
                    .with_parameter("method", "workshop")
                    .with_description("Hold a stakeholder workshop"),
            ],
            ManagementArea::Team => vec![
                Action::new("team_assessment")
                    .with_parameter("type", "capability_matrix")
                    .with_description("Assess team capabilities"),
                Action::new("development_plan")
                    .with_parameter("focus", "skill_enhancement")
                    .with_description("Draft a development plan"),
            ],
            ManagementArea::Performance => vec![
                Action::new("kpi_review")
                    .with_parameter("frequency", "quarterly")
                    .with_description("Schedule a KPI review"),
                Action::new("performance_coaching")
                    .with_parameter("method", "one_on_one")
                    .with_description("Set up coaching sessions"),
            ],
            _ => Vec::new(),
        };
        if decision.needs_executive_approval() {
            actions.push(
                Action::new("executive_approval")
                    .with_parameter("level", "senior_management")
                    .with_description("Obtain executive approval"),
            );
        }
        actions.push(
            Action::new("follow_up_review")
                .with_parameter("schedule", "1_week")
                .with_description("Review progress in one week"),
        );
        actions
    }

    fn needs_collaboration(&self, content: &str, area: ManagementArea) -> bool {
        // Go-to-market questions pull in sales.
        if contains_any(content, &["销售策略", "市场推广", "客户关系", "sales strategy", "go-to-market", "customer relationship"])
        {
            return true;
        }
        // Technology choices pull in the engineering side.
        if contains_any(content, &["技术选型", "系统架构", "it规划", "technology selection", "system architecture", "it planning"])
        {
            return true;
        }
        // Service-quality questions pull in customer support.
        if contains_any(content, &["客户满意度", "服务质量", "客户体验", "customer satisfaction", "service quality", "customer experience"])
        {
            return true;
        }
        area == ManagementArea::Strategy
            && contains_any(content, &["重大", "全面", "整体", "major", "company-wide", "overall"])
    }
}

#[async_trait]
impl AgentBehavior for ManagerBehavior {
    async fn can_handle(&self, request: &UserRequest) -> f64 {
        let content = request.content.to_lowercase();

        let keywords = keyword_score(&content, MANAGEMENT_KEYWORDS);
        let patterns = pattern_score(&content, management_patterns());
        let base = if contains_any(&content, BASE_MANAGEMENT_WORDS) {
            0.4
        } else {
            0.0
        };

        let mut total = (keywords + patterns + base).min(1.0);
        if contains_any(&content, TECHNICAL_DOMAIN_WORDS) {
            total *= 0.5;
        }
        total
    }

    fn capabilities(&self) -> Vec<String> {
        [
            "strategic_planning",
            "decision_analysis",
            "resource_allocation",
            "team_management",
            "performance_evaluation",
            "process_optimization",
            "risk_control",
            "policy_making",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn estimate_processing_time(&self, request: &UserRequest) -> u64 {
        let content = request.content.to_lowercase();
        if contains_any(&content, &["分析", "评估", "决策", "analyze", "evaluate", "decide"]) {
            35
        } else if contains_any(&content, &["战略", "规划", "方向", "strategy", "planning", "roadmap"]) {
            25
        } else if contains_any(&content, &["如何", "怎么", "建议", "how to", "advice", "recommend"]) {
            12
        } else {
            18
        }
    }

    async fn process(&self, request: &UserRequest) -> Result<AgentResponse> {
        let content = request.content.to_lowercase();
        let area = ManagementArea::classify(&content);
        let decision = DecisionType::classify(&content);
        debug!(
            area = area.as_str(),
            decision = decision.as_str(),
            "handling management request"
        );

        let reply = match area {
            ManagementArea::Strategy => self.strategy_reply(),
            ManagementArea::Resources => self.resources_reply(),
            ManagementArea::Team => self.team_reply(),
            ManagementArea::Process => self.process_reply(),
            ManagementArea::Performance => self.performance_reply(),
            ManagementArea::Risk => self.risk_reply(),
            ManagementArea::General => self.model_reply(&request.content).await,
        };

        let needs_collaboration = self.needs_collaboration(&content, area);
        Ok(
            AgentResponse::new("manager", AgentType::Manager, reply, 0.9)
                .with_actions(self.next_actions(area, decision))
                .with_collaboration_needed(needs_collaboration)
                .with_metadata("management_area", area.as_str())
                .with_metadata("decision_type", decision.as_str()),
        )
    }

    fn validate_config(&self, config: &AgentConfig) -> Result<()> {
        if config.agent_type != AgentType::Manager {
            return Err(Error::validation(
                "manager behavior requires a manager agent type",
            ));
        }
        Ok(())
    }
}
