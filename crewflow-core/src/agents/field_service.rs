//! Field service engineer behavior
//!
//! Handles on-site technical work: repairs, installations, preventive
//! maintenance, emergency callouts, upgrades, and operator training.
//! Repair requests are enriched with equipment-specific fault lists and
//! tooling so the dispatched engineer arrives prepared.

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

const SERVICE_KEYWORDS: &[&str] = &[
    "现场", "上门", "维修", "安装", "调试", "检修", "巡检", "保养", "故障", "报修",
    "抢修", "应急", "紧急", "设备", "机器", "工程师", "修复", "更换",
    "field", "onsite", "on-site", "repair", "install", "maintenance", "equipment",
    "engineer", "fix", "replace", "technician",
];

const BASE_SERVICE_WORDS: &[&str] = &[
    "现场", "维修", "安装", "设备", "故障", "工程师", "上门",
    "field", "repair", "install", "equipment", "engineer", "onsite", "technician",
];

const OTHER_DOMAIN_WORDS: &[&str] = &[
    "价格", "购买", "战略", "管理", "决策",
    "price", "buy", "strategy", "management", "decision",
];

fn service_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(field|onsite|on-site).*(service|repair|install)|(现场|上门).*(服务|维修|安装)",
            r"(equipment|machine|device).*(failure|repair|maintenance|broken)|(设备|机器).*(故障|维修|保养)",
            r"(need|request|send).*(technician|engineer)|(需要|请求).*(技术|工程师)",
            r"(urgent|emergency).*(repair|fix|callout)|(紧急|应急).*(抢修|维修|处理)",
            r"(install|deploy|configure).*(equipment|device|system)|(安装|调试|配置).*(设备|系统)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static pattern"))
        .collect()
    })
}

/// Kind of field service work requested, checked in order of urgency
/// and specificity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServiceKind {
    Emergency,
    Repair,
    Installation,
    Maintenance,
    Upgrade,
    Training,
    General,
}

impl ServiceKind {
    fn classify(content: &str) -> Self {
        if contains_any(content, &["紧急", "应急", "抢修", "停机", "中断", "emergency", "urgent", "outage", "down"])
        {
            ServiceKind::Emergency
        } else if contains_any(content, &["维修", "修理", "故障", "损坏", "报修", "repair", "broken", "fault", "malfunction"])
        {
            ServiceKind::Repair
        } else if contains_any(content, &["安装", "部署", "调试", "上线", "install", "deploy", "commission"])
        {
            ServiceKind::Installation
        } else if contains_any(content, &["保养", "维护", "巡检", "检查", "maintenance", "inspection", "servicing"])
        {
            ServiceKind::Maintenance
        } else if contains_any(content, &["升级", "改造", "扩容", "迁移", "upgrade", "retrofit", "migration"])
        {
            ServiceKind::Upgrade
        } else if contains_any(content, &["培训", "指导", "教学", "演示", "training", "walkthrough", "demonstration"])
        {
            ServiceKind::Training
        } else {
            ServiceKind::General
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Emergency => "emergency",
            ServiceKind::Repair => "repair",
            ServiceKind::Installation => "installation",
            ServiceKind::Maintenance => "maintenance",
            ServiceKind::Upgrade => "upgrade",
            ServiceKind::Training => "training",
            ServiceKind::General => "general",
        }
    }
}

struct EquipmentProfile {
    name: &'static str,
    match_words: &'static [&'static str],
    common_issues: &'static [&'static str],
    tools: &'static [&'static str],
}

const EQUIPMENT_PROFILES: &[EquipmentProfile] = &[
    EquipmentProfile {
        name: "server",
        match_words: &["服务器", "主机", "server", "host machine"],
        common_issues: &[
            "fails to boot",
            "degraded performance",
            "disk failure",
            "memory errors",
            "network interface down",
        ],
        tools: &["diagnostic suite", "spare disks and memory", "network tester"],
    },
    EquipmentProfile {
        name: "network",
        match_words: &["交换机", "路由器", "网络设备", "switch", "router", "network device"],
        common_issues: &[
            "link drops",
            "throughput degradation",
            "misconfiguration",
            "port failure",
            "weak signal",
        ],
        tools: &["network tester", "optical power meter", "configuration console"],
    },
    EquipmentProfile {
        name: "printer",
        match_words: &["打印机", "printer"],
        common_issues: &[
            "paper jams",
            "poor print quality",
            "connection failures",
            "depleted consumables",
            "driver problems",
        ],
        tools: &["cleaning kit", "spare consumables", "driver package"],
    },
    EquipmentProfile {
        name: "camera",
        match_words: &["监控", "摄像头", "camera", "surveillance"],
        common_issues: &[
            "blurry image",
            "no signal",
            "storage full",
            "dirty lens",
            "network disconnects",
        ],
        tools: &["cleaning kit", "signal tester", "spare storage"],
    },
];

fn identify_equipment(content: &str) -> Option<&'static EquipmentProfile> {
    EQUIPMENT_PROFILES
        .iter()
        .find(|profile| contains_any(content, profile.match_words))
}

const FIELD_PERSONA_PROMPT: &str = "You are a field service engineer for an enterprise \
technology vendor. Answer the customer's service question, state what information you \
need to dispatch an engineer, and keep the tone practical.\n\nCustomer message: {input}";

const GENERAL_FALLBACK: &str = "Thanks for contacting field service. We cover fault \
diagnosis and repair, installation and commissioning, preventive maintenance, emergency \
callouts, upgrades, and operator training. Describe what you need and I will arrange \
the right engineer and time slot.";

/// Behavior for the field service role.
pub struct FieldServiceBehavior {
    model: Arc<dyn ModelClient>,
}

impl FieldServiceBehavior {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }

    fn emergency_reply(&self) -> String {
        String::from(
            "Emergency callout acknowledged. Response targets: 30 minutes within the \
             city, 60 minutes for outlying areas, remote support immediately.\n\n\
             While the engineer is en route we will assess the impact, apply interim \
             measures to limit damage, restore critical functions first, and then plan \
             the permanent fix.\n\n\
             Please send the exact symptoms and error messages, the equipment model \
             and location, a contact name and number, and any site safety requirements. \
             Keep your phone reachable.",
        )
    }

    fn repair_reply(&self, equipment: Option<&EquipmentProfile>) -> String {
        let mut reply = String::from("I will help you get this repaired.\n\n");
        if let Some(profile) = equipment {
            reply.push_str(&format!(
                "Common {} faults include: {}.\n",
                profile.name,
                profile.common_issues.join(", ")
            ));
            reply.push_str(&format!(
                "The engineer will bring: {}.\n\n",
                profile.tools.join(", ")
            ));
        }
        reply.push_str(
            "Diagnosis will cover the reported symptoms and when they started, a \
             physical and connection check, the error logs and status indicators, and \
             a tool-assisted fault isolation.\n\n\
             Please power the equipment down before any physical intervention. Send \
             the specific symptoms and your contact details and I will schedule the \
             engineer.",
        );
        reply
    }

    fn installation_reply(&self) -> String {
        String::from(
            "Installation service runs as follows. Before the visit we confirm the \
             site environment (power, network, space), verify the equipment and \
             accessory list, and agree a schedule. On site the engineer installs to \
             specification, runs functional tests and commissioning, and finishes \
             with operator training and handover documents. Afterwards we set up a \
             maintenance plan.\n\n\
             Please send the equipment model, the installation address, and your \
             preferred time window.",
        )
    }

    fn maintenance_reply(&self) -> String {
        String::from(
            "Preventive maintenance covers an exterior and connection check, interior \
             and exterior cleaning, functional testing, parameter tuning, and \
             replacement of consumables and ageing parts.\n\n\
             Suggested cadence: weekly quick checks, monthly routine service, \
             quarterly deep service, and an annual overhaul. Every visit is logged in \
             the equipment's service record so you get a health report over time.\n\n\
             Tell me the equipment types and quantities and I will draw up a plan.",
        )
    }

    fn upgrade_reply(&self) -> String {
        String::from(
            "For an upgrade we start with an assessment: current state and \
             performance, your target outcome, a proposed design with an \
             implementation plan, and a risk review. Upgrades can cover hardware, \
             software, added functionality, or performance tuning. Data backup, \
             compatibility testing, and a rollback plan are part of every upgrade.\n\n\
             Send the equipment details and what you want to achieve and I will \
             prepare a proposal.",
        )
    }

    fn training_reply(&self) -> String {
        String::from(
            "We offer operator training covering basic operation, routine \
             maintenance, safety practice, fault triage, and usage best practices. \
             Delivery can be on-site hands-on training, remote video guidance, \
             written manuals, or recorded walkthroughs.\n\n\
             Tell me the equipment involved and the number of trainees and I will \
             arrange a trainer.",
        )
    }

    async fn model_reply(&self, content: &str) -> String {
        let prompt = FIELD_PERSONA_PROMPT.replace("{input}", content);
        match self
            .model
            .chat_completion(ChatRequest::user_prompt(prompt, 500, 0.5))
            .await
        {
            Ok(reply) => reply.content,
            Err(error) => {
                warn!(%error, "field service model reply failed, using canned fallback");
                GENERAL_FALLBACK.to_string()
            }
        }
    }

    fn next_actions(&self, kind: ServiceKind) -> Vec<Action> {
        let mut actions = match kind {
            ServiceKind::Emergency => vec![
                Action::new("dispatch_engineer")
                    .with_parameter("priority", "urgent")
                    .with_parameter("eta", "30_minutes")
                    .with_description("Dispatch an engineer immediately"),
                Action::new("prepare_tools")
                    .with_parameter("type", "emergency_kit")
                    .with_description("Prepare the emergency kit"),
            ],
            ServiceKind::Installation => vec![
                Action::new("site_survey")
                    .with_parameter("type", "installation_assessment")
                    .with_description("Survey the installation site"),
                Action::new("schedule_installation")
                    .with_parameter("lead_time", "3_days")
                    .with_description("Schedule the installation"),
            ],
            ServiceKind::Repair => vec![
                Action::new("diagnostic_check")
                    .with_parameter("method", "remote_first")
                    .with_description("Run a remote diagnostic first"),
                Action::new("prepare_parts")
                    .with_parameter("based_on", "diagnosis")
                    .with_description("Stage replacement parts"),
            ],
            _ => Vec::new(),
        };
        actions.push(
            Action::new("service_follow_up")
                .with_parameter("schedule", "24_hours")
                .with_description("Follow up within 24 hours"),
        );
        actions
    }

    fn needs_collaboration(&self, content: &str, kind: ServiceKind) -> bool {
        // Procurement questions pull in sales.
        if contains_any(content, &["采购", "购买", "报价", "合同", "procurement", "purchase", "quote"]) {
            return true;
        }
        // Complaints and liability pull in customer support.
        if contains_any(content, &["投诉", "赔偿", "责任", "complaint", "compensation", "liability"]) {
            return true;
        }
        // Budget or sign-off questions pull in management.
        if contains_any(content, &["重大", "批准", "决策", "预算", "approval", "budget", "sign-off"]) {
            return true;
        }
        kind == ServiceKind::Emergency
    }
}

#[async_trait]
impl AgentBehavior for FieldServiceBehavior {
    async fn can_handle(&self, request: &UserRequest) -> f64 {
        let content = request.content.to_lowercase();

        let keywords = keyword_score(&content, SERVICE_KEYWORDS);
        let patterns = pattern_score(&content, service_patterns());
        let base = if contains_any(&content, BASE_SERVICE_WORDS) {
            0.4
        } else {
            0.0
        };

        let mut total = (keywords + patterns + base).min(1.0);
        if contains_any(&content, OTHER_DOMAIN_WORDS) {
            total *= 0.6;
        }
        total
    }

    fn capabilities(&self) -> Vec<String> {
        [
            "fault_diagnosis",
            "equipment_repair",
            "equipment_installation",
            "system_commissioning",
            "preventive_maintenance",
            "emergency_callout",
            "technical_training",
            "onsite_support",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn estimate_processing_time(&self, request: &UserRequest) -> u64 {
        let content = request.content.to_lowercase();
        // Emergencies are answered fastest despite being the most work.
        if contains_any(&content, &["紧急", "应急", "立即", "emergency", "urgent"]) {
            12
        } else if contains_any(&content, &["故障", "问题", "异常", "fault", "problem", "broken"]) {
            20
        } else if contains_any(&content, &["现场", "上门", "安排", "onsite", "on-site", "schedule"]) {
            25
        } else if contains_any(&content, &["咨询", "了解", "询问", "inquiry", "question"]) {
            8
        } else {
            15
        }
    }

    async fn process(&self, request: &UserRequest) -> Result<AgentResponse> {
        let content = request.content.to_lowercase();
        let kind = ServiceKind::classify(&content);
        let equipment = identify_equipment(&content);
        debug!(
            kind = kind.as_str(),
            equipment = equipment.map(|p| p.name).unwrap_or("generic"),
            "handling field service request"
        );

        let reply = match kind {
            ServiceKind::Emergency => self.emergency_reply(),
            ServiceKind::Repair => self.repair_reply(equipment),
            ServiceKind::Installation => self.installation_reply(),
            ServiceKind::Maintenance => self.maintenance_reply(),
            ServiceKind::Upgrade => self.upgrade_reply(),
            ServiceKind::Training => self.training_reply(),
            ServiceKind::General => self.model_reply(&request.content).await,
        };

        let needs_collaboration = self.needs_collaboration(&content, kind);
        Ok(
            AgentResponse::new("field_service", AgentType::FieldService, reply, 0.9)
                .with_actions(self.next_actions(kind))
                .with_collaboration_needed(needs_collaboration)
                .with_metadata("service_kind", kind.as_str())
                .with_metadata(
                    "equipment_type",
                    equipment.map(|p| p.name).unwrap_or("generic"),
                ),
        )
    }

    fn validate_config(&self, config: &AgentConfig) -> Result<()> {
        if config.agent_type != AgentType::FieldService {
            return Err(Error::validation(
                "field service behavior requires a field service agent type",
            ));
        }
        Ok(())
    }
}
