//! Collaboration coordination
//!
//! The coordinator is itself an agent behavior. It decomposes a complex
//! request, decides which specializations must participate, schedules
//! them sequentially, in parallel, or hierarchically, and integrates
//! their answers into one response. Participants are real agents
//! resolved through the registry; every fan-out call is bounded by a
//! timeout and a failed participant degrades the result instead of
//! aborting the whole collaboration.

use crate::agent::AgentType;
use crate::config::RouterConfig;
use crate::registry::AgentRegistry;
use crate::request::{Action, AgentResponse, Priority, UserRequest};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Maximum confidence spread among participant responses before the
/// coordinator treats them as conflicting
const CONFLICT_CONFIDENCE_SPREAD: f64 = 0.3;

/// How participant work is scheduled
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationStrategy {
    Sequential,
    Parallel,
    Hierarchical,
}

impl fmt::Display for CollaborationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollaborationStrategy::Sequential => "sequential",
            CollaborationStrategy::Parallel => "parallel",
            CollaborationStrategy::Hierarchical => "hierarchical",
        };
        write!(f, "{}", name)
    }
}

/// Coarse task complexity bucket
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
}

/// Breakdown of what makes a request complex
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskAnalysis {
    pub level: ComplexityLevel,
    pub cross_domain: usize,
    pub urgency: bool,
    pub scope: bool,
    pub stakeholders: usize,
    pub score: usize,
}

/// A disagreement detected among participant responses. Mutated only to
/// attach the chosen resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conflict {
    pub conflict_id: Uuid,
    pub conflicting_agents: Vec<String>,
    pub conflict_type: String,
    pub description: String,
    pub proposed_solutions: Vec<String>,
    pub resolution: Option<String>,
    pub resolved: bool,
}

/// Outcome of one collaboration run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollaborationResult {
    pub collaboration_id: Uuid,
    pub participating_agents: Vec<String>,
    pub final_result: String,
    pub individual_responses: Vec<AgentResponse>,
    pub consensus_reached: bool,
    pub resolution_method: String,
    /// Conflicts detected during the run, with resolutions attached
    pub conflicts: Vec<Conflict>,
}

/// Lifecycle state of a tracked collaboration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationStatus {
    InProgress,
    Completed,
    Failed,
    Terminated,
}

/// Ledger entry for a collaboration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollaborationRecord {
    pub collaboration_id: Uuid,
    pub request_id: Uuid,
    pub agents: Vec<AgentType>,
    pub strategy: CollaborationStrategy,
    pub status: CollaborationStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Lifecycle state of a decomposed subtask
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Completed,
    Failed,
}

/// One unit of a decomposed request. Subtask ids are stable plan-local
/// names ("needs_analysis", "quote_generation") so dependencies can be
/// declared inside the plan template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subtask {
    pub task_id: String,
    pub name: String,
    pub agent_type: AgentType,
    pub priority: Priority,
    pub dependencies: Vec<String>,
    pub status: TaskStatus,
    pub assigned_agent: Option<String>,
    pub error: Option<String>,
}

impl Subtask {
    fn new(task_id: &str, name: &str, agent_type: AgentType) -> Self {
        Self {
            task_id: task_id.to_string(),
            name: name.to_string(),
            agent_type,
            priority: Priority::Normal,
            dependencies: Vec::new(),
            status: TaskStatus::Pending,
            assigned_agent: None,
            error: None,
        }
    }

    fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    fn depends_on(mut self, dependency: &str) -> Self {
        self.dependencies.push(dependency.to_string());
        self
    }
}

#[derive(Debug, Default)]
struct TaskBoard {
    subtasks: HashMap<String, Subtask>,
    queue: Vec<String>,
    completed: HashSet<String>,
    failed: HashSet<String>,
}

fn collaboration_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"need.+(multiple|all|every).+(department|team|staff)|需要.*(多个|各个|所有).*(部门|团队|人员)",
            r"(coordinate|organize).+(parties|stakeholders)|(协调|统筹|安排).*(各方|多方)",
            r"(integrate|consolidate).+(resources|information|plans)|(整合|综合).*(资源|信息|方案)",
            r"(comprehensive|overall).+(solution|handling|analysis)|(全面|整体).*(解决|处理|分析)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static pattern"))
        .collect()
    })
}

const COORDINATION_KEYWORDS: &[&str] = &[
    "coordinate", "manage", "organize", "integrate", "collaborate", "multiple",
    "team", "cooperation", "comprehensive",
    "协调", "统筹", "管理", "分配", "调度", "安排", "组织", "整合",
    "多个", "团队", "协作", "配合", "合作", "联合", "综合", "全面",
];

const COMPLEXITY_INDICATORS: &[&str] = &[
    "multiple", "comprehensive", "overall", "coordinate",
    "多个", "全面", "整体", "综合", "协调", "统筹",
];

/// One domain, matched by any of its synonyms
const DOMAINS: &[&[&str]] = &[
    &["sales", "销售"],
    &["support", "客服"],
    &["management", "管理"],
    &["technical", "技术"],
    &["on-site", "现场"],
];

const URGENCY_WORDS: &[&str] = &["urgent", "immediately", "right away", "紧急", "立即", "马上"];
const SCOPE_WORDS: &[&str] = &["comprehensive", "overall", "end-to-end", "全面", "整体", "综合"];
const STAKEHOLDER_WORDS: &[&str] = &[
    "customer", "user", "leadership", "team", "客户", "用户", "管理层", "团队",
];

fn count_hits(content: &str, words: &[&str]) -> usize {
    words.iter().filter(|w| content.contains(*w)).count()
}

fn count_domains(content: &str) -> usize {
    DOMAINS
        .iter()
        .filter(|synonyms| synonyms.iter().any(|w| content.contains(w)))
        .count()
}

/// Coordinator behavior backed by the agent registry
pub struct CoordinatorBehavior {
    registry: Arc<AgentRegistry>,
    call_timeout: Duration,
    collaborations: Mutex<HashMap<Uuid, CollaborationRecord>>,
    tasks: Mutex<TaskBoard>,
}

impl CoordinatorBehavior {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self::with_config(registry, &RouterConfig::default())
    }

    /// Build a coordinator carrying the configured fan-out call timeout
    pub fn with_config(registry: Arc<AgentRegistry>, config: &RouterConfig) -> Self {
        Self {
            registry,
            call_timeout: Duration::from_secs(config.collaboration_call_timeout_secs),
            collaborations: Mutex::new(HashMap::new()),
            tasks: Mutex::new(TaskBoard::default()),
        }
    }

    /// Override the per-participant call timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Timeout applied to each participant call
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Break a request down into complexity factors
    pub fn analyze_task(&self, content: &str) -> TaskAnalysis {
        let content = content.to_lowercase();
        let cross_domain = count_domains(&content);
        let urgency = count_hits(&content, URGENCY_WORDS) > 0;
        let scope = count_hits(&content, SCOPE_WORDS) > 0;
        let stakeholders = count_hits(&content, STAKEHOLDER_WORDS);

        let score = cross_domain + usize::from(urgency) + usize::from(scope) + stakeholders;
        let level = if score >= 4 {
            ComplexityLevel::High
        } else if score >= 2 {
            ComplexityLevel::Medium
        } else {
            ComplexityLevel::Low
        };

        TaskAnalysis {
            level,
            cross_domain,
            urgency,
            scope,
            stakeholders,
            score,
        }
    }

    /// Decide which specializations a request needs. Requests that hint
    /// at nothing specific get the default sales plus support pairing.
    pub fn identify_required_agents(&self, content: &str) -> Vec<AgentType> {
        let content = content.to_lowercase();
        let mut required = Vec::new();

        let wants: [(&[&str], AgentType); 4] = [
            (
                &["sales", "price", "product", "quote", "销售", "价格", "产品", "报价"],
                AgentType::Sales,
            ),
            (
                &["problem", "issue", "fault", "complaint", "support", "问题", "故障", "支持", "投诉", "服务"],
                AgentType::CustomerSupport,
            ),
            (
                &["decision", "strategy", "management", "planning", "resource", "决策", "战略", "管理", "规划", "资源"],
                AgentType::Manager,
            ),
            (
                &["on-site", "repair", "install", "equipment", "technical", "现场", "维修", "安装", "技术", "设备"],
                AgentType::FieldService,
            ),
        ];
        for (words, agent_type) in wants {
            if count_hits(&content, words) > 0 {
                required.push(agent_type);
            }
        }

        if required.is_empty() {
            required = vec![AgentType::Sales, AgentType::CustomerSupport];
        }
        required
    }

    /// Pick a scheduling strategy from complexity and participant count
    pub fn determine_strategy(
        &self,
        analysis: &TaskAnalysis,
        required_agents: &[AgentType],
    ) -> CollaborationStrategy {
        if analysis.level == ComplexityLevel::High || required_agents.len() > 2 {
            CollaborationStrategy::Hierarchical
        } else if required_agents.len() > 1 {
            CollaborationStrategy::Parallel
        } else {
            CollaborationStrategy::Sequential
        }
    }

    /// Break a request into a dependency-ordered subtask plan and put it
    /// on the task board. The plan template is picked by request domain.
    pub fn decompose_task(&self, request: &UserRequest) -> Vec<Subtask> {
        let content = request.content.to_lowercase();

        let plan = if count_hits(&content, &["购买", "报价", "价格", "buy", "quote", "price"]) > 0 {
            vec![
                Subtask::new("needs_analysis", "Needs Analysis", AgentType::Sales)
                    .priority(Priority::High),
                Subtask::new("product_recommendation", "Product Recommendation", AgentType::Sales)
                    .depends_on("needs_analysis"),
                Subtask::new("quote_generation", "Quote Generation", AgentType::Sales)
                    .depends_on("product_recommendation"),
                Subtask::new("management_approval", "Management Approval", AgentType::Manager)
                    .priority(Priority::High)
                    .depends_on("quote_generation"),
            ]
        } else if count_hits(&content, &["维修", "故障", "设备", "repair", "fault", "equipment"]) > 0 {
            vec![
                Subtask::new("problem_diagnosis", "Problem Diagnosis", AgentType::FieldService)
                    .priority(Priority::Urgent),
                Subtask::new("solution_planning", "Solution Planning", AgentType::FieldService)
                    .depends_on("problem_diagnosis"),
                Subtask::new("resource_scheduling", "Resource Scheduling", AgentType::Manager)
                    .depends_on("solution_planning"),
            ]
        } else if count_hits(&content, &["问题", "咨询", "帮助", "problem", "help", "support"]) > 0 {
            vec![
                Subtask::new("intent_analysis", "Intent Analysis", AgentType::CustomerSupport)
                    .priority(Priority::High),
                Subtask::new("info_gathering", "Information Gathering", AgentType::CustomerSupport)
                    .depends_on("intent_analysis"),
                Subtask::new("solution_provision", "Solution Provision", AgentType::CustomerSupport)
                    .depends_on("info_gathering"),
            ]
        } else {
            vec![
                Subtask::new("analysis", "Analysis", AgentType::CustomerSupport),
                Subtask::new("processing", "Processing", AgentType::Sales)
                    .depends_on("analysis"),
                Subtask::new("summary", "Summary", AgentType::Manager)
                    .depends_on("processing"),
            ]
        };

        let mut board = self.tasks.lock();
        for subtask in &plan {
            board.queue.push(subtask.task_id.clone());
            board.subtasks.insert(subtask.task_id.clone(), subtask.clone());
        }
        debug!(request_id = %request.request_id, subtasks = plan.len(), "Request decomposed");
        plan
    }

    /// Ids of the subtasks whose dependencies are all completed, highest
    /// priority first
    pub fn schedule_tasks(&self) -> Vec<String> {
        let board = self.tasks.lock();
        let mut ready: Vec<&Subtask> = board
            .queue
            .iter()
            .filter(|id| !board.completed.contains(*id) && !board.failed.contains(*id))
            .filter_map(|id| board.subtasks.get(id))
            .filter(|subtask| subtask.status == TaskStatus::Pending)
            .filter(|subtask| {
                subtask
                    .dependencies
                    .iter()
                    .all(|dep| board.completed.contains(dep))
            })
            .collect();
        ready.sort_by(|a, b| b.priority.cmp(&a.priority));
        ready.iter().map(|subtask| subtask.task_id.clone()).collect()
    }

    /// Hand a subtask to an agent. False when the id is unknown.
    pub fn assign_task(&self, task_id: &str, agent_id: &str) -> bool {
        let mut board = self.tasks.lock();
        match board.subtasks.get_mut(task_id) {
            Some(subtask) => {
                subtask.status = TaskStatus::Assigned;
                subtask.assigned_agent = Some(agent_id.to_string());
                true
            }
            None => false,
        }
    }

    /// Mark a subtask completed, unlocking its dependents
    pub fn complete_task(&self, task_id: &str) -> bool {
        let mut board = self.tasks.lock();
        match board.subtasks.get_mut(task_id) {
            Some(subtask) => {
                subtask.status = TaskStatus::Completed;
                board.completed.insert(task_id.to_string());
                true
            }
            None => false,
        }
    }

    /// Mark a subtask failed; its dependents stay blocked
    pub fn fail_task(&self, task_id: &str, error: &str) -> bool {
        let mut board = self.tasks.lock();
        match board.subtasks.get_mut(task_id) {
            Some(subtask) => {
                subtask.status = TaskStatus::Failed;
                subtask.error = Some(error.to_string());
                board.failed.insert(task_id.to_string());
                true
            }
            None => false,
        }
    }

    /// Snapshot of one subtask
    pub fn subtask(&self, task_id: &str) -> Option<Subtask> {
        self.tasks.lock().subtasks.get(task_id).cloned()
    }

    /// Run a collaboration end to end and record it in the ledger
    pub async fn coordinate(
        &self,
        request: &UserRequest,
        required_agents: &[AgentType],
        strategy: CollaborationStrategy,
    ) -> CollaborationResult {
        let collaboration_id = Uuid::new_v4();
        info!(
            %collaboration_id,
            request_id = %request.request_id,
            %strategy,
            agents = ?required_agents,
            "Starting collaboration"
        );
        self.collaborations.lock().insert(
            collaboration_id,
            CollaborationRecord {
                collaboration_id,
                request_id: request.request_id,
                agents: required_agents.to_vec(),
                strategy,
                status: CollaborationStatus::InProgress,
                started_at: Utc::now(),
                ended_at: None,
            },
        );

        let mut result = match strategy {
            CollaborationStrategy::Sequential => {
                self.run_sequential(collaboration_id, request, required_agents).await
            }
            CollaborationStrategy::Parallel => {
                self.run_parallel(collaboration_id, request, required_agents).await
            }
            CollaborationStrategy::Hierarchical => {
                self.run_hierarchical(collaboration_id, request, required_agents).await
            }
        };

        let status = if result.individual_responses.is_empty() {
            // Every participant failed; the result degrades instead of
            // propagating an error.
            result.consensus_reached = false;
            result.resolution_method = "error_fallback".to_string();
            result.final_result =
                "Collaboration could not be completed; no participant was reachable."
                    .to_string();
            CollaborationStatus::Failed
        } else {
            CollaborationStatus::Completed
        };
        if let Some(record) = self.collaborations.lock().get_mut(&collaboration_id) {
            // A terminated collaboration keeps its terminal state.
            if record.status == CollaborationStatus::InProgress {
                record.status = status;
            }
            record.ended_at = Some(Utc::now());
        }
        info!(
            %collaboration_id,
            consensus = result.consensus_reached,
            responses = result.individual_responses.len(),
            "Collaboration finished"
        );
        result
    }

    async fn call_participant(
        &self,
        agent_type: AgentType,
        request: &UserRequest,
    ) -> Result<AgentResponse> {
        let agent = self
            .registry
            .least_loaded(Some(agent_type))
            .await
            .ok_or_else(|| {
                Error::unavailable(agent_type.to_string(), "no available agent of this type")
            })?;
        let outcome = tokio::time::timeout(self.call_timeout, agent.process(request))
            .await
            .map_err(|_| {
                Error::timeout(
                    format!("collaboration call to {}", agent.id()),
                    self.call_timeout.as_secs(),
                )
            })??;
        Ok(outcome.into_response())
    }

    async fn run_sequential(
        &self,
        collaboration_id: Uuid,
        request: &UserRequest,
        required_agents: &[AgentType],
    ) -> CollaborationResult {
        let mut responses = Vec::new();
        let mut context = request.context.clone();

        for &agent_type in required_agents {
            let staged = request.with_context(context.clone());
            match self.call_participant(agent_type, &staged).await {
                Ok(response) => {
                    context.insert(format!("{}_response", agent_type), response.content.clone());
                    responses.push(response);
                }
                Err(e) => {
                    warn!(%collaboration_id, agent_type = %agent_type, error = %e, "Sequential participant failed");
                }
            }
        }

        let consensus = responses.len() == required_agents.len() && !responses.is_empty();
        CollaborationResult {
            collaboration_id,
            participating_agents: participant_ids(&responses),
            final_result: integrate_sequential(&responses),
            individual_responses: responses,
            consensus_reached: consensus,
            resolution_method: "sequential_integration".to_string(),
            conflicts: Vec::new(),
        }
    }

    async fn run_parallel(
        &self,
        collaboration_id: Uuid,
        request: &UserRequest,
        required_agents: &[AgentType],
    ) -> CollaborationResult {
        let calls = required_agents
            .iter()
            .map(|&agent_type| self.call_participant(agent_type, request));
        let results = futures::future::join_all(calls).await;

        let mut responses = Vec::new();
        for (agent_type, result) in required_agents.iter().zip(results) {
            match result {
                Ok(response) => responses.push(response),
                Err(e) => {
                    warn!(%collaboration_id, agent_type = %agent_type, error = %e, "Parallel participant failed");
                }
            }
        }

        let consensus = responses.len() == required_agents.len() && !responses.is_empty();
        CollaborationResult {
            collaboration_id,
            participating_agents: participant_ids(&responses),
            final_result: integrate_parallel(&responses),
            individual_responses: responses,
            consensus_reached: consensus,
            resolution_method: "parallel_integration".to_string(),
            conflicts: Vec::new(),
        }
    }

    async fn run_hierarchical(
        &self,
        collaboration_id: Uuid,
        request: &UserRequest,
        required_agents: &[AgentType],
    ) -> CollaborationResult {
        // First layer: gather every participant's take.
        let calls = required_agents
            .iter()
            .map(|&agent_type| self.call_participant(agent_type, request));
        let results = futures::future::join_all(calls).await;

        let mut responses = Vec::new();
        for (agent_type, result) in required_agents.iter().zip(results) {
            match result {
                Ok(response) => responses.push(response),
                Err(e) => {
                    warn!(%collaboration_id, agent_type = %agent_type, error = %e, "Hierarchical participant failed");
                }
            }
        }

        // Second layer: look for disagreement, then settle it.
        let mut conflicts = identify_conflicts(&responses);
        let final_result = if conflicts.is_empty() {
            integrate_hierarchical(&responses)
        } else {
            debug!(%collaboration_id, conflicts = conflicts.len(), "Resolving conflicts");
            resolve_conflicts(&mut conflicts, &responses)
        };

        CollaborationResult {
            collaboration_id,
            participating_agents: participant_ids(&responses),
            final_result,
            consensus_reached: !responses.is_empty(),
            individual_responses: responses,
            resolution_method: "hierarchical_coordination".to_string(),
            conflicts,
        }
    }

    /// Snapshot of the collaboration ledger
    pub fn active_collaborations(&self) -> Vec<CollaborationRecord> {
        self.collaborations.lock().values().cloned().collect()
    }

    /// Mark a collaboration terminated. Returns false for unknown ids.
    pub fn terminate_collaboration(&self, collaboration_id: Uuid) -> bool {
        let mut ledger = self.collaborations.lock();
        match ledger.get_mut(&collaboration_id) {
            Some(record) => {
                record.status = CollaborationStatus::Terminated;
                record.ended_at = Some(Utc::now());
                info!(%collaboration_id, "Collaboration terminated");
                true
            }
            None => false,
        }
    }

    fn follow_up_actions(&self, result: &CollaborationResult) -> Vec<Action> {
        let mut actions = vec![
            Action::new("monitor_collaboration")
                .with_parameter("collaboration_id", result.collaboration_id.to_string())
                .with_parameter("check_interval", "1_hour")
                .with_description("Track collaboration execution progress"),
            Action::new("validate_results")
                .with_parameter("validation_method", "cross_check")
                .with_parameter("timeline", "24_hours")
                .with_description("Verify the collaboration outcome"),
        ];
        if !result.consensus_reached {
            actions.push(
                Action::new("escalate_coordination")
                    .with_parameter("escalation_level", "senior_coordinator")
                    .with_parameter("reason", "consensus_not_reached")
                    .with_description("Escalate the unresolved collaboration"),
            );
        }
        actions.push(
            Action::new("collect_feedback")
                .with_parameter("feedback_type", "collaboration_effectiveness")
                .with_description("Gather participant feedback"),
        );
        actions
    }
}

#[async_trait]
impl crate::agent::AgentBehavior for CoordinatorBehavior {
    async fn can_handle(&self, request: &UserRequest) -> f64 {
        let content = request.content.to_lowercase();

        let keyword_score = (count_hits(&content, COORDINATION_KEYWORDS) as f64 * 0.2).min(0.6);
        let complexity_score = if count_hits(&content, COMPLEXITY_INDICATORS) > 0 {
            0.3
        } else {
            0.0
        };
        let domain_count = count_domains(&content);
        let cross_domain_score = if domain_count > 1 {
            (domain_count as f64 * 0.2).min(0.4)
        } else {
            0.0
        };
        let pattern_score = collaboration_patterns()
            .iter()
            .filter(|p| p.is_match(&content))
            .count() as f64
            * 0.2;

        (keyword_score + complexity_score + cross_domain_score + pattern_score).min(1.0)
    }

    fn capabilities(&self) -> Vec<String> {
        [
            "task_decomposition",
            "agent_scheduling",
            "collaboration_management",
            "conflict_resolution",
            "resource_coordination",
            "progress_monitoring",
            "result_integration",
            "decision_arbitration",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn estimate_processing_time(&self, request: &UserRequest) -> u64 {
        let content = request.content.to_lowercase();
        if count_hits(&content, &["simple", "basic", "简单", "基本", "一般"]) > 0 {
            return 35;
        }
        if count_hits(&content, &["complex", "comprehensive", "overall", "复杂", "全面", "整体"]) > 0 {
            return 75;
        }
        if count_domains(&content) > 1 {
            return 50;
        }
        40
    }

    async fn process(&self, request: &UserRequest) -> Result<AgentResponse> {
        let analysis = self.analyze_task(&request.content);
        let required_agents = self.identify_required_agents(&request.content);
        let strategy = self.determine_strategy(&analysis, &required_agents);

        let result = self.coordinate(request, &required_agents, strategy).await;
        let actions = self.follow_up_actions(&result);

        let mut content = format!(
            "Multi-agent collaboration complete.\n\nStrategy: {}\nParticipants: {}\nCollaboration id: {}\n\n{}",
            strategy,
            result.participating_agents.join(", "),
            result.collaboration_id,
            result.final_result,
        );
        if result.consensus_reached {
            content.push_str("\n\nStatus: consensus reached");
        } else {
            content.push_str("\n\nStatus: unresolved, further coordination needed");
        }

        let agent_names: Vec<String> =
            required_agents.iter().map(|t| t.to_string()).collect();
        Ok(AgentResponse::new(
            "coordinator",
            AgentType::Coordinator,
            content,
            0.9,
        )
        .with_actions(actions)
        .with_metadata("coordination_strategy", strategy.to_string())
        .with_metadata("required_agents", agent_names.join(","))
        .with_metadata(
            "task_complexity",
            serde_json::to_string(&analysis)?,
        )
        .with_metadata("collaboration_id", result.collaboration_id.to_string()))
    }
}

fn participant_ids(responses: &[AgentResponse]) -> Vec<String> {
    responses.iter().map(|r| r.agent_id.clone()).collect()
}

/// Detect disagreement among participant responses. Currently flags a
/// confidence spread wider than [`CONFLICT_CONFIDENCE_SPREAD`].
pub fn identify_conflicts(responses: &[AgentResponse]) -> Vec<Conflict> {
    if responses.len() < 2 {
        return Vec::new();
    }
    let max = responses.iter().map(|r| r.confidence).fold(f64::MIN, f64::max);
    let min = responses.iter().map(|r| r.confidence).fold(f64::MAX, f64::min);
    if max - min <= CONFLICT_CONFIDENCE_SPREAD {
        return Vec::new();
    }
    vec![Conflict {
        conflict_id: Uuid::new_v4(),
        conflicting_agents: responses.iter().map(|r| r.agent_id.clone()).collect(),
        conflict_type: "confidence_mismatch".to_string(),
        description: "participant confidence levels diverge significantly".to_string(),
        proposed_solutions: vec![
            "re-evaluate".to_string(),
            "expert arbitration".to_string(),
            "data verification".to_string(),
        ],
        resolution: None,
        resolved: false,
    }]
}

/// Settle conflicts by adopting the highest-confidence response as the
/// primary plan, attaching the chosen resolution to each conflict
pub fn resolve_conflicts(conflicts: &mut [Conflict], responses: &[AgentResponse]) -> String {
    let mut summary = String::from("Conflict resolution:\n\n");
    for conflict in conflicts {
        if conflict.conflict_type == "confidence_mismatch" {
            if let Some(best) = responses
                .iter()
                .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            {
                let resolution = format!(
                    "Adopting the high-confidence plan from the {} agent, \
                     with the remaining responses as supplementary input.",
                    best.agent_type
                );
                summary.push_str(&resolution);
                summary.push('\n');
                conflict.resolution = Some(resolution);
                conflict.resolved = true;
            }
        }
    }
    summary
}

fn integrate_sequential(responses: &[AgentResponse]) -> String {
    let mut result = String::from("Combined plan from sequential collaboration:\n\n");
    for (i, response) in responses.iter().enumerate() {
        result.push_str(&format!(
            "Stage {} ({} agent):\n{}\n\n",
            i + 1,
            response.agent_type,
            response.content
        ));
    }
    result.push_str("Coordinator summary: execute the stages above in order.");
    result
}

fn integrate_parallel(responses: &[AgentResponse]) -> String {
    let mut result = String::from("Combined plan from parallel collaboration:\n\n");
    for response in responses {
        result.push_str(&format!(
            "{} agent recommendation:\n{}\n\n",
            response.agent_type, response.content
        ));
    }
    result.push_str(
        "Coordinator summary: the recommendations above can proceed concurrently.",
    );
    result
}

fn integrate_hierarchical(responses: &[AgentResponse]) -> String {
    let mut ranked: Vec<&AgentResponse> = responses.iter().collect();
    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut result = String::from("Coordinated plan from hierarchical analysis:\n\n");
    result.push_str("Core recommendations, by priority:\n");
    for (i, response) in ranked.iter().enumerate() {
        let excerpt: String = response.content.chars().take(100).collect();
        result.push_str(&format!("{}. {}: {}\n", i + 1, response.agent_type, excerpt));
    }
    result.push_str("\nExecute in priority order, staging resource allocation accordingly.");
    result
}
