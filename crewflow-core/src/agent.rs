//! Agent runtime and behavior model
//!
//! This module provides the core agent abstractions for the service:
//! specialization lives in an [`AgentBehavior`] implementation while the
//! [`Agent`] runtime owns the cross-cutting mechanics every agent shares,
//! including admission control, load accounting, rolling latency metrics,
//! and the periodic self health loop.
//!
//! # Examples
//!
//! ```rust
//! use crewflow_core::agent::{AgentStatus, AgentType};
//!
//! assert!(AgentStatus::Active.is_available());
//! assert!(!AgentStatus::Offline.is_available());
//! assert!(AgentType::Coordinator.experience_rank() > AgentType::Sales.experience_rank());
//! ```

use crate::config::AgentConfig;
use crate::coordinator::Conflict;
use crate::model::ModelClient;
use crate::request::{AgentResponse, ProcessOutcome, UserRequest};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Weight given to each new latency sample in the rolling average
const LATENCY_EWMA_ALPHA: f64 = 0.1;

/// Specialization of an agent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Sales,
    CustomerSupport,
    FieldService,
    Manager,
    Coordinator,
}

impl AgentType {
    /// All known specializations
    pub fn all() -> [AgentType; 5] {
        [
            AgentType::Sales,
            AgentType::CustomerSupport,
            AgentType::FieldService,
            AgentType::Manager,
            AgentType::Coordinator,
        ]
    }

    /// Relative seniority used for priority routing. Higher ranks are
    /// preferred when several candidates score the same.
    pub fn experience_rank(&self) -> u8 {
        match self {
            AgentType::Coordinator => 5,
            AgentType::Manager => 4,
            AgentType::Sales => 3,
            AgentType::FieldService => 2,
            AgentType::CustomerSupport => 1,
        }
    }

    /// Multiplier applied to intent base times when estimating how long
    /// this specialization needs for a request.
    pub fn processing_time_multiplier(&self) -> f64 {
        match self {
            AgentType::CustomerSupport => 1.0,
            AgentType::Sales => 1.2,
            AgentType::FieldService => 1.5,
            AgentType::Manager => 2.0,
            AgentType::Coordinator => 2.5,
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentType::Sales => "sales",
            AgentType::CustomerSupport => "customer_support",
            AgentType::FieldService => "field_service",
            AgentType::Manager => "manager",
            AgentType::Coordinator => "coordinator",
        };
        write!(f, "{}", name)
    }
}

/// Lifecycle state of an agent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Initializing,
    Active,
    Busy,
    Error,
    Offline,
}

impl AgentStatus {
    /// Whether the agent may accept new work in this state. Busy agents
    /// stay available; admission control gates on load, not status.
    pub fn is_available(&self) -> bool {
        matches!(self, AgentStatus::Active | AgentStatus::Busy)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentStatus::Initializing => "initializing",
            AgentStatus::Active => "active",
            AgentStatus::Busy => "busy",
            AgentStatus::Error => "error",
            AgentStatus::Offline => "offline",
        };
        write!(f, "{}", name)
    }
}

/// Rolling performance counters for an agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AgentMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Exponentially weighted average response time in seconds
    pub average_response_time: f64,
    pub last_active: Option<DateTime<Utc>>,
}

impl AgentMetrics {
    pub fn record_success(&mut self, elapsed_secs: f64) {
        self.total_requests += 1;
        self.successful_requests += 1;
        self.update_latency(elapsed_secs);
    }

    pub fn record_failure(&mut self, elapsed_secs: f64) {
        self.total_requests += 1;
        self.failed_requests += 1;
        self.update_latency(elapsed_secs);
    }

    fn update_latency(&mut self, elapsed_secs: f64) {
        if self.total_requests <= 1 {
            self.average_response_time = elapsed_secs;
        } else {
            self.average_response_time = LATENCY_EWMA_ALPHA * elapsed_secs
                + (1.0 - LATENCY_EWMA_ALPHA) * self.average_response_time;
        }
        self.last_active = Some(Utc::now());
    }

    /// Fraction of requests that completed successfully
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }
}

/// Point-in-time snapshot of an agent, safe to hand across tasks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentInfo {
    pub agent_id: String,
    pub agent_type: AgentType,
    pub name: String,
    pub description: String,
    pub capabilities: Vec<String>,
    pub status: AgentStatus,
    pub current_load: usize,
    pub max_load: usize,
    pub metrics: AgentMetrics,
    pub last_health_check: Option<DateTime<Utc>>,
}

impl AgentInfo {
    /// Whether the agent can take one more request right now
    pub fn has_capacity(&self) -> bool {
        self.status.is_available() && self.current_load < self.max_load
    }
}

/// Specialized behavior plugged into the [`Agent`] runtime.
///
/// Implementations provide domain scoring and the actual request
/// handling; everything else (admission, metrics, health) is handled by
/// the runtime.
#[async_trait]
pub trait AgentBehavior: Send + Sync {
    /// Confidence in [0.0, 1.0] that this behavior can handle the request
    async fn can_handle(&self, request: &UserRequest) -> f64;

    /// Capability tags advertised to the registry and router
    fn capabilities(&self) -> Vec<String>;

    /// Rough processing time estimate in seconds
    fn estimate_processing_time(&self, _request: &UserRequest) -> u64 {
        60
    }

    /// Handle the request and produce a response
    async fn process(&self, request: &UserRequest) -> Result<AgentResponse>;

    /// Behavior-specific config expectations, checked at construction
    fn validate_config(&self, _config: &AgentConfig) -> Result<()> {
        Ok(())
    }

    /// Behavior-specific health probe, combined with the model client
    /// check by the agent's health loop
    async fn health_probe(&self) -> Result<bool> {
        Ok(true)
    }

    /// Pick a resolution for a conflict this agent is party to. The
    /// default takes the first proposed solution.
    fn handle_conflict(&self, conflict: &Conflict) -> String {
        conflict
            .proposed_solutions
            .first()
            .cloned()
            .unwrap_or_else(|| "no solution available".to_string())
    }
}

#[derive(Debug)]
struct AgentState {
    status: AgentStatus,
    current_load: usize,
    metrics: AgentMetrics,
    last_health_check: Option<DateTime<Utc>>,
}

/// Decrements the agent's load when the request finishes, no matter how
/// it finishes. Holding it keeps the slot reserved.
struct LoadGuard {
    state: Arc<Mutex<AgentState>>,
}

impl LoadGuard {
    fn acquire(state: &Arc<Mutex<AgentState>>, agent_id: &str, max_load: u32) -> Result<Self> {
        let mut guard = state.lock();
        if !guard.status.is_available() {
            return Err(Error::unavailable(agent_id, guard.status.to_string()));
        }
        if guard.current_load >= max_load as usize {
            return Err(Error::overloaded(agent_id, max_load));
        }
        guard.current_load += 1;
        guard.status = AgentStatus::Busy;
        Ok(Self {
            state: Arc::clone(state),
        })
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        let mut guard = self.state.lock();
        guard.current_load = guard.current_load.saturating_sub(1);
        if guard.current_load == 0 && guard.status == AgentStatus::Busy {
            guard.status = AgentStatus::Active;
        }
    }
}

/// An agent: a behavior, a model client, and the shared runtime around them
pub struct Agent {
    config: AgentConfig,
    behavior: Arc<dyn AgentBehavior>,
    model: Arc<dyn ModelClient>,
    state: Arc<Mutex<AgentState>>,
    shared_info: Mutex<HashMap<String, serde_json::Value>>,
    health_stop: Mutex<Option<watch::Sender<bool>>>,
}

impl Agent {
    /// Create an agent from a validated configuration
    pub fn new(
        config: AgentConfig,
        behavior: Arc<dyn AgentBehavior>,
        model: Arc<dyn ModelClient>,
    ) -> Result<Self> {
        config.validate()?;
        behavior.validate_config(&config)?;
        Ok(Self {
            config,
            behavior,
            model,
            state: Arc::new(Mutex::new(AgentState {
                status: AgentStatus::Initializing,
                current_load: 0,
                metrics: AgentMetrics::default(),
                last_health_check: None,
            })),
            shared_info: Mutex::new(HashMap::new()),
            health_stop: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.config.agent_id
    }

    pub fn agent_type(&self) -> AgentType {
        self.config.agent_type
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn status(&self) -> AgentStatus {
        self.state.lock().status
    }

    pub fn current_load(&self) -> usize {
        self.state.lock().current_load
    }

    pub fn metrics(&self) -> AgentMetrics {
        self.state.lock().metrics.clone()
    }

    pub fn capabilities(&self) -> Vec<String> {
        self.behavior.capabilities()
    }

    /// Confidence that this agent can handle the request
    pub async fn can_handle(&self, request: &UserRequest) -> f64 {
        self.behavior.can_handle(request).await.clamp(0.0, 1.0)
    }

    /// Rough processing time estimate in seconds
    pub fn estimate_processing_time(&self, request: &UserRequest) -> u64 {
        self.behavior.estimate_processing_time(request)
    }

    /// Delegate conflict resolution to the behavior
    pub fn handle_conflict(&self, conflict: &Conflict) -> String {
        self.behavior.handle_conflict(conflict)
    }

    /// Snapshot the agent for registry listings and routing decisions
    pub fn info(&self) -> AgentInfo {
        let state = self.state.lock();
        AgentInfo {
            agent_id: self.config.agent_id.clone(),
            agent_type: self.config.agent_type,
            name: self.config.name.clone(),
            description: self.config.description.clone(),
            capabilities: self.behavior.capabilities(),
            status: state.status,
            current_load: state.current_load,
            max_load: self.config.max_concurrent_tasks as usize,
            metrics: state.metrics.clone(),
            last_health_check: state.last_health_check,
        }
    }

    /// Initialize the backing model client and mark the agent active
    pub async fn initialize(&self) -> Result<()> {
        let ready = self.model.initialize().await?;
        if !ready {
            self.state.lock().status = AgentStatus::Error;
            return Err(Error::unavailable(
                &self.config.agent_id,
                "model client failed to initialize",
            ));
        }
        self.state.lock().status = AgentStatus::Active;
        info!(agent_id = %self.config.agent_id, agent_type = %self.config.agent_type, "Agent initialized");
        Ok(())
    }

    /// Start the periodic self health loop
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.health_stop.lock();
        if slot.is_some() {
            return;
        }
        let (tx, rx) = watch::channel(false);
        *slot = Some(tx);
        let agent = Arc::clone(self);
        tokio::spawn(async move {
            agent.health_loop(rx).await;
        });
        debug!(agent_id = %self.config.agent_id, "Agent health loop started");
    }

    /// Stop the health loop, drain in-flight work, and take the agent
    /// offline. New admissions are refused as soon as the status flips;
    /// the drain then waits for the slots already taken to release.
    pub async fn stop(&self) {
        if let Some(tx) = self.health_stop.lock().take() {
            let _ = tx.send(true);
        }
        self.state.lock().status = AgentStatus::Offline;
        loop {
            let load = self.state.lock().current_load;
            if load == 0 {
                break;
            }
            debug!(agent_id = %self.config.agent_id, load, "Draining in-flight requests before stop");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        info!(agent_id = %self.config.agent_id, "Agent stopped");
    }

    /// Release model client resources
    pub async fn cleanup(&self) -> Result<()> {
        self.model.cleanup().await
    }

    /// Force the agent's lifecycle state. Intended for registry health
    /// management and tests.
    pub fn set_status(&self, status: AgentStatus) {
        self.state.lock().status = status;
    }

    async fn health_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.config.health_check_interval_secs);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                }
            }
            self.run_health_probe().await;
        }
        debug!(agent_id = %self.config.agent_id, "Agent health loop stopped");
    }

    /// One self health probe. Skipped while the model client is cooling
    /// down so a flapping backend is not hammered.
    pub async fn run_health_probe(&self) {
        if let Some(until) = self.model.cooldown_until() {
            if until > Utc::now() {
                debug!(agent_id = %self.config.agent_id, cooldown_until = %until, "Skipping health probe during cooldown");
                return;
            }
        }
        let probe: Result<bool> = async {
            Ok(self.model.health_check().await? && self.behavior.health_probe().await?)
        }
        .await;
        match probe {
            Ok(true) => {
                let mut state = self.state.lock();
                state.last_health_check = Some(Utc::now());
                if state.status == AgentStatus::Error {
                    state.status = AgentStatus::Active;
                    info!(agent_id = %self.config.agent_id, "Agent recovered from error state");
                }
            }
            Ok(false) => {
                warn!(agent_id = %self.config.agent_id, "Model client reported unhealthy");
                self.state.lock().status = AgentStatus::Error;
            }
            Err(e) => {
                error!(agent_id = %self.config.agent_id, error = %e, "Health probe failed");
                self.state.lock().status = AgentStatus::Error;
            }
        }
    }

    /// Process a request end to end.
    ///
    /// Admission is checked first: unavailable agents and full agents
    /// reject immediately. When the behavior's own confidence falls below
    /// the configured floor the agent answers with a degraded response
    /// asking for collaboration instead of guessing. A behavior failure
    /// is likewise recovered into a zero-confidence degraded response
    /// carrying the error detail; only admission rejection surfaces as
    /// `Err`.
    pub async fn process(&self, request: &UserRequest) -> Result<ProcessOutcome> {
        let _guard = LoadGuard::acquire(
            &self.state,
            &self.config.agent_id,
            self.config.max_concurrent_tasks,
        )?;
        let started = Instant::now();

        let confidence = self.can_handle(request).await;
        if confidence < self.config.low_confidence_floor {
            let elapsed = started.elapsed().as_secs_f64();
            self.state.lock().metrics.record_success(elapsed);
            debug!(
                agent_id = %self.config.agent_id,
                request_id = %request.request_id,
                confidence,
                "Confidence below floor, returning degraded response"
            );
            let response = AgentResponse::new(
                &self.config.agent_id,
                self.config.agent_type,
                format!(
                    "I may not be the best agent to handle this request. \
                     My confidence is {:.2}. Another specialist should assist.",
                    confidence
                ),
                confidence,
            )
            .with_collaboration_needed(true);
            return Ok(ProcessOutcome::Degraded {
                response,
                reason: format!("confidence {:.2} below floor", confidence),
            });
        }

        match self.behavior.process(request).await {
            Ok(mut response) => {
                response.agent_id = self.config.agent_id.clone();
                let elapsed = started.elapsed().as_secs_f64();
                self.state.lock().metrics.record_success(elapsed);
                debug!(
                    agent_id = %self.config.agent_id,
                    request_id = %request.request_id,
                    elapsed_secs = elapsed,
                    "Request processed"
                );
                Ok(ProcessOutcome::Completed(response))
            }
            Err(e) => {
                let elapsed = started.elapsed().as_secs_f64();
                self.state.lock().metrics.record_failure(elapsed);
                error!(
                    agent_id = %self.config.agent_id,
                    request_id = %request.request_id,
                    error = %e,
                    "Request processing failed"
                );
                let response = AgentResponse::new(
                    &self.config.agent_id,
                    self.config.agent_type,
                    "I ran into an internal error while handling this request. \
                     Please try again or rephrase the question.",
                    0.0,
                )
                .with_metadata("error", e.to_string());
                Ok(ProcessOutcome::Degraded {
                    response,
                    reason: format!("processing failed: {}", e),
                })
            }
        }
    }

    /// Hand a request to a peer and return its response
    pub async fn collaborate(&self, peer: &Agent, request: &UserRequest) -> Result<AgentResponse> {
        info!(
            from = %self.config.agent_id,
            to = %peer.id(),
            request_id = %request.request_id,
            "Collaborating with peer"
        );
        let outcome = peer.process(request).await?;
        Ok(outcome.into_response())
    }

    /// Push a piece of information to a peer's shared store
    pub fn share_information(&self, peer: &Agent, key: &str, value: serde_json::Value) {
        debug!(from = %self.config.agent_id, to = %peer.id(), key, "Sharing information");
        peer.receive_information(key, value);
    }

    /// Accept a piece of shared information
    pub fn receive_information(&self, key: &str, value: serde_json::Value) {
        self.shared_info.lock().insert(key.to_string(), value);
    }

    /// Read back a previously shared value
    pub fn shared_information(&self, key: &str) -> Option<serde_json::Value> {
        self.shared_info.lock().get(key).cloned()
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("agent_id", &self.config.agent_id)
            .field("agent_type", &self.config.agent_type)
            .field("status", &self.status())
            .field("current_load", &self.current_load())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MockModelClient;
    use crate::request::Priority;

    struct FixedBehavior {
        confidence: f64,
        reply: String,
        fail: bool,
    }

    impl FixedBehavior {
        fn new(confidence: f64, reply: &str) -> Self {
            Self {
                confidence,
                reply: reply.to_string(),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl AgentBehavior for FixedBehavior {
        async fn can_handle(&self, _request: &UserRequest) -> f64 {
            self.confidence
        }

        fn capabilities(&self) -> Vec<String> {
            vec!["testing".to_string()]
        }

        async fn process(&self, _request: &UserRequest) -> Result<AgentResponse> {
            if self.fail {
                return Err(Error::processing("forced failure"));
            }
            Ok(AgentResponse::new(
                "fixed",
                AgentType::Sales,
                &self.reply,
                self.confidence,
            ))
        }
    }

    fn test_config(max_load: u32) -> AgentConfig {
        AgentConfig::builder()
            .agent_id("sales-1")
            .agent_type(AgentType::Sales)
            .name("Sales Agent")
            .description("handles sales")
            .max_concurrent_tasks(max_load)
            .build()
            .unwrap()
    }

    fn test_agent(behavior: FixedBehavior, max_load: u32) -> Agent {
        Agent::new(
            test_config(max_load),
            Arc::new(behavior),
            Arc::new(MockModelClient::new()),
        )
        .unwrap()
    }

    fn test_request(content: &str) -> UserRequest {
        UserRequest::builder()
            .content(content)
            .priority(Priority::Normal)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_lifecycle_and_info() {
        let agent = test_agent(FixedBehavior::new(0.9, "ok"), 3);
        assert_eq!(agent.status(), AgentStatus::Initializing);

        agent.initialize().await.unwrap();
        assert_eq!(agent.status(), AgentStatus::Active);

        let info = agent.info();
        assert_eq!(info.agent_id, "sales-1");
        assert_eq!(info.max_load, 3);
        assert!(info.has_capacity());
        assert_eq!(info.capabilities, vec!["testing".to_string()]);

        agent.stop().await;
        assert_eq!(agent.status(), AgentStatus::Offline);
    }

    #[tokio::test]
    async fn test_process_success_updates_metrics() {
        let agent = test_agent(FixedBehavior::new(0.9, "here is your quote"), 3);
        agent.initialize().await.unwrap();

        let outcome = agent.process(&test_request("price inquiry")).await.unwrap();
        assert!(!outcome.is_degraded());
        assert_eq!(outcome.response().content, "here is your quote");

        let metrics = agent.metrics();
        assert_eq!(metrics.total_requests, 1);
        assert_eq!(metrics.successful_requests, 1);
        assert_eq!(agent.current_load(), 0);
    }

    #[tokio::test]
    async fn test_low_confidence_yields_degraded_outcome() {
        let agent = test_agent(FixedBehavior::new(0.05, "unused"), 3);
        agent.initialize().await.unwrap();

        let outcome = agent.process(&test_request("quantum physics")).await.unwrap();
        assert!(outcome.is_degraded());
        let response = outcome.response();
        assert!(response.collaboration_needed);
        assert!(response.confidence < 0.1);
    }

    #[tokio::test]
    async fn test_offline_agent_rejects_requests() {
        let agent = test_agent(FixedBehavior::new(0.9, "ok"), 3);
        agent.initialize().await.unwrap();
        agent.stop().await;

        let err = agent.process(&test_request("hello")).await.unwrap_err();
        assert_eq!(err.category(), "unavailable");
    }

    #[tokio::test]
    async fn test_overload_rejection_and_load_release() {
        let agent = test_agent(FixedBehavior::new(0.9, "ok"), 1);
        agent.initialize().await.unwrap();

        // Occupy the only slot manually through the guard.
        let guard = LoadGuard::acquire(&agent.state, agent.id(), 1).unwrap();
        assert_eq!(agent.current_load(), 1);
        assert_eq!(agent.status(), AgentStatus::Busy);

        let err = agent.process(&test_request("hello")).await.unwrap_err();
        assert!(err.is_overloaded());

        drop(guard);
        assert_eq!(agent.current_load(), 0);
        assert_eq!(agent.status(), AgentStatus::Active);

        // Slot is free again.
        let outcome = agent.process(&test_request("hello")).await.unwrap();
        assert!(!outcome.is_degraded());
    }

    #[tokio::test]
    async fn test_failure_recovered_as_degraded_response() {
        let mut behavior = FixedBehavior::new(0.9, "ok");
        behavior.fail = true;
        let agent = test_agent(behavior, 2);
        agent.initialize().await.unwrap();

        let outcome = agent.process(&test_request("hello")).await.unwrap();
        assert!(outcome.is_degraded());
        let response = outcome.response();
        assert_eq!(response.agent_id, "sales-1");
        assert_eq!(response.confidence, 0.0);
        assert!(response
            .metadata
            .get("error")
            .unwrap()
            .contains("forced failure"));

        let metrics = agent.metrics();
        assert_eq!(metrics.failed_requests, 1);
        assert_eq!(agent.current_load(), 0);
    }

    struct ParkedBehavior {
        release: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl AgentBehavior for ParkedBehavior {
        async fn can_handle(&self, _request: &UserRequest) -> f64 {
            0.9
        }

        fn capabilities(&self) -> Vec<String> {
            vec!["parked".to_string()]
        }

        async fn process(&self, _request: &UserRequest) -> Result<AgentResponse> {
            self.release.notified().await;
            Ok(AgentResponse::new("parked", AgentType::Sales, "done", 0.9))
        }
    }

    #[tokio::test]
    async fn test_stop_drains_in_flight_work() {
        let release = Arc::new(tokio::sync::Notify::new());
        let agent = Arc::new(
            Agent::new(
                test_config(1),
                Arc::new(ParkedBehavior {
                    release: release.clone(),
                }),
                Arc::new(MockModelClient::new()),
            )
            .unwrap(),
        );
        agent.initialize().await.unwrap();

        let worker = {
            let agent = agent.clone();
            let request = test_request("hold");
            tokio::spawn(async move { agent.process(&request).await })
        };
        while agent.current_load() == 0 {
            tokio::task::yield_now().await;
        }

        let stopper = {
            let agent = agent.clone();
            tokio::spawn(async move { agent.stop().await })
        };
        // The stop call must not return while a request is in flight.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!stopper.is_finished());
        assert_eq!(agent.current_load(), 1);

        release.notify_one();
        stopper.await.unwrap();
        assert_eq!(agent.status(), AgentStatus::Offline);
        assert_eq!(agent.current_load(), 0);

        // The drained request still completed normally.
        let outcome = worker.await.unwrap().unwrap();
        assert!(!outcome.is_degraded());
    }

    #[tokio::test]
    async fn test_health_probe_recovers_error_state() {
        let model = Arc::new(MockModelClient::new());
        let agent = Agent::new(
            test_config(3),
            Arc::new(FixedBehavior::new(0.9, "ok")),
            Arc::clone(&model) as Arc<dyn ModelClient>,
        )
        .unwrap();
        agent.initialize().await.unwrap();

        model.set_healthy(false);
        agent.run_health_probe().await;
        assert_eq!(agent.status(), AgentStatus::Error);

        model.set_healthy(true);
        agent.run_health_probe().await;
        assert_eq!(agent.status(), AgentStatus::Active);
    }

    #[tokio::test]
    async fn test_health_probe_skipped_during_cooldown() {
        let model = Arc::new(MockModelClient::new());
        let agent = Agent::new(
            test_config(3),
            Arc::new(FixedBehavior::new(0.9, "ok")),
            Arc::clone(&model) as Arc<dyn ModelClient>,
        )
        .unwrap();
        agent.initialize().await.unwrap();

        model.set_healthy(false);
        model.set_cooldown_until(Some(Utc::now() + chrono::Duration::seconds(300)));
        agent.run_health_probe().await;
        // Probe skipped, so the unhealthy backend was never observed.
        assert_eq!(agent.status(), AgentStatus::Active);
    }

    #[tokio::test]
    async fn test_information_sharing() {
        let a = test_agent(FixedBehavior::new(0.9, "ok"), 3);
        let b = test_agent(FixedBehavior::new(0.9, "ok"), 3);

        a.share_information(&b, "customer_tier", serde_json::json!("gold"));
        assert_eq!(
            b.shared_information("customer_tier"),
            Some(serde_json::json!("gold"))
        );
        assert_eq!(b.shared_information("missing"), None);
    }

    #[test]
    fn test_metrics_ewma() {
        let mut metrics = AgentMetrics::default();
        metrics.record_success(10.0);
        assert!((metrics.average_response_time - 10.0).abs() < f64::EPSILON);

        metrics.record_success(20.0);
        // 0.1 * 20 + 0.9 * 10
        assert!((metrics.average_response_time - 11.0).abs() < 1e-9);
        assert!((metrics.success_rate() - 1.0).abs() < f64::EPSILON);

        metrics.record_failure(11.0);
        assert!((metrics.average_response_time - 11.0).abs() < 1e-9);
        assert!((metrics.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_experience_ordering() {
        let mut types = AgentType::all();
        types.sort_by_key(|t| std::cmp::Reverse(t.experience_rank()));
        assert_eq!(types[0], AgentType::Coordinator);
        assert_eq!(types[1], AgentType::Manager);
        assert_eq!(types[4], AgentType::CustomerSupport);
    }
}
