//! Agent registry
//!
//! Central directory of live agents. The registry owns lifecycle
//! fan-out (start, stop, restart, shutdown), lookup by id and type, and
//! the availability queries the router builds routing decisions on.
//! Instances are plain values wired in by the composition root; there is
//! no process-global registry.

use crate::agent::{Agent, AgentInfo, AgentStatus, AgentType};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Aggregate view of the registry's population
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryStats {
    pub total_agents: usize,
    pub active_agents: usize,
    pub error_agents: usize,
    pub offline_agents: usize,
    pub type_statistics: HashMap<String, TypeStats>,
}

/// Per-specialization counts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypeStats {
    pub total: usize,
    pub active: usize,
}

#[derive(Default)]
struct RegistryInner {
    agents: HashMap<String, Arc<Agent>>,
    by_type: HashMap<AgentType, Vec<String>>,
    startup_order: Vec<String>,
}

/// Directory of registered agents
#[derive(Default)]
pub struct AgentRegistry {
    inner: RwLock<RegistryInner>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize an agent and add it to the directory. Fails if the id
    /// is already taken or the agent's model client cannot initialize.
    pub async fn register(&self, agent: Arc<Agent>) -> Result<()> {
        {
            let inner = self.inner.read().await;
            if inner.agents.contains_key(agent.id()) {
                return Err(Error::registry(format!(
                    "agent '{}' is already registered",
                    agent.id()
                )));
            }
        }

        agent.initialize().await?;

        let mut inner = self.inner.write().await;
        // Re-check under the write lock in case of a concurrent register.
        if inner.agents.contains_key(agent.id()) {
            return Err(Error::registry(format!(
                "agent '{}' is already registered",
                agent.id()
            )));
        }
        let agent_id = agent.id().to_string();
        inner
            .by_type
            .entry(agent.agent_type())
            .or_default()
            .push(agent_id.clone());
        inner.startup_order.push(agent_id.clone());
        inner.agents.insert(agent_id.clone(), agent);
        info!(agent_id = %agent_id, "Agent registered");
        Ok(())
    }

    /// Stop, clean up, and remove an agent
    pub async fn unregister(&self, agent_id: &str) -> Result<()> {
        let agent = {
            let mut inner = self.inner.write().await;
            let agent = inner
                .agents
                .remove(agent_id)
                .ok_or_else(|| Error::not_found("agent", agent_id))?;
            if let Some(ids) = inner.by_type.get_mut(&agent.agent_type()) {
                ids.retain(|id| id != agent_id);
            }
            inner.startup_order.retain(|id| id != agent_id);
            agent
        };

        agent.stop().await;
        if let Err(e) = agent.cleanup().await {
            warn!(agent_id, error = %e, "Agent cleanup failed during unregister");
        }
        info!(agent_id, "Agent unregistered");
        Ok(())
    }

    pub async fn get(&self, agent_id: &str) -> Option<Arc<Agent>> {
        self.inner.read().await.agents.get(agent_id).cloned()
    }

    pub async fn get_info(&self, agent_id: &str) -> Option<AgentInfo> {
        self.get(agent_id).await.map(|agent| agent.info())
    }

    pub async fn get_by_type(&self, agent_type: AgentType) -> Vec<Arc<Agent>> {
        let inner = self.inner.read().await;
        inner
            .by_type
            .get(&agent_type)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.agents.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of the first registered agent of the given type
    pub async fn info_by_type(&self, agent_type: AgentType) -> Option<AgentInfo> {
        self.get_by_type(agent_type)
            .await
            .first()
            .map(|agent| agent.info())
    }

    /// Agents that can take more work right now, optionally narrowed to
    /// one specialization. Agents in error or offline states are never
    /// returned.
    pub async fn available_agents(&self, agent_type: Option<AgentType>) -> Vec<Arc<Agent>> {
        let candidates = match agent_type {
            Some(t) => self.get_by_type(t).await,
            None => self.inner.read().await.agents.values().cloned().collect(),
        };
        candidates
            .into_iter()
            .filter(|agent| agent.info().has_capacity())
            .collect()
    }

    /// Least loaded available agent, optionally narrowed by type
    pub async fn least_loaded(&self, agent_type: Option<AgentType>) -> Option<Arc<Agent>> {
        self.available_agents(agent_type)
            .await
            .into_iter()
            .min_by_key(|agent| agent.current_load())
    }

    pub async fn all_info(&self) -> Vec<AgentInfo> {
        let inner = self.inner.read().await;
        inner.agents.values().map(|agent| agent.info()).collect()
    }

    pub async fn stats(&self) -> RegistryStats {
        let inner = self.inner.read().await;
        let mut stats = RegistryStats {
            total_agents: inner.agents.len(),
            active_agents: 0,
            error_agents: 0,
            offline_agents: 0,
            type_statistics: HashMap::new(),
        };
        for agent in inner.agents.values() {
            match agent.status() {
                AgentStatus::Active | AgentStatus::Busy => stats.active_agents += 1,
                AgentStatus::Error => stats.error_agents += 1,
                AgentStatus::Offline => stats.offline_agents += 1,
                AgentStatus::Initializing => {}
            }
        }
        for (agent_type, ids) in &inner.by_type {
            let active = ids
                .iter()
                .filter_map(|id| inner.agents.get(id))
                .filter(|agent| agent.status().is_available())
                .count();
            stats
                .type_statistics
                .insert(agent_type.to_string(), TypeStats {
                    total: ids.len(),
                    active,
                });
        }
        stats
    }

    /// Probe every agent once and report per-agent health
    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let agents: Vec<Arc<Agent>> = {
            let inner = self.inner.read().await;
            inner.agents.values().cloned().collect()
        };
        let mut results = HashMap::new();
        for agent in agents {
            agent.run_health_probe().await;
            results.insert(agent.id().to_string(), agent.status().is_available());
        }
        results
    }

    /// Start health loops for all agents in registration order
    pub async fn start_all(&self) {
        let agents: Vec<Arc<Agent>> = {
            let inner = self.inner.read().await;
            inner
                .startup_order
                .iter()
                .filter_map(|id| inner.agents.get(id).cloned())
                .collect()
        };
        for agent in &agents {
            agent.start();
        }
        info!(count = agents.len(), "Started all agents");
    }

    /// Stop all agents in reverse registration order
    pub async fn stop_all(&self) {
        let agents: Vec<Arc<Agent>> = {
            let inner = self.inner.read().await;
            inner
                .startup_order
                .iter()
                .rev()
                .filter_map(|id| inner.agents.get(id).cloned())
                .collect()
        };
        for agent in &agents {
            agent.stop().await;
        }
        info!(count = agents.len(), "Stopped all agents");
    }

    /// Try to bring agents in error state back by reinitializing them.
    /// Returns how many recovered.
    pub async fn restart_failed(&self) -> usize {
        let agents: Vec<Arc<Agent>> = {
            let inner = self.inner.read().await;
            inner.agents.values().cloned().collect()
        };
        let mut restarted = 0;
        for agent in agents {
            if agent.status() != AgentStatus::Error {
                continue;
            }
            info!(agent_id = %agent.id(), "Restarting failed agent");
            agent.stop().await;
            match agent.initialize().await {
                Ok(()) => {
                    agent.start();
                    restarted += 1;
                }
                Err(e) => {
                    error!(agent_id = %agent.id(), error = %e, "Agent restart failed");
                }
            }
        }
        restarted
    }

    /// Stop and clean up every agent, then empty the directory
    pub async fn shutdown(&self) {
        info!("Shutting down agent registry");
        self.stop_all().await;
        let agents: Vec<Arc<Agent>> = {
            let mut inner = self.inner.write().await;
            let agents = inner.agents.drain().map(|(_, a)| a).collect();
            inner.by_type.clear();
            inner.startup_order.clear();
            agents
        };
        for agent in agents {
            if let Err(e) = agent.cleanup().await {
                error!(agent_id = %agent.id(), error = %e, "Agent cleanup failed during shutdown");
            }
        }
        info!("Agent registry shutdown complete");
    }
}
