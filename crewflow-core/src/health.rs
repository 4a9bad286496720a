//! Service health monitoring
//!
//! Tracks the health of registered services (model backends, external
//! dependencies) with adaptive scheduling: repeated soft failures widen
//! the probe interval, connection-class failures trigger a short
//! cooldown, and auth-class failures trigger a long one since retrying
//! cannot fix a bad credential. A single scheduler loop drives all
//! probes; due probes run concurrently, each bounded by a timeout.

use crate::config::HealthConfig;
use crate::error::FailureClass;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

/// Health state of one tracked service
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Cooldown,
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Cooldown => "cooldown",
            HealthStatus::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Result of probing one service once
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthCheckResult {
    pub service_id: String,
    pub status: HealthStatus,
    pub message: String,
    pub error_class: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl HealthCheckResult {
    fn new<S: Into<String>>(service_id: &str, status: HealthStatus, message: S) -> Self {
        Self {
            service_id: service_id.to_string(),
            status,
            message: message.into(),
            error_class: None,
            timestamp: Utc::now(),
        }
    }
}

/// A probe the manager can run against a service
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Returns true when the service is healthy
    async fn probe(&self) -> Result<bool>;
}

/// Serializable snapshot of a tracker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackerStatus {
    pub service_id: String,
    pub status: HealthStatus,
    pub last_check_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub current_interval_secs: u64,
    pub error_counts: HashMap<String, u64>,
    pub in_cooldown: bool,
}

/// Per-service health state with adaptive probe scheduling
#[derive(Debug)]
pub struct ServiceHealthTracker {
    service_id: String,
    config: HealthConfig,
    status: HealthStatus,
    last_check_time: Option<DateTime<Utc>>,
    last_success_time: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    cooldown_until: Option<DateTime<Utc>>,
    current_interval_secs: u64,
    error_counts: HashMap<String, u64>,
}

impl ServiceHealthTracker {
    pub fn new<S: Into<String>>(service_id: S, config: HealthConfig) -> Self {
        let current_interval_secs = config.base_interval_secs;
        Self {
            service_id: service_id.into(),
            config,
            status: HealthStatus::Unknown,
            last_check_time: None,
            last_success_time: None,
            consecutive_failures: 0,
            cooldown_until: None,
            current_interval_secs,
            error_counts: HashMap::new(),
        }
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }

    /// Whether a probe is due at `now`. Services in cooldown are never
    /// due.
    pub fn should_check_now(&self, now: DateTime<Utc>) -> bool {
        if let Some(until) = self.cooldown_until {
            if now < until {
                return false;
            }
        }
        match self.last_check_time {
            Some(last) => now >= last + ChronoDuration::seconds(self.current_interval_secs as i64),
            None => true,
        }
    }

    /// A healthy probe clears failures, cooldowns, and interval scaling
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.status = HealthStatus::Healthy;
        self.last_check_time = Some(now);
        self.last_success_time = Some(now);
        self.consecutive_failures = 0;
        self.cooldown_until = None;
        self.current_interval_secs = self.config.base_interval_secs;
        debug!(service_id = %self.service_id, "Health check succeeded");
    }

    /// Record a failed probe. Auth failures cool down long, connection
    /// and timeout failures cool down short, anything else widens the
    /// probe interval after three consecutive failures.
    pub fn record_failure(&mut self, now: DateTime<Utc>, class: FailureClass, message: &str) {
        self.status = HealthStatus::Unhealthy;
        self.last_check_time = Some(now);
        self.consecutive_failures += 1;
        *self.error_counts.entry(class.as_str().to_string()).or_insert(0) += 1;

        match class {
            FailureClass::Auth => {
                self.cooldown_until =
                    Some(now + ChronoDuration::seconds(self.config.auth_cooldown_secs as i64));
                self.status = HealthStatus::Cooldown;
                warn!(
                    service_id = %self.service_id,
                    cooldown_until = ?self.cooldown_until,
                    "Auth failure, entering long cooldown"
                );
            }
            FailureClass::Connection | FailureClass::Timeout => {
                self.cooldown_until =
                    Some(now + ChronoDuration::seconds(self.config.retry_cooldown_secs as i64));
                self.status = HealthStatus::Cooldown;
                warn!(
                    service_id = %self.service_id,
                    cooldown_until = ?self.cooldown_until,
                    "Connection-class failure, entering cooldown"
                );
            }
            FailureClass::Other => self.adjust_interval(),
        }
        debug!(
            service_id = %self.service_id,
            class = class.as_str(),
            message,
            consecutive = self.consecutive_failures,
            "Health check failed"
        );
    }

    fn adjust_interval(&mut self) {
        if self.consecutive_failures >= 3 {
            let multiplier = 2u64
                .saturating_pow(self.consecutive_failures.saturating_sub(2))
                .min(4);
            let max = self.config.base_interval_secs * 4;
            self.current_interval_secs = (self.config.base_interval_secs * multiplier).min(max);
            debug!(
                service_id = %self.service_id,
                interval_secs = self.current_interval_secs,
                "Widened probe interval"
            );
        }
    }

    pub fn status_info(&self, now: DateTime<Utc>) -> TrackerStatus {
        TrackerStatus {
            service_id: self.service_id.clone(),
            status: self.status,
            last_check_time: self.last_check_time,
            last_success_time: self.last_success_time,
            consecutive_failures: self.consecutive_failures,
            cooldown_until: self.cooldown_until,
            current_interval_secs: self.current_interval_secs,
            error_counts: self.error_counts.clone(),
            in_cooldown: self.cooldown_until.map_or(false, |until| now < until),
        }
    }
}

/// Aggregate health report for all tracked services
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub overall_healthy: bool,
    pub healthy_services: usize,
    pub total_services: usize,
    pub health_percentage: f64,
    pub services: HashMap<String, TrackerStatus>,
    pub total_checks: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub success_rate_percent: f64,
    pub uptime_seconds: f64,
    pub running: bool,
}

struct ServiceEntry {
    tracker: Arc<Mutex<ServiceHealthTracker>>,
    probe: Arc<dyn HealthProbe>,
}

#[derive(Default)]
struct Counters {
    total_checks: u64,
    total_successes: u64,
    total_failures: u64,
}

/// Drives health probes for every registered service
pub struct HealthCheckManager {
    config: HealthConfig,
    services: RwLock<HashMap<String, ServiceEntry>>,
    counters: Mutex<Counters>,
    started_at: Mutex<Option<DateTime<Utc>>>,
    stop: Mutex<Option<watch::Sender<bool>>>,
}

impl HealthCheckManager {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            services: RwLock::new(HashMap::new()),
            counters: Mutex::new(Counters::default()),
            started_at: Mutex::new(None),
            stop: Mutex::new(None),
        }
    }

    pub async fn register_service<S: Into<String>>(&self, service_id: S, probe: Arc<dyn HealthProbe>) {
        let service_id = service_id.into();
        let tracker = Arc::new(Mutex::new(ServiceHealthTracker::new(
            &service_id,
            self.config.clone(),
        )));
        self.services
            .write()
            .await
            .insert(service_id.clone(), ServiceEntry { tracker, probe });
        info!(service_id, "Registered health check");
    }

    pub async fn unregister_service(&self, service_id: &str) {
        self.services.write().await.remove(service_id);
        info!(service_id, "Unregistered health check");
    }

    /// Start the scheduler loop
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.stop.lock();
        if slot.is_some() {
            warn!("Health check manager is already running");
            return;
        }
        let (tx, rx) = watch::channel(false);
        *slot = Some(tx);
        *self.started_at.lock() = Some(Utc::now());
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.scheduler_loop(rx).await;
        });
        info!("Health check manager started");
    }

    /// Stop the scheduler loop
    pub fn stop(&self) {
        if let Some(tx) = self.stop.lock().take() {
            let _ = tx.send(true);
            info!("Health check manager stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.stop.lock().is_some()
    }

    async fn scheduler_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let tick = Duration::from_secs(self.config.scheduler_tick_secs);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(tick) => {}
                _ = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                }
            }
            self.run_due_checks().await;
        }
        debug!("Health scheduler loop exited");
    }

    /// Probe every service whose interval has elapsed
    pub async fn run_due_checks(&self) {
        let now = Utc::now();
        let due: Vec<(String, Arc<Mutex<ServiceHealthTracker>>, Arc<dyn HealthProbe>)> = {
            let services = self.services.read().await;
            services
                .iter()
                .filter(|(_, entry)| entry.tracker.lock().should_check_now(now))
                .map(|(id, entry)| {
                    (id.clone(), Arc::clone(&entry.tracker), Arc::clone(&entry.probe))
                })
                .collect()
        };
        if due.is_empty() {
            return;
        }

        let checks = due
            .into_iter()
            .map(|(id, tracker, probe)| async move {
                self.probe_and_record(&id, &tracker, probe.as_ref()).await;
            });
        futures::future::join_all(checks).await;
    }

    async fn probe_and_record(
        &self,
        service_id: &str,
        tracker: &Mutex<ServiceHealthTracker>,
        probe: &dyn HealthProbe,
    ) -> HealthCheckResult {
        self.counters.lock().total_checks += 1;
        let timeout = Duration::from_secs(self.config.probe_timeout_secs);
        let outcome = match tokio::time::timeout(timeout, probe.probe()).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(
                format!("health probe for {}", service_id),
                self.config.probe_timeout_secs,
            )),
        };

        let now = Utc::now();
        match outcome {
            Ok(true) => {
                tracker.lock().record_success(now);
                self.counters.lock().total_successes += 1;
                HealthCheckResult::new(service_id, HealthStatus::Healthy, "health check passed")
            }
            Ok(false) => {
                tracker
                    .lock()
                    .record_failure(now, FailureClass::Other, "health check returned false");
                self.counters.lock().total_failures += 1;
                let mut result = HealthCheckResult::new(
                    service_id,
                    HealthStatus::Unhealthy,
                    "health check returned false",
                );
                result.error_class = Some(FailureClass::Other.as_str().to_string());
                result
            }
            Err(e) => {
                let class = FailureClass::classify(&e);
                tracker.lock().record_failure(now, class, &e.to_string());
                self.counters.lock().total_failures += 1;
                let status = tracker.lock().status();
                let mut result = HealthCheckResult::new(service_id, status, e.to_string());
                result.error_class = Some(class.as_str().to_string());
                result
            }
        }
    }

    /// Probe a single service immediately, ignoring its schedule
    pub async fn check_service_now(&self, service_id: &str) -> HealthCheckResult {
        let entry = {
            let services = self.services.read().await;
            services
                .get(service_id)
                .map(|e| (Arc::clone(&e.tracker), Arc::clone(&e.probe)))
        };
        match entry {
            Some((tracker, probe)) => {
                self.probe_and_record(service_id, &tracker, probe.as_ref()).await
            }
            None => {
                HealthCheckResult::new(service_id, HealthStatus::Unknown, "service not registered")
            }
        }
    }

    pub async fn service_status(&self, service_id: &str) -> Option<TrackerStatus> {
        let services = self.services.read().await;
        services
            .get(service_id)
            .map(|entry| entry.tracker.lock().status_info(Utc::now()))
    }

    /// Full report across all services plus manager counters
    pub async fn report(&self) -> HealthReport {
        let now = Utc::now();
        let services_map = {
            let services = self.services.read().await;
            services
                .iter()
                .map(|(id, entry)| (id.clone(), entry.tracker.lock().status_info(now)))
                .collect::<HashMap<String, TrackerStatus>>()
        };
        let total = services_map.len();
        let healthy = services_map
            .values()
            .filter(|s| s.status == HealthStatus::Healthy)
            .count();

        let (total_checks, total_successes, total_failures) = {
            let counters = self.counters.lock();
            (
                counters.total_checks,
                counters.total_successes,
                counters.total_failures,
            )
        };
        let uptime_seconds = self
            .started_at
            .lock()
            .map(|start| (now - start).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        HealthReport {
            overall_healthy: total > 0 && healthy == total,
            healthy_services: healthy,
            total_services: total,
            health_percentage: if total > 0 {
                healthy as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            services: services_map,
            total_checks,
            total_successes,
            total_failures,
            success_rate_percent: if total_checks > 0 {
                total_successes as f64 / total_checks as f64 * 100.0
            } else {
                0.0
            },
            uptime_seconds,
            running: self.is_running(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelBackendKind;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn config() -> HealthConfig {
        HealthConfig::default()
    }

    struct FixedProbe {
        healthy: AtomicBool,
        error: Mutex<Option<Error>>,
    }

    impl FixedProbe {
        fn healthy() -> Arc<Self> {
            Arc::new(Self {
                healthy: AtomicBool::new(true),
                error: Mutex::new(None),
            })
        }

        fn failing(error: Error) -> Arc<Self> {
            Arc::new(Self {
                healthy: AtomicBool::new(false),
                error: Mutex::new(Some(error)),
            })
        }

        fn unhealthy() -> Arc<Self> {
            Arc::new(Self {
                healthy: AtomicBool::new(false),
                error: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl HealthProbe for FixedProbe {
        async fn probe(&self) -> Result<bool> {
            if let Some(e) = self.error.lock().take() {
                return Err(e);
            }
            Ok(self.healthy.load(Ordering::SeqCst))
        }
    }

    #[test]
    fn test_tracker_interval_scaling() {
        let mut tracker = ServiceHealthTracker::new("svc", config());
        let now = Utc::now();

        tracker.record_failure(now, FailureClass::Other, "x");
        tracker.record_failure(now, FailureClass::Other, "x");
        assert_eq!(tracker.status_info(now).current_interval_secs, 30);

        // Third consecutive failure doubles the interval.
        tracker.record_failure(now, FailureClass::Other, "x");
        assert_eq!(tracker.status_info(now).current_interval_secs, 60);

        tracker.record_failure(now, FailureClass::Other, "x");
        assert_eq!(tracker.status_info(now).current_interval_secs, 120);

        // Capped at four times the base.
        tracker.record_failure(now, FailureClass::Other, "x");
        tracker.record_failure(now, FailureClass::Other, "x");
        assert_eq!(tracker.status_info(now).current_interval_secs, 120);

        // Success resets everything.
        tracker.record_success(now);
        let info = tracker.status_info(now);
        assert_eq!(info.current_interval_secs, 30);
        assert_eq!(info.consecutive_failures, 0);
        assert_eq!(info.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_tracker_auth_cooldown() {
        let mut tracker = ServiceHealthTracker::new("svc", config());
        let now = Utc::now();

        tracker.record_failure(now, FailureClass::Auth, "401");
        assert_eq!(tracker.status(), HealthStatus::Cooldown);
        assert!(!tracker.should_check_now(now + ChronoDuration::seconds(299)));
        assert!(tracker.should_check_now(now + ChronoDuration::seconds(301)));
    }

    #[test]
    fn test_tracker_connection_cooldown() {
        let mut tracker = ServiceHealthTracker::new("svc", config());
        let now = Utc::now();

        tracker.record_failure(now, FailureClass::Connection, "refused");
        assert!(!tracker.should_check_now(now + ChronoDuration::seconds(59)));
        assert!(tracker.should_check_now(now + ChronoDuration::seconds(61)));
    }

    #[test]
    fn test_tracker_scheduling() {
        let mut tracker = ServiceHealthTracker::new("svc", config());
        let now = Utc::now();
        assert!(tracker.should_check_now(now));

        tracker.record_success(now);
        assert!(!tracker.should_check_now(now + ChronoDuration::seconds(29)));
        assert!(tracker.should_check_now(now + ChronoDuration::seconds(30)));
    }

    #[tokio::test]
    async fn test_manager_check_now_healthy() {
        let manager = HealthCheckManager::new(config());
        manager.register_service("model", FixedProbe::healthy()).await;

        let result = manager.check_service_now("model").await;
        assert_eq!(result.status, HealthStatus::Healthy);

        let status = manager.service_status("model").await.unwrap();
        assert_eq!(status.status, HealthStatus::Healthy);
        assert!(status.last_success_time.is_some());
    }

    #[tokio::test]
    async fn test_manager_check_now_unhealthy() {
        let manager = HealthCheckManager::new(config());
        manager.register_service("model", FixedProbe::unhealthy()).await;

        let result = manager.check_service_now("model").await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.error_class.as_deref(), Some("unknown"));
    }

    #[tokio::test]
    async fn test_manager_auth_failure_enters_cooldown() {
        let manager = HealthCheckManager::new(config());
        manager
            .register_service(
                "model",
                FixedProbe::failing(Error::model_backend(
                    ModelBackendKind::Unauthorized,
                    "401 unauthorized",
                )),
            )
            .await;

        let result = manager.check_service_now("model").await;
        assert_eq!(result.status, HealthStatus::Cooldown);
        assert_eq!(result.error_class.as_deref(), Some("auth_error"));

        let status = manager.service_status("model").await.unwrap();
        assert!(status.in_cooldown);
        assert_eq!(status.error_counts["auth_error"], 1);
    }

    #[tokio::test]
    async fn test_manager_probe_timeout() {
        struct SlowProbe;

        #[async_trait]
        impl HealthProbe for SlowProbe {
            async fn probe(&self) -> Result<bool> {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(true)
            }
        }

        let manager = HealthCheckManager::new(HealthConfig {
            probe_timeout_secs: 0,
            ..config()
        });
        manager.register_service("slow", Arc::new(SlowProbe)).await;

        let result = manager.check_service_now("slow").await;
        assert_eq!(result.error_class.as_deref(), Some("timeout"));
        assert_eq!(result.status, HealthStatus::Cooldown);
    }

    #[tokio::test]
    async fn test_manager_unknown_service() {
        let manager = HealthCheckManager::new(config());
        let result = manager.check_service_now("ghost").await;
        assert_eq!(result.status, HealthStatus::Unknown);
    }

    #[tokio::test]
    async fn test_run_due_checks_and_report() {
        let manager = HealthCheckManager::new(config());
        manager.register_service("a", FixedProbe::healthy()).await;
        manager.register_service("b", FixedProbe::unhealthy()).await;

        manager.run_due_checks().await;

        let report = manager.report().await;
        assert!(!report.overall_healthy);
        assert_eq!(report.total_services, 2);
        assert_eq!(report.healthy_services, 1);
        assert!((report.health_percentage - 50.0).abs() < 1e-9);
        assert_eq!(report.total_checks, 2);
        assert_eq!(report.total_successes, 1);
        assert_eq!(report.total_failures, 1);
        assert!((report.success_rate_percent - 50.0).abs() < 1e-9);

        // Freshly checked services are not due again.
        manager.run_due_checks().await;
        assert_eq!(manager.report().await.total_checks, 2);
    }

    #[tokio::test]
    async fn test_manager_start_stop() {
        let manager = Arc::new(HealthCheckManager::new(config()));
        assert!(!manager.is_running());
        manager.start();
        assert!(manager.is_running());
        // Second start is a no-op.
        manager.start();
        manager.stop();
        assert!(!manager.is_running());
    }

    #[tokio::test]
    async fn test_unregister() {
        let manager = HealthCheckManager::new(config());
        manager.register_service("model", FixedProbe::healthy()).await;
        manager.unregister_service("model").await;
        assert!(manager.service_status("model").await.is_none());
    }
}
