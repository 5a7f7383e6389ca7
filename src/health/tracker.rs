//! Health tracker: the single source of truth for backend eligibility.
//!
//! # Responsibilities
//! - Own one `BackendHealth` per backend, keyed by ordinal index
//! - Apply failure reports (worker signals, dial failures, relay failures)
//! - Compute the healthy subset at selection time, recovering lazily
//!
//! Each entry has its own mutex, so connections to unrelated backends never
//! contend on health updates.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::FailurePolicy;
use crate::health::state::{BackendHealth, FailureReason, HealthState};
use crate::load_balancer::{BackendDescriptor, BackendRegistry};
use crate::observability::metrics;

struct Entry {
    cooldown: Duration,
    health: Mutex<BackendHealth>,
}

impl Entry {
    fn lock(&self) -> MutexGuard<'_, BackendHealth> {
        // State is a plain value; a panicked writer cannot leave it torn.
        self.health.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Point-in-time view of one backend's health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub index: usize,
    pub state: HealthState,
    pub cooldown_remaining: Duration,
}

/// Tracks health for every backend in a registry.
pub struct HealthTracker {
    entries: Vec<Entry>,
    policy: FailurePolicy,
}

impl HealthTracker {
    /// One healthy entry per backend, with the backend's own cooldown.
    pub fn new(registry: &BackendRegistry, policy: FailurePolicy) -> Self {
        let entries = registry
            .list()
            .iter()
            .map(|backend| {
                metrics::record_backend_health(backend.index, true);
                Entry {
                    cooldown: backend.cooldown,
                    health: Mutex::new(BackendHealth::new()),
                }
            })
            .collect();

        Self { entries, policy }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Withdraw a backend for its cooldown window. Repeated reports while
    /// unhealthy keep the original timestamp.
    pub fn report_unhealthy(&self, index: usize) {
        self.mark(index, FailureReason::WorkerSignal);
    }

    /// The relay could not open a connection to this backend.
    pub fn record_dial_failure(&self, index: usize) {
        self.mark(index, FailureReason::Dial);
    }

    /// An established relay to this backend failed. Only withdraws the
    /// backend under `FailurePolicy::AnyRelayError`. Returns whether the
    /// failure counted.
    pub fn record_relay_failure(&self, index: usize) -> bool {
        match self.policy {
            FailurePolicy::DialOnly => false,
            FailurePolicy::AnyRelayError => {
                self.mark(index, FailureReason::Relay);
                true
            }
        }
    }

    fn mark(&self, index: usize, reason: FailureReason) {
        let Some(entry) = self.entries.get(index) else {
            tracing::warn!(backend = index, %reason, "Failure reported for unknown backend");
            return;
        };

        let transitioned = entry.lock().mark_unhealthy(Instant::now());
        if transitioned {
            metrics::record_backend_health(index, false);
            tracing::warn!(
                backend = index,
                %reason,
                cooldown_secs = entry.cooldown.as_secs_f64(),
                "Backend marked unhealthy"
            );
        } else {
            tracing::debug!(backend = index, %reason, "Backend already unhealthy");
        }
    }

    /// Indices of backends currently eligible for selection, in registry
    /// order. Unhealthy backends whose cooldown has elapsed recover here.
    pub fn healthy_subset(&self, backends: &[BackendDescriptor]) -> Vec<usize> {
        let now = Instant::now();
        backends
            .iter()
            .filter(|backend| self.evaluate(backend.index, now))
            .map(|backend| backend.index)
            .collect()
    }

    /// Current eligibility of one backend, recovering it if due.
    pub fn is_healthy(&self, index: usize) -> bool {
        self.evaluate(index, Instant::now())
    }

    fn evaluate(&self, index: usize, now: Instant) -> bool {
        let Some(entry) = self.entries.get(index) else {
            return false;
        };

        let mut health = entry.lock();
        if health.refresh(now, entry.cooldown) {
            drop(health);
            metrics::record_backend_health(index, true);
            tracing::info!(backend = index, "Backend recovered after cooldown");
            return true;
        }
        health.state() == HealthState::Healthy
    }

    /// Health of every backend without triggering recovery.
    pub fn snapshot(&self) -> Vec<HealthSnapshot> {
        let now = Instant::now();
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let health = entry.lock();
                HealthSnapshot {
                    index,
                    state: health.state(),
                    cooldown_remaining: health.cooldown_remaining(now, entry.cooldown),
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for HealthTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthTracker")
            .field("backends", &self.entries.len())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::backend::test_descriptor;
    use std::sync::Arc;

    fn registry(n: usize, cooldown: Duration) -> BackendRegistry {
        let backends = (0..n)
            .map(|i| {
                let mut d = test_descriptor(i, 10801 + i as u16);
                d.cooldown = cooldown;
                d
            })
            .collect();
        BackendRegistry::new(backends).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn all_healthy_at_start() {
        let registry = registry(3, Duration::from_secs(600));
        let tracker = HealthTracker::new(&registry, FailurePolicy::DialOnly);
        assert_eq!(tracker.healthy_subset(registry.list()), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn excluded_for_whole_cooldown_then_recovers() {
        let cooldown = Duration::from_secs(600);
        let registry = registry(3, cooldown);
        let tracker = HealthTracker::new(&registry, FailurePolicy::DialOnly);

        tracker.record_dial_failure(1);
        assert_eq!(tracker.healthy_subset(registry.list()), vec![0, 2]);

        tokio::time::advance(cooldown - Duration::from_millis(1)).await;
        assert_eq!(tracker.healthy_subset(registry.list()), vec![0, 2]);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(tracker.healthy_subset(registry.list()), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_reports_do_not_extend_cooldown() {
        let cooldown = Duration::from_secs(60);
        let registry = registry(2, cooldown);
        let tracker = HealthTracker::new(&registry, FailurePolicy::DialOnly);

        tracker.report_unhealthy(0);
        tokio::time::advance(Duration::from_secs(50)).await;
        tracker.report_unhealthy(0);
        tracker.record_dial_failure(0);
        tokio::time::advance(Duration::from_secs(10)).await;

        assert!(tracker.is_healthy(0));
    }

    #[tokio::test(start_paused = true)]
    async fn relay_failures_follow_policy() {
        let registry = registry(2, Duration::from_secs(60));

        let conservative = HealthTracker::new(&registry, FailurePolicy::DialOnly);
        assert!(!conservative.record_relay_failure(0));
        assert!(conservative.is_healthy(0));

        let broad = HealthTracker::new(&registry, FailurePolicy::AnyRelayError);
        assert!(broad.record_relay_failure(0));
        assert!(!broad.is_healthy(0));
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_reports_remaining_cooldown() {
        let registry = registry(2, Duration::from_secs(100));
        let tracker = HealthTracker::new(&registry, FailurePolicy::DialOnly);

        tracker.report_unhealthy(1);
        tokio::time::advance(Duration::from_secs(40)).await;

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot[0].state, HealthState::Healthy);
        assert_eq!(snapshot[1].state, HealthState::Unhealthy);
        assert_eq!(snapshot[1].cooldown_remaining, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_index_is_ignored() {
        let registry = registry(1, Duration::from_secs(60));
        let tracker = HealthTracker::new(&registry, FailurePolicy::DialOnly);

        tracker.report_unhealthy(7);
        assert!(!tracker.is_healthy(7));
        assert_eq!(tracker.healthy_subset(registry.list()), vec![0]);
    }

    #[test]
    fn debug_summarizes_backends_and_policy() {
        let registry = registry(3, Duration::from_secs(60));
        let tracker = HealthTracker::new(&registry, FailurePolicy::AnyRelayError);

        let rendered = format!("{tracker:?}");
        assert!(rendered.contains("backends: 3"), "{rendered}");
        assert!(rendered.contains("AnyRelayError"), "{rendered}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reports_keep_state_consistent() {
        let registry = registry(4, Duration::from_secs(600));
        let tracker = Arc::new(HealthTracker::new(&registry, FailurePolicy::DialOnly));

        let mut tasks = Vec::new();
        for i in 0..64 {
            let tracker = Arc::clone(&tracker);
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    tracker.record_dial_failure(2);
                } else {
                    tracker.report_unhealthy(2);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(tracker.healthy_subset(registry.list()), vec![0, 1, 3]);
    }
}
