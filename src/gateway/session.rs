use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::history::{BoundedHistory, DEFAULT_HISTORY_CAPACITY};

/// Connectivity state of the exchange session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Disconnected,
    Connected,
    /// Handshake retries exhausted, every call returns placeholder data
    Simulated,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "DISCONNECTED",
            SessionState::Connected => "CONNECTED",
            SessionState::Simulated => "SIMULATED",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Request metrics for one session
pub struct SessionMetrics {
    /// Successful remote calls
    request_count: AtomicU64,
    /// Calls rejected with 429 / 418
    rate_limit_triggered: AtomicU64,
    latencies: RwLock<BoundedHistory<Duration>>,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self {
            request_count: AtomicU64::new(0),
            rate_limit_triggered: AtomicU64::new(0),
            latencies: RwLock::new(BoundedHistory::new(DEFAULT_HISTORY_CAPACITY)),
        }
    }

    pub async fn record_success(&self, latency: Duration) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.latencies.write().await.push(latency);
    }

    pub fn inc_rate_limited(&self) {
        self.rate_limit_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn rate_limit_triggered(&self) -> u64 {
        self.rate_limit_triggered.load(Ordering::Relaxed)
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let latencies = self.latencies.read().await;
        MetricsSnapshot {
            request_count: self.request_count(),
            rate_limit_triggered: self.rate_limit_triggered(),
            latency_samples: latencies.to_vec(),
        }
    }
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the session metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub request_count: u64,
    pub rate_limit_triggered: u64,
    /// Oldest first
    pub latency_samples: Vec<Duration>,
}

impl MetricsSnapshot {
    pub fn mean_latency(&self) -> Option<Duration> {
        if self.latency_samples.is_empty() {
            return None;
        }
        let total: Duration = self.latency_samples.iter().sum();
        Some(total / self.latency_samples.len() as u32)
    }

    pub fn summary(&self, state: SessionState) -> String {
        let mean = self
            .mean_latency()
            .map(|d| format!("{:.1}ms", d.as_secs_f64() * 1000.0))
            .unwrap_or_else(|| "n/a".to_string());
        format!(
            "Session: {} | Requests: {} | Rate limited: {} | Mean latency: {} ({} samples)",
            state,
            self.request_count,
            self.rate_limit_triggered,
            mean,
            self.latency_samples.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn latency_samples_stay_bounded() {
        let metrics = SessionMetrics::new();
        for i in 0..(DEFAULT_HISTORY_CAPACITY as u64 + 5) {
            metrics.record_success(Duration::from_millis(i)).await;
        }
        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.request_count, DEFAULT_HISTORY_CAPACITY as u64 + 5);
        assert_eq!(snapshot.latency_samples.len(), DEFAULT_HISTORY_CAPACITY);
        assert_eq!(snapshot.latency_samples[0], Duration::from_millis(5));
    }

    #[test]
    fn mean_latency_of_empty_snapshot() {
        let snapshot = MetricsSnapshot::default();
        assert!(snapshot.mean_latency().is_none());
        assert!(snapshot.summary(SessionState::Simulated).contains("n/a"));
    }
}
