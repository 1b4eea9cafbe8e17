use crate::history::{BoundedHistory, DEFAULT_HISTORY_CAPACITY};
use crate::ml::Prediction;

/// Score reported when there is nothing to evaluate yet
pub const NEUTRAL_PERFORMANCE: f64 = 0.5;

/// External evaluation capability: one sample per cycle
pub trait PerformanceEvaluator: Send + Sync {
    fn evaluate(&self, predictions: &[Prediction]) -> f64;
}

/// Share of recent predictions whose direction matched the next price move
#[derive(Debug, Clone)]
pub struct DirectionalAccuracy {
    lookback: usize,
}

impl DirectionalAccuracy {
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback: lookback.max(1),
        }
    }
}

impl PerformanceEvaluator for DirectionalAccuracy {
    fn evaluate(&self, predictions: &[Prediction]) -> f64 {
        let start = predictions.len().saturating_sub(self.lookback + 1);
        let scored: Vec<bool> = predictions[start..]
            .windows(2)
            .filter(|w| w[1].price != w[0].price)
            .map(|w| (w[0].score > 0.5) == (w[1].price > w[0].price))
            .collect();

        if scored.is_empty() {
            return NEUTRAL_PERFORMANCE;
        }
        scored.iter().filter(|hit| **hit).count() as f64 / scored.len() as f64
    }
}

/// Rolling performance window with a retrain trigger
pub struct PerformanceMonitor {
    samples: BoundedHistory<f64>,
    window: usize,
    threshold: f64,
}

impl PerformanceMonitor {
    pub fn new(window: usize, threshold: f64) -> Self {
        Self {
            samples: BoundedHistory::new(DEFAULT_HISTORY_CAPACITY.max(window)),
            window: window.max(1),
            threshold,
        }
    }

    /// Mean of the last `window` samples, once that many exist
    pub fn rolling_mean(&self) -> Option<f64> {
        if self.samples.len() < self.window {
            return None;
        }
        let recent = self.samples.last_n(self.window);
        Some(recent.iter().sum::<f64>() / recent.len() as f64)
    }

    /// Append a sample; returns the rolling mean when it calls for retraining
    pub fn record(&mut self, sample: f64) -> Option<f64> {
        self.samples.push(sample);
        self.rolling_mean().filter(|mean| *mean < self.threshold)
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}
