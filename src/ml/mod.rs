//! Inference and retraining collaborators.
//!
//! The trading loop only sees the `Predictor` and `Retrainer` traits. The
//! bundled implementations are a JSON dense network and a neutral fallback.

pub mod dense;
pub mod features;
pub mod retrain;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::config::ModelConfig;
use crate::error::{BotError, Result};

pub use dense::{Activation, DenseLayer, DenseNetwork, DensePredictor};
pub use features::{pct_changes, price_change_features};
pub use retrain::{LogOnlyRetrainer, RetrainAck, RetrainDispatcher, RetrainRequest, Retrainer};

/// Score produced for one cycle, with the price it was made at
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub score: f64,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// External inference capability
pub trait Predictor: Send + Sync {
    /// Probability-like score in [0, 1]; above 0.5 favours long
    fn predict(&self, features: &[f64]) -> Result<f64>;

    /// Suggested lot size, validated by the caller
    fn predict_lot_size(&self, features: &[f64]) -> Result<f64>;
}

/// Used when no model is configured: always undecided
#[derive(Debug, Clone)]
pub struct NeutralPredictor {
    lot_size: f64,
}

impl NeutralPredictor {
    pub fn new(lot_size: f64) -> Self {
        Self { lot_size }
    }
}

impl Predictor for NeutralPredictor {
    fn predict(&self, _features: &[f64]) -> Result<f64> {
        Ok(0.5)
    }

    fn predict_lot_size(&self, _features: &[f64]) -> Result<f64> {
        Ok(self.lot_size)
    }
}

/// Build the predictor described by `ModelConfig`
pub fn load_predictor(config: &ModelConfig, fallback_lot_size: f64) -> Result<Arc<dyn Predictor>> {
    let Some(path) = config.path.as_deref() else {
        info!("No model configured, using neutral predictor");
        return Ok(Arc::new(NeutralPredictor::new(fallback_lot_size)));
    };

    let network = DenseNetwork::from_file(path)?;
    if network.input_dim != config.feature_window {
        return Err(BotError::Validation(format!(
            "model {} expects {} features but feature_window is {}",
            path, network.input_dim, config.feature_window
        )));
    }
    info!(path, outputs = network.output_dim(), "Loaded dense model");
    Ok(Arc::new(DensePredictor::new(network, fallback_lot_size)))
}
