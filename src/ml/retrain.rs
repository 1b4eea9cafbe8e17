//! Fire-and-forget retraining.
//!
//! The trading loop only ever calls `RetrainDispatcher::dispatch`, which never
//! waits. A background task drains the queue and talks to the `Retrainer`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::Prediction;
use crate::error::Result;

/// Pending requests beyond this are dropped
pub const DEFAULT_RETRAIN_QUEUE: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainRequest {
    pub symbol: String,
    /// Recent closing prices, oldest first
    pub closes: Vec<Decimal>,
    pub predictions: Vec<Prediction>,
    /// Rolling mean that triggered the request
    pub mean_performance: f64,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainAck {
    pub accepted: bool,
    pub message: String,
}

/// External retraining capability
#[async_trait]
pub trait Retrainer: Send + Sync {
    async fn retrain(&self, request: RetrainRequest) -> Result<RetrainAck>;
}

/// Accepts every request and only logs it
pub struct LogOnlyRetrainer;

#[async_trait]
impl Retrainer for LogOnlyRetrainer {
    async fn retrain(&self, request: RetrainRequest) -> Result<RetrainAck> {
        info!(
            symbol = %request.symbol,
            samples = request.closes.len(),
            mean = request.mean_performance,
            "retrain requested"
        );
        Ok(RetrainAck {
            accepted: true,
            message: "logged".to_string(),
        })
    }
}

/// Non-blocking sender side of the retrain queue
#[derive(Clone)]
pub struct RetrainDispatcher {
    tx: mpsc::Sender<RetrainRequest>,
}

impl RetrainDispatcher {
    /// Start the worker and return the dispatcher feeding it
    pub fn spawn(retrainer: Arc<dyn Retrainer>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<RetrainRequest>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let symbol = request.symbol.clone();
                match retrainer.retrain(request).await {
                    Ok(ack) => info!(%symbol, accepted = ack.accepted, "retrain ack: {}", ack.message),
                    Err(e) => warn!(%symbol, "retrain failed: {}", e),
                }
            }
        });
        (Self { tx }, worker)
    }

    /// Queue a request; returns false when it was dropped
    pub fn dispatch(&self, request: RetrainRequest) -> bool {
        match self.tx.try_send(request) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Retrain queue full, request dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Retrain worker stopped, request dropped");
                false
            }
        }
    }
}
