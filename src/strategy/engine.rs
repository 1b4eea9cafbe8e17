//! Trade loop orchestrator.
//!
//! One `TradingEngine` drives one symbol. Each cycle runs: price, risk,
//! spread check, parameter adaptation, decision, performance. Failures inside
//! a cycle are logged and never end the loop; only an unusable initial price
//! prevents it from starting. Operators talk to a running engine through the
//! clone-friendly `EngineHandle`.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, error, info, warn};

use super::decision::{decide, Decision, DecisionEngine, TradingMode};
use super::journal::{Alert, AlertLevel, Journal, PricePoint};
use super::params::{Adaptation, LotSizingMode, ParameterAdapter, TradingParameters};
use super::performance::{DirectionalAccuracy, PerformanceEvaluator, PerformanceMonitor};
use super::risk::{PositionState, RiskController};
use super::snapshot::MarketReader;
use crate::config::{AppConfig, TradingConfig};
use crate::domain::{OrderResult, OrderSide, PositionSide};
use crate::error::{BotError, Result};
use crate::gateway::{Gateway, MetricsSnapshot, SessionState};
use crate::ml::{price_change_features, Prediction, Predictor, RetrainDispatcher, RetrainRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    Idle,
    Running,
    Stopping,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EngineState::Idle => "IDLE",
            EngineState::Running => "RUNNING",
            EngineState::Stopping => "STOPPING",
        };
        write!(f, "{}", s)
    }
}

/// Knobs an operator may change while the loop runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorSettings {
    pub mode: TradingMode,
    pub lot_sizing_mode: LotSizingMode,
    pub manual_lot_size: Decimal,
    pub leverage: u32,
    pub stop_loss_pct: Option<Decimal>,
    pub take_profit_pct: Option<Decimal>,
    pub hedge: bool,
}

impl OperatorSettings {
    pub fn from_config(trading: &TradingConfig) -> Self {
        Self {
            mode: trading.mode,
            lot_sizing_mode: trading.lot_sizing_mode,
            manual_lot_size: trading.manual_lot_size,
            leverage: trading.leverage,
            stop_loss_pct: trading.stop_loss_pct,
            take_profit_pct: trading.take_profit_pct,
            hedge: trading.hedge,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.manual_lot_size <= Decimal::ZERO {
            return Err(BotError::Validation("manual lot size must be positive".to_string()));
        }
        if self.leverage == 0 {
            return Err(BotError::Validation("leverage must be at least 1".to_string()));
        }
        for pct in [self.stop_loss_pct, self.take_profit_pct].into_iter().flatten() {
            if pct <= Decimal::ZERO || pct >= Decimal::ONE {
                return Err(BotError::Validation(format!(
                    "protective distance {} must be between 0 and 1",
                    pct
                )));
            }
        }
        Ok(())
    }
}

/// State shared between the loop and its handles
struct Shared {
    state: RwLock<EngineState>,
    stop_requested: AtomicBool,
    wake: Notify,
    settings: RwLock<OperatorSettings>,
    settings_revision: AtomicU64,
    journal: RwLock<Journal>,
}

/// Operator interface to one engine
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<Shared>,
    gateway: Arc<Gateway>,
}

impl EngineHandle {
    pub async fn state(&self) -> EngineState {
        *self.shared.state.read().await
    }

    /// Ask the loop to finish its current cycle and return to idle
    pub async fn stop(&self) {
        self.shared.stop_requested.store(true, Ordering::SeqCst);
        {
            let mut state = self.shared.state.write().await;
            if *state == EngineState::Running {
                *state = EngineState::Stopping;
            }
        }
        self.shared.wake.notify_one();
        info!("Stop requested");
    }

    pub async fn settings(&self) -> OperatorSettings {
        self.shared.settings.read().await.clone()
    }

    /// Change settings; applied at the start of the next cycle
    pub async fn update_settings<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut OperatorSettings),
    {
        let mut settings = self.shared.settings.write().await;
        let mut updated = settings.clone();
        change(&mut updated);
        updated.validate()?;
        *settings = updated;
        self.shared.settings_revision.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub async fn prices(&self) -> Vec<PricePoint> {
        self.shared.journal.read().await.prices()
    }

    pub async fn predictions(&self) -> Vec<Prediction> {
        self.shared.journal.read().await.predictions()
    }

    pub async fn orders(&self) -> Vec<OrderResult> {
        self.shared.journal.read().await.orders()
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.shared.journal.read().await.alerts()
    }

    pub async fn session_state(&self) -> SessionState {
        self.gateway.state().await
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        self.gateway.metrics().await
    }
}

pub struct TradingEngine {
    config: AppConfig,
    gateway: Arc<Gateway>,
    predictor: Arc<dyn Predictor>,
    evaluator: Box<dyn PerformanceEvaluator>,
    retrain: Option<RetrainDispatcher>,
    shared: Arc<Shared>,
    reader: MarketReader,
    adapter: ParameterAdapter,
    decision: DecisionEngine,
    monitor: PerformanceMonitor,
    params: TradingParameters,
    adaptation: Adaptation,
    applied_revision: u64,
    cadence_unit: Duration,
}

impl TradingEngine {
    pub fn new(config: AppConfig, gateway: Arc<Gateway>, predictor: Arc<dyn Predictor>) -> Self {
        let symbol = config.trading.symbol.clone();
        let shared = Arc::new(Shared {
            state: RwLock::new(EngineState::Idle),
            stop_requested: AtomicBool::new(false),
            wake: Notify::new(),
            settings: RwLock::new(OperatorSettings::from_config(&config.trading)),
            settings_revision: AtomicU64::new(0),
            journal: RwLock::new(Journal::default()),
        });

        Self {
            evaluator: Box::new(DirectionalAccuracy::new(config.monitor.accuracy_lookback)),
            retrain: None,
            reader: MarketReader::new(&symbol),
            adapter: ParameterAdapter::new(config.adaptive.clone(), config.risk.trail_atr_multiplier),
            decision: DecisionEngine::new(&symbol),
            monitor: PerformanceMonitor::new(config.monitor.window, config.monitor.retrain_threshold),
            params: TradingParameters::from_config(&config.trading, &config.adaptive),
            adaptation: Adaptation::default(),
            applied_revision: 0,
            cadence_unit: Duration::from_millis(config.trading.cadence_unit_ms),
            config,
            gateway,
            predictor,
            shared,
        }
    }

    pub fn with_evaluator(mut self, evaluator: Box<dyn PerformanceEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_retrain_dispatcher(mut self, dispatcher: RetrainDispatcher) -> Self {
        self.retrain = Some(dispatcher);
        self
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            shared: self.shared.clone(),
            gateway: self.gateway.clone(),
        }
    }

    pub fn parameters(&self) -> &TradingParameters {
        &self.params
    }

    /// Run until stopped, or for at most `max_cycles` cycles.
    ///
    /// Returns the number of completed cycles. Fails only when the engine is
    /// already running or the initial price is unusable.
    pub async fn run(&mut self, max_cycles: Option<u64>) -> Result<u64> {
        {
            let state = self.shared.state.read().await;
            if *state != EngineState::Idle {
                return Err(BotError::Validation(format!("engine is {}, expected IDLE", state)));
            }
        }
        let entry_price = self.reader.price(&self.gateway).await.map_err(|e| {
            error!("Cannot start trading loop: {}", e);
            BotError::FatalStartup(e.to_string())
        })?;

        *self.shared.state.write().await = EngineState::Running;
        let session = self.gateway.state().await;
        info!(
            symbol = %self.reader.symbol(),
            entry = %entry_price,
            session = %session,
            "trading loop started"
        );

        let mut risk = RiskController::new(
            &self.config.risk,
            PositionState::new(entry_price, PositionSide::Long),
        );
        let mut cycles: u64 = 0;

        loop {
            if self.shared.stop_requested.load(Ordering::SeqCst) {
                info!("Stop honoured at cycle boundary");
                break;
            }
            if matches!(max_cycles, Some(max) if cycles >= max) {
                break;
            }

            self.run_cycle(&mut risk).await;
            cycles += 1;

            if max_cycles == Some(cycles) {
                break;
            }

            let pause = self.params.sleep_interval(self.cadence_unit);
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = self.shared.wake.notified() => {
                    debug!("Sleep interrupted");
                }
            }
        }

        // a stop consumed here must not end the next run
        self.shared.stop_requested.store(false, Ordering::SeqCst);
        *self.shared.state.write().await = EngineState::Idle;
        info!(cycles, "trading loop stopped");
        Ok(cycles)
    }

    async fn run_cycle(&mut self, risk: &mut RiskController) {
        let settings = self.apply_operator_settings().await;
        let symbol = self.reader.symbol().to_string();

        let price = match self.reader.price(&self.gateway).await {
            Ok(price) => price,
            Err(e) => {
                warn!("Cycle skipped: {}", e);
                self.shared
                    .journal
                    .write()
                    .await
                    .alert(AlertLevel::Warning, format!("Cycle skipped: {}", e));
                return;
            }
        };
        self.shared.journal.write().await.record_price(price);

        risk.apply_trailing_stop(price, self.adaptation.trail_distance);
        if let Some(update) = risk.check_break_even(&symbol, price) {
            let ack = self.gateway.update_stop_loss(&update).await;
            self.shared.journal.write().await.alert(
                AlertLevel::Info,
                format!("Stop moved to break-even at {} ({:?})", ack.stop_price, ack.status),
            );
        }

        if let Some(alert) = self
            .gateway
            .detect_order_book_abnormalities(&symbol, self.config.risk.spread_threshold)
            .await
        {
            self.shared
                .journal
                .write()
                .await
                .alert(AlertLevel::Warning, alert.to_string());
        }

        let candles = self
            .gateway
            .klines(&symbol, self.adapter.window_len() as u32)
            .await;
        let closes = self.shared.journal.read().await.closes();
        let features = price_change_features(&closes, self.config.model.feature_window);
        self.adaptation =
            self.adapter
                .adapt(&mut self.params, &candles, self.predictor.as_ref(), &features);

        match settings.mode {
            TradingMode::Manual => {}
            TradingMode::Ai => self.trade_on_prediction(risk, settings.hedge, &features, price).await,
        }

        self.monitor_performance(&symbol).await;
    }

    /// Copy operator changes into the working parameters
    async fn apply_operator_settings(&mut self) -> OperatorSettings {
        let settings = self.shared.settings.read().await.clone();
        let revision = self.shared.settings_revision.load(Ordering::SeqCst);
        if revision != self.applied_revision {
            self.params.lot_sizing_mode = settings.lot_sizing_mode;
            self.params.manual_lot_size = settings.manual_lot_size;
            self.params.leverage = settings.leverage;
            self.params.stop_loss_pct = settings.stop_loss_pct;
            self.params.take_profit_pct = settings.take_profit_pct;
            if settings.lot_sizing_mode == LotSizingMode::Manual {
                self.params.lot_size = settings.manual_lot_size;
            }
            self.applied_revision = revision;
            info!(
                mode = %settings.mode,
                lot_sizing = %settings.lot_sizing_mode,
                hedge = settings.hedge,
                "operator settings applied"
            );
        }
        settings
    }

    async fn trade_on_prediction(
        &self,
        risk: &mut RiskController,
        hedge: bool,
        features: &[f64],
        price: Decimal,
    ) {
        let score = match self.predictor.predict(features) {
            Ok(score) if score.is_finite() => score.clamp(0.0, 1.0),
            Ok(score) => {
                warn!("Discarding non-finite score {}", score);
                return;
            }
            Err(e) => {
                warn!("Inference failed: {}", e);
                return;
            }
        };

        let is_short = match decide(score, hedge) {
            Decision::OpenLong => Some(false),
            Decision::OpenShort => Some(true),
            Decision::Hold => {
                info!(score, "Balanced score, holding");
                None
            }
        };
        let opened = match is_short {
            Some(is_short) => Some(
                self.decision
                    .execute_trade(&self.gateway, &self.params, OrderSide::Buy, is_short, price)
                    .await,
            ),
            None => None,
        };

        {
            let mut journal = self.shared.journal.write().await;
            if let Some(order) = &opened {
                DecisionEngine::record_trade(&mut journal, order, price, self.params.leverage);
            }
            journal.record_prediction(score, price);
        }

        if let Some(order) = opened {
            risk.reset(order.avg_price.unwrap_or(price), order.side.opens());
        }
    }

    async fn monitor_performance(&mut self, symbol: &str) {
        let journal = self.shared.journal.read().await;
        let sample = self.evaluator.evaluate(&journal.predictions());
        let Some(mean) = self.monitor.record(sample) else {
            return;
        };

        let Some(dispatcher) = &self.retrain else {
            debug!(mean, "Performance below threshold, no retrainer attached");
            return;
        };
        let request = RetrainRequest {
            symbol: symbol.to_string(),
            closes: journal.recent_closes(self.config.monitor.retrain_sample_size),
            predictions: journal.recent_predictions(self.config.monitor.accuracy_lookback),
            mean_performance: mean,
            requested_at: Utc::now(),
        };
        drop(journal);

        if dispatcher.dispatch(request) {
            info!(mean, "Performance below threshold, retrain dispatched");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::SimulatedExchange;
    use rust_decimal_macros::dec;

    fn engine(mode: TradingMode) -> TradingEngine {
        let mut config = AppConfig::default_config("BTCUSDT");
        config.trading.mode = mode;
        config.trading.cadence_unit_ms = 1;
        let gateway = Arc::new(Gateway::new(Arc::new(SimulatedExchange::new())));
        TradingEngine::new(config, gateway, Arc::new(crate::ml::NeutralPredictor::new(0.001)))
    }

    #[tokio::test]
    async fn capped_run_returns_to_idle() {
        let mut engine = engine(TradingMode::Manual);
        let handle = engine.handle();
        let cycles = engine.run(Some(3)).await.expect("runs");
        assert_eq!(cycles, 3);
        assert_eq!(handle.state().await, EngineState::Idle);
        assert_eq!(handle.prices().await.len(), 3);
        assert!(handle.orders().await.is_empty());
        assert!(handle.predictions().await.is_empty());
    }

    #[tokio::test]
    async fn stop_ends_an_uncapped_run() {
        let mut engine = engine(TradingMode::Manual);
        let handle = engine.handle();
        let task = tokio::spawn(async move { engine.run(None).await });

        while handle.prices().await.len() < 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        handle.stop().await;

        let cycles = task.await.expect("join").expect("run");
        assert!(cycles >= 2);
        assert_eq!(handle.state().await, EngineState::Idle);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn run_future_is_send() {
        let mut engine = engine(TradingMode::Ai);
        let run = engine.run(Some(1));
        assert_send(&run);
        assert_eq!(run.await.expect("runs"), 1);
    }

    #[tokio::test]
    async fn stop_before_first_poll_is_honoured() {
        let mut engine = engine(TradingMode::Manual);
        let handle = engine.handle();
        handle.stop().await;

        let cycles = tokio::time::timeout(Duration::from_secs(5), engine.run(None))
            .await
            .expect("run returns")
            .expect("runs");
        assert_eq!(cycles, 0);
        assert_eq!(handle.state().await, EngineState::Idle);

        // the consumed stop does not leak into the next run
        assert_eq!(engine.run(Some(2)).await.expect("runs"), 2);
    }

    #[tokio::test]
    async fn invalid_settings_are_rejected() {
        let engine = engine(TradingMode::Manual);
        let handle = engine.handle();
        assert!(handle
            .update_settings(|s| s.manual_lot_size = Decimal::ZERO)
            .await
            .is_err());
        assert_eq!(handle.settings().await.manual_lot_size, dec!(0.001));

        handle
            .update_settings(|s| {
                s.mode = TradingMode::Ai;
                s.hedge = true;
            })
            .await
            .expect("valid change");
        assert!(handle.settings().await.hedge);
    }

    #[tokio::test]
    async fn settings_reach_parameters_on_next_cycle() {
        let mut engine = engine(TradingMode::Manual);
        let handle = engine.handle();
        handle
            .update_settings(|s| {
                s.lot_sizing_mode = LotSizingMode::Manual;
                s.manual_lot_size = dec!(0.05);
            })
            .await
            .expect("valid change");

        engine.run(Some(1)).await.expect("runs");
        assert_eq!(engine.parameters().lot_size, dec!(0.05));
    }

    #[tokio::test]
    async fn directional_ai_mode_trades_every_cycle() {
        let mut engine = engine(TradingMode::Ai);
        let handle = engine.handle();
        engine.run(Some(4)).await.expect("runs");

        // neutral score without hedge goes short
        let orders = handle.orders().await;
        assert_eq!(orders.len(), 4);
        assert!(orders.iter().all(|o| o.side == OrderSide::Sell));
        assert_eq!(handle.predictions().await.len(), 4);
    }
}
