//! Adaptive trading control loop.
//!
//! - `indicators` - ATR and volatility over the candle window
//! - `params` - lot size / leverage / cadence adaptation
//! - `risk` - trailing stop and break-even
//! - `decision` - score to action, order submission
//! - `performance` - rolling evaluation and retrain trigger
//! - `engine` - the orchestrating loop and its operator handle

pub mod decision;
pub mod engine;
pub mod indicators;
pub mod journal;
pub mod params;
pub mod performance;
pub mod risk;
pub mod snapshot;

pub use decision::{decide, Decision, DecisionEngine, TradingMode};
pub use engine::{EngineHandle, EngineState, OperatorSettings, TradingEngine};
pub use journal::{Alert, AlertLevel, Journal, PricePoint};
pub use params::{Adaptation, LotSizingMode, ParameterAdapter, TradingParameters};
pub use performance::{DirectionalAccuracy, PerformanceEvaluator, PerformanceMonitor};
pub use risk::{PositionState, RiskController};
pub use snapshot::MarketReader;
