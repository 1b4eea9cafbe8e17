pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod gateway;
pub mod history;
pub mod ml;
pub mod signing;
pub mod strategy;

pub use config::AppConfig;
pub use error::{BotError, Result};
pub use exchange::{ExchangeClient, ExchangeKind, SimulatedExchange};
pub use gateway::{Gateway, MetricsSnapshot, SessionState};
pub use history::BoundedHistory;
pub use strategy::{EngineHandle, EngineState, OperatorSettings, TradingEngine};
