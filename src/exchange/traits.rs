use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::{
    AccountBalance, Candle, ExchangeInfo, OrderBook, OrderRequest, OrderResult, PositionRisk,
    StopLossAck, StopLossUpdate,
};
use crate::error::{BotError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    Binance,
    Simulated,
}

impl Default for ExchangeKind {
    fn default() -> Self {
        Self::Binance
    }
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Simulated => "simulated",
        }
    }
}

impl std::fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExchangeKind {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "binance" | "bn" => Ok(Self::Binance),
            "simulated" | "sim" | "paper" => Ok(Self::Simulated),
            _ => Err("invalid exchange; expected binance|simulated"),
        }
    }
}

pub fn parse_exchange_kind(raw: &str) -> Result<ExchangeKind> {
    ExchangeKind::from_str(raw).map_err(|e| BotError::Validation(e.to_string()))
}

/// Remote exchange capability consumed through the gateway.
///
/// Implementations report failures as errors; retry, fallback and metrics
/// are the gateway's concern.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    fn kind(&self) -> ExchangeKind;

    /// Establish or verify the session with the exchange
    async fn handshake(&self) -> Result<()>;

    async fn exchange_info(&self) -> Result<ExchangeInfo>;

    async fn account_balance(&self) -> Result<AccountBalance>;

    async fn symbol_price(&self, symbol: &str) -> Result<Decimal>;

    async fn order_book(&self, symbol: &str, depth: u32) -> Result<OrderBook>;

    /// Most recent `limit` candles, oldest first
    async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>>;

    async fn position_risk(&self, symbol: &str) -> Result<PositionRisk>;

    async fn create_order(&self, request: &OrderRequest) -> Result<OrderResult>;

    async fn update_stop_loss(&self, update: &StopLossUpdate) -> Result<StopLossAck>;

    /// Release the session and forget credentials
    async fn close(&self) {}
}
