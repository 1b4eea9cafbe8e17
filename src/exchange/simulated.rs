//! Deterministic placeholder exchange
//!
//! Supplies the values the gateway falls back to when a call fails or the
//! session is degraded. Also usable as a paper exchange: every call succeeds.

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

use super::{ExchangeClient, ExchangeKind};
use crate::domain::{
    AccountBalance, Candle, ExchangeInfo, OrderBook, OrderRequest, OrderResult, OrderStatus,
    PositionRisk, StopLossAck, StopLossUpdate, SymbolInfo,
};
use crate::error::Result;

/// Placeholder last price
pub const SIMULATED_PRICE: Decimal = dec!(50000);
/// Half of the placeholder candle range
const SIMULATED_HALF_RANGE: Decimal = dec!(250);

#[derive(Debug, Clone, Default)]
pub struct SimulatedExchange;

impl SimulatedExchange {
    pub fn new() -> Self {
        Self
    }

    pub fn exchange_info_value(&self) -> ExchangeInfo {
        ExchangeInfo {
            symbols: ["BTCUSDT", "ETHUSDT"]
                .iter()
                .map(|s| SymbolInfo {
                    symbol: s.to_string(),
                    status: "TRADING".to_string(),
                })
                .collect(),
        }
    }

    pub fn account_balance_value(&self) -> AccountBalance {
        let mut free = HashMap::new();
        free.insert("BTC".to_string(), Decimal::ZERO);
        free.insert("USDT".to_string(), dec!(1000));
        AccountBalance { free }
    }

    pub fn price_value(&self, _symbol: &str) -> Decimal {
        SIMULATED_PRICE
    }

    /// Empty book, so spread checks stay quiet in simulation
    pub fn order_book_value(&self, _symbol: &str) -> OrderBook {
        OrderBook::default()
    }

    /// Flat candles with a constant range, one minute apart
    pub fn klines_value(&self, _symbol: &str, limit: u32) -> Vec<Candle> {
        let anchor = Utc
            .timestamp_opt(1_700_000_000, 0)
            .single()
            .unwrap_or_else(Utc::now);
        (0..limit)
            .map(|i| Candle {
                open_time: anchor + Duration::minutes(i as i64),
                open: SIMULATED_PRICE,
                high: SIMULATED_PRICE + SIMULATED_HALF_RANGE,
                low: SIMULATED_PRICE - SIMULATED_HALF_RANGE,
                close: SIMULATED_PRICE,
            })
            .collect()
    }

    pub fn position_risk_value(&self, symbol: &str) -> PositionRisk {
        PositionRisk {
            symbol: symbol.to_string(),
            position_amt: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            mark_price: SIMULATED_PRICE,
            unrealized_pnl: Decimal::ZERO,
            leverage: 1,
            simulated: true,
        }
    }

    pub fn order_value(&self, request: &OrderRequest) -> OrderResult {
        OrderResult::simulated(request)
    }

    pub fn stop_loss_value(&self, update: &StopLossUpdate) -> StopLossAck {
        StopLossAck {
            client_order_id: update.client_order_id.clone(),
            stop_price: update.stop_price,
            status: OrderStatus::Simulated,
        }
    }
}

#[async_trait]
impl ExchangeClient for SimulatedExchange {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Simulated
    }

    async fn handshake(&self) -> Result<()> {
        Ok(())
    }

    async fn exchange_info(&self) -> Result<ExchangeInfo> {
        Ok(self.exchange_info_value())
    }

    async fn account_balance(&self) -> Result<AccountBalance> {
        Ok(self.account_balance_value())
    }

    async fn symbol_price(&self, symbol: &str) -> Result<Decimal> {
        Ok(self.price_value(symbol))
    }

    async fn order_book(&self, symbol: &str, _depth: u32) -> Result<OrderBook> {
        Ok(self.order_book_value(symbol))
    }

    async fn klines(&self, symbol: &str, _interval: &str, limit: u32) -> Result<Vec<Candle>> {
        Ok(self.klines_value(symbol, limit))
    }

    async fn position_risk(&self, symbol: &str) -> Result<PositionRisk> {
        Ok(self.position_risk_value(symbol))
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<OrderResult> {
        Ok(self.order_value(request))
    }

    async fn update_stop_loss(&self, update: &StopLossUpdate) -> Result<StopLossAck> {
        Ok(self.stop_loss_value(update))
    }
}
