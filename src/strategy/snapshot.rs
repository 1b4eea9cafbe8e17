use chrono::Utc;
use rust_decimal::Decimal;

use crate::domain::{AccountBalance, MarketSnapshot};
use crate::error::{BotError, Result};
use crate::gateway::Gateway;

/// Reads market state for one symbol through the gateway
#[derive(Debug, Clone)]
pub struct MarketReader {
    symbol: String,
}

impl MarketReader {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Last price, rejected unless strictly positive
    pub async fn price(&self, gateway: &Gateway) -> Result<Decimal> {
        let price = gateway.symbol_price(&self.symbol).await;
        if price <= Decimal::ZERO {
            return Err(BotError::InvalidMarketData(format!(
                "{} price {} is not positive",
                self.symbol, price
            )));
        }
        Ok(price)
    }

    pub async fn snapshot(&self, gateway: &Gateway) -> Result<MarketSnapshot> {
        let last_price = self.price(gateway).await?;
        let book = gateway.order_book(&self.symbol).await;
        Ok(MarketSnapshot {
            symbol: self.symbol.clone(),
            last_price,
            best_bid: book.best_bid(),
            best_ask: book.best_ask(),
            timestamp: Utc::now(),
        })
    }

    pub async fn account(&self, gateway: &Gateway) -> AccountBalance {
        gateway.account_balance().await
    }
}
