use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Direction of an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tradable-symbol metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: String,
}

/// Exchange metadata, fetched once per process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

impl ExchangeInfo {
    /// Check whether a symbol is listed and currently trading
    pub fn is_tradable(&self, symbol: &str) -> bool {
        self.symbols
            .iter()
            .any(|s| s.symbol == symbol && s.status == "TRADING")
    }
}

/// Free balances keyed by asset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountBalance {
    pub free: HashMap<String, Decimal>,
}

impl AccountBalance {
    pub fn free(&self, asset: &str) -> Decimal {
        self.free.get(asset).copied().unwrap_or(Decimal::ZERO)
    }
}

/// One price level of the order book
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// Order book depth, best levels first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Mid price from top of book
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// Spread relative to mid price, `None` when either side is empty
    pub fn relative_spread(&self) -> Option<Decimal> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        let mid = (bid + ask) / Decimal::TWO;
        if mid.is_zero() {
            return None;
        }
        Some((ask - bid) / mid)
    }
}

/// Point-in-time view of one symbol, rebuilt every cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub last_price: Decimal,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

/// OHLC candle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

/// Futures position risk as reported by the exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRisk {
    pub symbol: String,
    pub position_amt: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub leverage: u32,
    /// Placeholder data produced without contacting the exchange
    #[serde(default)]
    pub simulated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn relative_spread_from_top_of_book() {
        let book = OrderBook {
            bids: vec![PriceLevel::new(dec!(99), dec!(1))],
            asks: vec![PriceLevel::new(dec!(101), dec!(1))],
        };
        assert_eq!(book.mid_price(), Some(dec!(100)));
        assert_eq!(book.relative_spread(), Some(dec!(0.02)));
    }

    #[test]
    fn empty_side_has_no_spread() {
        let book = OrderBook {
            bids: vec![],
            asks: vec![PriceLevel::new(dec!(101), dec!(1))],
        };
        assert!(book.relative_spread().is_none());
    }

    #[test]
    fn tradable_requires_trading_status() {
        let info = ExchangeInfo {
            symbols: vec![
                SymbolInfo { symbol: "BTCUSDT".into(), status: "TRADING".into() },
                SymbolInfo { symbol: "LUNAUSDT".into(), status: "BREAK".into() },
            ],
        };
        assert!(info.is_tradable("BTCUSDT"));
        assert!(!info.is_tradable("LUNAUSDT"));
        assert!(!info.is_tradable("DOGEUSDT"));
    }
}
