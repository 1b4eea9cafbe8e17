use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PositionSide;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn flip(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// Position opened by an order on this side
    pub fn opens(&self) -> PositionSide {
        match self {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        }
    }

    /// Side that closes a position
    pub fn closing(side: PositionSide) -> Self {
        match side {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    StopMarket,
    TakeProfitMarket,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::StopMarket => "STOP_MARKET",
            OrderType::TakeProfitMarket => "TAKE_PROFIT_MARKET",
        }
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
    /// Produced locally without contacting the exchange
    Simulated,
}

impl OrderStatus {
    /// Map an exchange status string, unknown values count as `New`
    pub fn from_exchange(raw: &str) -> Self {
        match raw {
            "FILLED" => OrderStatus::Filled,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "CANCELED" | "CANCELLED" => OrderStatus::Cancelled,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" => OrderStatus::Expired,
            _ => OrderStatus::New,
        }
    }
}

/// Order request (what we want to do)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub order_type: OrderType,
    /// Route to the futures (leveraged) venue
    pub futures: bool,
    /// Protective stop placed after the entry fills
    pub stop_loss: Option<Decimal>,
    /// Take-profit placed after the entry fills
    pub take_profit: Option<Decimal>,
    /// Leverage to apply before a futures entry
    pub leverage: Option<u32>,
}

impl OrderRequest {
    pub fn futures_market(symbol: &str, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            quantity,
            order_type: OrderType::Market,
            futures: true,
            stop_loss: None,
            take_profit: None,
            leverage: None,
        }
    }

    pub fn with_leverage(mut self, leverage: u32) -> Self {
        self.leverage = Some(leverage);
        self
    }

    pub fn with_protection(mut self, stop_loss: Option<Decimal>, take_profit: Option<Decimal>) -> Self {
        self.stop_loss = stop_loss;
        self.take_profit = take_profit;
        self
    }
}

/// Exchange acknowledgement of a submitted order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub avg_price: Option<Decimal>,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
}

impl OrderResult {
    /// Local placeholder for an order that never reached the exchange
    pub fn simulated(request: &OrderRequest) -> Self {
        Self {
            client_order_id: request.client_order_id.clone(),
            exchange_order_id: None,
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            avg_price: None,
            status: OrderStatus::Simulated,
            timestamp: Utc::now(),
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.status == OrderStatus::Simulated
    }
}

impl std::fmt::Display for OrderResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} status={:?}",
            self.side, self.quantity, self.symbol, self.status
        )?;
        if let Some(id) = &self.exchange_order_id {
            write!(f, " id={}", id)?;
        }
        Ok(())
    }
}

/// Stop-loss amendment request for an open position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopLossUpdate {
    /// Stable per position so repeated submissions are deduplicated upstream
    pub client_order_id: String,
    pub symbol: String,
    pub position_side: PositionSide,
    pub stop_price: Decimal,
}

/// Outcome of a stop-loss amendment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopLossAck {
    pub client_order_id: String,
    pub stop_price: Decimal,
    pub status: OrderStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_swaps_sides() {
        assert_eq!(OrderSide::Buy.flip(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.flip(), OrderSide::Buy);
    }

    #[test]
    fn closing_side_is_opposite_of_opening() {
        assert_eq!(OrderSide::closing(PositionSide::Long), OrderSide::Sell);
        assert_eq!(OrderSide::closing(PositionSide::Short), OrderSide::Buy);
        assert_eq!(OrderSide::Sell.opens(), PositionSide::Short);
    }

    #[test]
    fn exchange_status_mapping() {
        assert_eq!(OrderStatus::from_exchange("FILLED"), OrderStatus::Filled);
        assert_eq!(OrderStatus::from_exchange("CANCELED"), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::from_exchange("WHATEVER"), OrderStatus::New);
    }
}
