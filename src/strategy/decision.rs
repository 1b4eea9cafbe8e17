use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;

use super::journal::{AlertLevel, Journal};
use super::params::TradingParameters;
use crate::domain::{OrderRequest, OrderResult, OrderSide};
use crate::gateway::Gateway;

/// Score above which a directional (non-hedge) cycle goes long
pub const DIRECTIONAL_THRESHOLD: f64 = 0.5;
/// Hedge mode opens long only above this score
pub const HEDGE_LONG_THRESHOLD: f64 = 0.55;
/// Hedge mode opens short only below this score
pub const HEDGE_SHORT_THRESHOLD: f64 = 0.45;

/// Whether the loop places orders on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    /// Observe only
    Manual,
    #[serde(alias = "AI")]
    Ai,
}

impl TradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingMode::Manual => "manual",
            TradingMode::Ai => "ai",
        }
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TradingMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "ai" | "auto" => Ok(Self::Ai),
            other => Err(format!("invalid trading mode '{other}'; expected manual|ai")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    OpenLong,
    OpenShort,
    /// Hedge mode with a balanced score
    Hold,
}

/// Map a model score to an action
pub fn decide(score: f64, hedge: bool) -> Decision {
    if hedge {
        if score > HEDGE_LONG_THRESHOLD {
            Decision::OpenLong
        } else if score < HEDGE_SHORT_THRESHOLD {
            Decision::OpenShort
        } else {
            Decision::Hold
        }
    } else if score > DIRECTIONAL_THRESHOLD {
        Decision::OpenLong
    } else {
        Decision::OpenShort
    }
}

/// Turns decisions into futures market orders
pub struct DecisionEngine {
    symbol: String,
}

impl DecisionEngine {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
        }
    }

    /// Protective stop/take-profit levels for an entry at `price`
    pub fn protection(
        side: OrderSide,
        price: Decimal,
        params: &TradingParameters,
    ) -> (Option<Decimal>, Option<Decimal>) {
        let below = |pct: Decimal| price * (Decimal::ONE - pct);
        let above = |pct: Decimal| price * (Decimal::ONE + pct);
        match side {
            OrderSide::Buy => (params.stop_loss_pct.map(below), params.take_profit_pct.map(above)),
            OrderSide::Sell => (params.stop_loss_pct.map(above), params.take_profit_pct.map(below)),
        }
    }

    /// Submit a leveraged market order; `is_short` flips the requested side
    pub async fn execute_trade(
        &self,
        gateway: &Gateway,
        params: &TradingParameters,
        side: OrderSide,
        is_short: bool,
        price: Decimal,
    ) -> OrderResult {
        let side = if is_short { side.flip() } else { side };
        let (stop_loss, take_profit) = Self::protection(side, price, params);

        let request = OrderRequest::futures_market(&self.symbol, side, params.lot_size)
            .with_leverage(params.leverage)
            .with_protection(stop_loss, take_profit);

        let result = gateway.create_order(&request).await;
        info!(
            side = %side,
            qty = %params.lot_size,
            leverage = params.leverage,
            simulated = result.is_simulated(),
            "order submitted"
        );
        result
    }

    /// Append a submitted order and its alert line to the journal
    pub fn record_trade(journal: &mut Journal, result: &OrderResult, price: Decimal, leverage: u32) {
        journal.alert(
            AlertLevel::Info,
            format!("{} order: {} @ ~{} x{}", result.side.opens(), result, price, leverage),
        );
        journal.record_order(result.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdaptiveConfig, TradingConfig};
    use crate::exchange::SimulatedExchange;
    use crate::gateway::SessionState;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn hedge_boundaries() {
        assert_eq!(decide(0.50, true), Decision::Hold);
        assert_eq!(decide(0.55, true), Decision::Hold);
        assert_eq!(decide(0.45, true), Decision::Hold);
        assert_eq!(decide(0.56, true), Decision::OpenLong);
        assert_eq!(decide(0.44, true), Decision::OpenShort);
    }

    #[test]
    fn directional_mode_always_acts() {
        assert_eq!(decide(0.51, false), Decision::OpenLong);
        assert_eq!(decide(0.50, false), Decision::OpenShort);
        assert_eq!(decide(0.0, false), Decision::OpenShort);
    }

    #[test]
    fn protection_mirrors_for_shorts() {
        let mut trading = TradingConfig::default();
        trading.stop_loss_pct = Some(dec!(0.01));
        trading.take_profit_pct = Some(dec!(0.02));
        let params = TradingParameters::from_config(&trading, &AdaptiveConfig::default());

        assert_eq!(
            DecisionEngine::protection(OrderSide::Buy, dec!(100), &params),
            (Some(dec!(99)), Some(dec!(102)))
        );
        assert_eq!(
            DecisionEngine::protection(OrderSide::Sell, dec!(100), &params),
            (Some(dec!(101)), Some(dec!(98)))
        );
    }

    #[tokio::test]
    async fn short_trade_flips_to_sell_and_is_journaled() {
        let gateway = Gateway::new(Arc::new(SimulatedExchange::new()));
        assert_eq!(gateway.connect_with_retry(1, Duration::ZERO).await, SessionState::Connected);

        let params = TradingParameters::from_config(&TradingConfig::default(), &AdaptiveConfig::default());
        let mut journal = Journal::default();
        let engine = DecisionEngine::new("BTCUSDT");

        let result = engine
            .execute_trade(&gateway, &params, OrderSide::Buy, true, dec!(50000))
            .await;
        DecisionEngine::record_trade(&mut journal, &result, dec!(50000), params.leverage);

        assert_eq!(result.side, OrderSide::Sell);
        assert_eq!(result.quantity, params.lot_size);
        assert_eq!(journal.orders().len(), 1);
        assert_eq!(journal.alerts().len(), 1);
        assert!(journal.alerts()[0].message.contains("SHORT"));
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("AI".parse::<TradingMode>(), Ok(TradingMode::Ai));
        assert!("yolo".parse::<TradingMode>().is_err());
    }
}
