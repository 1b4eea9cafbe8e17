//! Trailing stop and break-even management for the open position.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RiskConfig;
use crate::domain::{PositionSide, StopLossUpdate};

/// Stop state for one position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionState {
    pub entry_price: Decimal,
    pub side: PositionSide,
    pub trailing_stop: Option<Decimal>,
    /// One-shot per position
    pub break_even_triggered: bool,
    /// Reused for every stop amendment of this position
    pub stop_client_id: String,
}

impl PositionState {
    pub fn new(entry_price: Decimal, side: PositionSide) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self {
            entry_price,
            side,
            trailing_stop: None,
            break_even_triggered: false,
            stop_client_id: format!("be-{}", &id[..16]),
        }
    }
}

pub struct RiskController {
    fallback_trail_pct: Decimal,
    break_even_threshold: Decimal,
    position: PositionState,
}

impl RiskController {
    pub fn new(config: &RiskConfig, position: PositionState) -> Self {
        Self {
            fallback_trail_pct: config.fallback_trail_pct,
            break_even_threshold: config.break_even_threshold,
            position,
        }
    }

    pub fn position(&self) -> &PositionState {
        &self.position
    }

    /// Start tracking a freshly opened position
    pub fn reset(&mut self, entry_price: Decimal, side: PositionSide) {
        debug!("Tracking new {} position at {}", side, entry_price);
        self.position = PositionState::new(entry_price, side);
    }

    /// Ratchet the trailing stop toward `current_price`.
    ///
    /// Uses `trail_distance` (ATR based) when known, else a fixed percentage
    /// of price. Returns the new stop when it moved.
    pub fn apply_trailing_stop(
        &mut self,
        current_price: Decimal,
        trail_distance: Option<Decimal>,
    ) -> Option<Decimal> {
        let side = self.position.side;
        let proposed = match (side, trail_distance) {
            (PositionSide::Long, Some(d)) => current_price - d,
            (PositionSide::Long, None) => current_price * (Decimal::ONE - self.fallback_trail_pct),
            (PositionSide::Short, Some(d)) => current_price + d,
            (PositionSide::Short, None) => current_price * (Decimal::ONE + self.fallback_trail_pct),
        };

        let improves = match (self.position.trailing_stop, side) {
            (None, _) => true,
            (Some(stop), PositionSide::Long) => proposed > stop,
            (Some(stop), PositionSide::Short) => proposed < stop,
        };
        if !improves {
            return None;
        }

        self.position.trailing_stop = Some(proposed);
        debug!("Trailing stop for {} moved to {}", side, proposed);
        Some(proposed)
    }

    /// Once price clears entry by the threshold, emit a single stop move to entry
    pub fn check_break_even(&mut self, symbol: &str, current_price: Decimal) -> Option<StopLossUpdate> {
        if self.position.break_even_triggered || self.position.entry_price <= Decimal::ZERO {
            return None;
        }

        let entry = self.position.entry_price;
        let reached = match self.position.side {
            PositionSide::Long => current_price >= entry * self.break_even_threshold,
            PositionSide::Short => current_price <= entry / self.break_even_threshold,
        };
        if !reached {
            return None;
        }

        self.position.break_even_triggered = true;
        info!(
            "Break-even reached at {} (entry {}), moving stop to entry",
            current_price, entry
        );
        Some(StopLossUpdate {
            client_order_id: self.position.stop_client_id.clone(),
            symbol: symbol.to_string(),
            position_side: self.position.side,
            stop_price: entry,
        })
    }
}
