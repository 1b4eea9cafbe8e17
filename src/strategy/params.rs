use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use super::indicators::{average_true_range, volatility};
use crate::config::{AdaptiveConfig, TradingConfig};
use crate::domain::Candle;
use crate::ml::Predictor;

/// How the per-order quantity is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LotSizingMode {
    Manual,
    #[serde(alias = "ATR")]
    Atr,
    #[serde(alias = "AI")]
    Ai,
}

impl LotSizingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotSizingMode::Manual => "manual",
            LotSizingMode::Atr => "atr",
            LotSizingMode::Ai => "ai",
        }
    }
}

impl std::fmt::Display for LotSizingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LotSizingMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "atr" => Ok(Self::Atr),
            "ai" => Ok(Self::Ai),
            other => Err(format!("invalid lot sizing mode '{other}'; expected manual|atr|ai")),
        }
    }
}

/// Per-cycle trading parameters, rewritten by the adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingParameters {
    pub lot_sizing_mode: LotSizingMode,
    /// Always > 0
    pub lot_size: Decimal,
    pub manual_lot_size: Decimal,
    pub leverage: u32,
    /// Pause between cycles, in cadence units
    pub sleep_units: u32,
    pub stop_loss_pct: Option<Decimal>,
    pub take_profit_pct: Option<Decimal>,
}

impl TradingParameters {
    pub fn from_config(trading: &TradingConfig, adaptive: &AdaptiveConfig) -> Self {
        Self {
            lot_sizing_mode: trading.lot_sizing_mode,
            lot_size: trading.manual_lot_size,
            manual_lot_size: trading.manual_lot_size,
            leverage: trading.leverage,
            sleep_units: adaptive.low_vol_sleep_units,
            stop_loss_pct: trading.stop_loss_pct,
            take_profit_pct: trading.take_profit_pct,
        }
    }

    pub fn sleep_interval(&self, unit: Duration) -> Duration {
        unit * self.sleep_units
    }
}

/// Readings from the latest adaptation, shared with the risk controller
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Adaptation {
    pub atr: Option<Decimal>,
    pub volatility: Option<f64>,
    /// ATR x trail multiplier; `None` when ATR is unknown or zero
    pub trail_distance: Option<Decimal>,
}

/// Derives lot size, leverage and cadence from ATR and volatility
#[derive(Debug, Clone)]
pub struct ParameterAdapter {
    config: AdaptiveConfig,
    trail_multiplier: Decimal,
}

impl ParameterAdapter {
    pub fn new(config: AdaptiveConfig, trail_multiplier: Decimal) -> Self {
        Self {
            config,
            trail_multiplier,
        }
    }

    /// Candles needed for one full reading
    pub fn window_len(&self) -> usize {
        self.config.atr_period + 1
    }

    pub fn measure(&self, candles: &[Candle]) -> Adaptation {
        let atr = average_true_range(candles, self.config.atr_period);
        Adaptation {
            atr,
            volatility: volatility(candles, self.config.atr_period),
            trail_distance: atr
                .filter(|a| !a.is_zero())
                .map(|a| a * self.trail_multiplier),
        }
    }

    pub fn lot_size_for_atr(&self, atr: Decimal) -> Decimal {
        if atr > self.config.atr_lot_threshold {
            self.config.atr_high_lot
        } else {
            self.config.atr_low_lot
        }
    }

    pub fn leverage_for(&self, volatility: f64) -> u32 {
        if volatility > self.config.volatility_threshold {
            self.config.high_vol_leverage
        } else {
            self.config.low_vol_leverage
        }
    }

    pub fn sleep_units_for(&self, volatility: f64) -> u32 {
        if volatility > self.config.volatility_threshold {
            self.config.high_vol_sleep_units
        } else {
            self.config.low_vol_sleep_units
        }
    }

    /// Rewrite `params` for this cycle.
    ///
    /// Missing readings or a rejected model lot keep the previous values.
    pub fn adapt(
        &self,
        params: &mut TradingParameters,
        candles: &[Candle],
        predictor: &dyn Predictor,
        features: &[f64],
    ) -> Adaptation {
        let reading = self.measure(candles);

        match params.lot_sizing_mode {
            LotSizingMode::Manual => params.lot_size = params.manual_lot_size,
            LotSizingMode::Atr => {
                if let Some(atr) = reading.atr {
                    params.lot_size = self.lot_size_for_atr(atr);
                }
            }
            LotSizingMode::Ai => match predictor.predict_lot_size(features) {
                Ok(raw) => match valid_lot(raw) {
                    Some(lot) => params.lot_size = lot,
                    None => warn!("Model lot size {} rejected, keeping {}", raw, params.lot_size),
                },
                Err(e) => warn!("Lot size inference failed: {}, keeping {}", e, params.lot_size),
            },
        }

        if let Some(vol) = reading.volatility {
            params.leverage = self.leverage_for(vol);
            params.sleep_units = self.sleep_units_for(vol);
        }

        debug!(
            atr = ?reading.atr,
            volatility = ?reading.volatility,
            lot = %params.lot_size,
            leverage = params.leverage,
            sleep_units = params.sleep_units,
            "parameters adapted"
        );
        reading
    }
}

fn valid_lot(raw: f64) -> Option<Decimal> {
    if !raw.is_finite() || raw <= 0.0 {
        return None;
    }
    Decimal::from_f64(raw).filter(|d| *d > Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BotError, Result};
    use crate::strategy::indicators::tests::candles;
    use rust_decimal_macros::dec;

    struct FixedLot(f64);

    impl Predictor for FixedLot {
        fn predict(&self, _features: &[f64]) -> Result<f64> {
            Ok(0.5)
        }

        fn predict_lot_size(&self, _features: &[f64]) -> Result<f64> {
            if self.0.is_nan() {
                return Err(BotError::Internal("model offline".into()));
            }
            Ok(self.0)
        }
    }

    fn adapter() -> ParameterAdapter {
        ParameterAdapter::new(AdaptiveConfig::default(), dec!(1.5))
    }

    fn params(mode: LotSizingMode) -> TradingParameters {
        let mut trading = TradingConfig::default();
        trading.lot_sizing_mode = mode;
        trading.manual_lot_size = dec!(0.005);
        TradingParameters::from_config(&trading, &AdaptiveConfig::default())
    }

    #[test]
    fn atr_lot_boundary() {
        let adapter = adapter();
        assert_eq!(adapter.lot_size_for_atr(dec!(49)), dec!(0.001));
        assert_eq!(adapter.lot_size_for_atr(dec!(50)), dec!(0.001));
        assert_eq!(adapter.lot_size_for_atr(dec!(51)), dec!(0.002));
    }

    #[test]
    fn atr_mode_sizes_from_candle_window() {
        let adapter = adapter();
        let mut p = params(LotSizingMode::Atr);

        // flat closes with a 49 range => ATR 49
        let reading = adapter.adapt(&mut p, &candles(&[dec!(100); 15], dec!(24.5)), &FixedLot(1.0), &[]);
        assert_eq!(reading.atr, Some(dec!(49)));
        assert_eq!(p.lot_size, dec!(0.001));
        assert_eq!(reading.trail_distance, Some(dec!(73.5)));

        adapter.adapt(&mut p, &candles(&[dec!(100); 15], dec!(25.5)), &FixedLot(1.0), &[]);
        assert_eq!(p.lot_size, dec!(0.002));
    }

    #[test]
    fn zero_atr_leaves_trail_to_the_fallback() {
        let adapter = adapter();
        let reading = adapter.measure(&candles(&[dec!(100); 15], Decimal::ZERO));
        assert_eq!(reading.atr, Some(Decimal::ZERO));
        assert_eq!(reading.trail_distance, None);

        let config = crate::config::RiskConfig::default();
        let mut risk = crate::strategy::RiskController::new(
            &config,
            crate::strategy::PositionState::new(dec!(100), crate::domain::PositionSide::Long),
        );
        assert_eq!(
            risk.apply_trailing_stop(dec!(100), reading.trail_distance),
            Some(dec!(98))
        );
    }

    #[test]
    fn volatility_drives_leverage_and_cadence() {
        let adapter = adapter();
        let mut p = params(LotSizingMode::Manual);

        let calm = candles(&[dec!(100); 15], dec!(1));
        adapter.adapt(&mut p, &calm, &FixedLot(1.0), &[]);
        assert_eq!((p.leverage, p.sleep_units), (10, 5));
        assert_eq!(p.lot_size, dec!(0.005));

        let swings: Vec<Decimal> = (0..15)
            .map(|i| if i % 2 == 0 { dec!(100) } else { dec!(105) })
            .collect();
        adapter.adapt(&mut p, &candles(&swings, dec!(1)), &FixedLot(1.0), &[]);
        assert_eq!((p.leverage, p.sleep_units), (20, 2));
        assert_eq!(
            p.sleep_interval(Duration::from_millis(1000)),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn ai_lot_rejects_invalid_values() {
        let adapter = adapter();
        let mut p = params(LotSizingMode::Ai);
        let window = candles(&[dec!(100); 15], dec!(1));

        adapter.adapt(&mut p, &window, &FixedLot(0.25), &[]);
        assert_eq!(p.lot_size, dec!(0.25));

        for bad in [0.0, -1.0, f64::INFINITY, f64::NAN] {
            adapter.adapt(&mut p, &window, &FixedLot(bad), &[]);
            assert_eq!(p.lot_size, dec!(0.25));
        }
    }

    #[test]
    fn missing_candles_keep_previous_values() {
        let adapter = adapter();
        let mut p = params(LotSizingMode::Atr);
        p.leverage = 7;
        let reading = adapter.adapt(&mut p, &[], &FixedLot(1.0), &[]);
        assert_eq!(reading, Adaptation::default());
        assert_eq!(p.leverage, 7);
        assert_eq!(p.lot_size, dec!(0.005));
    }

    #[test]
    fn mode_parsing_accepts_legacy_spelling() {
        assert_eq!("ATR".parse::<LotSizingMode>(), Ok(LotSizingMode::Atr));
        assert_eq!(" ai ".parse::<LotSizingMode>(), Ok(LotSizingMode::Ai));
        assert!("kelly".parse::<LotSizingMode>().is_err());
    }
}
