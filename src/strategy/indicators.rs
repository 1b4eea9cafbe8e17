//! ATR and close-to-close volatility over a trailing candle window.

use rust_decimal::Decimal;

use crate::domain::Candle;
use crate::ml::pct_changes;

/// max(high - low, |high - prev_close|, |low - prev_close|)
pub fn true_range(candle: &Candle, prev_close: Decimal) -> Decimal {
    let range = candle.high - candle.low;
    let up = (candle.high - prev_close).abs();
    let down = (candle.low - prev_close).abs();
    range.max(up).max(down)
}

/// Mean true range of the last `period` candles.
///
/// Needs `period + 1` candles: the first only provides a previous close.
pub fn average_true_range(candles: &[Candle], period: usize) -> Option<Decimal> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }
    let window = &candles[candles.len() - period - 1..];
    let total: Decimal = window
        .windows(2)
        .map(|w| true_range(&w[1], w[0].close))
        .sum();
    Some(total / Decimal::from(period))
}

/// Sample standard deviation (n - 1)
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}

/// Standard deviation of the last `period` close-to-close changes
pub fn volatility(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }
    let closes: Vec<Decimal> = candles[candles.len() - period - 1..]
        .iter()
        .map(|c| c.close)
        .collect();
    sample_std(&pct_changes(&closes)).filter(|v| v.is_finite())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    /// Candles with the given closes and a fixed half range around each close
    pub(crate) fn candles(closes: &[Decimal], half_range: Decimal) -> Vec<Candle> {
        let anchor = Utc.timestamp_opt(1_700_000_000, 0).single().expect("valid time");
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| Candle {
                open_time: anchor + Duration::minutes(i as i64),
                open: *close,
                high: *close + half_range,
                low: *close - half_range,
                close: *close,
            })
            .collect()
    }

    #[test]
    fn true_range_uses_gap_from_previous_close() {
        let c = Candle {
            open_time: Utc::now(),
            open: dec!(110),
            high: dec!(112),
            low: dec!(108),
            close: dec!(111),
        };
        assert_eq!(true_range(&c, dec!(100)), dec!(12));
        assert_eq!(true_range(&c, dec!(110)), dec!(4));
    }

    #[test]
    fn atr_of_flat_window_is_the_range() {
        let window = candles(&[dec!(100); 15], dec!(25));
        assert_eq!(average_true_range(&window, 14), Some(dec!(50)));
        assert_eq!(volatility(&window, 14), Some(0.0));
    }

    #[test]
    fn short_window_has_no_reading() {
        let window = candles(&[dec!(100); 14], dec!(25));
        assert!(average_true_range(&window, 14).is_none());
        assert!(volatility(&window, 14).is_none());
    }

    #[test]
    fn atr_uses_only_the_trailing_window() {
        let mut closes = vec![dec!(100); 5];
        closes.extend(vec![dec!(100); 15]);
        let mut window = candles(&closes, dec!(1));
        window[0].high = dec!(10_000);
        assert_eq!(average_true_range(&window, 14), Some(dec!(2)));
    }

    #[test]
    fn sample_std_matches_hand_computation() {
        let std = sample_std(&[0.01, -0.01, 0.01, -0.01]).expect("enough samples");
        assert!((std - (0.0004f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!(sample_std(&[0.5]).is_none());
    }
}
