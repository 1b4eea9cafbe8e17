use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Percentage changes between consecutive prices, skipping zero bases
pub fn pct_changes(prices: &[Decimal]) -> Vec<f64> {
    prices
        .windows(2)
        .filter_map(|w| {
            let prev = w[0].to_f64()?;
            let next = w[1].to_f64()?;
            (prev != 0.0).then(|| (next - prev) / prev)
        })
        .collect()
}

/// Last `window` price changes, min-max scaled to [0, 1] and left-padded with zeros.
///
/// A flat window scales to all zeros.
pub fn price_change_features(prices: &[Decimal], window: usize) -> Vec<f64> {
    let start = prices.len().saturating_sub(window + 1);
    let changes = pct_changes(&prices[start..]);

    let min = changes.iter().copied().fold(f64::INFINITY, f64::min);
    let max = changes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    let mut features = vec![0.0; window.saturating_sub(changes.len())];
    features.extend(changes.iter().map(|c| {
        if range > 0.0 {
            (c - min) / range
        } else {
            0.0
        }
    }));
    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn scales_changes_into_unit_range() {
        let prices = [dec!(100), dec!(110), dec!(99), dec!(99)];
        let features = price_change_features(&prices, 3);
        assert_eq!(features.len(), 3);
        assert_eq!(features[0], 1.0);
        assert_eq!(features[1], 0.0);
        assert!(features[2] > 0.0 && features[2] < 1.0);
    }

    #[test]
    fn short_history_is_zero_padded() {
        let features = price_change_features(&[dec!(100), dec!(101)], 10);
        assert_eq!(features.len(), 10);
        assert!(features.iter().all(|f| *f == 0.0));
        assert!(price_change_features(&[], 10).iter().all(|f| *f == 0.0));
    }

    #[test]
    fn only_most_recent_window_is_used() {
        let mut prices: Vec<Decimal> = (1..=50).map(Decimal::from).collect();
        prices.push(dec!(10));
        let features = price_change_features(&prices, 4);
        assert_eq!(features.len(), 4);
        assert_eq!(features[3], 0.0);
    }

    #[test]
    fn zero_base_is_skipped() {
        assert_eq!(pct_changes(&[dec!(0), dec!(5), dec!(10)]), vec![1.0]);
    }
}
