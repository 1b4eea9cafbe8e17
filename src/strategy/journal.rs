//! Observability buffers for one engine instance.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::OrderResult;
use crate::history::{BoundedHistory, DEFAULT_HISTORY_CAPACITY};
use crate::ml::Prediction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Price, prediction, order and alert histories
#[derive(Debug, Clone)]
pub struct Journal {
    prices: BoundedHistory<PricePoint>,
    predictions: BoundedHistory<Prediction>,
    orders: BoundedHistory<OrderResult>,
    alerts: BoundedHistory<Alert>,
}

impl Journal {
    pub fn new(capacity: usize) -> Self {
        Self {
            prices: BoundedHistory::new(capacity),
            predictions: BoundedHistory::new(capacity),
            orders: BoundedHistory::new(capacity),
            alerts: BoundedHistory::new(capacity),
        }
    }

    pub fn record_price(&mut self, price: Decimal) {
        self.prices.push(PricePoint {
            price,
            timestamp: Utc::now(),
        });
    }

    pub fn record_prediction(&mut self, score: f64, price: Decimal) {
        self.predictions.push(Prediction {
            score,
            price,
            timestamp: Utc::now(),
        });
    }

    pub fn record_order(&mut self, order: OrderResult) {
        self.orders.push(order);
    }

    pub fn alert(&mut self, level: AlertLevel, message: impl Into<String>) {
        self.alerts.push(Alert {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    /// Recorded prices, oldest first
    pub fn closes(&self) -> Vec<Decimal> {
        self.prices.iter().map(|p| p.price).collect()
    }

    /// The last `n` closes
    pub fn recent_closes(&self, n: usize) -> Vec<Decimal> {
        self.prices.last_n(n).into_iter().map(|p| p.price).collect()
    }

    pub fn prices(&self) -> Vec<PricePoint> {
        self.prices.to_vec()
    }

    pub fn predictions(&self) -> Vec<Prediction> {
        self.predictions.to_vec()
    }

    pub fn recent_predictions(&self, n: usize) -> Vec<Prediction> {
        self.predictions.last_n(n)
    }

    pub fn orders(&self) -> Vec<OrderResult> {
        self.orders.to_vec()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.to_vec()
    }

    pub fn price_count(&self) -> usize {
        self.prices.len()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderRequest, OrderSide};
    use rust_decimal_macros::dec;

    #[test]
    fn every_buffer_is_capped() {
        let mut journal = Journal::default();
        let request = OrderRequest::futures_market("BTCUSDT", OrderSide::Buy, dec!(0.001));
        for i in 0..=DEFAULT_HISTORY_CAPACITY {
            journal.record_price(Decimal::from(i));
            journal.record_prediction(0.5, Decimal::from(i));
            journal.record_order(OrderResult::simulated(&request));
            journal.alert(AlertLevel::Info, format!("alert {i}"));
        }

        assert_eq!(journal.price_count(), DEFAULT_HISTORY_CAPACITY);
        assert_eq!(journal.predictions().len(), DEFAULT_HISTORY_CAPACITY);
        assert_eq!(journal.order_count(), DEFAULT_HISTORY_CAPACITY);
        assert_eq!(journal.alerts().len(), DEFAULT_HISTORY_CAPACITY);

        // the 1001st append evicted entry 0
        assert_eq!(journal.closes()[0], dec!(1));
        assert_eq!(journal.alerts()[0].message, "alert 1");
        assert_eq!(journal.recent_closes(2), vec![dec!(999), dec!(1000)]);
    }
}
