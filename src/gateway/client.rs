use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

use super::session::{MetricsSnapshot, SessionMetrics, SessionState};
use crate::domain::{
    AccountBalance, Candle, ExchangeInfo, OrderBook, OrderRequest, OrderResult, PositionRisk,
    StopLossAck, StopLossUpdate,
};
use crate::error::{BotError, Result};
use crate::exchange::{ExchangeClient, SimulatedExchange};

/// Order book depth requested for the spread check
const BOOK_DEPTH: u32 = 5;

/// Top-of-book spread wider than the configured threshold
#[derive(Debug, Clone, PartialEq)]
pub struct SpreadAlert {
    pub symbol: String,
    pub mid_price: Decimal,
    pub spread: Decimal,
    pub threshold: Decimal,
}

impl std::fmt::Display for SpreadAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Abnormal spread on {}: {:.5} > {} (mid {})",
            self.symbol, self.spread, self.threshold, self.mid_price
        )
    }
}

/// Owns the exchange session.
///
/// Every remote call is infallible from the caller's side: while connected a
/// failed call is logged and answered with the placeholder value, without
/// touching the session state. Only `connect` changes connectivity.
pub struct Gateway {
    client: RwLock<Option<Arc<dyn ExchangeClient>>>,
    placeholder: SimulatedExchange,
    state: RwLock<SessionState>,
    metrics: SessionMetrics,
    exchange_info: OnceCell<ExchangeInfo>,
    kline_interval: String,
}

impl Gateway {
    pub fn new(client: Arc<dyn ExchangeClient>) -> Self {
        Self {
            client: RwLock::new(Some(client)),
            placeholder: SimulatedExchange::new(),
            state: RwLock::new(SessionState::Disconnected),
            metrics: SessionMetrics::new(),
            exchange_info: OnceCell::new(),
            kline_interval: "1m".to_string(),
        }
    }

    pub fn with_kline_interval(mut self, interval: &str) -> Self {
        self.kline_interval = interval.to_string();
        self
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot().await
    }

    async fn client(&self) -> Option<Arc<dyn ExchangeClient>> {
        self.client.read().await.clone()
    }

    /// Single handshake attempt
    pub async fn connect(&self) -> Result<()> {
        let client = self
            .client()
            .await
            .ok_or_else(|| BotError::Connection("session is closed".to_string()))?;

        match client.handshake().await {
            Ok(()) => {
                *self.state.write().await = SessionState::Connected;
                info!("Connected to {}", client.kind());
                Ok(())
            }
            Err(e) => {
                let mut state = self.state.write().await;
                if *state == SessionState::Connected {
                    *state = SessionState::Disconnected;
                }
                Err(match e {
                    BotError::Connection(_) => e,
                    other => BotError::Connection(other.to_string()),
                })
            }
        }
    }

    /// Retry `connect` with a fixed delay; exhaustion degrades to simulation
    pub async fn connect_with_retry(&self, max_attempts: u32, delay: Duration) -> SessionState {
        for attempt in 1..=max_attempts {
            match self.connect().await {
                Ok(()) => return SessionState::Connected,
                Err(e) => {
                    warn!("Connection attempt {}/{} failed: {}", attempt, max_attempts, e);
                    if attempt < max_attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        *self.state.write().await = SessionState::Simulated;
        warn!(
            "Exchange unreachable after {} attempts, continuing with simulated data",
            max_attempts
        );
        SessionState::Simulated
    }

    /// Per-call pattern shared by every remote operation
    async fn guarded<T, F, Fut>(&self, operation: &str, call: F, placeholder: impl FnOnce() -> T) -> T
    where
        F: FnOnce(Arc<dyn ExchangeClient>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.state().await != SessionState::Connected {
            return placeholder();
        }
        let Some(client) = self.client().await else {
            return placeholder();
        };

        let started = Instant::now();
        match call(client).await {
            Ok(value) => {
                let latency = started.elapsed();
                self.metrics.record_success(latency).await;
                debug!("{} completed in {:?}", operation, latency);
                value
            }
            Err(e) => {
                if e.is_rate_limit() {
                    self.metrics.inc_rate_limited();
                }
                warn!("{}, using simulated value", BotError::transient(operation, e));
                placeholder()
            }
        }
    }

    /// Fetched once, then served from cache for the process lifetime
    pub async fn exchange_info(&self) -> ExchangeInfo {
        self.exchange_info
            .get_or_init(|| async {
                self.guarded(
                    "exchange_info",
                    |c| async move { c.exchange_info().await },
                    || self.placeholder.exchange_info_value(),
                )
                .await
            })
            .await
            .clone()
    }

    pub async fn account_balance(&self) -> AccountBalance {
        self.guarded(
            "account_balance",
            |c| async move { c.account_balance().await },
            || self.placeholder.account_balance_value(),
        )
        .await
    }

    pub async fn symbol_price(&self, symbol: &str) -> Decimal {
        self.guarded(
            "symbol_price",
            |c| async move { c.symbol_price(symbol).await },
            || self.placeholder.price_value(symbol),
        )
        .await
    }

    /// Prices for several symbols, each through its own guarded call
    pub async fn symbol_prices(&self, symbols: &[&str]) -> Vec<(String, Decimal)> {
        let mut prices = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            prices.push((symbol.to_string(), self.symbol_price(symbol).await));
        }
        prices
    }

    pub async fn order_book(&self, symbol: &str) -> OrderBook {
        self.guarded(
            "order_book",
            |c| async move { c.order_book(symbol, BOOK_DEPTH).await },
            || self.placeholder.order_book_value(symbol),
        )
        .await
    }

    /// Most recent `limit` candles at the session's interval
    pub async fn klines(&self, symbol: &str, limit: u32) -> Vec<Candle> {
        let interval = self.kline_interval.as_str();
        self.guarded(
            "klines",
            |c| async move { c.klines(symbol, interval, limit).await },
            || self.placeholder.klines_value(symbol, limit),
        )
        .await
    }

    pub async fn position_risk(&self, symbol: &str) -> PositionRisk {
        self.guarded(
            "position_risk",
            |c| async move { c.position_risk(symbol).await },
            || self.placeholder.position_risk_value(symbol),
        )
        .await
    }

    pub async fn create_order(&self, request: &OrderRequest) -> OrderResult {
        self.guarded(
            "create_order",
            |c| async move { c.create_order(request).await },
            || self.placeholder.order_value(request),
        )
        .await
    }

    pub async fn update_stop_loss(&self, update: &StopLossUpdate) -> StopLossAck {
        self.guarded(
            "update_stop_loss",
            |c| async move { c.update_stop_loss(update).await },
            || self.placeholder.stop_loss_value(update),
        )
        .await
    }

    /// Flag a top-of-book spread above `threshold`; never fails
    pub async fn detect_order_book_abnormalities(
        &self,
        symbol: &str,
        threshold: Decimal,
    ) -> Option<SpreadAlert> {
        let book = self.order_book(symbol).await;
        let mid_price = book.mid_price()?;
        let spread = book.relative_spread()?;
        if spread <= threshold {
            return None;
        }
        let alert = SpreadAlert {
            symbol: symbol.to_string(),
            mid_price,
            spread,
            threshold,
        };
        warn!("{}", alert);
        Some(alert)
    }

    /// Drop the client and its credentials
    pub async fn close(&self) {
        if let Some(client) = self.client.write().await.take() {
            client.close().await;
        }
        *self.state.write().await = SessionState::Disconnected;
        info!("Gateway session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderSide, PriceLevel};
    use crate::exchange::MockExchangeClient;
    use crate::exchange::ExchangeKind;
    use mockall::Sequence;
    use rust_decimal_macros::dec;

    fn gateway(mock: MockExchangeClient) -> Gateway {
        Gateway::new(Arc::new(mock))
    }

    #[tokio::test]
    async fn exhausted_retries_degrade_then_recover() {
        let mut mock = MockExchangeClient::new();
        let mut seq = Sequence::new();
        mock.expect_handshake()
            .times(5)
            .in_sequence(&mut seq)
            .returning(|| Err(BotError::Connection("refused".into())));
        mock.expect_handshake()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        mock.expect_kind().return_const(ExchangeKind::Binance);

        let gw = gateway(mock);
        let state = gw.connect_with_retry(5, Duration::ZERO).await;
        assert_eq!(state, SessionState::Simulated);
        assert_eq!(gw.state().await, SessionState::Simulated);

        gw.connect().await.expect("handshake now succeeds");
        assert_eq!(gw.state().await, SessionState::Connected);
    }

    #[tokio::test]
    async fn simulated_session_never_touches_the_network() {
        let mut mock = MockExchangeClient::new();
        mock.expect_handshake()
            .times(1)
            .returning(|| Err(BotError::Connection("refused".into())));
        // no symbol_price expectation: any call would panic

        let gw = gateway(mock);
        assert_eq!(gw.connect_with_retry(1, Duration::ZERO).await, SessionState::Simulated);
        assert_eq!(gw.symbol_price("BTCUSDT").await, dec!(50000));
        assert_eq!(gw.metrics().await.request_count, 0);
    }

    #[tokio::test]
    async fn failed_call_falls_back_without_demoting() {
        let mut mock = MockExchangeClient::new();
        mock.expect_handshake().returning(|| Ok(()));
        mock.expect_kind().return_const(ExchangeKind::Binance);
        let mut seq = Sequence::new();
        mock.expect_symbol_price()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(BotError::Internal("timeout".into())));
        mock.expect_symbol_price()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(dec!(61000)));

        let gw = gateway(mock);
        gw.connect().await.expect("connects");

        assert_eq!(gw.symbol_price("BTCUSDT").await, dec!(50000));
        assert_eq!(gw.state().await, SessionState::Connected);
        assert_eq!(gw.metrics().await.request_count, 0);

        assert_eq!(gw.symbol_price("BTCUSDT").await, dec!(61000));
        let metrics = gw.metrics().await;
        assert_eq!(metrics.request_count, 1);
        assert_eq!(metrics.latency_samples.len(), 1);
    }

    #[tokio::test]
    async fn failed_connect_demotes_a_connected_session() {
        let mut mock = MockExchangeClient::new();
        let mut seq = Sequence::new();
        mock.expect_handshake()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        mock.expect_handshake()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(BotError::Internal("tls".into())));
        mock.expect_kind().return_const(ExchangeKind::Binance);

        let gw = gateway(mock);
        gw.connect().await.expect("first handshake");
        let err = gw.connect().await.expect_err("second handshake fails");
        assert!(matches!(err, BotError::Connection(_)));
        assert_eq!(gw.state().await, SessionState::Disconnected);
    }

    #[tokio::test]
    async fn exchange_info_is_fetched_once() {
        let mut mock = MockExchangeClient::new();
        mock.expect_handshake().returning(|| Ok(()));
        mock.expect_kind().return_const(ExchangeKind::Binance);
        mock.expect_exchange_info()
            .times(1)
            .returning(|| Ok(ExchangeInfo::default()));

        let gw = gateway(mock);
        gw.connect().await.expect("connects");
        assert!(gw.exchange_info().await.symbols.is_empty());
        assert!(gw.exchange_info().await.symbols.is_empty());
    }

    #[tokio::test]
    async fn rate_limits_are_counted() {
        let mut mock = MockExchangeClient::new();
        mock.expect_handshake().returning(|| Ok(()));
        mock.expect_kind().return_const(ExchangeKind::Binance);
        mock.expect_create_order()
            .times(2)
            .returning(|_| Err(BotError::RateLimited("weight".into())));

        let gw = gateway(mock);
        gw.connect().await.expect("connects");
        let request = OrderRequest::futures_market("BTCUSDT", OrderSide::Buy, dec!(0.001));
        let first = gw.create_order(&request).await;
        let second = gw.create_order(&request).await;

        assert!(first.is_simulated() && second.is_simulated());
        assert_eq!(gw.metrics().await.rate_limit_triggered, 2);
        assert_eq!(gw.state().await, SessionState::Connected);
    }

    #[tokio::test]
    async fn wide_spread_raises_alert() {
        let mut mock = MockExchangeClient::new();
        mock.expect_handshake().returning(|| Ok(()));
        mock.expect_kind().return_const(ExchangeKind::Binance);
        mock.expect_order_book().returning(|_, _| {
            Ok(OrderBook {
                bids: vec![PriceLevel::new(dec!(99), dec!(1))],
                asks: vec![PriceLevel::new(dec!(101), dec!(1))],
            })
        });

        let gw = gateway(mock);
        gw.connect().await.expect("connects");
        let alert = gw
            .detect_order_book_abnormalities("BTCUSDT", dec!(0.002))
            .await
            .expect("2% spread is abnormal");
        assert_eq!(alert.spread, dec!(0.02));
        assert!(gw
            .detect_order_book_abnormalities("BTCUSDT", dec!(0.05))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn close_disconnects_and_blocks_reconnect() {
        let mut mock = MockExchangeClient::new();
        mock.expect_handshake().times(1).returning(|| Ok(()));
        mock.expect_kind().return_const(ExchangeKind::Binance);
        mock.expect_close().times(1).returning(|| ());

        let gw = gateway(mock);
        gw.connect().await.expect("connects");
        gw.close().await;
        assert_eq!(gw.state().await, SessionState::Disconnected);
        assert!(gw.connect().await.is_err());
    }
}
