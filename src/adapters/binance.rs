//! Binance REST adapter (spot + USD-M futures).
//!
//! Only the handful of endpoints the trading loop consumes. Payloads are
//! normalised into the crate's domain types.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::{
    AccountBalance, Candle, ExchangeInfo, OrderBook, OrderRequest, OrderResult, OrderSide,
    OrderStatus, OrderType, PositionRisk, PriceLevel, StopLossAck, StopLossUpdate, SymbolInfo,
};
use crate::error::{BotError, Result};
use crate::exchange::{ExchangeClient, ExchangeKind};
use crate::signing::{encode_params, QuerySigner};

/// Futures error code for a reused client order id
const DUPLICATE_CLIENT_ORDER_ID: i64 = -4116;

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct RawExchangeInfo {
    symbols: Vec<RawSymbol>,
}

#[derive(Debug, Deserialize)]
struct RawSymbol {
    symbol: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    balances: Vec<RawBalance>,
}

#[derive(Debug, Deserialize)]
struct RawBalance {
    asset: String,
    free: Decimal,
}

#[derive(Debug, Deserialize)]
struct RawTicker {
    price: Decimal,
}

#[derive(Debug, Deserialize)]
struct RawDepth {
    bids: Vec<(Decimal, Decimal)>,
    asks: Vec<(Decimal, Decimal)>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOrder {
    order_id: i64,
    client_order_id: String,
    status: String,
    #[serde(default)]
    avg_price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPositionRisk {
    symbol: String,
    position_amt: Decimal,
    entry_price: Decimal,
    mark_price: Decimal,
    #[serde(rename = "unRealizedProfit")]
    unrealized_profit: Decimal,
    leverage: String,
}

pub struct BinanceClient {
    http: Client,
    spot_url: String,
    futures_url: String,
    signer: RwLock<Option<QuerySigner>>,
}

impl BinanceClient {
    pub fn new(
        spot_url: &str,
        futures_url: &str,
        signer: Option<QuerySigner>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent("cryptobot/0.1")
            .timeout(request_timeout)
            .build()
            .map_err(|e| BotError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            spot_url: spot_url.trim_end_matches('/').to_string(),
            futures_url: futures_url.trim_end_matches('/').to_string(),
            signer: RwLock::new(signer),
        })
    }

    async fn public_get<T: DeserializeOwned>(
        &self,
        base: &str,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let query = encode_params(params);
        let url = if query.is_empty() {
            format!("{}{}", base, path)
        } else {
            format!("{}{}?{}", base, path, query)
        };
        let resp = self.http.get(&url).send().await?;
        Self::decode(resp, path).await
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        base: &str,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let guard = self.signer.read().await;
        let signer = guard.as_ref().ok_or_else(|| {
            BotError::Connection("API credentials are not configured".to_string())
        })?;
        let query = signer.signed_query(params)?;
        let api_key = HeaderValue::from_str(signer.api_key())
            .map_err(|e| BotError::Signature(format!("invalid API key header: {}", e)))?;
        drop(guard);

        let url = format!("{}{}?{}", base, path, query);
        let resp = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", api_key)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .send()
            .await?;
        Self::decode(resp, path).await
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response, path: &str) -> Result<T> {
        let status = resp.status();
        let text = resp.text().await?;

        if status.as_u16() == 429 || status.as_u16() == 418 {
            return Err(BotError::RateLimited(format!(
                "{} returned {}",
                path, status
            )));
        }

        if !status.is_success() {
            return Err(match serde_json::from_str::<ApiErrorBody>(&text) {
                Ok(body) => BotError::Exchange {
                    code: body.code,
                    message: body.msg,
                },
                Err(_) => BotError::Exchange {
                    code: status.as_u16() as i64,
                    message: text,
                },
            });
        }

        Ok(serde_json::from_str(&text)?)
    }

    fn order_params(request: &OrderRequest) -> Vec<(&'static str, String)> {
        vec![
            ("symbol", request.symbol.clone()),
            ("side", request.side.as_str().to_string()),
            ("type", request.order_type.as_str().to_string()),
            ("quantity", request.quantity.normalize().to_string()),
            ("newClientOrderId", request.client_order_id.clone()),
            ("newOrderRespType", "RESULT".to_string()),
        ]
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        let _: Value = self
            .signed(
                Method::POST,
                &self.futures_url,
                "/fapi/v1/leverage",
                &[("symbol", symbol.to_string()), ("leverage", leverage.to_string())],
            )
            .await?;
        Ok(())
    }

    /// Reduce-only trigger order that closes the whole position
    async fn place_trigger(
        &self,
        symbol: &str,
        side: OrderSide,
        order_type: OrderType,
        stop_price: Decimal,
        client_order_id: &str,
    ) -> Result<RawOrder> {
        self.signed(
            Method::POST,
            &self.futures_url,
            "/fapi/v1/order",
            &[
                ("symbol", symbol.to_string()),
                ("side", side.as_str().to_string()),
                ("type", order_type.as_str().to_string()),
                ("stopPrice", stop_price.normalize().to_string()),
                ("closePosition", "true".to_string()),
                ("newClientOrderId", client_order_id.to_string()),
            ],
        )
        .await
    }

    fn to_result(request: &OrderRequest, raw: RawOrder) -> OrderResult {
        OrderResult {
            client_order_id: raw.client_order_id,
            exchange_order_id: Some(raw.order_id.to_string()),
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            avg_price: raw.avg_price.filter(|p| !p.is_zero()),
            status: OrderStatus::from_exchange(&raw.status),
            timestamp: Utc::now(),
        }
    }
}

fn decimal_at(row: &[Value], idx: usize) -> Result<Decimal> {
    let raw = row
        .get(idx)
        .and_then(|v| v.as_str())
        .ok_or_else(|| BotError::InvalidMarketData(format!("kline field {} missing", idx)))?;
    Decimal::from_str(raw)
        .map_err(|e| BotError::InvalidMarketData(format!("kline field {}: {}", idx, e)))
}

fn parse_kline(row: &[Value]) -> Result<Candle> {
    let open_ms = row
        .first()
        .and_then(|v| v.as_i64())
        .ok_or_else(|| BotError::InvalidMarketData("kline open time missing".to_string()))?;
    let open_time = Utc
        .timestamp_millis_opt(open_ms)
        .single()
        .ok_or_else(|| BotError::InvalidMarketData(format!("bad kline time {}", open_ms)))?;
    Ok(Candle {
        open_time,
        open: decimal_at(row, 1)?,
        high: decimal_at(row, 2)?,
        low: decimal_at(row, 3)?,
        close: decimal_at(row, 4)?,
    })
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Binance
    }

    async fn handshake(&self) -> Result<()> {
        let _: Value = self
            .public_get(&self.spot_url, "/api/v3/ping", &[])
            .await
            .map_err(|e| BotError::Connection(format!("ping failed: {}", e)))?;

        // Validates credentials as part of the handshake
        let _: RawAccount = self
            .signed(Method::GET, &self.spot_url, "/api/v3/account", &[])
            .await
            .map_err(|e| BotError::Connection(format!("account check failed: {}", e)))?;

        info!("Binance session established");
        Ok(())
    }

    async fn exchange_info(&self) -> Result<ExchangeInfo> {
        let raw: RawExchangeInfo = self
            .public_get(&self.spot_url, "/api/v3/exchangeInfo", &[])
            .await?;
        Ok(ExchangeInfo {
            symbols: raw
                .symbols
                .into_iter()
                .map(|s| SymbolInfo {
                    symbol: s.symbol,
                    status: s.status,
                })
                .collect(),
        })
    }

    async fn account_balance(&self) -> Result<AccountBalance> {
        let raw: RawAccount = self
            .signed(Method::GET, &self.spot_url, "/api/v3/account", &[])
            .await?;
        let free: HashMap<String, Decimal> =
            raw.balances.into_iter().map(|b| (b.asset, b.free)).collect();
        Ok(AccountBalance { free })
    }

    async fn symbol_price(&self, symbol: &str) -> Result<Decimal> {
        let raw: RawTicker = self
            .public_get(
                &self.spot_url,
                "/api/v3/ticker/price",
                &[("symbol", symbol.to_string())],
            )
            .await?;
        Ok(raw.price)
    }

    async fn order_book(&self, symbol: &str, depth: u32) -> Result<OrderBook> {
        let raw: RawDepth = self
            .public_get(
                &self.spot_url,
                "/api/v3/depth",
                &[("symbol", symbol.to_string()), ("limit", depth.to_string())],
            )
            .await?;
        let level = |(price, qty): (Decimal, Decimal)| PriceLevel::new(price, qty);
        Ok(OrderBook {
            bids: raw.bids.into_iter().map(level).collect(),
            asks: raw.asks.into_iter().map(level).collect(),
        })
    }

    async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let rows: Vec<Vec<Value>> = self
            .public_get(
                &self.spot_url,
                "/api/v3/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        rows.iter().map(|row| parse_kline(row)).collect()
    }

    async fn position_risk(&self, symbol: &str) -> Result<PositionRisk> {
        let rows: Vec<RawPositionRisk> = self
            .signed(
                Method::GET,
                &self.futures_url,
                "/fapi/v2/positionRisk",
                &[("symbol", symbol.to_string())],
            )
            .await?;
        let raw = rows
            .into_iter()
            .find(|r| r.symbol == symbol)
            .ok_or_else(|| {
                BotError::InvalidMarketData(format!("no position risk row for {}", symbol))
            })?;
        Ok(PositionRisk {
            symbol: raw.symbol,
            position_amt: raw.position_amt,
            entry_price: raw.entry_price,
            mark_price: raw.mark_price,
            unrealized_pnl: raw.unrealized_profit,
            leverage: raw.leverage.parse().unwrap_or(1),
            simulated: false,
        })
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<OrderResult> {
        if !request.futures {
            let raw: RawOrder = self
                .signed(
                    Method::POST,
                    &self.spot_url,
                    "/api/v3/order",
                    &Self::order_params(request),
                )
                .await?;
            return Ok(Self::to_result(request, raw));
        }

        if let Some(leverage) = request.leverage {
            if let Err(e) = self.set_leverage(&request.symbol, leverage).await {
                warn!("Failed to set leverage {}x for {}: {}", leverage, request.symbol, e);
            }
        }

        let raw: RawOrder = self
            .signed(
                Method::POST,
                &self.futures_url,
                "/fapi/v1/order",
                &Self::order_params(request),
            )
            .await?;
        let result = Self::to_result(request, raw);

        let exit_side = request.side.flip();
        let protection = [
            (OrderType::StopMarket, request.stop_loss, "sl"),
            (OrderType::TakeProfitMarket, request.take_profit, "tp"),
        ];
        for (order_type, trigger, tag) in protection {
            let Some(trigger) = trigger else { continue };
            let client_id = format!("{}-{}", tag, &request.client_order_id[..8.min(request.client_order_id.len())]);
            match self
                .place_trigger(&request.symbol, exit_side, order_type, trigger, &client_id)
                .await
            {
                Ok(raw) => debug!("Protective {} placed at {} (id {})", order_type.as_str(), trigger, raw.order_id),
                Err(e) => warn!("Protective {} at {} failed: {}", order_type.as_str(), trigger, e),
            }
        }

        Ok(result)
    }

    async fn update_stop_loss(&self, update: &StopLossUpdate) -> Result<StopLossAck> {
        let side = OrderSide::closing(update.position_side);
        match self
            .place_trigger(
                &update.symbol,
                side,
                OrderType::StopMarket,
                update.stop_price,
                &update.client_order_id,
            )
            .await
        {
            Ok(raw) => Ok(StopLossAck {
                client_order_id: raw.client_order_id,
                stop_price: update.stop_price,
                status: OrderStatus::from_exchange(&raw.status),
            }),
            Err(BotError::Exchange { code, .. }) if code == DUPLICATE_CLIENT_ORDER_ID => {
                debug!("Stop {} already registered", update.client_order_id);
                Ok(StopLossAck {
                    client_order_id: update.client_order_id.clone(),
                    stop_price: update.stop_price,
                    status: OrderStatus::New,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn close(&self) {
        self.signer.write().await.take();
        info!("Binance session closed, credentials cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn parses_kline_row() {
        let row = json!([
            1499040000000i64, "0.01634790", "0.80000000", "0.01575800", "0.01577100",
            "148976.11427815", 1499644799999i64, "2434.19055334", 308, "1756.87402397",
            "28.46694368", "0"
        ]);
        let candle = parse_kline(row.as_array().expect("array")).expect("row should parse");
        assert_eq!(candle.high, dec!(0.80000000));
        assert_eq!(candle.close, dec!(0.01577100));
        assert_eq!(candle.open_time.timestamp_millis(), 1499040000000);
    }

    #[test]
    fn rejects_malformed_kline() {
        let row = json!([1499040000000i64, "abc"]);
        assert!(parse_kline(row.as_array().expect("array")).is_err());
    }

    #[test]
    fn order_params_use_exchange_spelling() {
        let request = OrderRequest::futures_market("BTCUSDT", OrderSide::Sell, dec!(0.0020));
        let params = BinanceClient::order_params(&request);
        assert!(params.contains(&("side", "SELL".to_string())));
        assert!(params.contains(&("type", "MARKET".to_string())));
        assert!(params.contains(&("quantity", "0.002".to_string())));
    }

    #[test]
    fn depth_levels_deserialize_from_string_pairs() {
        let raw: RawDepth = serde_json::from_value(json!({
            "lastUpdateId": 1,
            "bids": [["100.5", "2"]],
            "asks": [["101.0", "1.5"]]
        }))
        .expect("depth should parse");
        assert_eq!(raw.bids[0], (dec!(100.5), dec!(2)));
        assert_eq!(raw.asks[0].0, dec!(101.0));
    }

    #[tokio::test]
    async fn signed_call_without_credentials_is_a_connection_error() {
        let client = BinanceClient::new(
            "http://127.0.0.1:9",
            "http://127.0.0.1:9",
            None,
            Duration::from_millis(200),
        )
        .expect("client should build");
        let err = client
            .account_balance()
            .await
            .expect_err("missing credentials should fail");
        assert!(matches!(err, BotError::Connection(_)));
    }
}
