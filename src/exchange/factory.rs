use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::adapters::BinanceClient;
use crate::config::AppConfig;
use crate::error::Result;
use crate::signing::{ApiCredentials, QuerySigner};

use super::{parse_exchange_kind, ExchangeClient, ExchangeKind, SimulatedExchange};

/// Create the runtime exchange client from `AppConfig`.
pub fn build_exchange_client(app_config: &AppConfig) -> Result<Arc<dyn ExchangeClient>> {
    let exchange = parse_exchange_kind(&app_config.exchange.kind)?;
    build_exchange_client_for(exchange, app_config)
}

/// Create exchange client for an explicit exchange kind.
pub fn build_exchange_client_for(
    exchange: ExchangeKind,
    app_config: &AppConfig,
) -> Result<Arc<dyn ExchangeClient>> {
    match exchange {
        ExchangeKind::Simulated => Ok(Arc::new(SimulatedExchange::new())),
        ExchangeKind::Binance => {
            let cfg = &app_config.exchange;
            let signer = match cfg.credentials() {
                Some((key, secret)) => Some(QuerySigner::new(
                    ApiCredentials::new(key, secret),
                    cfg.recv_window_ms,
                )),
                None => {
                    warn!("No API credentials configured, signed endpoints will fail");
                    None
                }
            };

            let client = BinanceClient::new(
                &cfg.rest_url,
                &cfg.futures_url,
                signer,
                Duration::from_millis(cfg.request_timeout_ms),
            )?;
            Ok(Arc::new(client))
        }
    }
}
