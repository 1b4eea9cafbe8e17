use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::strategy::{LotSizingMode, TradingMode};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub adaptive: AdaptiveConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Exchange implementation (binance | simulated)
    pub kind: String,
    /// Spot REST endpoint
    pub rest_url: String,
    /// USD-M futures REST endpoint
    pub futures_url: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Signed request validity window
    pub recv_window_ms: u64,
    /// Per-request timeout
    pub request_timeout_ms: u64,
    /// Handshake attempts before degrading to simulation
    pub connect_attempts: u32,
    /// Fixed delay between handshake attempts
    pub connect_delay_ms: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            kind: "binance".to_string(),
            rest_url: "https://api.binance.com".to_string(),
            futures_url: "https://fapi.binance.com".to_string(),
            api_key: None,
            api_secret: None,
            recv_window_ms: 5000,
            request_timeout_ms: 10_000,
            connect_attempts: 5,
            connect_delay_ms: 5000,
        }
    }
}

impl ExchangeConfig {
    /// API key and secret from config, falling back to `API_KEY` / `API_SECRET`
    pub fn credentials(&self) -> Option<(String, String)> {
        let key = self
            .api_key
            .clone()
            .or_else(|| std::env::var("API_KEY").ok())
            .filter(|k| !k.trim().is_empty())?;
        let secret = self
            .api_secret
            .clone()
            .or_else(|| std::env::var("API_SECRET").ok())
            .filter(|s| !s.trim().is_empty())?;
        Some((key, secret))
    }

    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.connect_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Symbol to trade (e.g., "BTCUSDT")
    pub symbol: String,
    pub mode: TradingMode,
    pub lot_sizing_mode: LotSizingMode,
    /// Lot size used in manual sizing mode
    pub manual_lot_size: Decimal,
    /// Initial leverage, re-derived every cycle
    pub leverage: u32,
    /// Fixed stop-loss distance as a fraction of entry (e.g., 0.01 = 1%)
    pub stop_loss_pct: Option<Decimal>,
    /// Fixed take-profit distance as a fraction of entry
    pub take_profit_pct: Option<Decimal>,
    pub hedge: bool,
    /// Length of one sleep unit in milliseconds
    pub cadence_unit_ms: u64,
    /// Candle interval for the ATR window
    pub kline_interval: String,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            mode: TradingMode::Manual,
            lot_sizing_mode: LotSizingMode::Atr,
            manual_lot_size: dec!(0.001),
            leverage: 10,
            stop_loss_pct: None,
            take_profit_pct: None,
            hedge: false,
            cadence_unit_ms: 1000,
            kline_interval: "1m".to_string(),
        }
    }
}

/// Volatility-driven parameter derivation
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// ATR / volatility window length
    pub atr_period: usize,
    /// ATR above which the larger lot is used
    pub atr_lot_threshold: Decimal,
    pub atr_high_lot: Decimal,
    pub atr_low_lot: Decimal,
    /// Volatility above which leverage and cadence tighten
    pub volatility_threshold: f64,
    pub high_vol_leverage: u32,
    pub low_vol_leverage: u32,
    /// Sleep units between cycles
    pub high_vol_sleep_units: u32,
    pub low_vol_sleep_units: u32,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            atr_lot_threshold: dec!(50),
            atr_high_lot: dec!(0.002),
            atr_low_lot: dec!(0.001),
            volatility_threshold: 0.01,
            high_vol_leverage: 20,
            low_vol_leverage: 10,
            high_vol_sleep_units: 2,
            low_vol_sleep_units: 5,
        }
    }
}

/// Protective stop management
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Trailing distance as a multiple of ATR
    pub trail_atr_multiplier: Decimal,
    /// Trailing distance as a fraction of price when ATR is unavailable
    pub fallback_trail_pct: Decimal,
    /// Price / entry ratio that moves the stop to break-even
    pub break_even_threshold: Decimal,
    /// Relative spread above which the book is flagged
    pub spread_threshold: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            trail_atr_multiplier: dec!(1.5),
            fallback_trail_pct: dec!(0.02),
            break_even_threshold: dec!(1.02),
            spread_threshold: dec!(0.002),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// JSON dense model; neutral predictor when absent
    pub path: Option<String>,
    /// Number of price changes fed to the model
    pub feature_window: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: None,
            feature_window: 10,
        }
    }
}

/// Rolling performance window and retrain trigger
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Samples averaged for the retrain decision
    pub window: usize,
    pub retrain_threshold: f64,
    /// Closing prices shipped with a retrain request
    pub retrain_sample_size: usize,
    /// Prediction pairs scored by the directional evaluator
    pub accuracy_lookback: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window: 10,
            retrain_threshold: 0.5,
            retrain_sample_size: 100,
            accuracy_lookback: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("CRYPTOBOT_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (CRYPTOBOT_TRADING__SYMBOL, etc.)
            .add_source(
                Environment::with_prefix("CRYPTOBOT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Create a default configuration for CLI usage
    pub fn default_config(symbol: &str) -> Self {
        let mut config = Self::default();
        config.trading.symbol = symbol.to_string();
        config
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.trading.symbol.trim().is_empty() {
            errors.push("trading.symbol must not be empty".to_string());
        }

        if self.trading.manual_lot_size <= Decimal::ZERO {
            errors.push("trading.manual_lot_size must be positive".to_string());
        }

        if self.trading.cadence_unit_ms == 0 {
            errors.push("trading.cadence_unit_ms must be positive".to_string());
        }

        for (name, pct) in [
            ("stop_loss_pct", self.trading.stop_loss_pct),
            ("take_profit_pct", self.trading.take_profit_pct),
        ] {
            if let Some(pct) = pct {
                if pct <= Decimal::ZERO || pct >= Decimal::ONE {
                    errors.push(format!("trading.{name} must be between 0 and 1"));
                }
            }
        }

        if self.exchange.connect_attempts == 0 {
            errors.push("exchange.connect_attempts must be at least 1".to_string());
        }

        if self.adaptive.atr_period == 0 {
            errors.push("adaptive.atr_period must be at least 1".to_string());
        }

        if self.adaptive.atr_low_lot <= Decimal::ZERO || self.adaptive.atr_high_lot <= Decimal::ZERO {
            errors.push("adaptive lot sizes must be positive".to_string());
        }

        if self.risk.break_even_threshold <= Decimal::ONE {
            errors.push("risk.break_even_threshold must be greater than 1".to_string());
        }

        if self.risk.fallback_trail_pct <= Decimal::ZERO
            || self.risk.fallback_trail_pct >= Decimal::ONE
        {
            errors.push("risk.fallback_trail_pct must be between 0 and 1".to_string());
        }

        if self.risk.spread_threshold <= Decimal::ZERO {
            errors.push("risk.spread_threshold must be positive".to_string());
        }

        if self.monitor.window == 0 {
            errors.push("monitor.window must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
