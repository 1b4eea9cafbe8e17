use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use crate::config::AppConfig;
use crate::gateway::{Gateway, SessionState};
use crate::strategy::{LotSizingMode, MarketReader, TradingMode};

#[derive(Parser, Debug)]
#[command(name = "cryptobot")]
#[command(version, about = "Adaptive futures trading loop", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and environment overrides
    #[arg(short, long, default_value = "config", global = true)]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the trading loop
    Run {
        /// Symbol to trade (e.g., BTCUSDT)
        #[arg(short, long)]
        symbol: Option<String>,
        /// manual | ai
        #[arg(long)]
        mode: Option<TradingMode>,
        /// manual | atr | ai
        #[arg(long)]
        lot_sizing: Option<LotSizingMode>,
        /// Manual lot size
        #[arg(long)]
        lot_size: Option<Decimal>,
        /// Only trade on decisive scores
        #[arg(long)]
        hedge: bool,
        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<u64>,
        /// Use the placeholder exchange instead of Binance
        #[arg(long)]
        simulated: bool,
    },
    /// Connect with retries and print session metrics
    Ping {
        /// Symbols to quote; defaults to the configured symbol
        #[arg(short, long = "symbol")]
        symbols: Vec<String>,
    },
    /// Print one market snapshot
    Snapshot {
        #[arg(short, long)]
        symbol: Option<String>,
    },
}

impl Commands {
    /// Fold command-line overrides into the loaded configuration
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        match self {
            Commands::Run {
                symbol,
                mode,
                lot_sizing,
                lot_size,
                hedge,
                simulated,
                ..
            } => {
                if let Some(symbol) = symbol {
                    config.trading.symbol = symbol.to_uppercase();
                }
                if let Some(mode) = mode {
                    config.trading.mode = *mode;
                }
                if let Some(lot_sizing) = lot_sizing {
                    config.trading.lot_sizing_mode = *lot_sizing;
                }
                if let Some(lot_size) = lot_size {
                    config.trading.manual_lot_size = *lot_size;
                }
                if *hedge {
                    config.trading.hedge = true;
                }
                if *simulated {
                    config.exchange.kind = "simulated".to_string();
                }
            }
            Commands::Ping { symbols } => {
                if let Some(first) = symbols.first() {
                    config.trading.symbol = first.to_uppercase();
                }
            }
            Commands::Snapshot { symbol } => {
                if let Some(symbol) = symbol {
                    config.trading.symbol = symbol.to_uppercase();
                }
            }
        }
    }
}

/// Connect, quote `symbols` and report the resulting session state
pub async fn ping(gateway: &Gateway, config: &AppConfig, symbols: &[String]) -> SessionState {
    println!("Connecting to {} ...", config.exchange.kind);
    let state = gateway
        .connect_with_retry(config.exchange.connect_attempts, config.exchange.connect_delay())
        .await;

    match state {
        SessionState::Connected => println!("\x1b[32m✓ Connected\x1b[0m"),
        other => println!("\x1b[33m! Session {}\x1b[0m", other),
    }

    let mut wanted: Vec<String> = symbols.iter().map(|s| s.to_uppercase()).collect();
    if wanted.is_empty() {
        wanted.push(config.trading.symbol.clone());
    }
    let refs: Vec<&str> = wanted.iter().map(String::as_str).collect();

    let info = gateway.exchange_info().await;
    for (symbol, price) in gateway.symbol_prices(&refs).await {
        println!("  {:<10} {:>14}  tradable: {}", symbol, price, info.is_tradable(&symbol));
    }
    println!("  {}", gateway.metrics().await.summary(state));
    state
}

pub async fn show_snapshot(gateway: &Gateway, config: &AppConfig) -> crate::error::Result<()> {
    gateway
        .connect_with_retry(config.exchange.connect_attempts, config.exchange.connect_delay())
        .await;

    let reader = MarketReader::new(&config.trading.symbol);
    let snapshot = reader.snapshot(gateway).await?;
    let balance = reader.account(gateway).await;
    let position = gateway.position_risk(&config.trading.symbol).await;
    let fmt = |v: Option<Decimal>| v.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string());

    println!("\n=== {} @ {} ===", snapshot.symbol, snapshot.timestamp.format("%H:%M:%S"));
    println!("Last:     {}", snapshot.last_price);
    println!("Best bid: {}", fmt(snapshot.best_bid));
    println!("Best ask: {}", fmt(snapshot.best_ask));
    println!("USDT:     {}", balance.free("USDT"));
    println!(
        "Position: {} @ {} (uPnL {}, {}x{})",
        position.position_amt,
        position.entry_price,
        position.unrealized_pnl,
        position.leverage,
        if position.simulated { ", simulated" } else { "" }
    );
    println!("Session:  {}", gateway.state().await);
    Ok(())
}
