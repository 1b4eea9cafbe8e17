use anyhow::{bail, Context};
use clap::Parser;
use cryptobot::cli::{self, Cli, Commands};
use cryptobot::config::{AppConfig, LoggingConfig};
use cryptobot::exchange::build_exchange_client;
use cryptobot::gateway::Gateway;
use cryptobot::ml::retrain::DEFAULT_RETRAIN_QUEUE;
use cryptobot::ml::{load_predictor, LogOnlyRetrainer, RetrainDispatcher};
use cryptobot::strategy::TradingEngine;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;
    cli.command.apply_overrides(&mut config);
    if let Err(problems) = config.validate() {
        bail!("invalid configuration:\n  {}", problems.join("\n  "));
    }

    match &cli.command {
        Commands::Run { cycles, .. } => {
            init_logging(&config.logging);
            run_engine(config, *cycles).await?;
        }
        Commands::Ping { symbols } => {
            init_logging_simple();
            let gateway = build_gateway(&config)?;
            cli::ping(&gateway, &config, symbols).await;
            gateway.close().await;
        }
        Commands::Snapshot { .. } => {
            init_logging_simple();
            let gateway = build_gateway(&config)?;
            cli::show_snapshot(&gateway, &config).await?;
            gateway.close().await;
        }
    }

    Ok(())
}

fn build_gateway(config: &AppConfig) -> anyhow::Result<Gateway> {
    let client = build_exchange_client(config).context("failed to build exchange client")?;
    Ok(Gateway::new(client).with_kline_interval(&config.trading.kline_interval))
}

async fn run_engine(config: AppConfig, max_cycles: Option<u64>) -> anyhow::Result<()> {
    let gateway = Arc::new(build_gateway(&config)?);
    gateway
        .connect_with_retry(config.exchange.connect_attempts, config.exchange.connect_delay())
        .await;

    let fallback_lot = config.trading.manual_lot_size.to_f64().unwrap_or(0.001);
    let predictor = load_predictor(&config.model, fallback_lot).context("failed to load model")?;
    let (dispatcher, _retrain_worker) =
        RetrainDispatcher::spawn(Arc::new(LogOnlyRetrainer), DEFAULT_RETRAIN_QUEUE);

    let mut engine = TradingEngine::new(config, gateway.clone(), predictor)
        .with_retrain_dispatcher(dispatcher);
    let handle = engine.handle();

    let stopper = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        stopper.stop().await;
    });

    let cycles = engine.run(max_cycles).await?;

    let metrics = handle.metrics().await;
    let session = handle.session_state().await;
    let orders = handle.orders().await.len();
    let alerts = handle.alerts().await.len();
    info!(cycles, orders, alerts, "{}", metrics.summary(session));
    gateway.close().await;
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},cryptobot=debug", logging.level)));

    let log_dir = std::env::var("CRYPTOBOT_LOG_DIR").unwrap_or_else(|_| "logs".to_string());

    // rolling::daily panics if the first file cannot be created, so probe first
    let file_layer = if std::fs::create_dir_all(&log_dir).is_ok() {
        let probe = std::path::Path::new(&log_dir).join(".cryptobot_write_test");
        match std::fs::OpenOptions::new().create(true).append(true).open(&probe) {
            Ok(_) => {
                let _ = std::fs::remove_file(&probe);
                let appender = tracing_appender::rolling::daily(&log_dir, "cryptobot.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                // lives for the whole process
                Box::leak(Box::new(guard));
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!("Warning: log directory {} not writable ({}), file logging disabled", log_dir, e);
                None
            }
        }
    } else {
        eprintln!("Warning: could not create log directory {}, file logging disabled", log_dir);
        None
    };

    let (plain_console, json_console) = if logging.json {
        (None, Some(tracing_subscriber::fmt::layer().json().with_target(true)))
    } else {
        (Some(tracing_subscriber::fmt::layer().with_target(true)), None)
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(plain_console)
        .with(json_console)
        .with(file_layer)
        .init();

    if file_logging_enabled {
        eprintln!("Logging to: {}/cryptobot.log", log_dir);
    }
}

fn init_logging_simple() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
