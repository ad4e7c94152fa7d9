//! ChainWatch CLI — watch an account's log feed and print every relevant
//! transaction with its balance changes.
//!
//! # Usage
//! ```text
//! HELIUS_API_KEY=... chainwatch
//! chainwatch --watch-address <pubkey> --program-ids <id>,<id> --fetch-strategy bulk
//! ```
//!
//! Every flag falls back to the environment variable of the same name
//! (e.g. `--ws-url` / `WS_URL`); a `.env` file in the working directory is
//! loaded first.
//!
//! Exit status: 0 after SIGINT/SIGTERM, 1 when the reconnect budget is spent
//! or startup fails.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;

use chainwatch_core::config::{
    EndpointConfig, FetchConfig, FetchStrategyKind, ReconnectConfig, RelevancePolicy,
    SubscriptionConfig, WatchConfig, DEFAULT_PROGRAM_IDS, DEFAULT_WATCH_ADDRESS,
};
use chainwatch_core::error::ConfigError;
use chainwatch_core::policy::RetryConfig;
use chainwatch_core::telemetry::{init_tracing, LogConfig};
use chainwatch_http::{build_strategy, DetailFetcher, FetchStrategy};
use chainwatch_ws::StreamSubscriber;

mod console;

use console::ConsoleAnalyzer;

#[derive(Debug, Parser)]
#[command(
    name = "chainwatch",
    about = "Stream Solana logs for an account and analyse matching transactions",
    version
)]
struct Cli {
    /// Helius API key, substituted for {api_key} in endpoint URLs
    #[arg(long, env = "HELIUS_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    /// WebSocket endpoint for logsSubscribe
    #[arg(long, env = "WS_URL", default_value = "wss://mainnet.helius-rpc.com/?api-key={api_key}")]
    ws_url: String,

    /// JSON-RPC endpoint for getTransaction
    #[arg(long, env = "RPC_URL", default_value = "https://mainnet.helius-rpc.com/?api-key={api_key}")]
    rpc_url: String,

    /// JSON-RPC endpoint for batched getTransaction calls
    #[arg(long, env = "BULK_URL", default_value = "https://mainnet.helius-rpc.com/?api-key={api_key}")]
    bulk_url: String,

    /// Account passed as the `mentions` filter
    #[arg(long, env = "WATCH_ADDRESS", default_value = DEFAULT_WATCH_ADDRESS)]
    watch_address: String,

    /// Program ids of interest (comma separated); defaults to the major DEX programs
    #[arg(long, env = "PROGRAM_IDS", value_delimiter = ',')]
    program_ids: Vec<String>,

    /// Relevance policy: `logs` (match log content) or `any` (every signature)
    #[arg(long, env = "RELEVANCE_POLICY", default_value = "logs")]
    relevance_policy: String,

    /// Detail source: `rpc` (getTransaction) or `bulk`
    #[arg(long, env = "FETCH_STRATEGY", default_value = "rpc")]
    fetch_strategy: String,

    #[arg(long, env = "HEARTBEAT_INTERVAL_MS", default_value_t = 30_000)]
    heartbeat_interval_ms: u64,

    #[arg(long, env = "MAX_RECONNECT_ATTEMPTS", default_value_t = 10)]
    max_reconnect_attempts: u32,

    #[arg(long, env = "RECONNECT_INITIAL_MS", default_value_t = 1_000)]
    reconnect_initial_ms: u64,

    #[arg(long, env = "RECONNECT_MAX_MS", default_value_t = 30_000)]
    reconnect_max_ms: u64,

    /// Wait before the first detail request, for the node to index the transaction
    #[arg(long, env = "FETCH_INITIAL_DELAY_MS", default_value_t = 1_000)]
    fetch_initial_delay_ms: u64,

    #[arg(long, env = "FETCH_MAX_ATTEMPTS", default_value_t = 3)]
    fetch_max_attempts: u32,

    #[arg(long, env = "FETCH_RETRY_INITIAL_MS", default_value_t = 2_000)]
    fetch_retry_initial_ms: u64,

    #[arg(long, env = "FETCH_RETRY_MAX_MS", default_value_t = 10_000)]
    fetch_retry_max_ms: u64,

    /// Per-request HTTP timeout
    #[arg(long, env = "FETCH_TIMEOUT_MS", default_value_t = 30_000)]
    fetch_timeout_ms: u64,

    /// Time allowed for the close frame to flush before exiting
    #[arg(long, env = "SHUTDOWN_GRACE_MS", default_value_t = 1_000)]
    shutdown_grace_ms: u64,

    /// Level or filter directives, e.g. "info,chainwatch_ws=debug"
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Per-crate levels, e.g. "chainwatch_ws=debug,chainwatch_http=trace"
    #[arg(long, env = "LOG_COMPONENTS", default_value = "")]
    log_components: String,

    /// Emit JSON logs
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn into_config(self) -> Result<WatchConfig, ConfigError> {
        let program_ids = if self.program_ids.is_empty() {
            DEFAULT_PROGRAM_IDS.iter().map(|id| id.to_string()).collect()
        } else {
            self.program_ids
                .into_iter()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect()
        };
        let defaults = WatchConfig::default();

        Ok(WatchConfig {
            endpoints: EndpointConfig {
                api_key: self.api_key,
                ws_url: self.ws_url,
                rpc_url: self.rpc_url,
                bulk_url: self.bulk_url,
            },
            subscription: SubscriptionConfig {
                watch_address: self.watch_address,
                program_ids,
                relevance: self.relevance_policy.parse::<RelevancePolicy>()?,
                heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            },
            reconnect: ReconnectConfig {
                retry: RetryConfig {
                    max_retries: self.max_reconnect_attempts,
                    initial_backoff: Duration::from_millis(self.reconnect_initial_ms),
                    max_backoff: Duration::from_millis(self.reconnect_max_ms),
                    multiplier: defaults.reconnect.retry.multiplier,
                },
            },
            fetch: FetchConfig {
                strategy: self.fetch_strategy.parse::<FetchStrategyKind>()?,
                initial_delay: Duration::from_millis(self.fetch_initial_delay_ms),
                max_attempts: self.fetch_max_attempts,
                retry_initial: Duration::from_millis(self.fetch_retry_initial_ms),
                retry_max: Duration::from_millis(self.fetch_retry_max_ms),
                multiplier: defaults.fetch.multiplier,
                request_timeout: Duration::from_millis(self.fetch_timeout_ms),
            },
            log: LogConfig {
                level: self.log_level,
                components: LogConfig::parse_components(&self.log_components)?,
                json: self.log_json,
            },
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = cli.into_config().context("invalid configuration")?;
    config.validate().context("invalid configuration")?;
    init_tracing(&config.log).context("invalid log configuration")?;

    let strategy =
        build_strategy(&config.endpoints, &config.fetch).context("failed to build HTTP client")?;
    tracing::info!(
        strategy = strategy.name(),
        watch_address = %config.subscription.watch_address,
        programs = config.subscription.program_ids.len(),
        relevance = ?config.subscription.relevance,
        "starting chainwatch"
    );

    let fetcher = Arc::new(DetailFetcher::new(strategy, &config.fetch));
    let analyzer = Arc::new(ConsoleAnalyzer::new(config.subscription.program_ids.clone()));
    let subscriber = StreamSubscriber::new(
        config.endpoints.ws_url(),
        &config.subscription,
        &config.reconnect,
        fetcher,
        analyzer,
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    subscriber.run(shutdown_rx).await?;

    tokio::time::sleep(config.shutdown_grace).await;
    tracing::info!("shutdown complete");
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => tracing::info!("interrupt received, shutting down"),
        _ = terminate => tracing::info!("termination signal received, shutting down"),
    }
}
