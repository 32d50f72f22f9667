mod loopback;

use std::{sync::Arc, time::Duration};

use {
    clap::Parser,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use portico_gateway::{
    config::{DEFAULT_MAX_BODY_BYTES, DEFAULT_PORT, GatewayConfig},
    server::start_gateway,
};

#[derive(Parser)]
#[command(name = "portico", about = "Portico — session gateway for streamable HTTP JSON-RPC engines")]
struct Cli {
    /// Bind address.
    #[arg(long, env = "PORTICO_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Listen port.
    #[arg(long, env = "PORTICO_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Maximum accepted request body size, in bytes.
    #[arg(long, env = "PORTICO_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,

    /// Idle seconds before a session is eligible for eviction.
    #[arg(long, env = "PORTICO_SESSION_TTL_SECS", default_value_t = 30 * 60)]
    session_ttl_secs: u64,

    /// Seconds between expiry sweeps.
    #[arg(long, env = "PORTICO_SWEEP_INTERVAL_SECS", default_value_t = 5 * 60)]
    sweep_interval_secs: u64,

    /// Upper bound on shutdown draining, in seconds.
    #[arg(long, env = "PORTICO_DRAIN_TIMEOUT_SECS", default_value_t = 5)]
    drain_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "portico starting");

    let config = GatewayConfig {
        bind: cli.bind.clone(),
        port: cli.port,
        max_body_bytes: cli.max_body_bytes,
        session_ttl: Duration::from_secs(cli.session_ttl_secs),
        sweep_interval: Duration::from_secs(cli.sweep_interval_secs),
        drain_timeout: Duration::from_secs(cli.drain_timeout_secs),
    };

    start_gateway(config, Arc::new(loopback::LoopbackEngine)).await
}
