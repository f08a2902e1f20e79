//! rate-pacer: HTTP request admission through a leak-bucket limiter.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ CatchPanic → RequestId → Trace → Timeout
//!                                                        │
//!                                                        ▼
//!                          ┌──────────────────────────────────────────┐
//!                          │ rate-limit middleware                    │
//!                          │  extract traceparent/baggage             │
//!                          │  start span "rate-limit"                 │
//!                          │  PacedLimiter::acquire (1/rps spacing)   │
//!                          │  attach rate_limit baggage               │
//!                          └───────────────────┬──────────────────────┘
//!                                              ▼
//!                                      GET /rate handler
//!                                              │
//!     Client Response                          ▼
//!     ◀────────────── span closed ──▶ SpanSink → batch worker → exporter
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;

use rate_pacer::config::{read_config, validate_config, GatewayConfig};
use rate_pacer::error::GatewayError;
use rate_pacer::lifecycle::startup;
use rate_pacer::observability::logging;
use rate_pacer::{GatewayServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "rate-pacer")]
#[command(about = "Paces HTTP requests through a fixed-rate leak bucket", long_about = None)]
struct Cli {
    /// Requests per second admitted across all clients [default: 100]
    #[arg(long, allow_negative_numbers = true)]
    rps: Option<i64>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:8081
    #[arg(long)]
    bind: Option<String>,

    /// Log level when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,

    /// Expose Prometheus metrics on this address
    #[arg(long)]
    metrics_address: Option<String>,
}

impl Cli {
    /// Overlay flags onto `config`; flags win over file values.
    fn apply(&self, config: &mut GatewayConfig) {
        if let Some(rps) = self.rps {
            config.rate_limit.requests_per_second = rps;
        }
        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(level) = &self.log_level {
            config.telemetry.log_level = level.clone();
        }
        if let Some(addr) = &self.metrics_address {
            config.telemetry.metrics_enabled = true;
            config.telemetry.metrics_address = addr.clone();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "Startup failed");
            eprintln!("rate-pacer: {error}");
            ExitCode::FAILURE
        }
    }
}

/// File (or defaults), then flags, then one validation pass over the result.
fn resolve_config(cli: &Cli) -> Result<GatewayConfig, GatewayError> {
    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => GatewayConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(GatewayError::Validation)?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<(), GatewayError> {
    let config = resolve_config(&cli)?;
    logging::init_logging(&config.telemetry.log_level)?;

    tracing::info!(
        rps = config.rate_limit.requests_per_second,
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        "Current rate limit: {} requests/s",
        config.rate_limit.requests_per_second
    );

    startup::start_metrics(&config.telemetry)?;
    let pipeline = startup::start_span_pipeline(&config.telemetry);

    let server = GatewayServer::new(config.clone(), pipeline.sink)?;
    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .map_err(|source| GatewayError::Bind {
            address: config.listener.bind_address.clone(),
            source,
        })?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(shutdown.trigger_on_signal());

    let served = server.run(listener, server_shutdown).await;
    pipeline.handle.shutdown().await;
    served.map_err(GatewayError::Serve)?;

    tracing::info!("Shutdown complete");
    Ok(())
}
