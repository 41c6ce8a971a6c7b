//! Statboard Daemon
//!
//! Runs the counter flush scheduler and serves health and metrics endpoints.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         statboard                                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │    Flush     │───▶│   Counter    │───▶│   Durable    │       │
//! │  │  Scheduler   │    │    Store     │    │    Store     │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! │  /healthz /readyz :8081               /metrics :8080            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Standalone mode wires the in-memory cache and durable stores. Deployments
//! with real backends implement `CacheStore` and `DurableCounterStore`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use statboard::adapters::InMemoryDurableStore;
use statboard::{
    metrics, CacheClient, CounterStore, DomainEvent, EngineConfig, FlushScheduler, InMemoryCacheStore,
    RankingStore, ReadModelProjector,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Statboard - write-behind counters and leaderboards for a community backend
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine configuration file (YAML)
    #[arg(long, env = "STATBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds between flush cycles (overrides the config file)
    #[arg(long, env = "FLUSH_INTERVAL_SECS")]
    flush_interval_secs: Option<u64>,

    /// Failed reconciliations tolerated per entity (overrides the config file)
    #[arg(long, env = "MAX_RETRY_COUNT")]
    max_retry_count: Option<u32>,

    /// JSON-lines file of domain events to project at startup
    #[arg(long, env = "STATBOARD_REPLAY")]
    replay: Option<PathBuf>,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// File config (or defaults) with CLI overrides applied.
    fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(secs) = self.flush_interval_secs {
            config.counter.flush_interval_secs = secs;
        }
        if let Some(retries) = self.max_retry_count {
            config.counter.max_retry_count = retries;
        }
        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let config = args.engine_config()?;

    info!("Starting statboard");
    info!("  Flush interval: {}s", config.counter.flush_interval_secs);
    info!("  Max retry count: {}", config.counter.max_retry_count);
    info!(
        "  Ranking caps: global={} category={} window={}",
        config.ranking.global_cap, config.ranking.category_cap, config.ranking.window_cap
    );

    metrics::init();

    // Standalone backends
    let cache = CacheClient::new(Arc::new(InMemoryCacheStore::new()));
    let durable = Arc::new(InMemoryDurableStore::new());

    let counters = Arc::new(CounterStore::new(cache.clone(), durable, config.counter.clone()));
    let rankings = RankingStore::new(cache.clone(), config.ranking.clone());
    let projector = ReadModelProjector::new(counters.clone(), rankings);

    if let Some(path) = &args.replay {
        replay_events(&projector, path).await?;
    }

    let shutdown = CancellationToken::new();

    // Start flush scheduler
    let scheduler = Arc::new(FlushScheduler::from_store(counters.clone()));
    let flush_handle = tokio::spawn(scheduler.clone().run(shutdown.clone()));

    // Start health server
    let health_addr = args.health_addr.clone();
    let health_cache = cache.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_cache).await {
            error!("Health server error: {:#}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr).await {
            error!("Metrics server error: {:#}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    shutdown.cancel();
    flush_handle.await.context("Flush scheduler task failed")?;

    let report = scheduler.run_once().await;
    info!(
        "Final flush: {} applied, {} rejected, {} left pending",
        report.applied, report.rejected, report.retrieval_failures
    );

    info!("Statboard shutdown complete");
    Ok(())
}

/// Project every event of a JSON-lines file. Bad lines and rejected events
/// are logged and skipped.
async fn replay_events(projector: &ReadModelProjector, path: &Path) -> anyhow::Result<()> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read replay file {}", path.display()))?;

    let mut applied = 0usize;
    for (line_no, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event: DomainEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping malformed event on line {}: {}", line_no + 1, e);
                continue;
            }
        };
        match projector.apply(&event).await {
            Ok(_) => applied += 1,
            Err(e) => warn!("Event on line {} not applied: {}", line_no + 1, e),
        }
    }

    info!("Replayed {} events from {}", applied, path.display());
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}

// =============================================================================
// HTTP Helpers
// =============================================================================

mod http {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::{Response, StatusCode};

    pub type Reply = Response<Full<Bytes>>;

    pub fn text(status: StatusCode, body: impl Into<Bytes>) -> Reply {
        let mut response = Response::new(Full::new(body.into()));
        *response.status_mut() = status;
        response
    }
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str, cache: CacheClient) -> anyhow::Result<()> {
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn health_handler(
        req: Request<hyper::body::Incoming>,
        cache: CacheClient,
    ) -> std::result::Result<http::Reply, std::convert::Infallible> {
        let response = match req.uri().path() {
            "/healthz" | "/livez" => http::text(StatusCode::OK, "ok"),
            "/readyz" => match cache.ping().await {
                Ok(()) => http::text(StatusCode::OK, "ok"),
                Err(e) => {
                    warn!("Readiness check failed: {}", e);
                    http::text(StatusCode::SERVICE_UNAVAILABLE, "cache store unavailable")
                }
            },
            _ => http::text(StatusCode::NOT_FOUND, "not found"),
        };
        Ok(response)
    }

    let addr: SocketAddr = addr.parse().context("Invalid health server address")?;
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind health server")?;

    info!("Health server listening on {}", addr);

    loop {
        let (stream, _) = listener.accept().await.context("Health server accept error")?;
        let io = TokioIo::new(stream);
        let cache = cache.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| health_handler(req, cache.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Health server connection error: {}", e);
            }
        });
    }
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str) -> anyhow::Result<()> {
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, StatusCode};
    use hyper_util::rt::TokioIo;
    use prometheus::{Encoder, TextEncoder};
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn metrics_handler(
        req: Request<hyper::body::Incoming>,
    ) -> std::result::Result<http::Reply, std::convert::Infallible> {
        let response = match req.uri().path() {
            "/metrics" => {
                let encoder = TextEncoder::new();
                let mut buffer = Vec::new();
                match encoder.encode(&prometheus::gather(), &mut buffer) {
                    Ok(()) => {
                        let mut response = http::text(StatusCode::OK, buffer);
                        if let Ok(content_type) = encoder.format_type().parse() {
                            response
                                .headers_mut()
                                .insert(hyper::header::CONTENT_TYPE, content_type);
                        }
                        response
                    }
                    Err(e) => {
                        error!("Failed to encode metrics: {}", e);
                        http::text(StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable")
                    }
                }
            }
            _ => http::text(StatusCode::NOT_FOUND, "not found"),
        };
        Ok(response)
    }

    let addr: SocketAddr = addr.parse().context("Invalid metrics server address")?;
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind metrics server")?;

    info!("Metrics server listening on {}", addr);

    loop {
        let (stream, _) = listener.accept().await.context("Metrics server accept error")?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(metrics_handler))
                .await
            {
                error!("Metrics server connection error: {}", e);
            }
        });
    }
}
