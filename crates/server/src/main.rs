mod api;
mod background;
mod metrics;
mod router;
mod state;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use newswire_analysis::{
    AdaptiveRateLimiter, AnalysisSemaphore, CircuitBreaker, Orchestrator, RunGovernor,
};
use newswire_core::{Config, SystemClock};
use newswire_ingest::{FeedScheduler, Fetcher};
use newswire_llm::Classifier;

use crate::background::{spawn_background_tasks, Shutdown};
use crate::metrics::Metrics;
use crate::state::AppState;

async fn serve(config: Config) -> anyhow::Result<()> {
    config.log_summary();

    let pool = newswire_store::init_pg_pool(&config.database).await?;
    let clock: Arc<dyn newswire_core::Clock> = Arc::new(SystemClock);

    // Backpressure primitives: one of each per process.
    let limiter = Arc::new(AdaptiveRateLimiter::new(
        config.limiter.clone(),
        Arc::clone(&clock),
    ));
    let breaker = Arc::new(CircuitBreaker::new(
        config.breaker.clone(),
        Arc::clone(&clock),
    ));
    let semaphore = Arc::new(AnalysisSemaphore::new(config.analysis.semaphore_capacity));
    let halt = Arc::new(AtomicBool::new(false));

    let classifier = Arc::new(Classifier::from_config(&config.llm).map_err(|e| {
        anyhow::anyhow!("LLM classifier unavailable: {} (set LLM_API_KEY)", e)
    })?);

    let orchestrator = Arc::new(Orchestrator::new(
        pool.clone(),
        classifier,
        Arc::clone(&limiter),
        Arc::clone(&breaker),
        Arc::clone(&semaphore),
        Arc::clone(&clock),
        Arc::clone(&halt),
        Duration::from_secs(config.analysis.semaphore_timeout_seconds),
        Duration::from_secs(config.limiter.acquire_timeout_seconds),
    ));

    let governor = Arc::new(RunGovernor::new(
        pool.clone(),
        config.governor.clone(),
        Arc::clone(&clock),
        Arc::clone(&orchestrator),
        Arc::clone(&halt),
        config.analysis.avg_tokens_per_item,
        config.llm.default_model_tag.clone(),
        config.limiter.rate_per_second,
    ));

    let fetcher = Arc::new(Fetcher::new(&config.fetch)?);
    let (intake_tx, intake_rx) = tokio::sync::mpsc::unbounded_channel();
    let scheduler = Arc::new(FeedScheduler::new(
        pool.clone(),
        fetcher,
        config.fetch.clone(),
        Arc::clone(&clock),
        intake_tx.clone(),
    ));

    let metrics = Arc::new(Metrics::new()?);

    let state = Arc::new(AppState {
        pool,
        config: config.clone(),
        scheduler,
        governor,
        orchestrator,
        limiter,
        breaker,
        semaphore,
        metrics,
        intake: intake_tx,
        started_at: Utc::now(),
    });

    let shutdown = Shutdown::new();
    spawn_background_tasks(Arc::clone(&state), intake_rx, &shutdown);

    let app = router::build_router(Arc::clone(&state));
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("server listening on http://{}", addr);

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("ctrl-c received — shutting down"),
                Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
            }
        })
        .await;

    shutdown.trigger();
    serve_result?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    newswire_core::config::load_dotenv();
    let config = Config::from_env();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("serve") | None => serve(config).await?,
        Some("config") => {
            println!("{}", serde_json::to_string_pretty(&config.redacted_summary())?);
        }
        _ => {
            println!("newswire v{}", env!("CARGO_PKG_VERSION"));
            println!("Usage: newswire-server <command>");
            println!("  serve     Start the HTTP server and background workers (default)");
            println!("  config    Print the redacted effective configuration");
        }
    }

    Ok(())
}
