use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use tubely::control::pipeline::UploadPipeline;
use tubely::control::repository::InMemoryVideoRepository;
use tubely::core::auth::JwtAuthenticator;
use tubely::core::config::AppConfig;
use tubely::core::shutdown::{ShutdownCoordinator, HTTP_DRAIN_TIMEOUT_SECS};
use tubely::delivery::router::{self, AppState};
use tubely::media::{FfmpegRemuxer, FfprobeInspector};
use tubely::observability::metrics as obs_metrics;
use tubely::observability::redact_layer::RedactingLayer;
use tubely::storage::{self, SignedUrlIssuer};

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration (layered: default.toml → {env}.toml → env vars)
    let config = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    info!(version = env!("CARGO_PKG_VERSION"), "Tubely starting");
    debug!(config = ?config, "effective configuration");

    // Must be installed before any metrics are recorded.
    let metrics_handle = if config.observability.metrics_enabled {
        match obs_metrics::install_prometheus_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "failed to install Prometheus recorder, /metrics will be empty");
                obs_metrics::detached_handle()
            }
        }
    } else {
        obs_metrics::detached_handle()
    };
    obs_metrics::describe_all_metrics();

    // Log panics with a backtrace and count them.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        obs_metrics::inc_panic_total();
        let backtrace = std::backtrace::Backtrace::force_capture();
        eprintln!("PANIC: {info}\nBacktrace:\n{backtrace}");
        default_hook(info);
    }));

    let spool_dir = config.upload.spool_dir();
    if let Err(e) = tokio::fs::create_dir_all(&spool_dir).await {
        error!(path = %spool_dir.display(), error = %e, "cannot create spool directory");
        return ExitCode::FAILURE;
    }

    let backend = match storage::connect(&config.storage).await {
        Ok(backend) => backend,
        Err(e) => {
            error!(error = %e, backend = %config.storage.backend, "storage initialization failed");
            return ExitCode::FAILURE;
        }
    };
    info!(
        backend = backend.store.backend(),
        bucket = backend.store.bucket(),
        "storage backend connected"
    );

    let shutdown = ShutdownCoordinator::new();
    let repo = Arc::new(InMemoryVideoRepository::new());
    let pipeline = UploadPipeline::new(
        Arc::new(FfprobeInspector::new(&config.media)),
        Arc::new(FfmpegRemuxer::new(&config.media, spool_dir.clone())),
        backend.store.clone(),
        SignedUrlIssuer::new(backend.signer.clone()),
        repo,
    );

    let start_time = Instant::now();
    let bind = (config.server.host.clone(), config.server.port);
    let app_state = AppState {
        pipeline,
        auth: Arc::new(JwtAuthenticator::new(&config.auth)),
        local: backend.local.clone(),
        config: Arc::new(config),
        start_time,
        metrics_handle,
    };
    let app = router::build_router(app_state);

    let uptime_cancel = shutdown.token();
    tokio::spawn(async move {
        obs_metrics::run_uptime_task(start_time, uptime_cancel).await;
    });

    let listener = match tokio::net::TcpListener::bind((bind.0.as_str(), bind.1)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(host = %bind.0, port = bind.1, error = %e, "failed to bind HTTP listener");
            return ExitCode::FAILURE;
        }
    };
    match listener.local_addr() {
        Ok(addr) => info!(%addr, "HTTP server listening"),
        Err(e) => warn!(error = %e, "HTTP server listening on unknown address"),
    }

    let shutdown_token = shutdown.token();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
            })
            .await
    });

    shutdown.wait_for_signal_and_shutdown().await;

    info!(
        timeout_secs = HTTP_DRAIN_TIMEOUT_SECS,
        "draining in-flight requests"
    );
    match tokio::time::timeout(Duration::from_secs(HTTP_DRAIN_TIMEOUT_SECS), server).await {
        Ok(Ok(Ok(()))) => {
            info!("graceful shutdown completed");
            ExitCode::SUCCESS
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "HTTP server error");
            ExitCode::FAILURE
        }
        Ok(Err(e)) => {
            error!(error = %e, "HTTP server task failed");
            ExitCode::FAILURE
        }
        Err(_) => {
            error!(
                "shutdown timed out after {}s, forcing exit",
                HTTP_DRAIN_TIMEOUT_SECS
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_level: &str, log_format: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match log_format {
        "json" => registry
            .with(RedactingLayer::new(fmt::layer().json()))
            .init(),
        _ => registry.with(RedactingLayer::new(fmt::layer())).init(),
    }
}
