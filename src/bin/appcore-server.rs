use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tracing::{error, info};

use appcore::config::AppConfig;
use appcore::fpi::{mock::MockFpi, FpiBackend};
use appcore::managers::backup::BackupManager;
use appcore::managers::cronjob::CronJobManager;
use appcore::managers::function::FunctionManager;
use appcore::metrics::prometheus::MetricsState;
use appcore::scheduling::SchedulingEngine;
use appcore::store::postgres::PostgresStore;
use appcore::wri::mock::MockWri;
use appcore::wri::WorkloadRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .json()
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting appcore-server");

    let config = AppConfig::from_env();

    let store = Arc::new(PostgresStore::connect(&config.store_connection_string).await?);
    store.migrate().await?;
    info!("Connected to store and applied migrations");

    // No production WRI/FPI implementation ships in this crate (spec.md §2:
    // "Implementations are external"); the mock seam is the runtime default
    // until a real orchestrator/provider adapter is wired in.
    let wri: Arc<dyn WorkloadRuntime> = Arc::new(MockWri::new());
    let default_fpi = Arc::new(FpiBackend::Mock(MockFpi::new()));

    let object_store: Arc<dyn object_store::ObjectStore> =
        Arc::new(object_store::memory::InMemory::new());

    let metrics = Arc::new(MetricsState::new());

    let backup_manager = Arc::new(
        BackupManager::new(Arc::clone(&store), object_store).with_metrics(Arc::clone(&metrics)),
    );
    let function_manager = Arc::new(
        FunctionManager::new(Arc::clone(&store), default_fpi).with_metrics(Arc::clone(&metrics)),
    );
    let cronjob_manager = CronJobManager::new(Arc::clone(&store), Arc::clone(&wri), config.clone())
        .with_backup_coupling(Arc::clone(&backup_manager) as Arc<dyn appcore::managers::cronjob::BackupCoupling>)
        .with_metrics(Arc::clone(&metrics));

    // Constructed here so the wiring is exercised end-to-end; the actual
    // tenant-facing API that calls into it lives outside this crate.
    let _core = Arc::new(appcore::ExecutionCore::new(
        Arc::clone(&store),
        cronjob_manager,
        Arc::clone(&function_manager),
        Arc::clone(&backup_manager),
    ));

    let owner = format!("appcore-server-{}", uuid::Uuid::new_v4());
    let mut scheduling_engine = SchedulingEngine::new(
        Arc::clone(&store),
        Arc::clone(&wri),
        Arc::clone(&backup_manager),
        Arc::clone(&function_manager),
        config.clone(),
        Arc::clone(&metrics),
        owner,
    );
    scheduling_engine.start();
    info!("Scheduling engine started");

    let health_metrics_server = {
        let metrics = Arc::clone(&metrics);
        async move {
            let app = Router::new()
                .route("/healthz", get(|| async { "ok" }))
                .route("/readyz", get(|| async { "ok" }))
                .route(
                    "/metrics",
                    get(move || {
                        let metrics = Arc::clone(&metrics);
                        async move { metrics.gather() }
                    }),
                );

            let addr = SocketAddr::from(([0, 0, 0, 0], 9090));
            info!(%addr, "Starting health/metrics server");
            let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
            {
                error!(error = %err, "health/metrics server error");
            }
        }
    };

    health_metrics_server.await;

    scheduling_engine.shutdown();
    info!("appcore-server shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
