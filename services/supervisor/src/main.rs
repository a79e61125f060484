//! roomvisor supervisor
//!
//! Admits rooms onto the cluster: starts them when their region has room,
//! queues them otherwise, and admits the next queued room whenever one is
//! torn down.

use std::sync::Arc;

use anyhow::Result;
use roomvisor_supervisor::{
    adapters::{ChakraStreamService, GatewayPresenceService},
    api,
    capacity::KubernetesProvider,
    config,
    coordinator::{Collaborators, DeployCoordinator},
    db::Database,
    state::AppState,
};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Prefer RUST_LOG, fall back to SUPERVISOR_LOG_LEVEL.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting roomvisor supervisor");
    info!(
        listen_addr = %config.listen_addr,
        kubernetes = %config.kubernetes.api_url,
        namespace = %config.kubernetes.namespace,
        "Configuration loaded"
    );

    let db = match Database::connect(&config.database).await {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "Failed to connect to database");
            return Err(e.into());
        }
    };

    if config.dev_mode {
        info!("Running database migrations (dev mode)");
        if let Err(e) = db.run_migrations().await {
            error!(error = %e, "Failed to run migrations");
            return Err(e.into());
        }
    }

    let capacity = KubernetesProvider::new(config.kubernetes_config()?)?;
    info!(
        cpu = %capacity.footprint().cpu,
        memory = %capacity.footprint().memory,
        "Room footprint"
    );
    let streams = ChakraStreamService::connect(&config.chakra_endpoints()?, config.retry.clone())?;
    let presence =
        GatewayPresenceService::connect(&config.gateway_endpoints()?, config.retry.clone())?;

    let coordinator = DeployCoordinator::new(
        Collaborators {
            queue: Arc::new(db.admission_queue()),
            capacity: Arc::new(capacity),
            streams: Arc::new(streams),
            presence: Arc::new(presence),
            notifier: Arc::new(db.notifier()),
        },
        config.coordinator.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = api::create_router(AppState::new(coordinator));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });
    tokio::pin!(server_handle);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
            match (&mut server_handle).await {
                Ok(Ok(())) => info!("In-flight requests drained"),
                Ok(Err(e)) => error!(error = %e, "Server error during shutdown"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
        result = &mut server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    db.pool().close().await;
    info!("Supervisor shutdown complete");
    Ok(())
}
