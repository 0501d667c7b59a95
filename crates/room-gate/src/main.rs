//! Room Gate
//!
//! HTTP admission gate for capacity-bounded rooms.
//!
//! # Startup Flow
//!
//! 1. Initialize tracing (JSON output)
//! 2. Load configuration from environment
//! 3. Initialize Prometheus metrics recorder
//! 4. Connect to the room store
//! 5. Build classifier, registrar and Membership Manager
//! 6. Serve until SIGINT/SIGTERM, then drain

use room_gate::classifier::AdmissionClassifier;
use room_gate::config::Config;
use room_gate::observability::init_metrics_recorder;
use room_gate::routes::{self, AppState};
use room_gate::services::{build_registrar, MembershipManager};
use room_gate::store;
use room_gate::token::RandomTokenGenerator;
use secrecy::ExposeSecret;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "room_gate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Room Gate");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        environment = ?config.environment,
        max_room_participants = config.max_room_participants,
        registration_strategy = config.registration_strategy.as_str(),
        "Configuration loaded successfully"
    );

    info!("Initializing Prometheus metrics recorder...");
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    info!("Connecting to room store...");
    let room_store = store::connect(config.redis_url.expose_secret())
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to connect to room store");
            e
        })?;
    info!("Room store connection established");

    let classifier = Arc::new(AdmissionClassifier::new(&config.bot_signatures)?);
    let registrar = build_registrar(&config, room_store.clone());
    let membership = Arc::new(MembershipManager::new(
        room_store.clone(),
        registrar,
        Arc::new(RandomTokenGenerator::new()),
        config.max_room_participants,
    ));

    let bind_address = config.bind_address.clone();
    let drain_seconds = config.drain_seconds;

    let state = Arc::new(AppState {
        config,
        classifier,
        membership,
        store: room_store,
    });

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Room Gate listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(drain_seconds))
    .await?;

    info!("Room Gate shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and the drain period is complete.
async fn shutdown_signal(drain_seconds: u64) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain_seconds > 0 {
        warn!("Draining connections for {} seconds...", drain_seconds);
        tokio::time::sleep(Duration::from_secs(drain_seconds)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (GATE_DRAIN_SECONDS=0)");
    }
}
