//! Subathon timer binary entrypoint wiring REST, WebSocket, SSE, the alert socket and the
//! snapshot file.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use subathon_timer::{
    config::AppConfig,
    dao::snapshot_store::FileSnapshotStore,
    routes,
    services::{persistence_service, timer_service},
    state::{AppState, SharedState, timer::now_ms},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();

    let store = Arc::new(FileSnapshotStore::new(config.snapshot_path.clone()));
    info!(path = %store.path().display(), "using snapshot file");
    let initial = persistence_service::load_initial_state(store.as_ref(), now_ms()).await;
    let app_state = AppState::new(initial, store);

    let mut tasks = vec![
        timer_service::spawn_ticker(app_state.clone()),
        timer_service::spawn_ingest_sweeper(app_state.clone()),
    ];
    if let Some(handle) = spawn_provider_client(&app_state, &config) {
        tasks.push(handle);
    }

    let app = build_router(app_state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let abort_handles: Vec<_> = tasks.iter().map(|task| task.abort_handle()).collect();
    let shutdown_state = app_state.clone();
    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Stop mutating the timer and end open streams so connections can drain.
            for handle in &abort_handles {
                handle.abort();
            }
            shutdown_state.begin_shutdown();
        })
        .await
        .context("serving axum");

    for task in &tasks {
        task.abort();
    }
    persistence_service::flush_on_shutdown(&app_state).await;

    served
}

#[cfg(feature = "streamlabs")]
fn spawn_provider_client(
    state: &SharedState,
    config: &AppConfig,
) -> Option<tokio::task::JoinHandle<()>> {
    use subathon_timer::services::provider_client;

    let Some(streamlabs) = config.streamlabs.clone() else {
        info!("no provider token configured; alert socket disabled");
        return None;
    };
    Some(tokio::spawn(provider_client::run(state.clone(), streamlabs)))
}

#[cfg(not(feature = "streamlabs"))]
fn spawn_provider_client(
    _state: &SharedState,
    config: &AppConfig,
) -> Option<tokio::task::JoinHandle<()>> {
    if config.streamlabs.is_some() {
        warn!("provider token configured but the streamlabs feature is disabled");
    }
    None
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown requested");
}
