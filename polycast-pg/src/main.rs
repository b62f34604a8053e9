//! polycast-pg: podcast generation orchestrator
//!
//! Dispatches per-language synthesis jobs for the daily digest, polls the
//! synthesis API until jobs settle, reconciles stuck jobs, and serves the
//! operator API.

use chrono::Utc;
use clap::Parser;
use polycast_common::events::EventBus;
use polycast_pg::services::audio_client::{AudioJobClient, HttpAudioJobClient};
use polycast_pg::services::content_client::{ContentProvider, HttpContentProvider};
use polycast_pg::services::dispatcher::Dispatcher;
use polycast_pg::services::poller;
use polycast_pg::services::sweep::SweepService;
use polycast_pg::state::{AppState, DateLocks};
use polycast_pg::{api, config, db};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "polycast-pg", version, about = "Polycast podcast generation module")]
struct Args {
    /// HTTP listen port
    #[arg(short, long, env = "POLYCAST_PG_PORT", default_value_t = 5780)]
    port: u16,

    /// Data folder holding the database
    #[arg(long)]
    data_folder: Option<PathBuf>,

    /// Path to polycast.toml
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "polycast_pg=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!(
        "Starting polycast-pg v{} ({}, {} build)",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_PROFILE")
    );

    let toml_config = polycast_common::config::load_toml_config(args.config.as_deref())?;
    let data_folder = polycast_common::config::resolve_data_folder(
        args.data_folder.as_deref(),
        "POLYCAST_DATA_FOLDER",
        Some(&toml_config),
    );
    polycast_common::config::ensure_data_folder(&data_folder)?;
    info!("Data folder: {}", data_folder.display());

    let db_path = polycast_common::config::database_path(&data_folder);
    let db = db::init_database(&db_path).await?;

    let params = Arc::new(RwLock::new(db::settings::load_parameters(&db).await));
    info!(params = ?*params.read().await, "Generation parameters loaded");

    let content_api_url = config::resolve_api_url(
        config::CONTENT_API_URL_ENV,
        toml_config.content_api_url.as_ref(),
        config::DEFAULT_CONTENT_API_URL,
    );
    let speech_api_url = config::resolve_api_url(
        config::SPEECH_API_URL_ENV,
        toml_config.speech_api_url.as_ref(),
        config::DEFAULT_SPEECH_API_URL,
    );
    let speech_api_key = config::resolve_speech_api_key(&db, &toml_config).await;
    if speech_api_key.is_none() {
        warn!("No speech API key configured; synthesis requests will be unauthenticated");
    }

    let content: Arc<dyn ContentProvider> =
        Arc::new(HttpContentProvider::new(content_api_url.clone())?);
    let audio: Arc<dyn AudioJobClient> =
        Arc::new(HttpAudioJobClient::new(speech_api_url.clone(), speech_api_key)?);
    info!(content_api = %content_api_url, speech_api = %speech_api_url, "External API clients ready");

    let event_bus = EventBus::new(256);
    let date_locks = DateLocks::new();
    let last_error: Arc<RwLock<Option<String>>> = Arc::new(RwLock::new(None));

    let dispatcher = Arc::new(Dispatcher::new(
        db.clone(),
        event_bus.clone(),
        content.clone(),
        audio.clone(),
        params.clone(),
        date_locks.clone(),
    ));

    // Jobs left in flight by the previous process get their pollers back
    let resumed = poller::resume_inflight_jobs(&db, &event_bus, &audio, &params).await?;
    if resumed > 0 {
        info!(count = resumed, "Resumed pollers for in-flight jobs");
    }

    let sweep_service = SweepService::new(
        db.clone(),
        event_bus.clone(),
        audio.clone(),
        params.clone(),
        date_locks.clone(),
        last_error.clone(),
    );
    tokio::spawn(sweep_service.run());

    let state = AppState {
        db,
        event_bus,
        content,
        audio,
        params,
        date_locks,
        dispatcher,
        startup_time: Utc::now(),
        last_error,
    };

    let app = api::create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
