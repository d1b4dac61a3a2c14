mod config;

use std::sync::Arc;

use tracing::{error, info, warn};

use signage_api::auth::{AppState, AppStateInner, Settings};
use signage_api::router::build_router;
use signage_api::storage::{self, Storage};
use signage_db::Database;
use signage_gateway::dispatcher::Dispatcher;

use crate::config::Config;

/// How often expired screenshots are pruned.
const CLEANUP_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "signage=debug,signage_api=debug,signage_gateway=debug,tower_http=debug".into()
            }),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("FATAL: {}", e);
            error!("Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = Arc::new(Database::open(&config.db_path)?);
    let storage = Arc::new(Storage::new(config.storage_dir.clone(), &config.public_url).await?);

    tokio::spawn(storage::run_cleanup_loop(
        db.clone(),
        storage.clone(),
        config.screenshot_retention_hours,
        CLEANUP_INTERVAL_SECS,
    ));

    if config.provision_token.is_none() {
        warn!("SIGNAGE_PROVISION_TOKEN is unset; device provisioning is disabled");
    }

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        dispatcher: Dispatcher::new(),
        storage,
        settings: Settings {
            provision_token: config.provision_token.clone(),
            online_window: config.online_window,
            max_upload_bytes: config.max_upload_bytes,
        },
    });

    let app = build_router(state);

    info!("Signage server listening on {}", config.addr);
    info!("Serving media from {} as {}/media", config.storage_dir.display(), config.public_url);
    info!(
        "Screenshot retention: {} hours ({} days)",
        config.screenshot_retention_hours,
        config.screenshot_retention_hours / 24
    );

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Signage server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
