mod api;
mod metrics;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tickd_core::{
    load_config, validate_config, Dispatcher, GithubClient, IntegrationClient, JiraClient,
    LifecycleManager, SqliteEventLog, SqlitePushRecordStore, SqliteTicketStore, TestRailClient,
};

use api::create_router;
use state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("TICKD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        "Configuration loaded successfully (hash: {})",
        &config_hash[..16]
    );
    info!("Database path: {:?}", config.database.path);

    // Create stores
    let tickets = Arc::new(
        SqliteTicketStore::new(&config.database.path).context("Failed to create ticket store")?,
    );
    info!("Ticket store initialized");

    let events = Arc::new(
        SqliteEventLog::new(&config.database.path).context("Failed to create event log")?,
    );
    info!("Event log initialized");

    let push_records = Arc::new(
        SqlitePushRecordStore::new(&config.database.path)
            .context("Failed to create push record store")?,
    );
    info!("Push record store initialized");

    // Create integration clients from config
    let mut clients: Vec<Arc<dyn IntegrationClient>> = Vec::new();
    if let Some(ref jira_config) = config.integrations.jira {
        info!("Initializing Jira client at {}", jira_config.url);
        clients.push(Arc::new(JiraClient::new(jira_config.clone())));
    }
    if let Some(ref github_config) = config.integrations.github {
        info!("Initializing GitHub client for {}", github_config.repo);
        clients.push(Arc::new(GithubClient::new(github_config.clone())));
    }
    if let Some(ref testrail_config) = config.integrations.testrail {
        info!("Initializing TestRail client at {}", testrail_config.url);
        clients.push(Arc::new(TestRailClient::new(testrail_config.clone())));
    }
    if clients.is_empty() {
        info!("No integration targets configured");
    }

    // Create and start the dispatcher
    let dispatcher = Arc::new(Dispatcher::new(
        clients,
        Arc::clone(&tickets),
        Arc::clone(&events),
        Arc::clone(&push_records),
        config.integrations.retry.clone(),
        config.integrations.queue_capacity,
    ));
    let dispatcher_handle = dispatcher.start();

    // Create the lifecycle manager
    let lifecycle = Arc::new(
        LifecycleManager::new(Arc::clone(&tickets), Arc::clone(&events))
            .with_dispatcher(dispatcher_handle),
    );

    // Create app state and router
    let state = Arc::new(AppState::new(
        config.clone(),
        lifecycle,
        tickets,
        events,
        push_records,
        Arc::clone(&dispatcher),
    ));
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop dispatcher workers; undelivered events stay recorded in the
    // push records and resume on next startup.
    info!("Server shutting down...");
    dispatcher.stop().await;
    info!("Integration dispatcher stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
