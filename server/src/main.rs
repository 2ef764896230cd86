// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use anyhow::Context;
use axum::http::{HeaderName, Method};
use billing_server::config::Config;
use billing_server::scheduler::ReminderScheduler;
use billing_server::{database, notifier, routes};
use std::time::Duration;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting up the server...");

    let config = Config::from_env();
    tracing::debug!("Loaded configuration: {:?}", config);

    let db_pool = match database::establish_connection_pool(&config.database_url).await {
        Ok(pool) => {
            tracing::info!("Database connection was made successfully.");
            pool
        }
        Err(e) => {
            tracing::error!("Failed to connect with the database: {:?}", e);
            std::process::exit(1);
        }
    };

    let notifier = notifier::from_config(config.twilio.as_ref());
    tracing::info!("SMS backend: {}", notifier.name());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = ReminderScheduler::new(
        db_pool.clone(),
        notifier,
        config.reminder_hour,
        config.sweep_check_interval(),
    )
    .spawn(shutdown_rx);

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("accept"),
            HeaderName::from_static("authorization"),
        ])
        .allow_origin(Any);

    let app = routes::create_router(db_pool.clone())
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = config.addr().context("Invalid listen address")?;
    tracing::info!("The server listens on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Every ledger write is committed as it happens; stop the timer, let a
    // running sweep finish, then close the pool.
    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(Duration::from_secs(30), scheduler)
        .await
        .is_err()
    {
        tracing::warn!("Reminder scheduler did not stop in time.");
    }
    db_pool.close().await;
    tracing::info!("Server stopped.");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {:?}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {:?}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received.");
}
