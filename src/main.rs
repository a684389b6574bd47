use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audit_ledger::api;
use audit_ledger::audit::{AuditLedger, ProfileDirectory};
use audit_ledger::config::AppConfig;
use audit_ledger::database::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audit_ledger=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting audit ledger");

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize database
    let database = Database::new(&config.database_url).await?;
    database.run_migrations().await?;
    info!("Database migrations completed");

    let directory = std::sync::Arc::new(ProfileDirectory::new(database.pool().clone()));
    let (ledger, writer_task) = AuditLedger::open_with_directory(database.clone(), &config, directory);

    let head = ledger.head().await?;
    info!(
        "Ledger opened with {} entries (head {})",
        head.total_entries,
        if head.event_hash.is_empty() { "genesis" } else { head.event_hash.as_str() }
    );

    let app = api::router(ledger);

    let addr: SocketAddr = config.listen_addr().parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router held the last writer handle; let queued appends finish.
    writer_task.await?;
    database.close().await;
    info!("Audit ledger stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
