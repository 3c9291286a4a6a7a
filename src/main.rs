//! Bookrec Engine
//!
//! Hybrid book recommendation service.
//!
//! # Architecture
//!
//! - **Catalog**: users, books and ratings in PostgreSQL
//! - **Recommendation Engine**: genre-overlap content scoring blended with
//!   ratings from readers of similar taste
//! - **API Server**: read-only REST endpoints
//!
//! # Graceful Shutdown
//!
//! The engine handles SIGTERM and SIGINT signals: in-flight requests
//! complete, then database connections are closed.

use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bookrec::database::{self, Database, PgCatalogStore};
use bookrec::{api, Config, RecommendationEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with structured logging
    init_tracing();

    info!("═══════════════════════════════════════════════════════════════");
    info!("  📚 Bookrec Engine v{}", env!("CARGO_PKG_VERSION"));
    info!("═══════════════════════════════════════════════════════════════");

    // Load configuration
    let config = Arc::new(Config::from_env()?);
    info!("✅ Configuration loaded and validated");

    // Initialize database connection pool
    let db = Database::new(&config.database).await?;
    info!("✅ Database connection pool established");

    if config.database.run_migrations {
        info!("📦 Running database migrations...");
        database::run_migrations(db.pool()).await?;
        info!("✅ Database migrations applied");
    }

    let store = PgCatalogStore::new(db.clone());
    let engine = RecommendationEngine::with_config(store, config.recommendation.engine_config());
    info!("✅ Recommendation engine ready");

    let stats = db.stats();
    info!("═══════════════════════════════════════════════════════════════");
    info!("  📡 API: http://{}:{}", config.api.host, config.api.port);
    info!(
        "  🔗 Health: http://{}:{}/health",
        config.api.host, config.api.port
    );
    info!("  🗄️ Pool: {} connections ({} idle)", stats.size, stats.idle);
    info!("═══════════════════════════════════════════════════════════════");

    let result = api::start_server(engine, &config.api, shutdown_signal()).await;
    if let Err(e) = &result {
        error!("API server error: {:?}", e);
    }

    // Cleanup resources
    info!("🛑 Shutting down...");
    db.close().await;

    info!("👋 Bookrec Engine stopped gracefully");
    result
}

/// Initialize structured logging with tracing.
/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Default log levels
        EnvFilter::new("bookrec_engine=debug,bookrec=debug,tower_http=debug,sqlx=warn,info")
    });

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let json_layer = json.then(|| fmt::layer().json().with_target(true));
    let text_layer = (!json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(std::env::var("NO_COLOR").is_err())
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
    info!("📴 Shutdown signal received");
}
