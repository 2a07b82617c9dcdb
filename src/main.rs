//! Keygate Server — Credential & Session Lifecycle Engine
//!
//! Main entry point that wires all crates together: the process root owns
//! the connection pool, the cache client, and every service built on them,
//! and passes them by reference. There are no ambient globals.

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use keygate_auth::{
    LockoutGuard, PasswordHasher, PgAuditRecorder, PgSessionLedger, SessionLifecycle,
    ValidationCache, ZxcvbnPolicy,
};
use keygate_cache::CacheManager;
use keygate_core::config::AppConfig;
use keygate_core::error::AppError;
use keygate_database::DatabasePool;
use keygate_token::{KeyMaterial, TokenIssuer, TokenVerifier};
use keygate_worker::{RetentionSweeper, SweepScheduler};

#[tokio::main]
async fn main() {
    let env = std::env::var("KEYGATE_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging.
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt().json().with_env_filter(filter).with_target(true).init();
        }
        _ => {
            fmt().pretty().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Main server run function.
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Keygate v{}", env!("CARGO_PKG_VERSION"));

    // ── Database connection + migrations ─────────────────────────
    let db = DatabasePool::connect(&config.database).await?;
    keygate_database::migration::run_migrations(db.pool()).await?;

    // ── Cache ────────────────────────────────────────────────────
    tracing::info!(provider = %config.cache.provider, "Initializing cache");
    let cache = CacheManager::new(&config.cache).await?;

    // ── Key material and token services ──────────────────────────
    let keys = Arc::new(KeyMaterial::load(&config.token)?);
    tracing::info!(kid = keys.kid(), "Signing key loaded");
    let issuer = Arc::new(TokenIssuer::new(Arc::clone(&keys), &config.token));
    let verifier = Arc::new(TokenVerifier::new(Arc::clone(&keys), &config.token));

    // ── Lifecycle services ───────────────────────────────────────
    let ledger = Arc::new(PgSessionLedger::new(db.pool().clone()));
    let lockout = Arc::new(LockoutGuard::new(cache.clone(), config.lockout.clone()));
    let validation = Arc::new(ValidationCache::new(
        cache.clone(),
        config.session.validation_cache_ttl_seconds,
    ));
    let audit = Arc::new(PgAuditRecorder::new(db.pool().clone()));

    // Held for the process lifetime; the transport layer that consumes it
    // lives outside this engine.
    let _lifecycle = Arc::new(SessionLifecycle::new(
        ledger,
        issuer,
        verifier,
        Arc::new(PasswordHasher::new()),
        Arc::new(ZxcvbnPolicy::default()),
        lockout,
        validation,
        audit,
        config.session.clone(),
    ));

    // ── Retention sweeper ────────────────────────────────────────
    let sweeper = Arc::new(RetentionSweeper::new(
        db.pool().clone(),
        config.retention.clone(),
    ));
    let mut scheduler = SweepScheduler::new().await?;
    scheduler
        .register_retention_sweep(sweeper, &config.retention.sweep_schedule)
        .await?;
    scheduler.start().await?;

    tracing::info!("Keygate is running; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| AppError::internal(format!("Failed to listen for shutdown signal: {e}")))?;

    // ── Graceful shutdown ────────────────────────────────────────
    tracing::info!("Shutting down");
    scheduler.shutdown().await?;
    db.close().await;

    Ok(())
}
