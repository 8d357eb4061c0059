//! Wallet Server Binary
//!
//! Serves the wallet HTTP API on top of Postgres.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallet_fx::{CachingRateSource, HttpRateSource, PgRateSource, RateCache, RateCacheConfig, RateSource};
use wallet_ledger::{LedgerEngine, PgBalanceStore};
use wallet_server::{
    build_app, AccountService, AppState, AuthState, CorsState, Metrics, PgUserStore,
    RateSourceKind, ServerConfig, TokenIssuer, TokenValidator, WalletService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    info!("Starting wallet server");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let connect_options = config
        .database
        .connect_options()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(connect_options)
        .await?;
    info!(database = %config.database.describe(), "Database connection established");

    wallet_ledger::init_schema(&pool).await?;
    let db_rates = PgRateSource::new(pool.clone());
    db_rates.init_schema().await?;
    let users = PgUserStore::new(pool.clone());
    users.init_schema().await?;

    let source: Arc<dyn RateSource> = match config.rates.source {
        RateSourceKind::Database => Arc::new(db_rates),
        RateSourceKind::Remote => {
            let url = config.rates.service_url.clone().unwrap_or_default();
            Arc::new(HttpRateSource::new(url, config.rates.request_timeout)?)
        }
    };
    let rate_cache = Arc::new(RateCache::with_config(RateCacheConfig {
        ttl: config.rates.cache_ttl,
        max_entries: config.rates.cache_max_entries,
    }));
    info!(
        source = source.name(),
        ttl_secs = config.rates.cache_ttl.as_secs(),
        "Rate source ready"
    );
    let rates = Arc::new(CachingRateSource::new(source, rate_cache.clone()));

    let store = PgBalanceStore::new(pool.clone(), config.ledger.lock_timeout);
    let ledger = Arc::new(LedgerEngine::new(store).with_op_timeout(config.ledger.op_timeout));

    let metrics = Arc::new(Metrics::new());
    let service = Arc::new(WalletService::new(ledger, rates, metrics.clone()));
    let accounts = Arc::new(
        AccountService::new(
            Arc::new(users),
            TokenIssuer::new(config.auth.jwt_secret.as_bytes(), config.auth.token_ttl),
        )
        .with_hash_cost(config.auth.password_hash_cost),
    );

    let app = build_app(
        AppState {
            service,
            accounts,
            metrics,
            rate_cache,
        },
        AuthState {
            validator: Arc::new(TokenValidator::new(config.auth.jwt_secret.as_bytes())),
        },
        CorsState::new(config.http.cors_allowed_origin.as_deref()),
    );

    let listener =
        tokio::net::TcpListener::bind((config.listen_addr.as_str(), config.listen_port)).await?;
    info!(
        listen_addr = %config.listen_addr,
        listen_port = %config.listen_port,
        "Wallet server running"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    info!("Wallet server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
