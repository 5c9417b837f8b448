//! Roster API Server Entry Point
//!
//! Validates configuration, prepares the schema, wires the backends and
//! starts the Axum HTTP server. Any startup failure exits with status 1.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use roster_api::{
    build_session_store, create_router, ensure_schema, init_tracing, ApiError, ApiResult,
    AppState, PgRecordStore, TelemetryConfig,
};
use roster_core::{RosterConfig, ServerConfig};
use roster_storage::RedisCacheClient;

#[tokio::main]
async fn main() -> ExitCode {
    let config = RosterConfig::from_env();

    let telemetry = match &config {
        Ok(config) => TelemetryConfig::from_server(&config.server),
        Err(_) => TelemetryConfig::default(),
    };
    if let Err(err) = init_tracing(&telemetry) {
        eprintln!("{}", err);
        return ExitCode::FAILURE;
    }

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "Roster API failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: RosterConfig) -> ApiResult<()> {
    if config.server.secret_generated {
        tracing::warn!("SECRET_KEY not set, sessions will not survive a restart");
    }

    ensure_schema(&config.database).await?;

    let store = Arc::new(PgRecordStore::new(config.database.clone()));
    let cache = Arc::new(RedisCacheClient::from_config(&config.cache));
    let sessions = build_session_store(&config);
    tracing::info!(
        backend = ?config.session.backend,
        lifetime = ?config.session.lifetime,
        "Session store ready"
    );
    let state = AppState::from_config(&config, store, cache, sessions)?;
    let app = create_router(state);

    let addr = resolve_bind_addr(&config.server)?;
    tracing::info!(%addr, "Starting Roster API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

fn resolve_bind_addr(server: &ServerConfig) -> ApiResult<SocketAddr> {
    let addr = format!("{}:{}", server.bind_host, server.port);
    addr.parse::<SocketAddr>().map_err(|e| {
        ApiError::internal_error(format!("Invalid bind address {}: {}", addr, e))
    })
}
