//! Tracing subscriber initialization.
//!
//! JSON-formatted events filtered by `RUST_LOG` when set, otherwise by a
//! default directive chosen from the debug flag.

use roster_core::ServerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

const DEBUG_DIRECTIVES: &str = "roster_api=debug,roster_storage=debug,tower_http=debug,info";
const DEFAULT_DIRECTIVES: &str = "roster_api=info,roster_storage=info,tower_http=info,warn";

/// Telemetry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Service version attached to the startup event
    pub service_version: String,
    /// Debug-level logging for the Roster crates
    pub debug: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "roster-api".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            debug: true,
        }
    }
}

impl TelemetryConfig {
    pub fn from_server(server: &ServerConfig) -> Self {
        Self {
            service_version: server.version.clone(),
            debug: server.debug,
            ..Self::default()
        }
    }

    /// Filter directives used when `RUST_LOG` is not set.
    pub fn default_directives(&self) -> &'static str {
        if self.debug {
            DEBUG_DIRECTIVES
        } else {
            DEFAULT_DIRECTIVES
        }
    }
}

/// Install the global tracing subscriber. Call once at startup.
pub fn init_tracing(config: &TelemetryConfig) -> ApiResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directives()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = config.service_name,
        service_version = config.service_version,
        debug = config.debug,
        "Telemetry initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::RosterConfig;

    fn server(debug: &str) -> ServerConfig {
        let debug = debug.to_string();
        RosterConfig::from_lookup(move |name| match name {
            "DATABASE_HOST" | "DATABASE_USER" | "DATABASE_PASSWORD" => Some("x".to_string()),
            "APP_DEBUG" => Some(debug.clone()),
            "APP_VERSION" => Some("2.1".to_string()),
            _ => None,
        })
        .unwrap()
        .server
    }

    #[test]
    fn test_debug_flag_selects_directives() {
        let config = TelemetryConfig::from_server(&server("true"));
        assert!(config.debug);
        assert_eq!(config.default_directives(), DEBUG_DIRECTIVES);
        assert_eq!(config.service_version, "2.1");

        let config = TelemetryConfig::from_server(&server("false"));
        assert_eq!(config.default_directives(), DEFAULT_DIRECTIVES);
    }

    #[test]
    fn test_default_directives_parse() {
        assert!(EnvFilter::try_new(DEBUG_DIRECTIVES).is_ok());
        assert!(EnvFilter::try_new(DEFAULT_DIRECTIVES).is_ok());
    }
}
