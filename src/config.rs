// ============================================================================
// Configuration - Environment-driven
// ============================================================================
//
// FULFILLMENT_HTTP_PORT  API port (default 8080)
// DATABASE_URL           Postgres connection string; when unset the service
//                        runs on the in-memory store (dev mode)
// RUST_LOG               log filtering, handled by tracing-subscriber
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub database_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let http_port = match lookup("FULFILLMENT_HTTP_PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "FULFILLMENT_HTTP_PORT",
                value: raw,
            })?,
            None => 8080,
        };

        Ok(Self {
            http_port,
            database_url: lookup("DATABASE_URL"),
        })
    }
}
