//! Server configuration from environment variables.

use std::net::SocketAddr;

/// Everything the server reads from the environment, validated up front.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// HTTP/WebSocket bind address.
    pub bind: SocketAddr,
    /// Prometheus scrape listener; `None` disables metrics.
    pub metrics_bind: Option<SocketAddr>,
    /// Bot token used as the HMAC key for init-data verification. Absent
    /// means only guest identities work.
    pub telegram_token: Option<String>,
    pub bot_username: Option<String>,
    pub webapp_url: Option<String>,
    pub production: bool,
}

impl ServerConfig {
    /// Load configuration. CLI overrides beat environment variables.
    ///
    /// `SERVER_BIND` wins over `PORT`; with neither set the server binds
    /// 127.0.0.1:8000.
    pub fn from_env(bind_override: Option<SocketAddr>) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(addr) => addr,
            None => {
                if let Ok(raw) = std::env::var("SERVER_BIND") {
                    raw.parse().map_err(|_| ConfigError::Invalid {
                        var: "SERVER_BIND".to_string(),
                        reason: format!("not a socket address: {raw}"),
                    })?
                } else if let Ok(port) = std::env::var("PORT") {
                    let port: u16 = port.parse().map_err(|_| ConfigError::Invalid {
                        var: "PORT".to_string(),
                        reason: format!("not a port number: {port}"),
                    })?;
                    SocketAddr::from(([0, 0, 0, 0], port))
                } else {
                    SocketAddr::from(([127, 0, 0, 1], 8000))
                }
            }
        };

        let metrics_bind = match std::env::var("METRICS_BIND") {
            Ok(raw) => Some(raw.parse().map_err(|_| ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                reason: format!("not a socket address: {raw}"),
            })?),
            Err(_) => None,
        };

        let production = std::env::var("PRODUCTION").is_ok_and(|v| {
            matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
        });

        Ok(Self {
            bind,
            metrics_bind,
            telegram_token: std::env::var("TELEGRAM_TOKEN").ok().filter(|t| !t.is_empty()),
            bot_username: std::env::var("BOT_USERNAME").ok(),
            webapp_url: std::env::var("WEBAPP_URL").ok(),
            production,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.production && self.telegram_token.is_none() {
            return Err(ConfigError::MissingRequired {
                var: "TELEGRAM_TOKEN".to_string(),
                hint: "production mode cannot verify identities without the bot token"
                    .to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}
