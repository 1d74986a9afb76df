//! Configuration management for the grouprelay service.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use grouprelay_delivery::{ClientConfig, EngineConfig};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::server::RouterConfig;

const CONFIG_FILE: &str = "config.toml";

/// Paths served by the router itself; the webhook path must not shadow them.
const RESERVED_PATHS: [&str; 3] = ["/", "/health", "/live"];

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`config.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// Without `DATABASE_URL` the relay buffers groups in memory. Without a sink
/// URL it still accepts webhooks but every delivery fails and is logged.
///
/// # Example
///
/// ```no_run
/// use grouprelay_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Server will bind to {}:{}", config.host, config.port);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Store
    /// PostgreSQL connection URL. Unset selects the in-memory store.
    ///
    /// Environment variable: `DATABASE_URL`
    #[serde(default)]
    pub database_url: Option<String>,
    /// Maximum number of database connections in the pool.
    ///
    /// Environment variable: `DATABASE_MAX_CONNECTIONS`
    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    // Sink
    /// Downstream webhook receiving single and group payloads.
    ///
    /// Environment variable: `SINK_URL`
    #[serde(default)]
    pub sink_url: Option<String>,
    /// Fallback for `sink_url` under its older name.
    ///
    /// Environment variable: `N8N_WEBHOOK_URL`
    #[serde(default, skip_serializing)]
    pub n8n_webhook_url: Option<String>,
    /// HTTP request timeout for sink deliveries in seconds.
    ///
    /// Environment variable: `DELIVERY_TIMEOUT_SECONDS`
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_seconds: u64,

    // Server
    /// Server bind address.
    ///
    /// Environment variable: `HOST`
    #[serde(default = "default_host")]
    pub host: String,
    /// Server bind port.
    ///
    /// Environment variable: `PORT`
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path Telegram posts updates to.
    ///
    /// Environment variable: `WEBHOOK_PATH`
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
    /// HTTP request timeout in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT`
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    // Grouping
    /// Quiescence window in milliseconds.
    ///
    /// Environment variable: `DEBOUNCE_WINDOW_MS`
    #[serde(default = "default_debounce_window_ms")]
    pub debounce_window_ms: u64,
    /// Orphan sweep interval in seconds; 0 disables the sweeper.
    ///
    /// Environment variable: `SWEEP_INTERVAL_SECS`
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Time allowed for flushing pending groups on shutdown, in seconds.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECONDS`
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,

    // Telegram
    /// Bot token. Carried for downstream use only; never logged in clear.
    ///
    /// Environment variable: `TELEGRAM_BOT_TOKEN`
    #[serde(default, skip_serializing)]
    pub telegram_bot_token: Option<String>,

    // Logging
    /// Log level configuration.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

impl Config {
    /// Load configuration from defaults, config file, and environment variable
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns error if a source cannot be parsed or validation fails.
    pub fn load() -> Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Serialized::defaults(Self::default()))
                .merge(Toml::file(CONFIG_FILE))
                .merge(Env::prefixed("")),
        )
    }

    /// Extracts and validates configuration from an arbitrary figment.
    ///
    /// # Errors
    ///
    /// Returns error if extraction or validation fails.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Effective sink URL, preferring `SINK_URL` over `N8N_WEBHOOK_URL`.
    pub fn sink_url(&self) -> Option<&str> {
        self.sink_url
            .as_deref()
            .or(self.n8n_webhook_url.as_deref())
            .filter(|url| !url.trim().is_empty())
    }

    /// Convert to the debounce engine configuration.
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            debounce_window: Duration::from_millis(self.debounce_window_ms),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }

    /// Convert to sink client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.delivery_timeout_seconds),
            ..ClientConfig::default()
        }
    }

    /// Convert to router configuration.
    pub fn to_router_config(&self) -> RouterConfig {
        RouterConfig {
            webhook_path: self.webhook_path.clone(),
            request_timeout: Duration::from_secs(self.request_timeout),
        }
    }

    /// Time allowed for the engine to flush on shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    /// Parse server socket address from host and port configuration.
    ///
    /// # Errors
    ///
    /// Returns error if host and port do not form a socket address.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Get database URL with password masked for logging.
    pub fn database_url_masked(&self) -> Option<String> {
        let url = self.database_url.as_ref()?;
        if let Some(at_pos) = url.find('@') {
            if let Some(colon_pos) = url[..at_pos].rfind(':') {
                let mut masked = url.clone();
                masked.replace_range(colon_pos + 1..at_pos, "***");
                return Some(masked);
            }
        }
        Some(url.clone())
    }

    /// Get bot token with everything but the bot id masked.
    pub fn telegram_bot_token_masked(&self) -> Option<String> {
        let token = self.telegram_bot_token.as_ref()?;
        Some(match token.split_once(':') {
            Some((bot_id, _)) => format!("{bot_id}:***"),
            None => "***".to_string(),
        })
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.debounce_window_ms == 0 {
            anyhow::bail!("debounce_window_ms must be greater than 0");
        }

        if self.database_max_connections == 0 {
            anyhow::bail!("database max_connections must be greater than 0");
        }

        if let Some(url) = &self.database_url {
            if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
                anyhow::bail!("database_url must be a postgres:// or postgresql:// URL");
            }
        }

        if let Some(url) = self.sink_url() {
            let parsed = Url::parse(url).context("sink_url is not a valid URL")?;
            if !matches!(parsed.scheme(), "http" | "https") {
                anyhow::bail!("sink_url must use http or https");
            }
        }

        if !self.webhook_path.starts_with('/') {
            anyhow::bail!("webhook_path must start with '/'");
        }

        if RESERVED_PATHS.contains(&self.webhook_path.as_str()) {
            anyhow::bail!("webhook_path {} collides with a built-in route", self.webhook_path);
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: default_max_connections(),
            sink_url: None,
            n8n_webhook_url: None,
            delivery_timeout_seconds: default_delivery_timeout(),
            host: default_host(),
            port: default_port(),
            webhook_path: default_webhook_path(),
            request_timeout: default_request_timeout(),
            debounce_window_ms: default_debounce_window_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
            telegram_bot_token: None,
            rust_log: default_log_level(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_delivery_timeout() -> u64 {
    grouprelay_delivery::DEFAULT_TIMEOUT_SECONDS
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_webhook_path() -> String {
    "/telegram".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_debounce_window_ms() -> u64 {
    grouprelay_delivery::DEFAULT_DEBOUNCE_WINDOW_MS
}

fn default_sweep_interval_secs() -> u64 {
    grouprelay_delivery::DEFAULT_SWEEP_INTERVAL_SECS
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}
