use std::{collections::HashMap, collections::HashSet, time::Duration};

use config::{
    Config as ConfigLib, ConfigError, Environment, File,
    builder::{ConfigBuilder, DefaultState},
};
use redis::{
    Client as RedisClient, RedisResult,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub fetch: FetchConfig,
    pub housekeeping: HousekeepingConfig,
    pub scheduler: SchedulerConfig,
    /// CRL distribution points to maintain. Usually supplied via
    /// `config/settings.toml`; identity is the (unique) `name`.
    #[serde(default)]
    pub sources: Vec<CrlSource>,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// HTTP retrieval limits for CRL downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Overall per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Additional attempts after the first failure (transient errors only).
    pub max_retries: u32,
    /// Base delay for exponential backoff between attempts.
    pub backoff_ms: u64,
}

/// Thresholds and toggles for one housekeeping invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HousekeepingConfig {
    /// A record older than this (hours since last successful fetch) is stale.
    pub max_crl_age_hours: f64,
    /// Records of disabled sources older than this many days are swept.
    pub retention_days: f64,
    /// Number of revoked serials kept as a sample per CRL.
    pub sample_size: usize,
    pub enable_health_check: bool,
    pub enable_cleanup: bool,
    pub enable_queue_processing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between invocations. Each run finishes before the next starts.
    pub interval_secs: u64,
    /// Run a single invocation and exit instead of serving.
    pub run_once: bool,
}

/// One CRL distribution point from the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrlSource {
    pub name: String,
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub uri: SecretString,
}

impl RedisConfig {
    /// Establishes a new Redis connection based on the provided URI.
    ///
    /// - To enable TLS, the URI must use the `rediss://` scheme.
    /// - To enable insecure TLS, the URI must use the `rediss://` scheme and end with `/#insecure`.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established.
    pub async fn start(&self) -> RedisResult<ConnectionManager> {
        let client = RedisClient::open(self.uri.expose_secret())?;
        let config = ConnectionManagerConfig::new().set_connection_timeout(Duration::from_secs(60));
        client.get_connection_manager_with_config(config).await
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder =
            Self::builder_with_defaults()?.add_source(File::with_name("config/settings").required(false));

        // If env_vars is provided, we use it instead of system environment
        // This is to avoid systems variables pollution across tests
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // Use system environment variables
            // Should be in the format APP_SERVER__HOST or APP_HOUSEKEEPING__RETENTION_DAYS
            builder = builder.add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        ConfigLib::builder()
            .set_default("server.host", "localhost")?
            .set_default("server.port", 3000)?
            .set_default("fetch.timeout_secs", 60)?
            .set_default("fetch.max_retries", 2)?
            .set_default("fetch.backoff_ms", 500)?
            .set_default("housekeeping.max_crl_age_hours", 24.0)?
            .set_default("housekeeping.retention_days", 7.0)?
            .set_default("housekeeping.sample_size", 10)?
            .set_default("housekeeping.enable_health_check", true)?
            .set_default("housekeeping.enable_cleanup", true)?
            .set_default("housekeeping.enable_queue_processing", true)?
            .set_default("scheduler.interval_secs", 3600)?
            .set_default("scheduler.run_once", false)
    }

    /// Rejects registries the housekeeping job cannot act on: unnamed or
    /// duplicate sources, and URLs that are not plain http(s).
    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(ConfigError::Message(format!(
                    "source with url '{}' has an empty name",
                    source.url
                )));
            }
            if !seen.insert(source.name.as_str()) {
                return Err(ConfigError::Message(format!(
                    "duplicate source name '{}'",
                    source.name
                )));
            }
            let url = Url::parse(&source.url).map_err(|e| {
                ConfigError::Message(format!("source '{}' has an invalid url: {e}", source.name))
            })?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConfigError::Message(format!(
                    "source '{}' must use http or https, got '{}'",
                    source.name,
                    url.scheme()
                )));
            }
        }
        Ok(())
    }

    /// Names of the sources the job actively maintains; everything else is
    /// cleanup territory.
    pub fn enabled_source_names(&self) -> HashSet<String> {
        self.sources
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.name.clone())
            .collect()
    }
}
