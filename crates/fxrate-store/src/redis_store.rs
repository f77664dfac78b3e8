//! Redis Streams rate store.
//!
//! Every saved rate becomes one stream entry with `from`, `to`, `rate`
//! and `created_at` (RFC 3339) fields. The entry id is the record id.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, info};

use fxrate_models::{CurrencyPair, ExchangeRateRecord};

use crate::error::{StoreError, StoreResult};
use crate::RateStore;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Redis host
    pub host: String,
    /// Redis port
    pub port: u16,
    /// Optional ACL username
    pub username: Option<String>,
    /// Optional password
    pub password: Option<String>,
    /// Logical database index
    pub database: u32,
    /// Stream receiving rate records
    pub stream: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            username: None,
            password: None,
            database: 0,
            stream: "exchange_rates".to_string(),
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_env_with(Self::default())
    }

    /// Apply environment overrides on top of `defaults`.
    pub fn from_env_with(defaults: Self) -> Self {
        Self {
            host: std::env::var("STORE_HOST").unwrap_or(defaults.host),
            port: std::env::var("STORE_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            username: std::env::var("STORE_USERNAME").ok().or(defaults.username),
            password: std::env::var("STORE_PASSWORD").ok().or(defaults.password),
            database: std::env::var("STORE_DATABASE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.database),
            stream: std::env::var("STORE_STREAM").unwrap_or(defaults.stream),
        }
    }

    /// Connection URL, credentials percent-encoded.
    pub fn url(&self) -> String {
        self.build_url(self.password.as_deref().map(|p| urlencoding::encode(p).into_owned()))
    }

    /// Connection URL safe for logs.
    pub fn redacted_url(&self) -> String {
        self.build_url(self.password.as_ref().map(|_| "***".to_string()))
    }

    fn build_url(&self, password: Option<String>) -> String {
        let username = self.username.as_deref().map(urlencoding::encode);
        let auth = match (username, password) {
            (Some(user), Some(pass)) => format!("{}:{}@", user, pass),
            (Some(user), None) => format!("{}@", user),
            (None, Some(pass)) => format!(":{}@", pass),
            (None, None) => String::new(),
        };
        format!("redis://{}{}:{}/{}", auth, self.host, self.port, self.database)
    }
}

/// Stream entry fields for a record.
pub fn record_fields(record: &ExchangeRateRecord) -> [(&'static str, String); 4] {
    [
        ("from", record.from.clone()),
        ("to", record.to.clone()),
        ("rate", record.rate.clone()),
        ("created_at", record.created_at.to_rfc3339()),
    ]
}

/// Rate store backed by a Redis stream.
#[derive(Clone)]
pub struct RedisRateStore {
    conn: MultiplexedConnection,
    stream: String,
}

impl RedisRateStore {
    /// Connect to Redis.
    pub async fn connect(config: StoreConfig) -> StoreResult<Self> {
        if config.stream.is_empty() {
            return Err(StoreError::config_error("stream name must not be empty"));
        }

        let client = redis::Client::open(config.url())?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Connected to rate store {}", config.redacted_url());

        Ok(Self {
            conn,
            stream: config.stream,
        })
    }

    /// Connect using environment variables.
    pub async fn from_env() -> StoreResult<Self> {
        Self::connect(StoreConfig::from_env()).await
    }

    /// Number of stored records.
    pub async fn count(&self) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.xlen(&self.stream).await?;
        Ok(len)
    }
}

#[async_trait]
impl RateStore for RedisRateStore {
    async fn save(&self, pair: &CurrencyPair, rate: &str) -> StoreResult<String> {
        let record = ExchangeRateRecord::new(pair, rate);
        let mut conn = self.conn.clone();

        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.stream).arg("*");
        for (field, value) in record_fields(&record) {
            cmd.arg(field).arg(value);
        }
        let id: String = cmd.query_async(&mut conn).await?;

        debug!("Stored exchange rate {} = {} as {}", pair, rate, id);
        Ok(id)
    }
}
