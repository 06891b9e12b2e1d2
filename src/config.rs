use clap::{Parser, ValueEnum};
use std::time::Duration;

/// Where fetched payloads are snapshotted between runs
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotBackend {
    /// One JSON file per resource under --cache-dir
    File,
    /// A single SQLite table at --database-path
    Sqlite,
}

/// Live sports feed with an offline snapshot cache
#[derive(Parser, Debug, Clone)]
#[command(name = "livesports-feed", version, about)]
pub struct Config {
    /// Feed API base URL (serves /sports, /competitions and the events path)
    #[arg(long, env = "FEED_API_URL")]
    pub api_base_url: String,

    /// Path of the events endpoint relative to the base URL
    #[arg(long, env = "FEED_EVENTS_PATH", default_value = "matches")]
    pub events_path: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "10")]
    pub request_timeout_secs: u64,

    /// Snapshot storage backend
    #[arg(long, env = "SNAPSHOT_BACKEND", value_enum, default_value = "file")]
    pub snapshot_backend: SnapshotBackend,

    /// Directory for file snapshots
    #[arg(long, env = "CACHE_DIR", default_value = "cache")]
    pub cache_dir: String,

    /// SQLite database path for the sqlite backend
    #[arg(long, env = "DATABASE_PATH", default_value = "livesports-feed.db")]
    pub database_path: String,

    /// Give up on a snapshot read after this many milliseconds
    #[arg(long, env = "CACHE_READ_TIMEOUT_MS", default_value = "500")]
    pub cache_read_timeout_ms: u64,

    /// Refresh all resources every N seconds (0 = only on retry)
    #[arg(long, env = "REFRESH_INTERVAL_SECS", default_value = "0")]
    pub refresh_interval_secs: u64,

    /// View API listen address
    #[arg(long, env = "DASHBOARD_ADDR", default_value = "0.0.0.0:8080")]
    pub dashboard_addr: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        let url = url::Url::parse(&self.api_base_url)
            .map_err(|e| anyhow::anyhow!("api_base_url is not a valid URL: {}", e))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("api_base_url must use http or https, got '{}'", url.scheme());
        }
        if self.events_path.trim_matches('/').is_empty() {
            anyhow::bail!("events_path must not be empty");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be positive");
        }
        if self.cache_read_timeout_ms == 0 {
            anyhow::bail!("cache_read_timeout_ms must be positive");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_read_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_read_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }
}
