use anyhow::{Context, Result};
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::database::models::TimeAxis;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub sync_fallback_interval_secs: u64,
    pub timeline_start_hour: f64,
    pub timeline_end_hour: f64,
    pub layout_cache_capacity: u64,
    pub layout_cache_ttl_secs: u64,
    pub subscription_buffer: usize,
    pub environment: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_env_only()
    }

    /// Load configuration from environment variables only (without loading .env files)
    /// This is useful for testing where you want to control the environment directly
    pub fn from_env_only() -> Result<Self> {
        let config = Config {
            sync_fallback_interval_secs: env_or("SYNC_FALLBACK_INTERVAL_SECS", 30),
            timeline_start_hour: env_or("TIMELINE_START_HOUR", 6.0),
            timeline_end_hour: env_or("TIMELINE_END_HOUR", 22.0),
            layout_cache_capacity: env_or("LAYOUT_CACHE_CAPACITY", 512),
            layout_cache_ttl_secs: env_or("LAYOUT_CACHE_TTL_SECS", 300),
            subscription_buffer: env_or("SUBSCRIPTION_BUFFER", 256),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads a specific env file on top of the process environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        dotenvy::from_path(path)
            .with_context(|| format!("failed to load env file {}", path.display()))?;
        Self::from_env_only()
    }

    pub fn test_config() -> Result<Self> {
        Ok(Config {
            sync_fallback_interval_secs: 1,
            timeline_start_hour: 0.0,
            timeline_end_hour: 24.0,
            layout_cache_capacity: 64,
            layout_cache_ttl_secs: 60,
            subscription_buffer: 64,
            environment: "test".to_string(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.timeline_axis()
            .map_err(|e| anyhow::anyhow!("invalid timeline hours: {}", e))?;
        if self.sync_fallback_interval_secs == 0 {
            anyhow::bail!("SYNC_FALLBACK_INTERVAL_SECS must be greater than zero");
        }
        if self.subscription_buffer == 0 {
            anyhow::bail!("SUBSCRIPTION_BUFFER must be greater than zero");
        }
        Ok(())
    }

    pub fn timeline_axis(&self) -> crate::error::Result<TimeAxis> {
        TimeAxis::new(self.timeline_start_hour, self.timeline_end_hour)
    }

    pub fn sync_fallback_interval(&self) -> Duration {
        Duration::from_secs(self.sync_fallback_interval_secs)
    }

    pub fn layout_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.layout_cache_ttl_secs)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sync_fallback_interval_secs: 30,
            timeline_start_hour: 6.0,
            timeline_end_hour: 22.0,
            layout_cache_capacity: 512,
            layout_cache_ttl_secs: 300,
            subscription_buffer: 256,
            environment: "development".to_string(),
        }
    }
}
