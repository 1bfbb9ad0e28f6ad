use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub timeline: TimelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// RS256 public key used to verify bearer tokens
    pub jwt_public_key_pem: String,
    /// Shared token expected on `/internal` routes
    pub internal_api_token: String,
}

/// Ranking, pagination and cache tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
    #[serde(default = "default_active_ttl_secs")]
    pub active_ttl_secs: u64,
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
    #[serde(default = "default_activity_window_hours")]
    pub activity_window_hours: i64,
    #[serde(default = "default_interaction_window_days")]
    pub interaction_window_days: i64,
    #[serde(default = "default_invalidation_queue")]
    pub invalidation_queue: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            active_ttl_secs: default_active_ttl_secs(),
            idle_ttl_secs: default_idle_ttl_secs(),
            activity_window_hours: default_activity_window_hours(),
            interaction_window_days: default_interaction_window_days(),
            invalidation_queue: default_invalidation_queue(),
        }
    }
}

impl TimelineConfig {
    /// Clamp a requested page size into `[1, max_limit]`
    pub fn clamp_limit(&self, requested: Option<u32>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1)) as usize
    }

    fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            default_limit: parse_or("TIMELINE_DEFAULT_LIMIT", default_limit())?,
            max_limit: parse_or("TIMELINE_MAX_LIMIT", default_max_limit())?,
            active_ttl_secs: parse_or("TIMELINE_ACTIVE_TTL_SECS", default_active_ttl_secs())?,
            idle_ttl_secs: parse_or("TIMELINE_IDLE_TTL_SECS", default_idle_ttl_secs())?,
            activity_window_hours: parse_or(
                "TIMELINE_ACTIVITY_WINDOW_HOURS",
                default_activity_window_hours(),
            )?,
            interaction_window_days: parse_or(
                "TIMELINE_INTERACTION_WINDOW_DAYS",
                default_interaction_window_days(),
            )?,
            invalidation_queue: parse_or(
                "TIMELINE_INVALIDATION_QUEUE",
                default_invalidation_queue(),
            )?,
        })
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                host: env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_or("APP_PORT", 8000)?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            },
            auth: AuthConfig {
                jwt_public_key_pem: env::var("JWT_PUBLIC_KEY_PEM")
                    .context("JWT_PUBLIC_KEY_PEM must be set for JWT authentication")?,
                internal_api_token: non_empty(
                    "INTERNAL_API_TOKEN",
                    env::var("INTERNAL_API_TOKEN")
                        .context("INTERNAL_API_TOKEN must be set for internal routes")?,
                )?,
            },
            timeline: TimelineConfig::from_env()?,
        })
    }
}

/// Blank secrets count as unset
fn non_empty(key: &str, value: String) -> anyhow::Result<String> {
    if value.trim().is_empty() {
        anyhow::bail!("{} must not be empty", key);
    }
    Ok(value)
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} has invalid value {:?}: {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}

fn default_limit() -> u32 {
    20
}

fn default_max_limit() -> u32 {
    100
}

fn default_active_ttl_secs() -> u64 {
    timeline_cache::ttl::ACTIVE_VIEWER
}

fn default_idle_ttl_secs() -> u64 {
    timeline_cache::ttl::IDLE_VIEWER
}

fn default_activity_window_hours() -> i64 {
    24
}

fn default_interaction_window_days() -> i64 {
    30
}

fn default_invalidation_queue() -> usize {
    1024
}
