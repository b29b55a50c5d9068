use std::{fmt::Display, path::Path, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const ENV_PREFIX: &str = "BOOK_CLUB_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app_name: String,
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// HS256 signing secret; generated per process when absent
    pub jwt_secret: Option<String>,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub google_books_base_url: String,
    pub google_books_api_key: Option<String>,
    pub google_books_timeout_secs: u64,
    pub google_books_cache_ttl_secs: u64,
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
    pub log_dir: Option<PathBuf>,
    pub log_level: String,
    /// Reject progress updates that carry `status` together with a page or percentage.
    pub reject_conflicting_progress_updates: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "Literattus".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8000,
            database_url: "sqlite://database/book_club.db".to_string(),
            jwt_secret: None,
            access_token_minutes: 30,
            refresh_token_days: 7,
            google_books_base_url: "https://www.googleapis.com/books/v1".to_string(),
            google_books_api_key: None,
            google_books_timeout_secs: 10,
            google_books_cache_ttl_secs: 3600,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:3001".to_string(),
            ],
            request_timeout_secs: 30,
            log_dir: None,
            log_level: "info".to_string(),
            reject_conflicting_progress_updates: false,
        }
    }
}

impl Config {
    /// Defaults, then the TOML file (if any), then `BOOK_CLUB_*` environment variables.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                info!("loading config from {}", path.display());
                toml::from_str::<Config>(&content)?
            }
            None => Config::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> anyhow::Result<()> {
        override_with(&mut self.app_name, "APP_NAME")?;
        override_with(&mut self.host, "HOST")?;
        override_with(&mut self.port, "PORT")?;
        override_with(&mut self.database_url, "DATABASE_URL")?;
        override_opt(&mut self.jwt_secret, "JWT_SECRET")?;
        override_with(&mut self.access_token_minutes, "ACCESS_TOKEN_MINUTES")?;
        override_with(&mut self.refresh_token_days, "REFRESH_TOKEN_DAYS")?;
        override_with(&mut self.google_books_base_url, "GOOGLE_BOOKS_BASE_URL")?;
        override_opt(&mut self.google_books_api_key, "GOOGLE_BOOKS_API_KEY")?;
        override_with(&mut self.google_books_timeout_secs, "GOOGLE_BOOKS_TIMEOUT_SECS")?;
        override_with(&mut self.google_books_cache_ttl_secs, "GOOGLE_BOOKS_CACHE_TTL_SECS")?;
        override_with(&mut self.request_timeout_secs, "REQUEST_TIMEOUT_SECS")?;
        override_opt(&mut self.log_dir, "LOG_DIR")?;
        override_with(&mut self.log_level, "LOG_LEVEL")?;
        override_with(
            &mut self.reject_conflicting_progress_updates,
            "REJECT_CONFLICTING_PROGRESS_UPDATES",
        )?;
        if let Some(origins) = var("CORS_ORIGINS") {
            self.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if self.access_token_minutes <= 0 || self.refresh_token_days <= 0 {
            anyhow::bail!("token lifetimes must be positive");
        }
        Ok(())
    }
}

fn var(key: &str) -> Option<String> {
    dotenvy::var(format!("{ENV_PREFIX}{key}")).ok()
}

fn parse<T: FromStr>(key: &str, value: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    value.parse().map_err(|e| {
        warn!("Invalid {ENV_PREFIX}{key} value: {e}");
        anyhow::anyhow!("invalid {ENV_PREFIX}{key}: {e}")
    })
}

fn override_with<T: FromStr>(slot: &mut T, key: &str) -> anyhow::Result<()>
where
    T::Err: Display,
{
    if let Some(value) = var(key) {
        *slot = parse(key, &value)?;
    }
    Ok(())
}

fn override_opt<T: FromStr>(slot: &mut Option<T>, key: &str) -> anyhow::Result<()>
where
    T::Err: Display,
{
    if let Some(value) = var(key) {
        *slot = if value.is_empty() {
            None
        } else {
            Some(parse(key, &value)?)
        };
    }
    Ok(())
}
