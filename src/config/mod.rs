//! Service configuration.
//!
//! Loaded from a TOML file; every section and field has a default so a
//! missing file or partial file still yields a runnable configuration.
//! Secrets (client key/secret, token encryption key) are taken from
//! `FANPULSE_*` environment variables and override whatever the file says.

use serde::Deserialize;

/// Complete service configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub douyin: DouyinConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Storage configuration.
///
/// `path = ":memory:"` selects the in-memory fallback mode (data is lost on
/// restart); any other value is a SQLite file path.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "fanpulse.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Douyin open platform configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DouyinConfig {
    /// Application client key (overridden by `FANPULSE_CLIENT_KEY`).
    #[serde(default)]
    pub client_key: String,
    /// Application client secret (overridden by `FANPULSE_CLIENT_SECRET`).
    #[serde(default)]
    pub client_secret: String,
    /// Redirect target registered with the platform.
    #[serde(default)]
    pub redirect_uri: String,
    /// Scope string requested during authorization.
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Base URL of the open platform API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_scope() -> String {
    "user_info,data.external.user,video.list.bind".to_string()
}

fn default_api_base() -> String {
    "https://open.douyin.com".to_string()
}

impl Default for DouyinConfig {
    fn default() -> Self {
        Self {
            client_key: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            scope: default_scope(),
            api_base: default_api_base(),
        }
    }
}

/// Sync orchestration tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Employees synced concurrently per group.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between groups, in milliseconds.
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    /// Reporting window passed to the per-metric endpoints (7/15/30 days).
    #[serde(default = "default_date_type")]
    pub date_type: u32,
    /// Videos pulled per sync.
    #[serde(default = "default_video_page_size")]
    pub video_page_size: u32,
}

fn default_batch_size() -> usize {
    3
}

fn default_batch_pause_ms() -> u64 {
    1000
}

fn default_date_type() -> u32 {
    7
}

fn default_video_page_size() -> u32 {
    50
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            date_type: default_date_type(),
            video_page_size: default_video_page_size(),
        }
    }
}

/// Load configuration from a TOML file, falling back to defaults when the
/// file does not exist. Environment overrides are applied afterwards.
pub fn load_config(path: &str) -> anyhow::Result<AppConfig> {
    let mut config = if std::path::Path::new(path).exists() {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)?
    } else {
        AppConfig::default()
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Pull secrets and deployment-specific values from the environment.
fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(v) = std::env::var("FANPULSE_CLIENT_KEY") {
        config.douyin.client_key = v;
    }
    if let Ok(v) = std::env::var("FANPULSE_CLIENT_SECRET") {
        config.douyin.client_secret = v;
    }
    if let Ok(v) = std::env::var("FANPULSE_REDIRECT_URI") {
        config.douyin.redirect_uri = v;
    }
    if let Ok(v) = std::env::var("FANPULSE_DB_PATH") {
        config.database.path = v;
    }
}
