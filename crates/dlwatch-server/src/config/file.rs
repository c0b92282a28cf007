// src/config/file.rs
// File-based configuration, loaded from a TOML file at startup (spec §6).

use serde::Deserialize;

/// Top-level config structure, one section per concern named in spec §6.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub aria2: Aria2Config,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct TelegramConfig {
    /// Usually left unset in the file and supplied via `TELEGRAM_BOT_TOKEN`.
    pub bot_token: Option<String>,
    /// Overridden at runtime by `TELEGRAM_API_BASE` when that's set.
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub authorized_users: Vec<i64>,
    #[serde(default)]
    pub notify_users: Vec<i64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Aria2Config {
    #[serde(default = "Aria2Config::default_host")]
    pub host: String,
    #[serde(default = "Aria2Config::default_port")]
    pub port: u16,
    /// Usually left unset in the file and supplied via `ARIA2_SECRET`.
    pub secret: Option<String>,
}

impl Aria2Config {
    fn default_host() -> String {
        "localhost".to_string()
    }
    fn default_port() -> u16 {
        6800
    }
}

impl Default for Aria2Config {
    fn default() -> Self {
        Self { host: Self::default_host(), port: Self::default_port(), secret: None }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "DatabaseConfig::default_path")]
    pub path: String,
}

impl DatabaseConfig {
    fn default_path() -> String {
        "./dlwatch.db".to_string()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: Self::default_path() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaginationConfig {
    #[serde(default = "PaginationConfig::default_items_per_page")]
    pub items_per_page: u64,
}

impl PaginationConfig {
    fn default_items_per_page() -> u64 {
        5
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self { items_per_page: Self::default_items_per_page() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: Self::default_level() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    #[serde(default = "NotificationConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "NotificationConfig::default_interval_secs")]
    pub interval_secs: u64,
}

impl NotificationConfig {
    fn default_enabled() -> bool {
        true
    }
    fn default_interval_secs() -> u64 {
        60
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { enabled: Self::default_enabled(), interval_secs: Self::default_interval_secs() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default = "MonitorConfig::default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "MonitorConfig::default_max_history")]
    pub max_history: u64,
}

impl MonitorConfig {
    fn default_interval_secs() -> u64 {
        5
    }
    fn default_max_history() -> u64 {
        200
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: Self::default_interval_secs(),
            max_history: Self::default_max_history(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        let config: AppConfig = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
        Ok(config)
    }
}
