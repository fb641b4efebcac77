//! Configuration management
//!
//! The blog reads its configuration from a YAML file (`config.yml` by default,
//! or the path in `CODEX_CONFIG`). Environment variables named
//! `CODEX_<SECTION>_<KEY>` override file values.
//!
//! Missing optional values are filled with defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Blog presentation settings
    #[serde(default)]
    pub blog: BlogConfig,
    /// Analytics job configuration
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:8080".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/codex.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of a login session
    #[serde(default = "default_session_expiration_days")]
    pub session_expiration_days: i64,
    /// Admin account ensured at startup (requires `admin_password` too)
    #[serde(default)]
    pub admin_username: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_expiration_days: default_session_expiration_days(),
            admin_username: None,
            admin_password: None,
        }
    }
}

fn default_session_expiration_days() -> i64 {
    7
}

/// Blog presentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogConfig {
    #[serde(default = "default_site_name")]
    pub site_name: String,
    #[serde(default)]
    pub site_description: String,
    /// Posts per listing page
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    /// Delete tags that no longer have posts after a post is deleted
    #[serde(default = "default_prune_orphan_tags")]
    pub prune_orphan_tags: bool,
}

impl Default for BlogConfig {
    fn default() -> Self {
        Self {
            site_name: default_site_name(),
            site_description: String::new(),
            page_size: default_page_size(),
            prune_orphan_tags: default_prune_orphan_tags(),
        }
    }
}

fn default_site_name() -> String {
    "Codex".to_string()
}

fn default_page_size() -> i64 {
    10
}

fn default_prune_orphan_tags() -> bool {
    true
}

/// Analytics job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Cron expression (with seconds) for the in-process daily job.
    /// When unset the job only runs through the `daily-stats` binary.
    #[serde(default)]
    pub schedule: Option<String>,
    /// Number of days shown in the dashboard engagement series
    #[serde(default = "default_dashboard_days")]
    pub dashboard_days: i64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            schedule: None,
            dashboard_days: default_dashboard_days(),
        }
    }
}

fn default_dashboard_days() -> i64 {
    30
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - CODEX_SERVER_HOST, CODEX_SERVER_PORT, CODEX_SERVER_CORS_ORIGIN
    /// - CODEX_DATABASE_DRIVER, CODEX_DATABASE_URL
    /// - CODEX_AUTH_SESSION_EXPIRATION_DAYS, CODEX_AUTH_ADMIN_USERNAME, CODEX_AUTH_ADMIN_PASSWORD
    /// - CODEX_BLOG_SITE_NAME, CODEX_BLOG_PAGE_SIZE, CODEX_BLOG_PRUNE_ORPHAN_TAGS
    /// - CODEX_ANALYTICS_SCHEDULE, CODEX_ANALYTICS_DASHBOARD_DAYS
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Path of the config file, from `CODEX_CONFIG` or `config.yml`
    pub fn default_path() -> std::path::PathBuf {
        std::env::var("CODEX_CONFIG")
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|_| std::path::PathBuf::from("config.yml"))
    }

    /// Check values that parse but make no sense
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blog.page_size <= 0 {
            return Err(ConfigError::ValidationError(
                "blog.page_size must be positive".to_string(),
            ));
        }
        if self.auth.session_expiration_days <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.session_expiration_days must be positive".to_string(),
            ));
        }
        if self.analytics.dashboard_days <= 0 {
            return Err(ConfigError::ValidationError(
                "analytics.dashboard_days must be positive".to_string(),
            ));
        }
        if self.auth.admin_username.is_some() != self.auth.admin_password.is_some() {
            return Err(ConfigError::ValidationError(
                "auth.admin_username and auth.admin_password must be set together".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("CODEX_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("CODEX_SERVER_PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid CODEX_SERVER_PORT: {}", port),
            }
        }
        if let Ok(cors_origin) = std::env::var("CODEX_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        // Database configuration
        if let Ok(driver) = std::env::var("CODEX_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => tracing::warn!("Ignoring invalid CODEX_DATABASE_DRIVER: {}", driver),
            }
        }
        if let Ok(url) = std::env::var("CODEX_DATABASE_URL") {
            self.database.url = url;
        }

        // Auth configuration
        if let Ok(days) = std::env::var("CODEX_AUTH_SESSION_EXPIRATION_DAYS") {
            if let Ok(days) = days.parse::<i64>() {
                self.auth.session_expiration_days = days;
            }
        }
        if let Ok(username) = std::env::var("CODEX_AUTH_ADMIN_USERNAME") {
            self.auth.admin_username = Some(username);
        }
        if let Ok(password) = std::env::var("CODEX_AUTH_ADMIN_PASSWORD") {
            self.auth.admin_password = Some(password);
        }

        // Blog configuration
        if let Ok(name) = std::env::var("CODEX_BLOG_SITE_NAME") {
            self.blog.site_name = name;
        }
        if let Ok(size) = std::env::var("CODEX_BLOG_PAGE_SIZE") {
            if let Ok(size) = size.parse::<i64>() {
                self.blog.page_size = size;
            }
        }
        if let Ok(prune) = std::env::var("CODEX_BLOG_PRUNE_ORPHAN_TAGS") {
            match prune.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.blog.prune_orphan_tags = true,
                "false" | "0" | "no" => self.blog.prune_orphan_tags = false,
                _ => {}
            }
        }

        // Analytics configuration
        if let Ok(schedule) = std::env::var("CODEX_ANALYTICS_SCHEDULE") {
            self.analytics.schedule = if schedule.trim().is_empty() {
                None
            } else {
                Some(schedule)
            };
        }
        if let Ok(days) = std::env::var("CODEX_ANALYTICS_DASHBOARD_DAYS") {
            if let Ok(days) = days.parse::<i64>() {
                self.analytics.dashboard_days = days;
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "CODEX_SERVER_HOST",
    "CODEX_SERVER_PORT",
    "CODEX_SERVER_CORS_ORIGIN",
    "CODEX_DATABASE_DRIVER",
    "CODEX_DATABASE_URL",
    "CODEX_AUTH_SESSION_EXPIRATION_DAYS",
    "CODEX_AUTH_ADMIN_USERNAME",
    "CODEX_AUTH_ADMIN_PASSWORD",
    "CODEX_BLOG_SITE_NAME",
    "CODEX_BLOG_PAGE_SIZE",
    "CODEX_BLOG_PRUNE_ORPHAN_TAGS",
    "CODEX_ANALYTICS_SCHEDULE",
    "CODEX_ANALYTICS_DASHBOARD_DAYS",
];

#[cfg(test)]
fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn partial_config_yaml_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            (1u16..=65535).prop_map(|port| format!("server:\n  port: {}\n", port)),
            Just("database:\n  driver: mysql\n".to_string()),
            Just("auth:\n  session_expiration_days: 3\n".to_string()),
            "[A-Za-z ]{1,20}".prop_map(|name| format!("blog:\n  site_name: \"{}\"\n", name)),
            (1i64..100).prop_map(|days| format!("analytics:\n  dashboard_days: {}\n", days)),
            Just("".to_string()),
            Just("   \n\n   ".to_string()),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Any partial file still yields a complete, valid config.
        #[test]
        fn partial_config_fills_defaults(yaml in partial_config_yaml_strategy()) {
            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");

            let config = Config::load(file.path()).expect("Failed to parse config");

            prop_assert!(config.validate().is_ok());
            prop_assert!(!config.server.host.is_empty());
            prop_assert!(!config.database.url.is_empty());
            prop_assert!(config.blog.page_size > 0);
        }

        /// Serializing a config and loading it back preserves every field.
        #[test]
        fn config_roundtrip(
            port in 1u16..=65535,
            page_size in 1i64..100,
            prune in any::<bool>(),
            days in 1i64..30,
        ) {
            let mut config = Config::default();
            config.server.port = port;
            config.blog.page_size = page_size;
            config.blog.prune_orphan_tags = prune;
            config.auth.session_expiration_days = days;

            let yaml = serde_yaml::to_string(&config).expect("Failed to serialize config");
            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");

            let parsed = Config::load(file.path()).expect("Failed to parse config");
            prop_assert_eq!(parsed.server.port, port);
            prop_assert_eq!(parsed.blog.page_size, page_size);
            prop_assert_eq!(parsed.blog.prune_orphan_tags, prune);
            prop_assert_eq!(parsed.auth.session_expiration_days, days);
        }

        /// Env vars take precedence over file values.
        #[test]
        fn env_precedence_over_file(
            file_port in 1000u16..2000,
            env_port in 3000u16..4000,
        ) {
            let _guard = lock_env();
            clear_env();

            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "server:\n  port: {}\n", file_port).expect("Failed to write config");

            std::env::set_var("CODEX_SERVER_PORT", env_port.to_string());

            let config = Config::load_with_env(file.path()).expect("Failed to load config");
            prop_assert_eq!(config.server.port, env_port);

            clear_env();
        }
    }
}
