//! Configuration management
//!
//! Configuration is loaded from a `config.yml` file and then overridden by
//! `QUILLPRESS_*` environment variables. Missing values fall back to defaults,
//! so an absent or empty file yields a runnable configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub theme: ThemeConfig,
    #[serde(default)]
    pub media: MediaConfig,
    /// SMTP settings; email features are disabled when absent
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    #[serde(default)]
    pub comments: CommentsConfig,
    /// OAuth providers keyed by provider name (e.g. "github", "google")
    #[serde(default)]
    pub social: HashMap<String, SocialProviderConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Public base URL used for absolute links (sitemap, emails, OAuth redirects)
    #[serde(default = "default_site_url")]
    pub site_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            site_url: default_site_url(),
        }
    }
}

impl ServerConfig {
    /// Site URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.site_url.trim_end_matches('/')
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

fn default_site_url() -> String {
    "http://localhost:8080".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path or `sqlite:` URL
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "data/quillpress.db".to_string()
}

fn default_max_connections() -> u32 {
    20
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub driver: CacheDriver,
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Default TTL in seconds for entries stored without an explicit TTL
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: CacheDriver::default(),
            redis_url: None,
            ttl_seconds: default_ttl(),
            max_capacity: default_max_capacity(),
        }
    }
}

fn default_ttl() -> u64 {
    3600
}

fn default_max_capacity() -> u64 {
    10_000
}

/// Cache driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriver {
    #[default]
    Memory,
    Redis,
}

/// Theme configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeConfig {
    #[serde(default = "default_theme")]
    pub active: String,
    #[serde(default = "default_theme_path")]
    pub path: PathBuf,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            active: default_theme(),
            path: default_theme_path(),
        }
    }
}

fn default_theme() -> String {
    "default".to_string()
}

fn default_theme_path() -> PathBuf {
    PathBuf::from("themes")
}

/// Media (uploads and resized images) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Root directory for uploaded media, served under `/media`
    #[serde(default = "default_media_root")]
    pub root: PathBuf,
    /// Maximum upload size in bytes (default: 10MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
    /// Widths generated for responsive `<picture>` sources
    #[serde(default = "default_responsive_widths")]
    pub responsive_widths: Vec<u32>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root: default_media_root(),
            max_file_size: default_max_file_size(),
            allowed_types: default_allowed_types(),
            responsive_widths: default_responsive_widths(),
        }
    }
}

fn default_media_root() -> PathBuf {
    PathBuf::from("media")
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/gif".to_string(),
        "image/webp".to_string(),
    ]
}

fn default_responsive_widths() -> Vec<u32> {
    vec![150, 300, 320, 480, 768, 1024]
}

impl MediaConfig {
    /// Check if a MIME type is allowed
    pub fn is_type_allowed(&self, mime_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == mime_type)
    }

    /// Get file extension for a MIME type
    pub fn extension_for(&self, mime_type: &str) -> &'static str {
        match mime_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "bin",
        }
    }

    /// Directory that holds generated responsive variants
    pub fn resized_dir(&self) -> PathBuf {
        self.root.join("resized")
    }
}

/// SMTP configuration for outgoing mail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Quillpress".to_string()
}

/// Comment system tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentsConfig {
    /// Maximum nesting depth; replies to a comment at depth `max_depth - 1` are rejected
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    #[serde(default = "default_edit_window_minutes")]
    pub edit_window_minutes: i64,
    /// Minimum seconds between two comments from the same user or IP
    #[serde(default = "default_rate_limit_seconds")]
    pub rate_limit_seconds: u64,
    /// Number of flags after which a comment is marked flagged
    #[serde(default = "default_auto_flag_threshold")]
    pub auto_flag_threshold: i64,
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_length: default_max_length(),
            min_length: default_min_length(),
            edit_window_minutes: default_edit_window_minutes(),
            rate_limit_seconds: default_rate_limit_seconds(),
            auto_flag_threshold: default_auto_flag_threshold(),
        }
    }
}

fn default_max_depth() -> u32 {
    4
}

fn default_max_length() -> usize {
    1000
}

fn default_min_length() -> usize {
    10
}

fn default_edit_window_minutes() -> i64 {
    15
}

fn default_rate_limit_seconds() -> u64 {
    30
}

fn default_auto_flag_threshold() -> i64 {
    3
}

/// OAuth2 provider used for social login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    #[serde(default)]
    pub scope: String,
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
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file.
    ///
    /// A missing or empty file yields the default configuration. Invalid YAML
    /// yields a [`ConfigError::ParseError`] carrying the line and column.
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

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        Ok(config)
    }

    /// Load configuration from file, apply environment overrides, and validate.
    ///
    /// Recognised variables:
    /// - QUILLPRESS_SERVER_HOST / QUILLPRESS_SERVER_PORT / QUILLPRESS_SERVER_CORS_ORIGIN
    /// - QUILLPRESS_SITE_URL
    /// - QUILLPRESS_DATABASE_URL
    /// - QUILLPRESS_CACHE_DRIVER / QUILLPRESS_CACHE_REDIS_URL / QUILLPRESS_CACHE_TTL_SECONDS
    /// - QUILLPRESS_THEME_ACTIVE / QUILLPRESS_THEME_PATH
    /// - QUILLPRESS_MEDIA_ROOT
    /// - QUILLPRESS_SMTP_HOST / QUILLPRESS_SMTP_PORT / QUILLPRESS_SMTP_USERNAME /
    ///   QUILLPRESS_SMTP_PASSWORD / QUILLPRESS_SMTP_FROM
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the server misbehave at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be greater than 0".to_string(),
            ));
        }
        if self.comments.max_depth < 1 {
            return Err(ConfigError::ValidationError(
                "comments.max_depth must be at least 1".to_string(),
            ));
        }
        if self.comments.min_length > self.comments.max_length {
            return Err(ConfigError::ValidationError(format!(
                "comments.min_length ({}) exceeds comments.max_length ({})",
                self.comments.min_length, self.comments.max_length
            )));
        }
        if let Some(ref smtp) = self.smtp {
            if smtp.host.trim().is_empty() || smtp.from_address.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "smtp.host and smtp.from_address are required when smtp is set".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("QUILLPRESS_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("QUILLPRESS_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("QUILLPRESS_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }
        if let Ok(site_url) = std::env::var("QUILLPRESS_SITE_URL") {
            self.server.site_url = site_url;
        }

        if let Ok(url) = std::env::var("QUILLPRESS_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(driver) = std::env::var("QUILLPRESS_CACHE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "memory" => self.cache.driver = CacheDriver::Memory,
                "redis" => self.cache.driver = CacheDriver::Redis,
                _ => {}
            }
        }
        if let Ok(redis_url) = std::env::var("QUILLPRESS_CACHE_REDIS_URL") {
            self.cache.redis_url = Some(redis_url);
        }
        if let Ok(ttl) = std::env::var("QUILLPRESS_CACHE_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.cache.ttl_seconds = ttl;
            }
        }

        if let Ok(active) = std::env::var("QUILLPRESS_THEME_ACTIVE") {
            self.theme.active = active;
        }
        if let Ok(path) = std::env::var("QUILLPRESS_THEME_PATH") {
            self.theme.path = PathBuf::from(path);
        }

        if let Ok(root) = std::env::var("QUILLPRESS_MEDIA_ROOT") {
            self.media.root = PathBuf::from(root);
        }

        // SMTP is only created from the environment when both host and sender are present
        let smtp_host = std::env::var("QUILLPRESS_SMTP_HOST").ok();
        let smtp_from = std::env::var("QUILLPRESS_SMTP_FROM").ok();
        if let Some(ref mut smtp) = self.smtp {
            if let Some(host) = smtp_host {
                smtp.host = host;
            }
            if let Some(from) = smtp_from {
                smtp.from_address = from;
            }
        } else if let (Some(host), Some(from)) = (smtp_host, smtp_from) {
            self.smtp = Some(SmtpConfig {
                host,
                port: default_smtp_port(),
                username: String::new(),
                password: String::new(),
                from_address: from,
                from_name: default_from_name(),
            });
        }
        if let Some(ref mut smtp) = self.smtp {
            if let Ok(port) = std::env::var("QUILLPRESS_SMTP_PORT") {
                if let Ok(port) = port.parse::<u16>() {
                    smtp.port = port;
                }
            }
            if let Ok(username) = std::env::var("QUILLPRESS_SMTP_USERNAME") {
                smtp.username = username;
            }
            if let Ok(password) = std::env::var("QUILLPRESS_SMTP_PASSWORD") {
                smtp.password = password;
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

// Shared by every test that touches process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ENV_KEYS: &[&str] = &[
        "QUILLPRESS_SERVER_HOST",
        "QUILLPRESS_SERVER_PORT",
        "QUILLPRESS_SERVER_CORS_ORIGIN",
        "QUILLPRESS_SITE_URL",
        "QUILLPRESS_DATABASE_URL",
        "QUILLPRESS_CACHE_DRIVER",
        "QUILLPRESS_CACHE_REDIS_URL",
        "QUILLPRESS_CACHE_TTL_SECONDS",
        "QUILLPRESS_THEME_ACTIVE",
        "QUILLPRESS_THEME_PATH",
        "QUILLPRESS_MEDIA_ROOT",
        "QUILLPRESS_SMTP_HOST",
        "QUILLPRESS_SMTP_PORT",
        "QUILLPRESS_SMTP_USERNAME",
        "QUILLPRESS_SMTP_PASSWORD",
        "QUILLPRESS_SMTP_FROM",
    ];

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn clear_env() {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let path = std::path::Path::new("nonexistent_config.yml");
        let config = Config::load(path).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.url, "data/quillpress.db");
        assert_eq!(config.cache.driver, CacheDriver::Memory);
        assert_eq!(config.cache.ttl_seconds, 3600);
        assert_eq!(config.theme.active, "default");
        assert_eq!(config.media.root, PathBuf::from("media"));
        assert_eq!(config.media.responsive_widths, vec![150, 300, 320, 480, 768, 1024]);
        assert!(config.smtp.is_none());
        assert_eq!(config.comments.max_depth, 4);
        assert_eq!(config.comments.max_length, 1000);
        assert_eq!(config.comments.edit_window_minutes, 15);
        assert_eq!(config.comments.rate_limit_seconds, 30);
        assert_eq!(config.comments.auto_flag_threshold, 3);
        assert!(config.social.is_empty());
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 3000\ncomments:\n  max_depth: 6\n").unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.comments.max_depth, 6);
        assert_eq!(config.comments.min_length, 10);
    }

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
server:
  host: "127.0.0.1"
  port: 9000
  site_url: "https://blog.example.com/"
database:
  url: "sqlite:/var/lib/quillpress.db"
cache:
  driver: redis
  redis_url: "redis://localhost:6379"
  ttl_seconds: 7200
media:
  root: "/srv/media"
  responsive_widths: [320, 640]
smtp:
  host: "smtp.example.com"
  from_address: "noreply@example.com"
social:
  github:
    client_id: "abc"
    client_secret: "secret"
    authorize_url: "https://github.com/login/oauth/authorize"
    token_url: "https://github.com/login/oauth/access_token"
    userinfo_url: "https://api.github.com/user"
    scope: "read:user user:email"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.base_url(), "https://blog.example.com");
        assert_eq!(config.database.url, "sqlite:/var/lib/quillpress.db");
        assert_eq!(config.cache.driver, CacheDriver::Redis);
        assert_eq!(config.cache.ttl_seconds, 7200);
        assert_eq!(config.media.root, PathBuf::from("/srv/media"));
        assert_eq!(config.media.responsive_widths, vec![320, 640]);
        let smtp = config.smtp.expect("smtp section");
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.from_name, "Quillpress");
        assert_eq!(config.social["github"].client_id, "abc");
    }

    #[test]
    fn test_load_invalid_yaml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: not_a_number\n").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn test_validate_rejects_bad_comment_limits() {
        let mut config = Config::default();
        config.comments.min_length = 2000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = Config::default();
        config.comments.max_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_incomplete_smtp() {
        let mut config = Config::default();
        config.smtp = Some(SmtpConfig {
            host: String::new(),
            port: 587,
            username: String::new(),
            password: String::new(),
            from_address: "a@b.c".to_string(),
            from_name: "x".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_override_server_config() {
        let _guard = lock_env();
        clear_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  host: \"0.0.0.0\"\n  port: 8080\n").unwrap();

        std::env::set_var("QUILLPRESS_SERVER_HOST", "192.168.1.1");
        std::env::set_var("QUILLPRESS_SERVER_PORT", "4000");
        std::env::set_var("QUILLPRESS_SITE_URL", "https://example.org");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.server.host, "192.168.1.1");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.site_url, "https://example.org");

        clear_env();
    }

    #[test]
    fn test_env_override_invalid_values_ignored() {
        let _guard = lock_env();
        clear_env();

        std::env::set_var("QUILLPRESS_SERVER_PORT", "not_a_port");
        std::env::set_var("QUILLPRESS_CACHE_DRIVER", "memcached");

        let config = Config::load_with_env(std::path::Path::new("missing.yml")).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.cache.driver, CacheDriver::Memory);

        clear_env();
    }

    #[test]
    fn test_env_creates_smtp_section() {
        let _guard = lock_env();
        clear_env();

        std::env::set_var("QUILLPRESS_SMTP_HOST", "mail.example.com");
        std::env::set_var("QUILLPRESS_SMTP_FROM", "blog@example.com");
        std::env::set_var("QUILLPRESS_SMTP_PORT", "2525");

        let config = Config::load_with_env(std::path::Path::new("missing.yml")).unwrap();
        let smtp = config.smtp.expect("smtp from env");
        assert_eq!(smtp.host, "mail.example.com");
        assert_eq!(smtp.from_address, "blog@example.com");
        assert_eq!(smtp.port, 2525);

        clear_env();
    }

    #[test]
    fn test_env_host_alone_does_not_enable_smtp() {
        let _guard = lock_env();
        clear_env();

        std::env::set_var("QUILLPRESS_SMTP_HOST", "mail.example.com");
        let config = Config::load_with_env(std::path::Path::new("missing.yml")).unwrap();
        assert!(config.smtp.is_none());

        clear_env();
    }
}
