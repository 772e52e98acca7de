//! Configuration file parser for ~/.config/rssbridge/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde, though we log a warning when the file
//! contains potential typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_BODY_SIZE};

/// Environment variable that overrides the `secret` key.
pub const SECRET_ENV_VAR: &str = "RSSBRIDGE_SECRET";

/// Picture used for feeds that publish no image.
pub const DEFAULT_PROFILE_PICTURE_URL: &str =
    "https://upload.wikimedia.org/wikipedia/commons/4/43/Feed-icon.svg";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("No identity secret configured; set `secret` in the config file or {SECRET_ENV_VAR}")]
    MissingSecret,
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
///
/// The custom Debug impl masks `secret`: it is the root of every derived
/// private key.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shared secret for identity derivation. `RSSBRIDGE_SECRET` takes precedence.
    pub secret: Option<String>,

    /// Profile picture for feeds without an image.
    pub default_profile_picture_url: String,

    /// Whether newly seen feeds may be published as new identities.
    pub enable_auto_registration: bool,

    /// Per-request timeout for discovery and feed fetches, in seconds.
    pub fetch_timeout_secs: u64,

    /// Largest accepted response body, in bytes.
    pub max_feed_size_bytes: usize,

    /// Allow localhost and private-network feed URLs.
    pub allow_private_hosts: bool,

    /// SQLite feed store. Defaults to `feeds.db` next to the config file.
    pub database_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            secret: None,
            default_profile_picture_url: DEFAULT_PROFILE_PICTURE_URL.to_string(),
            enable_auto_registration: true,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            max_feed_size_bytes: DEFAULT_MAX_BODY_SIZE,
            allow_private_hosts: false,
            database_path: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field(
                "default_profile_picture_url",
                &self.default_profile_picture_url,
            )
            .field("enable_auto_registration", &self.enable_auto_registration)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("max_feed_size_bytes", &self.max_feed_size_bytes)
            .field("allow_private_hosts", &self.allow_private_hosts)
            .field("database_path", &self.database_path)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "secret",
                "default_profile_picture_url",
                "enable_auto_registration",
                "fetch_timeout_secs",
                "max_feed_size_bytes",
                "allow_private_hosts",
                "database_path",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            auto_registration = config.enable_auto_registration,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// The identity secret, from `RSSBRIDGE_SECRET` or else the config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSecret`] when neither source is set or both
    /// are empty.
    pub fn resolve_secret(&self) -> Result<SecretString, ConfigError> {
        self.resolve_secret_with(std::env::var(SECRET_ENV_VAR).ok())
    }

    fn resolve_secret_with(&self, env_value: Option<String>) -> Result<SecretString, ConfigError> {
        env_value
            .filter(|s| !s.is_empty())
            .or_else(|| self.secret.clone().filter(|s| !s.is_empty()))
            .map(SecretString::from)
            .ok_or(ConfigError::MissingSecret)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// The configured store path, or `feeds.db` inside `config_dir`.
    pub fn database_path_in(&self, config_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| config_dir.join("feeds.db"))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.secret.is_none());
        assert_eq!(config.default_profile_picture_url, DEFAULT_PROFILE_PICTURE_URL);
        assert!(config.enable_auto_registration);
        assert_eq!(config.fetch_timeout(), DEFAULT_FETCH_TIMEOUT);
        assert_eq!(config.max_feed_size_bytes, DEFAULT_MAX_BODY_SIZE);
        assert!(!config.allow_private_hosts);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/rssbridge_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert!(config.enable_auto_registration);
    }

    #[test]
    fn test_empty_file_returns_default() {
        let dir = std::env::temp_dir().join("rssbridge_config_test_empty");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "   \n  \n").unwrap();

        let config = Config::load(&path).unwrap();
        assert!(config.secret.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let dir = std::env::temp_dir().join("rssbridge_config_test_partial");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "enable_auto_registration = false\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert!(!config.enable_auto_registration);
        assert_eq!(config.fetch_timeout_secs, 10); // default
        assert_eq!(config.default_profile_picture_url, DEFAULT_PROFILE_PICTURE_URL);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let dir = std::env::temp_dir().join("rssbridge_config_test_full");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let content = r#"
secret = "test"
default_profile_picture_url = "https://image.example/feed.png"
enable_auto_registration = false
fetch_timeout_secs = 3
max_feed_size_bytes = 4096
allow_private_hosts = true
database_path = "/var/lib/rssbridge/feeds.db"
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.secret.as_deref(), Some("test"));
        assert_eq!(
            config.default_profile_picture_url,
            "https://image.example/feed.png"
        );
        assert!(!config.enable_auto_registration);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(3));
        assert_eq!(config.max_feed_size_bytes, 4096);
        assert!(config.allow_private_hosts);
        assert_eq!(
            config.database_path_in(Path::new("/unused")),
            PathBuf::from("/var/lib/rssbridge/feeds.db")
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let dir = std::env::temp_dir().join("rssbridge_config_test_invalid");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "this is not [valid toml").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let dir = std::env::temp_dir().join("rssbridge_config_test_unknown");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "secret = \"s\"\nrelay_url = \"wss://relay.example\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.secret.as_deref(), Some("s"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let dir = std::env::temp_dir().join("rssbridge_config_test_wrongtype");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "fetch_timeout_secs = \"ten\"\n").unwrap();

        assert!(Config::load(&path).is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = std::env::temp_dir().join("rssbridge_config_test_too_large");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "a".repeat(1_048_577)).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_env_secret_takes_precedence() {
        let config = Config {
            secret: Some("from-file".to_string()),
            ..Config::default()
        };

        let secret = config
            .resolve_secret_with(Some("from-env".to_string()))
            .unwrap();
        assert_eq!(secret.expose_secret(), "from-env");

        let secret = config.resolve_secret_with(None).unwrap();
        assert_eq!(secret.expose_secret(), "from-file");

        // An empty variable does not shadow the file
        let secret = config.resolve_secret_with(Some(String::new())).unwrap();
        assert_eq!(secret.expose_secret(), "from-file");
    }

    #[test]
    fn test_missing_secret_is_error() {
        let config = Config::default();
        assert!(matches!(
            config.resolve_secret_with(None),
            Err(ConfigError::MissingSecret)
        ));
    }

    #[test]
    fn test_database_path_defaults_to_config_dir() {
        let config = Config::default();
        assert_eq!(
            config.database_path_in(Path::new("/home/u/.config/rssbridge")),
            PathBuf::from("/home/u/.config/rssbridge/feeds.db")
        );
    }

    #[test]
    fn test_debug_masks_secret() {
        let config = Config {
            secret: Some("super-secret-value-12345".to_string()),
            ..Config::default()
        };

        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super-secret-value-12345"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_debug_shows_none_when_no_secret() {
        let debug_output = format!("{:?}", Config::default());
        assert!(debug_output.contains("secret: None"));
        assert!(!debug_output.contains("[REDACTED]"));
    }
}
