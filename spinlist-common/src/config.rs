//! Configuration loading and config file resolution
//!
//! Bootstrap configuration lives in a single TOML file. Every field has a
//! built-in default, so a missing file is never fatal.
//!
//! # Config File Priority
//!
//! 1. Command-line argument (`--config`)
//! 2. Environment variable (`SPINLIST_CONFIG`)
//! 3. Platform config directory (`~/.config/spinlist/config.toml` on Linux)
//! 4. Built-in defaults (no file)
//!
//! A handful of values can additionally be overridden from the environment
//! after the file is read; see [`TomlConfig::apply_env_overrides`].

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SPINLIST_CONFIG";

const ENV_CATALOG_BASE_URL: &str = "SPINLIST_CATALOG_BASE_URL";
const ENV_USER_AGENT: &str = "SPINLIST_USER_AGENT";
const ENV_LOG_LEVEL: &str = "SPINLIST_LOG_LEVEL";

/// Root configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Mention extraction and scoring
    pub extraction: ExtractionConfig,
    /// Catalog request quota, retry and fan-out
    pub resolver: ResolverConfig,
    /// Track matching thresholds
    pub matching: MatchingConfig,
    /// Catalog search endpoint
    pub catalog: CatalogConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// A pattern rule declared as data
///
/// `pattern` is a regular expression with named groups `artist` and `title`,
/// and optionally `album`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSpec {
    /// Stable rule identifier, reported on every candidate it produces
    pub id: String,
    /// Regular expression source
    pub pattern: String,
    /// Base weight in (0, 1]
    pub base_weight: f32,
}

/// Extraction and confidence scoring settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Number of tokens before a match searched for music keywords
    pub keyword_window: usize,
    /// Music keywords; single words also match their plural and past forms, phrases match verbatim
    pub keywords: Vec<String>,
    /// Additional rules appended after the built-in pattern table
    pub patterns: Vec<PatternSpec>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            keyword_window: 8,
            keywords: ["plays", "listening to", "track", "song", "recommend"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            patterns: Vec::new(),
        }
    }
}

/// Catalog request quota, retry policy and concurrency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Bucket capacity: requests allowed per rolling window
    pub requests_per_window: u32,
    /// Rolling window length in seconds
    pub window_secs: u64,
    /// Longest a caller may wait for a token before failing
    pub max_wait_ms: u64,
    /// First retry delay
    pub base_delay_ms: u64,
    /// Retry delay cap
    pub max_delay_ms: u64,
    /// Total attempts per search, including the first
    ///
    /// The default of 3 gives up on a search answered by three 429s in a
    /// row; raise it to 4 or more to ride out a longer throttling burst.
    pub max_attempts: u32,
    /// Concurrent resolution calls
    pub fan_out: usize,
    /// Overall run deadline (none by default)
    pub deadline_secs: Option<u64>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 100,
            window_secs: 60,
            max_wait_ms: 120_000,
            base_delay_ms: 250,
            max_delay_ms: 4_000,
            max_attempts: 3,
            fan_out: 5,
            deadline_secs: None,
        }
    }
}

/// Track matching thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum combined similarity to accept a match
    pub threshold: f32,
    /// Minimum per-field (artist, title) similarity for a result to be eligible
    pub field_floor: f32,
    /// Added when the recommendation's album matches the result's album
    pub album_bonus: f32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.75,
            field_floor: 0.6,
            album_bonus: 0.1,
        }
    }
}

/// Catalog search endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Search API base URL
    pub base_url: String,
    /// User-Agent sent with every request (MusicBrainz rejects anonymous clients)
    pub user_agent: String,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Maximum results requested per search
    pub result_limit: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://musicbrainz.org/ws/2".to_string(),
            user_agent: get_user_agent(),
            timeout_secs: 15,
            result_limit: 10,
        }
    }
}

/// Standard User-Agent string for outbound HTTP clients
pub fn get_user_agent() -> String {
    format!(
        "spinlist/{} ( https://github.com/spinlist/spinlist )",
        env!("CARGO_PKG_VERSION")
    )
}

impl TomlConfig {
    /// Resolve, load, override and validate configuration
    ///
    /// **Algorithm:**
    /// 1. Resolve the config path (CLI → ENV → platform default)
    /// 2. Load the file, falling back to defaults if none exists
    /// 3. Apply environment overrides
    /// 4. Validate ranges
    pub fn load(cli_arg: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(cli_arg, CONFIG_ENV_VAR) {
            Some(path) => load_toml_config(&path)?,
            None => {
                info!("No config file found, using built-in defaults");
                TomlConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides on top of file values
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env(ENV_CATALOG_BASE_URL) {
            info!(base_url = %url, "Catalog base URL overridden from environment");
            self.catalog.base_url = url;
        }
        if let Some(agent) = non_empty_env(ENV_USER_AGENT) {
            self.catalog.user_agent = agent;
        }
        if let Some(level) = non_empty_env(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let r = &self.resolver;
        if r.requests_per_window == 0 {
            return Err(Error::Config(
                "resolver.requests_per_window must be at least 1".to_string(),
            ));
        }
        if r.window_secs == 0 {
            return Err(Error::Config(
                "resolver.window_secs must be at least 1".to_string(),
            ));
        }
        if r.max_attempts == 0 {
            return Err(Error::Config(
                "resolver.max_attempts must be at least 1".to_string(),
            ));
        }
        if r.fan_out == 0 {
            return Err(Error::Config("resolver.fan_out must be at least 1".to_string()));
        }
        if r.base_delay_ms > r.max_delay_ms {
            return Err(Error::Config(format!(
                "resolver.base_delay_ms ({}) exceeds resolver.max_delay_ms ({})",
                r.base_delay_ms, r.max_delay_ms
            )));
        }

        let m = &self.matching;
        for (name, value) in [
            ("matching.threshold", m.threshold),
            ("matching.field_floor", m.field_floor),
            ("matching.album_bonus", m.album_bonus),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be within 0.0-1.0, got {}",
                    name, value
                )));
            }
        }

        if self.extraction.keyword_window == 0 {
            return Err(Error::Config(
                "extraction.keyword_window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolve the config file path
///
/// Returns `None` when neither an explicit path nor a platform config file exists.
/// Explicit paths (CLI or ENV) are returned even if missing so the loader can warn.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Some(path) = non_empty_env(env_var_name) {
        return Some(PathBuf::from(path));
    }

    // Priority 3: Platform config directory
    default_config_path().filter(|p| p.exists())
}

/// Platform config file location (`<config_dir>/spinlist/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("spinlist").join("config.toml"))
}

/// Load a TOML config file
///
/// A missing file logs a warning and yields defaults. A file that exists but
/// cannot be parsed is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                path = %path.display(),
                "Config file not found, using built-in defaults"
            );
            return Ok(TomlConfig::default());
        }
        Err(e) => return Err(Error::Io(e)),
    };

    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Write a config file atomically
///
/// Serializes to `<path>.tmp` then renames over the target, so readers never
/// observe a partially written file. On Unix the file is created with mode 0600.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize config failed: {}", e)))?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    std::fs::write(&tmp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(Error::Io(e));
    }
    Ok(())
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
