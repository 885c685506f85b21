//! Tool configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Which snapshot entries make an identity count as new.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewIdentityRule {
    /// New when the key has no display name OR no token assignment
    #[default]
    NameOrToken,
    /// New only when the key has no display name
    NameOnly,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub roster: RosterConfig,
    #[serde(default)]
    pub appearance: AppearanceConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Remote token registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// API base URL
    #[serde(default = "default_registry_api")]
    pub api_base: String,

    /// Bot authentication token
    #[serde(default)]
    pub token: String,

    /// Containers in allocation priority order
    #[serde(default, alias = "guild_ids")]
    pub container_ids: Vec<String>,

    /// Container id -> channel receiving the token listing
    #[serde(default, alias = "emoji_list_channels")]
    pub listing_channels: HashMap<String, String>,

    /// Fixed per-container capacity; derived from the container tier when unset
    #[serde(default)]
    pub capacity: Option<usize>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            api_base: default_registry_api(),
            token: String::new(),
            container_ids: Vec::new(),
            listing_channels: HashMap::new(),
            capacity: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Identity group service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterConfig {
    #[serde(default = "default_roster_api")]
    pub api_base: String,

    /// Group labels, fetched in this order
    #[serde(default = "default_groups")]
    pub groups: Vec<String>,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            api_base: default_roster_api(),
            groups: default_groups(),
        }
    }
}

/// Appearance asset service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppearanceConfig {
    #[serde(default = "default_appearance_api")]
    pub api_base: String,

    /// Local asset cache, keyed by fingerprint
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Attempts per fetch, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the first retry, doubled on each further retry
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        Self {
            api_base: default_appearance_api(),
            cache_dir: default_cache_dir(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// Reconciliation behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Directory holding the four snapshot documents
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Pause after each processed identity
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,

    #[serde(default)]
    pub new_identity_rule: NewIdentityRule,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            step_delay_ms: default_step_delay_ms(),
            new_identity_rule: NewIdentityRule::default(),
        }
    }
}

// Defaults
fn default_registry_api() -> String { "https://discord.com/api".to_string() }
fn default_roster_api() -> String { "https://api.jaoafa.com".to_string() }
fn default_appearance_api() -> String { "https://crafatar.com".to_string() }
fn default_groups() -> Vec<String> {
    ["admin", "moderator", "regular", "verified"]
        .iter()
        .map(|g| g.to_string())
        .collect()
}
fn default_cache_dir() -> PathBuf { PathBuf::from("images") }
fn default_state_dir() -> PathBuf { PathBuf::from(".") }
fn default_timeout_secs() -> u64 { 30 }
fn default_max_attempts() -> u32 { 3 }
fn default_backoff_ms() -> u64 { 500 }
fn default_step_delay_ms() -> u64 { 1000 }

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("No registry token configured")]
    MissingToken,

    #[error("No containers configured")]
    NoContainers,

    #[error("No roster groups configured")]
    NoGroups,

    #[error("Invalid client settings: {0}")]
    Client(String),

    #[error("No listing channel configured for container {0}")]
    MissingListingChannel(String),
}

impl Config {
    /// Load from `path`; a missing file yields the (unusable) default config.
    ///
    /// Files ending in `.json` are parsed as JSON, anything else as TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let parse_err = |reason: String| ConfigError::Parse {
            path: path.display().to_string(),
            reason,
        };

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))
        } else {
            toml::from_str(&content).map_err(|e| parse_err(e.to_string()))
        }
    }

    /// Check the values a sync run cannot do without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if self.registry.container_ids.is_empty() {
            return Err(ConfigError::NoContainers);
        }
        if self.roster.groups.is_empty() {
            return Err(ConfigError::NoGroups);
        }
        Ok(())
    }

    /// Listing channel for a container.
    pub fn listing_channel(&self, container: &str) -> Result<&str, ConfigError> {
        self.registry
            .listing_channels
            .get(container)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingListingChannel(container.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_default_that_fails_validation() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();

        assert!(config.registry.container_ids.is_empty());
        assert!(matches!(config.validate(), Err(ConfigError::MissingToken)));
    }

    #[test]
    fn test_load_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roster-tokens.toml");
        std::fs::write(
            &path,
            r#"
[registry]
token = "secret"
container_ids = ["g1", "g2"]
capacity = 50

[registry.listing_channels]
g1 = "c1"

[sync]
step_delay_ms = 0
new_identity_rule = "name_only"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.registry.container_ids, vec!["g1", "g2"]);
        assert_eq!(config.registry.capacity, Some(50));
        assert_eq!(config.sync.new_identity_rule, NewIdentityRule::NameOnly);
        assert_eq!(config.roster.groups.len(), 4);
        assert_eq!(config.listing_channel("g1").unwrap(), "c1");
        assert!(config.listing_channel("g2").is_err());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_json_accepts_legacy_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"registry": {"token": "t", "guild_ids": ["g1"], "emoji_list_channels": {"g1": "c9"}}}"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.registry.container_ids, vec!["g1"]);
        assert_eq!(config.listing_channel("g1").unwrap(), "c9");
        assert_eq!(config.sync.new_identity_rule, NewIdentityRule::NameOrToken);
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[registry\ntoken=").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }
}
