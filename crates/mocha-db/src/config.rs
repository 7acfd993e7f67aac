//! # Application Configuration
//!
//! Where the database lives and how the engine behaves.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     MOCHA_DB_PATH=/var/lib/mocha/mocha.db                              │
//! │     MOCHA_VALUATION=current-average                                    │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/pos/mocha.toml (Linux)                                   │
//! │     ~/Library/Application Support/com.mocha.pos/mocha.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # mocha.toml
//! [database]
//! path = "mocha.db"
//! max_connections = 5
//!
//! [engine]
//! max_free_items_per_order = 3
//! feasibility_warning_ratio = 0.7
//! valuation = "snapshot"  # snapshot | current-average
//! ```

use mocha_core::{EnginePolicy, ValuationPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};

// =============================================================================
// Database Settings
// =============================================================================

/// Where the SQLite file lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Relative paths resolve against the working directory.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("mocha.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Engine Settings
// =============================================================================

/// `[engine]` table; becomes an [`EnginePolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Store-wide cap on BuyXGetY free units. Absent means uncapped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_free_items_per_order: Option<u32>,

    #[serde(default = "default_warning_ratio")]
    pub feasibility_warning_ratio: f64,

    #[serde(default)]
    pub valuation: ValuationPolicy,
}

fn default_warning_ratio() -> f64 {
    EnginePolicy::default().feasibility_warning_ratio
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            max_free_items_per_order: None,
            feasibility_warning_ratio: default_warning_ratio(),
            valuation: ValuationPolicy::default(),
        }
    }
}

impl From<&EngineSettings> for EnginePolicy {
    fn from(settings: &EngineSettings) -> Self {
        EnginePolicy {
            max_free_items_per_order: settings.max_free_items_per_order,
            feasibility_warning_ratio: settings.feasibility_warning_ratio,
            valuation: settings.valuation,
        }
    }
}

// =============================================================================
// App Config
// =============================================================================

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub engine: EngineSettings,
}

impl AppConfig {
    /// Loads configuration from file and environment.
    ///
    /// ## Loading Order
    /// 1. Start with defaults
    /// 2. Override with TOML file (if exists)
    /// 3. Override with environment variables
    /// 4. Validate
    pub fn load(config_path: Option<PathBuf>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                config = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a TOML file without applying overrides.
    pub fn from_file(path: &Path) -> DbResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> DbResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| DbError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DbError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| DbError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DbResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(DbError::InvalidConfig("database.path is required".into()));
        }
        if self.database.max_connections == 0 {
            return Err(DbError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        self.policy()
            .validate()
            .map_err(|e| DbError::InvalidConfig(e.to_string()))
    }

    /// The engine policy these settings describe.
    pub fn policy(&self) -> EnginePolicy {
        EnginePolicy::from(&self.engine)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `MOCHA_*` overrides from `lookup`. Unparsable values are
    /// ignored with a warning.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("MOCHA_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = lookup("MOCHA_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid MOCHA_MAX_CONNECTIONS"),
            }
        }

        if let Some(cap) = lookup("MOCHA_MAX_FREE_ITEMS") {
            match cap.trim() {
                "" | "none" => self.engine.max_free_items_per_order = None,
                value => match value.parse::<u32>() {
                    Ok(n) => self.engine.max_free_items_per_order = Some(n),
                    Err(_) => warn!(value = %cap, "Ignoring invalid MOCHA_MAX_FREE_ITEMS"),
                },
            }
        }

        if let Some(ratio) = lookup("MOCHA_WARNING_RATIO") {
            match ratio.parse::<f64>() {
                Ok(r) => self.engine.feasibility_warning_ratio = r,
                Err(_) => warn!(value = %ratio, "Ignoring invalid MOCHA_WARNING_RATIO"),
            }
        }

        if let Some(valuation) = lookup("MOCHA_VALUATION") {
            match valuation.parse() {
                Ok(policy) => {
                    debug!(valuation = %valuation, "Overriding valuation from environment");
                    self.engine.valuation = policy;
                }
                Err(_) => warn!(value = %valuation, "Ignoring invalid MOCHA_VALUATION"),
            }
        }
    }

    /// Platform config location of `mocha.toml`.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "mocha", "pos")
            .map(|dirs| dirs.config_dir().join("mocha.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mocha-config-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.database.path, PathBuf::from("mocha.db"));
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.policy(), EnginePolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_file() {
        let config: AppConfig = toml::from_str(
            r#"
            [engine]
            max_free_items_per_order = 3
            valuation = "current-average"
            "#,
        )
        .unwrap();

        assert_eq!(config.database, DatabaseSettings::default());
        let policy = config.policy();
        assert_eq!(policy.max_free_items_per_order, Some(3));
        assert_eq!(policy.feasibility_warning_ratio, 0.7);
        assert_eq!(policy.valuation, ValuationPolicy::CurrentAverage);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = scratch_dir("save");
        let path = dir.join("nested").join("mocha.toml");

        let mut config = AppConfig::default();
        config.database.path = PathBuf::from("/srv/mocha/shop.db");
        config.engine.max_free_items_per_order = Some(2);
        config.save(Some(path.clone())).unwrap();

        let reloaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(reloaded, config);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MOCHA_DB_PATH", "/tmp/other.db"),
            ("MOCHA_MAX_FREE_ITEMS", "4"),
            ("MOCHA_WARNING_RATIO", "not-a-number"),
            ("MOCHA_VALUATION", "average"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.engine.max_free_items_per_order, Some(4));
        assert_eq!(config.engine.feasibility_warning_ratio, 0.7);
        assert_eq!(config.engine.valuation, ValuationPolicy::CurrentAverage);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.engine.feasibility_warning_ratio = 1.5;
        assert!(matches!(config.validate(), Err(DbError::InvalidConfig(_))));

        let mut config = AppConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_file_fails_to_load() {
        let dir = scratch_dir("malformed");
        let path = dir.join("mocha.toml");
        std::fs::write(&path, "[engine\nvaluation = 1").unwrap();

        assert!(matches!(
            AppConfig::load(Some(path.clone())),
            Err(DbError::ConfigLoadFailed(_))
        ));
        // Falls back instead of failing startup
        assert_eq!(
            AppConfig::load_or_default(Some(path)).engine,
            EngineSettings::default()
        );
        std::fs::remove_dir_all(dir).ok();
    }
}
