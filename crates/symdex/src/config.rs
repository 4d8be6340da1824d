//! Engine configuration.
//!
//! Loads settings from `.symdex.toml` in the workspace root. Uses figment
//! for layered configuration with provenance tracking; an unreadable or
//! invalid file degrades to defaults with a warning rather than failing
//! startup.

use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration filename looked up in the workspace root.
pub const CONFIG_FILE_NAME: &str = ".symdex.toml";

/// Default directories to exclude from workspace scans.
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    ".git",
    "__history",
    "backup",
    "lib",
    "node_modules",
    "target",
];

/// Engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Path of the persistent symbol store. Absent means in-memory-only
    /// operation: every reload re-extracts and workspace search always
    /// returns the full aggregation.
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    /// Emit enum member symbols. Suppressed by default.
    #[serde(default)]
    pub include_enum_members: bool,

    /// Whether to respect .gitignore files when scanning (default: true).
    #[serde(default = "default_respect_gitignore")]
    pub respect_gitignore: bool,

    /// Additional directories to exclude from scans (merged with defaults).
    #[serde(default)]
    pub exclude_dirs: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: None,
            include_enum_members: false,
            respect_gitignore: default_respect_gitignore(),
            exclude_dirs: Vec::new(),
        }
    }
}

fn default_respect_gitignore() -> bool {
    true
}

impl Config {
    /// Load configuration from `.symdex.toml` in the given root directory.
    ///
    /// Returns the defaults if the file doesn't exist. Parse errors are
    /// reported with file, line, and key information.
    pub fn load(root: &Path) -> Self {
        let config_path = root.join(CONFIG_FILE_NAME);

        let figment = Figment::from(Serialized::defaults(Config::default()));
        let figment = if config_path.exists() {
            figment.merge(Toml::file(&config_path))
        } else {
            figment
        };

        match figment.extract() {
            Ok(config) => {
                if config_path.exists() {
                    tracing::info!("Loaded config from {:?}", config_path);
                }
                config
            }
            Err(e) => {
                // Figment provides detailed error messages with provenance
                tracing::warn!("Config error: {}", e);
                Self::default()
            }
        }
    }

    /// All directories to exclude from scans (defaults + user-configured).
    pub fn excluded_dirs(&self) -> Vec<&str> {
        let mut dirs: Vec<&str> = DEFAULT_EXCLUDE_DIRS.to_vec();
        for dir in &self.exclude_dirs {
            if !dirs.contains(&dir.as_str()) {
                dirs.push(dir.as_str());
            }
        }
        dirs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.store_path.is_none());
        assert!(!config.include_enum_members);
        assert!(config.respect_gitignore);
        let excluded = config.excluded_dirs();
        assert!(excluded.contains(&".git"));
        assert!(excluded.contains(&"backup"));
    }

    #[test]
    fn test_load_missing_config() {
        let temp = TempDir::new().unwrap();
        let config = Config::load(temp.path());
        assert!(config.store_path.is_none());
        assert!(config.exclude_dirs.is_empty());
    }

    #[test]
    fn test_load_config() {
        let temp = TempDir::new().unwrap();
        let config_content = r#"
store_path = ".cache/symbols.db"
include_enum_members = true
exclude_dirs = ["generated"]
"#;
        std::fs::write(temp.path().join(CONFIG_FILE_NAME), config_content).unwrap();

        let config = Config::load(temp.path());
        assert_eq!(
            config.store_path,
            Some(PathBuf::from(".cache/symbols.db"))
        );
        assert!(config.include_enum_members);

        let excluded = config.excluded_dirs();
        assert!(excluded.contains(&"generated"));
        assert!(excluded.contains(&".git")); // defaults still present
    }

    #[test]
    fn test_invalid_config_returns_defaults() {
        let temp = TempDir::new().unwrap();
        let config_content = r#"
include_enum_members = "not a bool"
"#;
        std::fs::write(temp.path().join(CONFIG_FILE_NAME), config_content).unwrap();

        let config = Config::load(temp.path());
        assert!(!config.include_enum_members); // default value
    }

    #[test]
    fn test_partial_config_merges_with_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE_NAME), "respect_gitignore = false\n")
            .unwrap();

        let config = Config::load(temp.path());
        assert!(!config.respect_gitignore); // from config
        assert!(config.store_path.is_none()); // from defaults
        assert!(config.exclude_dirs.is_empty()); // from defaults
    }
}
