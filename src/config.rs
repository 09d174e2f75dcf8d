use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, Result};
use crate::matcher::Matcher;

/// how many linear edits the reuse search walks back by default
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// store configuration kept in config.toml
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// bound on the reuse search
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// zstd level for stored records
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
    /// working-tree patterns left out of snapshots
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_compression_level() -> i32 {
    3
}

fn default_ignore() -> Vec<String> {
    vec![".git/**".to_string(), ".snapcache/**".to_string()]
}

impl Config {
    /// load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path)?;
        Ok(())
    }

    /// matcher over the ignored paths
    pub fn ignore_matcher(&self) -> Result<Matcher> {
        Matcher::from_patterns(&self.ignore)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            compression_level: default_compression_level(),
            ignore: default_ignore(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_toml_roundtrip() {
        let config = Config {
            max_depth: 4,
            compression_level: 9,
            ignore: vec!["target/**".to_string()],
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_config_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.max_depth, 10);
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config {
            max_depth: 2,
            ..Config::default()
        };
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_ignore_matcher() {
        let m = Config::default().ignore_matcher().unwrap();
        assert!(m.matches(".git/HEAD"));
        assert!(m.matches(".snapcache/config.toml"));
        assert!(!m.matches("src/main.rs"));
    }
}
