//! Configuration file schema for hallulib.
//!
//! A config file fixes the ground-truth locations and check options for a
//! project so scans are reproducible. Every field is optional.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::check::{Checker, HallucinationLevel};
use crate::registry::{GroundTruth, DEFAULT_DOCUMENTATION_FILE, DEFAULT_PYPI_PACKAGES_FILE};

/// Config file names searched for in the working directory.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["hallulib.yaml", ".hallulib.yaml"];

/// Starter config written by `hallulib init`.
pub const CONFIG_TEMPLATE: &str = include_str!("templates/hallulib.yaml");

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Package registry file (default: data/libraries/pypi_data.json)
    #[serde(default)]
    pub pypi_file: Option<PathBuf>,
    /// Library documentation file (default: data/libraries/documentation.json)
    #[serde(default)]
    pub documentation_file: Option<PathBuf>,
    /// Treat standard library modules as known (default: true)
    #[serde(default = "default_true")]
    pub include_stdlib: bool,
    /// Treat curated import aliases as known (default: true)
    #[serde(default = "default_true")]
    pub include_valid_extras: bool,
    /// Check only installed names when a response has install lines
    #[serde(default)]
    pub installs_only: bool,
    /// "library" (default) or "member"
    #[serde(default)]
    pub level: Option<String>,
    /// Target library for member-level checks
    #[serde(default)]
    pub library: Option<String>,
    /// Names or glob patterns never reported
    #[serde(default)]
    pub allowlist: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pypi_file: None,
            documentation_file: None,
            include_stdlib: true,
            include_valid_extras: true,
            installs_only: false,
            level: None,
            library: None,
            allowlist: Vec::new(),
        }
    }
}

impl Config {
    /// Parse a config from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load the explicit config, else a discovered one, else defaults.
    ///
    /// Returns the config and the file it came from.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<(Self, Option<PathBuf>)> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => discover_config(Path::new(".")),
        };

        match path {
            Some(path) => {
                let config = Self::parse_file(&path)
                    .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", path.display(), e))?;
                Ok((config, Some(path)))
            }
            None => Ok((Self::default(), None)),
        }
    }

    pub fn pypi_file(&self) -> PathBuf {
        self.pypi_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PYPI_PACKAGES_FILE))
    }

    pub fn documentation_file(&self) -> PathBuf {
        self.documentation_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DOCUMENTATION_FILE))
    }

    /// Returns the configured level (defaults to library).
    pub fn get_level(&self) -> crate::Result<HallucinationLevel> {
        match &self.level {
            Some(level) => level.parse(),
            None => Ok(HallucinationLevel::Library),
        }
    }

    /// Ground truth over the configured files.
    pub fn ground_truth(&self) -> GroundTruth {
        GroundTruth::with_paths(self.pypi_file(), self.documentation_file())
    }

    /// A checker with the configured options.
    pub fn checker<'a>(&self, ground_truth: &'a GroundTruth) -> Checker<'a> {
        Checker::new(ground_truth)
            .with_stdlib(self.include_stdlib)
            .with_valid_extras(self.include_valid_extras)
            .with_installs_only(self.installs_only)
            .with_allowlist(self.allowlist.as_slice())
    }
}

/// Find a config file in `dir`.
pub fn discover_config(dir: &Path) -> Option<PathBuf> {
    DEFAULT_CONFIG_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

/// Validate a config for correctness.
pub fn validate(config: &Config) -> anyhow::Result<()> {
    let level = config.get_level()?;

    if level == HallucinationLevel::Member && config.library.is_none() {
        anyhow::bail!("level \"member\" requires a target library");
    }

    for pattern in &config.allowlist {
        globset::Glob::new(pattern)
            .map_err(|e| anyhow::anyhow!("invalid allowlist pattern {:?}: {}", pattern, e))?;
    }

    Ok(())
}

/// Platform data directory for downloaded ground truth.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "hallulib")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("data").join("libraries"))
}

/// Where `refresh-pypi` writes by default.
pub fn default_refresh_path() -> PathBuf {
    data_dir().join("pypi_data.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let yaml = r#"
pypi_file: "fixtures/pypi.json"
include_stdlib: false
level: member
library: numpy
allowlist:
  - "internal_*"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.pypi_file(), PathBuf::from("fixtures/pypi.json"));
        assert_eq!(config.documentation_file(), PathBuf::from(DEFAULT_DOCUMENTATION_FILE));
        assert!(!config.include_stdlib);
        assert!(config.include_valid_extras);
        assert_eq!(config.get_level().unwrap(), HallucinationLevel::Member);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_template_parses() {
        let config: Config = serde_yaml::from_str(CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.get_level().unwrap(), HallucinationLevel::Library);
        assert_eq!(config.pypi_file(), PathBuf::from(DEFAULT_PYPI_PACKAGES_FILE));
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_level() {
        let config = Config {
            level: Some("module".to_string()),
            ..Default::default()
        };
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("library, member"));
    }

    #[test]
    fn test_validate_member_needs_library() {
        let config = Config {
            level: Some("member".to_string()),
            ..Default::default()
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_glob() {
        let config = Config {
            allowlist: vec!["pkg[".to_string()],
            ..Default::default()
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_discover_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_config(dir.path()).is_none());

        fs::write(dir.path().join(".hallulib.yaml"), "installs_only: true\n").unwrap();
        let found = discover_config(dir.path()).unwrap();
        let config = Config::parse_file(&found).unwrap();
        assert!(config.installs_only);
    }
}
