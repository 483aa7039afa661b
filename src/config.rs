// src/config.rs

//! Sequencer configuration
//!
//! Every field has a default matching the stock adapter table layout, so an
//! empty TOML document is a valid configuration:
//!
//! ```toml
//! adapter_table = "TAPInterface"
//! install_action = "InstallTAPInterfaces"
//! uninstall_action = "UninstallTAPInterfaces"
//! rollback_disabled_property = "RollbackDisabled"
//! adapter_ticks = 16384
//! temp_dir = "/var/tmp"
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Progress ticks reserved for one adapter create/delete
pub const DEFAULT_ADAPTER_TICKS: u32 = 16 * 1024;

/// Configuration shared by the planner and the executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Declarative host table listing the adapters to manage
    pub adapter_table: String,

    /// Deferred action that creates adapters
    pub install_action: String,

    /// Deferred action that removes adapters
    pub uninstall_action: String,

    /// Host property that turns off rollback recording
    pub rollback_disabled_property: String,

    /// Tick cost of each adapter operation
    pub adapter_ticks: u32,

    /// Where sequence files are written (system temp dir when unset)
    pub temp_dir: Option<PathBuf>,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            adapter_table: "TAPInterface".to_string(),
            install_action: "InstallTAPInterfaces".to_string(),
            uninstall_action: "UninstallTAPInterfaces".to_string(),
            rollback_disabled_property: "RollbackDisabled".to_string(),
            adapter_ticks: DEFAULT_ADAPTER_TICKS,
            temp_dir: None,
        }
    }
}

impl SequencerConfig {
    /// Parse a configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SequencerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Serialize the configuration to TOML
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Reject settings the planner cannot work with
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("adapter_table", &self.adapter_table),
            ("install_action", &self.install_action),
            ("uninstall_action", &self.uninstall_action),
            ("rollback_disabled_property", &self.rollback_disabled_property),
        ] {
            if value.trim().is_empty() {
                return Err(Error::ConfigError(format!("{} must not be empty", field)));
            }
        }

        if self.install_action == self.uninstall_action {
            return Err(Error::ConfigError(format!(
                "install_action and uninstall_action are both '{}'",
                self.install_action
            )));
        }

        if self.adapter_ticks == 0 {
            return Err(Error::ConfigError(
                "adapter_ticks must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Directory sequence files are created in
    pub fn sequence_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = SequencerConfig::default();
        assert_eq!(config.adapter_table, "TAPInterface");
        assert_eq!(config.install_action, "InstallTAPInterfaces");
        assert_eq!(config.uninstall_action, "UninstallTAPInterfaces");
        assert_eq!(config.adapter_ticks, DEFAULT_ADAPTER_TICKS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = SequencerConfig::from_toml_str("").unwrap();
        assert_eq!(config, SequencerConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let toml = r#"
adapter_table = "WintunInterface"
adapter_ticks = 4096
temp_dir = "/var/tmp/seq"
"#;
        let config = SequencerConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.adapter_table, "WintunInterface");
        assert_eq!(config.adapter_ticks, 4096);
        assert_eq!(config.install_action, "InstallTAPInterfaces");
        assert_eq!(config.sequence_dir(), PathBuf::from("/var/tmp/seq"));
    }

    #[test]
    fn test_zero_ticks_rejected() {
        let result = SequencerConfig::from_toml_str("adapter_ticks = 0");
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_same_action_names_rejected() {
        let toml = r#"
install_action = "Adapters"
uninstall_action = "Adapters"
"#;
        assert!(matches!(
            SequencerConfig::from_toml_str(toml),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_malformed_toml() {
        let result = SequencerConfig::from_toml_str("adapter_ticks = \"lots\"");
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_load_and_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sequencer.toml");

        let mut config = SequencerConfig::default();
        config.uninstall_action = "RemoveAdapters".to_string();
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();

        let loaded = SequencerConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = SequencerConfig::load(&temp_dir.path().join("absent.toml"));
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }
}
