use crate::backend::AcceleratorFlags;
use crate::plugins::ReferenceFrame;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Host configuration, read from `~/.opi/config.yaml`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub plugins: PluginsConfig,
    #[serde(default)]
    pub accelerators: AcceleratorConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginsConfig {
    /// Directory scanned for propagator libraries
    pub directory: Option<PathBuf>,

    /// Scan `directory` when the host starts
    #[serde(default = "default_true")]
    pub autoload: bool,

    /// Additional libraries loaded explicitly
    #[serde(default)]
    pub paths: Vec<PathBuf>,

    /// Propagator enabled and selected at startup
    pub default_propagator: Option<String>,
}

/// Accelerator backends this host offers to plugins.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AcceleratorConfig {
    #[serde(default)]
    pub cuda: bool,
    #[serde(default)]
    pub opencl: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchConfig {
    /// Reject propagators whose output frame differs
    pub required_frame: Option<ReferenceFrame>,

    /// Permit negative time steps on propagators that support them
    #[serde(default = "default_true")]
    pub allow_backward: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            directory: None,
            autoload: true,
            paths: Vec::new(),
            default_propagator: None,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            required_frame: None,
            allow_backward: true,
        }
    }
}

impl AcceleratorConfig {
    #[must_use]
    pub fn flags(&self) -> AcceleratorFlags {
        let mut flags = AcceleratorFlags::empty();
        flags.set(AcceleratorFlags::CUDA, self.cuda);
        flags.set(AcceleratorFlags::OPENCL, self.opencl);
        flags
    }
}

impl Config {
    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;

        let config: Config = serde_yaml::from_str(&contents)
            .context("Failed to parse config file")?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        fs::write(path.as_ref(), contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get default configuration path
    pub fn default_config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .context("Failed to get home directory")?;

        Ok(home.join(".opi").join("config.yaml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.plugins.autoload);
        assert!(config.plugins.directory.is_none());
        assert!(config.dispatch.allow_backward);
        assert!(config.accelerators.flags().is_empty());
    }

    #[test]
    fn test_config_deserialization() {
        let yaml = r#"
plugins:
  directory: /opt/opi/plugins
  default_propagator: basic
accelerators:
  cuda: true
dispatch:
  required_frame: teme
  allow_backward: false
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.plugins.directory, Some(PathBuf::from("/opt/opi/plugins")));
        assert!(config.plugins.autoload);
        assert_eq!(config.plugins.default_propagator.as_deref(), Some("basic"));
        assert_eq!(config.accelerators.flags(), AcceleratorFlags::CUDA);
        assert_eq!(config.dispatch.required_frame, Some(ReferenceFrame::Teme));
        assert!(!config.dispatch.allow_backward);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = Config::default();
        config.plugins.paths.push(PathBuf::from("libbasic.so"));
        config.accelerators.opencl = true;
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(Config::load_from_file(dir.path().join("absent.yaml")).is_err());
    }
}
