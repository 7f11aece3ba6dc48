//! Configuration management with file persistence

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};

use crate::manifest::DEFAULT_MAX_MANIFEST_BYTES;
use crate::resolver::StaticLibraryVersions;
use crate::version::Version;

/// Tessera configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub plugins: PluginsConfig,
    /// Library name to installed version, served to the resolver
    #[serde(default)]
    pub libraries: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Manifest directory; `TESSERA_PLUGIN_DIR` takes precedence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    pub check_dependencies: bool,
    pub max_manifest_bytes: u64,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            directory: None,
            check_dependencies: true,
            max_manifest_bytes: DEFAULT_MAX_MANIFEST_BYTES,
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("TESSERA_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("tessera")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default path, or defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Render as TOML, the same form [`Config::save`] writes
    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.plugins.max_manifest_bytes == 0 {
            return Err(anyhow!("plugins.max_manifest_bytes must be greater than zero"));
        }
        for (name, version) in &self.libraries {
            if name.trim().is_empty() {
                return Err(anyhow!("Library names cannot be empty"));
            }
            Version::parse(version)
                .with_context(|| format!("Invalid version for library '{}'", name))?;
        }
        Ok(())
    }

    /// Directory plugin manifests are discovered in
    pub fn plugin_dir(&self) -> anyhow::Result<PathBuf> {
        self.resolve_plugin_dir(env::var_os("TESSERA_PLUGIN_DIR").map(PathBuf::from))
    }

    fn resolve_plugin_dir(&self, env_override: Option<PathBuf>) -> anyhow::Result<PathBuf> {
        if let Some(dir) = env_override {
            return Ok(dir);
        }
        if let Some(dir) = &self.plugins.directory {
            return Ok(dir.clone());
        }
        dirs::home_dir()
            .map(|home| home.join(".tessera").join("plugins"))
            .ok_or_else(|| anyhow!("Unable to resolve plugin directory"))
    }

    /// Library versions from `[libraries]` as a resolver provider
    pub fn library_versions(&self) -> anyhow::Result<StaticLibraryVersions> {
        StaticLibraryVersions::from_strings(&self.libraries)
            .context("Invalid [libraries] entry in configuration")
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "plugins.directory" => Ok(self
                .plugins
                .directory
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "(not set)".to_string())),
            "plugins.check_dependencies" => Ok(self.plugins.check_dependencies.to_string()),
            "plugins.max_manifest_bytes" => Ok(self.plugins.max_manifest_bytes.to_string()),
            _ => match key.strip_prefix("libraries.") {
                Some(name) => self
                    .libraries
                    .get(name)
                    .cloned()
                    .ok_or_else(|| anyhow!("Library '{}' is not configured", name)),
                None => Err(anyhow!(
                    "Unknown configuration key: {}. Use `tessera config list` to see available keys.",
                    key
                )),
            },
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "plugins.directory" => {
                self.plugins.directory = if value.trim().is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            "plugins.check_dependencies" => {
                self.plugins.check_dependencies = value
                    .parse()
                    .with_context(|| format!("Invalid check_dependencies value: {}", value))?;
            }
            "plugins.max_manifest_bytes" => {
                let bytes: u64 = value
                    .parse()
                    .with_context(|| format!("Invalid max_manifest_bytes value: {}", value))?;
                if bytes == 0 {
                    return Err(anyhow!("max_manifest_bytes must be greater than zero"));
                }
                self.plugins.max_manifest_bytes = bytes;
            }
            _ => {
                let Some(name) = key.strip_prefix("libraries.") else {
                    return Err(anyhow!(
                        "Unknown configuration key: {}. Use `tessera config list` to see available keys.",
                        key
                    ));
                };
                if name.trim().is_empty() {
                    return Err(anyhow!("Library names cannot be empty"));
                }
                Version::parse(value)
                    .with_context(|| format!("Invalid version for library '{}'", name))?;
                self.libraries.insert(name.to_string(), value.to_string());
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "plugins.directory",
            "plugins.check_dependencies",
            "plugins.max_manifest_bytes",
        ]
        .into_iter()
        .map(str::to_string)
        .chain(self.libraries.keys().map(|name| format!("libraries.{}", name)));

        keys.map(|key| {
            let value = self.get(&key)?;
            Ok((key, value))
        })
        .collect()
    }
}
