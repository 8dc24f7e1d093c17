//! Configuration system for shadowhook
//!
//! This module provides a trait-based configuration system that supports:
//! - Type-safe config structs via serde
//! - TOML file format
//! - Auto-generation of default configs
//! - Manual reload capability
//!
//! # Example
//!
//! ```ignore
//! use serde::{Deserialize, Serialize};
//! use shadowhook_core::ModConfig;
//!
//! #[derive(Default, Serialize, Deserialize)]
//! pub struct SaveLoggerConfig {
//!     pub verbose: bool,
//!     pub backup_count: u32,
//! }
//!
//! impl ModConfig for SaveLoggerConfig {
//!     const MOD_ID: &'static str = "save_logger";
//! }
//!
//! fn load_config() {
//!     let config = SaveLoggerConfig::load().unwrap_or_default();
//!     println!("Backups: {}", config.backup_count);
//! }
//! ```

mod loader;

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub use loader::{configs_dir, core_config_path, mod_config_path, shadowhook_base_dir, HOME_ENV};

/// Configuration system errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read or write config file
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML content
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config to TOML
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Could not determine config directory from library location
    #[error("Config directory not available - could not resolve framework base path")]
    NoConfigDirectory,
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Read a TOML file, or write `T::default()` there if it is missing
fn load_or_create<T>(path: &Path) -> ConfigResult<(T, bool)>
where
    T: Default + Serialize + DeserializeOwned,
{
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        Ok((toml::from_str(&content)?, false))
    } else {
        let default = T::default();
        write_toml(path, &default)?;
        Ok((default, true))
    }
}

/// Write a TOML file, creating parent directories if needed
fn write_toml<T: Serialize>(path: &Path, value: &T) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(value)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Trait for mod configuration types.
///
/// Implement this trait on your config struct to enable automatic loading,
/// saving, and reloading of configuration files.
///
/// # Requirements
///
/// Your config type must implement:
/// - `Default` - for generating initial config files
/// - `Serialize` - for saving to TOML
/// - `DeserializeOwned` - for loading from TOML
/// - `Send + Sync` - for thread-safe access
///
/// # File Location
///
/// Configs are stored at:
/// `<base>/configs/mods/{MOD_ID}/{MOD_ID}.toml`
pub trait ModConfig: Default + Serialize + DeserializeOwned + Send + Sync {
    /// The mod id used for config file path resolution.
    const MOD_ID: &'static str;

    /// Load config from file, creating default if missing.
    fn load() -> ConfigResult<Self> {
        let path = mod_config_path(Self::MOD_ID)?;
        let (config, created) = load_or_create(&path)?;

        if created {
            tracing::info!("Created default config for {} at {:?}", Self::MOD_ID, path);
        } else {
            tracing::debug!("Loaded config for {} from {:?}", Self::MOD_ID, path);
        }
        Ok(config)
    }

    /// Save config to file.
    fn save(&self) -> ConfigResult<()> {
        let path = mod_config_path(Self::MOD_ID)?;
        write_toml(&path, self)?;
        tracing::debug!("Saved config for {} to {:?}", Self::MOD_ID, path);
        Ok(())
    }

    /// Reload config from file.
    ///
    /// Updates self with the current file contents.
    fn reload(&mut self) -> ConfigResult<()> {
        let path = mod_config_path(Self::MOD_ID)?;
        let content = std::fs::read_to_string(&path)?;
        *self = toml::from_str(&content)?;
        tracing::debug!("Reloaded config for {} from {:?}", Self::MOD_ID, path);
        Ok(())
    }
}

/// Core framework configuration.
///
/// This config controls framework-level settings and is loaded from:
/// `<base>/configs/core.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    /// Config version for future migration support
    pub version: u32,

    /// Enable debug logging
    pub debug: bool,

    /// Host build the descriptors are selected for, e.g. `2.206`
    pub host_build: String,

    /// Directory holding platform descriptors, relative to the base directory
    /// unless absolute
    pub descriptors_dir: PathBuf,

    /// File the loaded-mod state is written to on every host save, relative
    /// to the base directory unless absolute
    pub state_file: PathBuf,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            version: 1,
            debug: false,
            host_build: String::new(),
            descriptors_dir: PathBuf::from("descriptors"),
            state_file: PathBuf::from("data/state.json"),
        }
    }
}

impl FrameworkConfig {
    /// Load core config from file, creating default if missing.
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&core_config_path()?)
    }

    /// Load from an explicit path, creating default if missing.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let (config, created) = load_or_create(path)?;
        if created {
            tracing::info!("Created default core config at {:?}", path);
        } else {
            tracing::debug!("Loaded core config from {:?}", path);
        }
        Ok(config)
    }

    /// Save core config to file.
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&core_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        write_toml(path, self)?;
        tracing::debug!("Saved core config to {:?}", path);
        Ok(())
    }

    /// Reload core config from file.
    pub fn reload(&mut self) -> ConfigResult<()> {
        let path = core_config_path()?;
        let content = std::fs::read_to_string(&path)?;
        *self = toml::from_str(&content)?;
        tracing::debug!("Reloaded core config from {:?}", path);
        Ok(())
    }

    /// Descriptor directory resolved against `base`
    pub fn descriptors_path(&self, base: &Path) -> PathBuf {
        resolve(base, &self.descriptors_dir)
    }

    /// State file resolved against `base`
    pub fn state_path(&self, base: &Path) -> PathBuf {
        resolve(base, &self.state_file)
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
