//! Configuration management for mips-emu.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (`MIPS_EMU_MEMORY_SIZE`, `MIPS_EMU_ENDIANNESS`)
//! 2. Project-local config file (`./mips-emu.toml`)
//! 3. User config file (`~/.config/mips-emu/config.toml`)
//! 4. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # mips-emu.toml
//!
//! # Guest memory size in bytes
//! memory_size = 16777216
//!
//! # Guest byte order: "big" (default) or "little"
//! endianness = "big"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::memory::Endianness;

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// mips-emu configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Guest memory size in bytes.
    pub memory_size: Option<u32>,

    /// Guest byte order.
    pub endianness: Option<Endianness>,
}

impl Config {
    /// Default guest memory size: 16 MiB.
    pub const DEFAULT_MEMORY_SIZE: u32 = 0x0100_0000;

    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `mips-emu.toml`
    /// 3. User config `~/.config/mips-emu/config.toml`
    /// 4. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load user config first (lowest priority of file configs)
        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        // Load project-local config (higher priority)
        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        // Environment variables override everything
        config.apply_env_overrides();

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// Guest memory size, with fallback to the default.
    pub fn memory_size(&self) -> u32 {
        self.memory_size.unwrap_or(Self::DEFAULT_MEMORY_SIZE)
    }

    /// Guest byte order, big-endian by default.
    pub fn endianness(&self) -> Endianness {
        self.endianness.unwrap_or_default()
    }

    /// Load user configuration from ~/.config/mips-emu/config.toml
    fn load_user_config() -> Option<Self> {
        let config_dir = dirs::config_dir()?;
        let config_path = config_dir.join("mips-emu").join("config.toml");
        Self::load_from_file(&config_path)
    }

    /// Load project-local configuration from ./mips-emu.toml
    fn load_local_config() -> Option<Self> {
        let local_path = Path::new("mips-emu.toml");
        if let Some(config) = Self::load_from_file(local_path) {
            return Some(config);
        }

        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let project_path = Path::new(&manifest_dir).join("mips-emu.toml");
            if let Some(config) = Self::load_from_file(&project_path) {
                return Some(config);
            }
        }

        None
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    fn merge(&mut self, other: Self) {
        if other.memory_size.is_some() {
            self.memory_size = other.memory_size;
        }
        if other.endianness.is_some() {
            self.endianness = other.endianness;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(size) = std::env::var("MIPS_EMU_MEMORY_SIZE") {
            match size.parse::<u32>() {
                Ok(bytes) => {
                    log::info!("Using MIPS_EMU_MEMORY_SIZE from environment: {}", bytes);
                    self.memory_size = Some(bytes);
                }
                Err(e) => log::warn!("Ignoring MIPS_EMU_MEMORY_SIZE ({}): {}", size, e),
            }
        }
        if let Ok(order) = std::env::var("MIPS_EMU_ENDIANNESS") {
            match order.to_ascii_lowercase().as_str() {
                "big" => self.endianness = Some(Endianness::Big),
                "little" => self.endianness = Some(Endianness::Little),
                other => log::warn!("Ignoring MIPS_EMU_ENDIANNESS: unknown value '{}'", other),
            }
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("mips-emu").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# mips-emu configuration
# Place this file at ~/.config/mips-emu/config.toml or ./mips-emu.toml

# Guest memory size in bytes (default 16 MiB)
memory_size = 16777216

# Guest byte order: "big" or "little" (default "big")
endianness = "big"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.memory_size(), 0x0100_0000);
        assert_eq!(config.endianness(), Endianness::Big);
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config {
            memory_size: Some(1024),
            endianness: None,
        };

        let overlay = Config {
            memory_size: None,
            endianness: Some(Endianness::Little),
        };

        base.merge(overlay);

        // memory_size unchanged (overlay was None)
        assert_eq!(base.memory_size, Some(1024));
        // endianness set from overlay
        assert_eq!(base.endianness, Some(Endianness::Little));
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = Config::sample_config();
        let config: Config = toml::from_str(&sample).expect("Sample config should parse");
        assert_eq!(config.memory_size, Some(16_777_216));
        assert_eq!(config.endianness, Some(Endianness::Big));
    }
}
