//! # chonk-config
//!
//! Configuration for the chonk store and walker.
//!
//! Resolution order:
//! 1. Built-in defaults
//! 2. `~/.chonk/config.toml` (global)
//! 3. Environment variables (`CHONK_*`, highest priority)

pub mod logging;

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use chonk_core::{StoreConfig, DEFAULT_RESERVED_BYTES};
use chonk_index::WalkOptions;

/// Global config instance
static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| {
    RwLock::new(Config::load().unwrap_or_else(|e| {
        eprintln!(
            "[chonk-config] WARNING: failed to load config: {}. Using defaults.",
            e
        );
        Config::default()
    }))
});

/// Get the global config (read-only)
pub fn config() -> std::sync::RwLockReadGuard<'static, Config> {
    CONFIG.read().unwrap()
}

/// Reload the global config from disk
pub fn reload() -> Result<(), ConfigError> {
    let new_config = Config::load()?;
    *CONFIG.write().unwrap() = new_config;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreSettings,
    pub walk: WalkSettings,
    pub log: LogSettings,
}

impl Config {
    /// Load config from the standard locations.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("loading global config from {:?}", global_path);
                let contents = std::fs::read_to_string(&global_path)?;
                config = toml::from_str(&contents)?;
            }
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load config from one specific file plus env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Global config path: `~/.chonk/config.toml`
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".chonk/config.toml"))
    }

    /// Apply environment variable overrides (highest priority)
    fn apply_env_overrides(&mut self) {
        if let Ok(bytes) = std::env::var("CHONK_RESERVED_BYTES") {
            if let Ok(n) = bytes.parse() {
                self.store.reserved_bytes = n;
            }
        }
        if let Ok(pages) = std::env::var("CHONK_HEADER_PAGES") {
            if let Ok(n) = pages.parse() {
                self.store.header_pages = n;
            }
        }
        if let Ok(size) = std::env::var("CHONK_PAGE_SIZE") {
            if let Ok(n) = size.parse() {
                self.store.page_size = n;
            }
        }
        if let Ok(depth) = std::env::var("CHONK_MAX_DEPTH") {
            if let Ok(n) = depth.parse() {
                self.walk.max_depth = n;
            }
        }
        if std::env::var("CHONK_ONE_FILESYSTEM").is_ok() {
            self.walk.one_filesystem = true;
        }
    }

    /// Materialize the typed store geometry.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            reserved_address_bytes: self.store.reserved_bytes,
            header_pages: self.store.header_pages,
            page_size: self.store.page_size,
        }
    }

    /// Materialize the typed walk options.
    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            max_depth: self.walk.max_depth,
            one_filesystem: self.walk.one_filesystem,
        }
    }

    /// Generate a TOML template for `chonk init`-style setup.
    pub fn init_toml() -> String {
        let default = Config::default();
        format!(
            r#"# chonk configuration
# Documentation: https://github.com/chonk-sh/chonk

[store]
# Address space reserved for the tree, in bytes. Committed lazily.
reserved_bytes = {reserved_bytes}
# header_pages = 2
# page_size = 0  # 0 = host page size

[walk]
# max_depth = 0  # 0 = unlimited
# one_filesystem = false

[log]
# level = "info"  # error | warn | info | debug | trace
"#,
            reserved_bytes = default.store.reserved_bytes,
        )
    }
}

/// Store geometry settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreSettings {
    /// Address space reserved at init; nothing is committed up front.
    pub reserved_bytes: usize,
    /// Pages set aside for metadata, root entry, and root path.
    pub header_pages: u32,
    /// Backing page size; 0 asks the host.
    pub page_size: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            reserved_bytes: DEFAULT_RESERVED_BYTES,
            header_pages: 2,
            page_size: 0,
        }
    }
}

/// Walk behavior settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WalkSettings {
    /// Deepest directory level to enumerate; 0 = unlimited.
    pub max_depth: u32,
    /// Do not cross filesystem boundaries below the root.
    pub one_filesystem: bool,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogSettings {
    /// Default verbosity; `CHONK_LOG`/`RUST_LOG` override at init.
    pub level: logging::LogLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    // Lock for tests that modify environment variables to prevent race
    // conditions when tests run in parallel
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    // ========== Default Values Tests ==========

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.store.reserved_bytes, DEFAULT_RESERVED_BYTES);
        assert_eq!(config.store.header_pages, 2);
        assert_eq!(config.store.page_size, 0);
        assert_eq!(config.walk.max_depth, 0);
        assert!(!config.walk.one_filesystem);
        assert_eq!(config.log.level, logging::LogLevel::Info);
    }

    #[test]
    fn test_log_level_from_toml() {
        let config: Config = toml::from_str("[log]\nlevel = \"debug\"\n").unwrap();
        assert_eq!(config.log.level, logging::LogLevel::Debug);
    }

    #[test]
    fn test_typed_configs_mirror_settings() {
        let mut config = Config::default();
        config.store.reserved_bytes = 1 << 20;
        config.walk.max_depth = 7;

        let sc = config.store_config();
        assert_eq!(sc.reserved_address_bytes, 1 << 20);
        assert_eq!(sc.header_pages, 2);

        let wo = config.walk_options();
        assert_eq!(wo.max_depth, 7);
        assert!(!wo.one_filesystem);
    }

    // ========== TOML Tests ==========

    #[test]
    fn test_toml_roundtrip() {
        let original = Config::default();
        let toml_str = toml::to_string(&original).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(original.store, parsed.store);
        assert_eq!(original.walk, parsed.walk);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let partial = r#"
[walk]
max_depth = 3
"#;
        let config: Config = toml::from_str(partial).unwrap();
        assert_eq!(config.walk.max_depth, 3);
        assert_eq!(config.store.reserved_bytes, DEFAULT_RESERVED_BYTES);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let result: Result<Config, _> = toml::from_str("invalid { toml }");
        assert!(result.is_err());
    }

    #[test]
    fn test_init_toml_parses_back() {
        let config: Config = toml::from_str(&Config::init_toml()).unwrap();
        assert_eq!(config.store.reserved_bytes, DEFAULT_RESERVED_BYTES);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[store]
reserved_bytes = 1048576
header_pages = 4

[walk]
one_filesystem = true
"#,
        )
        .unwrap();

        let _guard = ENV_LOCK.lock().unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.store.reserved_bytes, 1048576);
        assert_eq!(config.store.header_pages, 4);
        assert!(config.walk.one_filesystem);
    }

    // ========== Environment Override Tests ==========

    #[test]
    fn test_env_override_reserved_bytes() {
        let _guard = ENV_LOCK.lock().unwrap();
        let mut config = Config::default();

        std::env::set_var("CHONK_RESERVED_BYTES", "4194304");
        config.apply_env_overrides();
        std::env::remove_var("CHONK_RESERVED_BYTES");

        assert_eq!(config.store.reserved_bytes, 4194304);
    }

    #[test]
    fn test_env_override_invalid_value_ignored() {
        let _guard = ENV_LOCK.lock().unwrap();
        let mut config = Config::default();

        std::env::set_var("CHONK_MAX_DEPTH", "not_a_number");
        config.apply_env_overrides();
        std::env::remove_var("CHONK_MAX_DEPTH");

        assert_eq!(config.walk.max_depth, 0);
    }

    #[test]
    fn test_env_override_one_filesystem_flag() {
        let _guard = ENV_LOCK.lock().unwrap();
        let mut config = Config::default();

        std::env::set_var("CHONK_ONE_FILESYSTEM", "1");
        config.apply_env_overrides();
        std::env::remove_var("CHONK_ONE_FILESYSTEM");

        assert!(config.walk.one_filesystem);
    }

    // ========== Global Path ==========

    #[test]
    fn test_global_config_path_shape() {
        let path = Config::global_config_path();
        assert!(path.is_some());
        assert!(path.unwrap().ends_with(".chonk/config.toml"));
    }
}
