//! Symbolizer location lookup
//!
//! Two values drive the process pool: the directory holding unstripped
//! libraries (`symbols_root`) and the symbolizer binary (`symbolizer_path`).
//! Each one is taken from the first source that provides it:
//!
//! 1. Explicit override (command line)
//! 2. Environment variable (`ANDROID_SYMBOLS`, `ANDROID_ADDR2LINE`)
//! 3. User configuration file (`$HEAPSCOPE_CONFIG` or `~/.config/heapscope/config.json`)
//! 4. Built-in default (`$ANDROID_PRODUCT_OUT/symbols`, `addr2line`)

use log::debug;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::ConfigError;

pub const SYMBOLS_ENV: &str = "ANDROID_SYMBOLS";
pub const SYMBOLIZER_ENV: &str = "ANDROID_ADDR2LINE";
pub const PRODUCT_OUT_ENV: &str = "ANDROID_PRODUCT_OUT";
pub const CONFIG_ENV: &str = "HEAPSCOPE_CONFIG";

const DEFAULT_SYMBOLIZER: &str = "addr2line";

/// Contents of the user configuration file
#[derive(Debug, Default, Clone, Deserialize)]
pub struct UserConfig {
    pub symbols_root: Option<PathBuf>,
    pub symbolizer_path: Option<PathBuf>,
}

impl UserConfig {
    /// Load the user configuration file
    ///
    /// A missing file is not an error and yields an empty configuration.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No user config at {}", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|source| ConfigError::ReadFailed { path: path.display().to_string(), source })?;
        serde_json::from_str(&content)
            .map_err(|source| ConfigError::ParseFailed { path: path.display().to_string(), source })
    }

    /// Where the user configuration file lives
    #[must_use]
    pub fn default_path(env: &dyn Fn(&str) -> Option<String>) -> Option<PathBuf> {
        if let Some(path) = env(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        home::home_dir().map(|home| home.join(".config").join("heapscope").join("config.json"))
    }
}

/// Resolved symbolizer locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolizerConfig {
    pub symbols_root: PathBuf,
    pub symbolizer_path: PathBuf,
}

impl SymbolizerConfig {
    /// Resolve both locations from the process environment
    ///
    /// # Errors
    /// Returns an error if the user configuration file is unreadable
    pub fn from_env(
        symbols_override: Option<PathBuf>,
        symbolizer_override: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        let user = match UserConfig::default_path(&env) {
            Some(path) => UserConfig::load(&path)?,
            None => UserConfig::default(),
        };
        Ok(Self::resolve(symbols_override, symbolizer_override, &env, &user))
    }

    /// Apply the override → environment → user config → default order
    pub fn resolve(
        symbols_override: Option<PathBuf>,
        symbolizer_override: Option<PathBuf>,
        env: &dyn Fn(&str) -> Option<String>,
        user: &UserConfig,
    ) -> Self {
        let symbols_root = symbols_override
            .or_else(|| env(SYMBOLS_ENV).map(PathBuf::from))
            .or_else(|| user.symbols_root.clone())
            .unwrap_or_else(|| {
                env(PRODUCT_OUT_ENV).map_or_else(|| PathBuf::from("symbols"), |out| {
                    PathBuf::from(out).join("symbols")
                })
            });

        let symbolizer_path = symbolizer_override
            .or_else(|| env(SYMBOLIZER_ENV).map(PathBuf::from))
            .or_else(|| user.symbolizer_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SYMBOLIZER));

        debug!(
            "Symbolizer config: symbols_root={}, symbolizer={}",
            symbols_root.display(),
            symbolizer_path.display()
        );

        Self { symbols_root, symbolizer_path }
    }
}
