//! Core configuration, read from `config.toml` in the application home.
//!
//! Every key is optional; a missing or unreadable file yields the defaults.
//!
//! ```toml
//! conan_executable = "/opt/conan/bin/conan"
//! search_local_versions = true
//! enable_version_queue = true
//! read_only_cache = false
//! probe_timeout_secs = 20
//! shutdown_timeout_secs = 5
//! log_filter = "info,conan=debug"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Explicit `conan` executable. Looked up on `PATH` when unset.
    pub conan_executable: Option<PathBuf>,
    /// Merge locally cached recipes into version alternative searches.
    pub search_local_versions: bool,
    /// Start the version discovery queue from `update_all_info`.
    pub enable_version_queue: bool,
    /// Never write the info cache back to disk.
    pub read_only_cache: bool,
    /// Upper bound for `conan --version` at startup.
    pub probe_timeout_secs: u64,
    /// How long shutdown waits for the worker threads.
    pub shutdown_timeout_secs: u64,
    /// Directory for the info cache file. Defaults to the application home.
    pub cache_dir: Option<PathBuf>,
    /// `tracing` filter directives used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            conan_executable: None,
            search_local_versions: false,
            enable_version_queue: true,
            read_only_cache: false,
            probe_timeout_secs: 20,
            shutdown_timeout_secs: 5,
            cache_dir: None,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Parse a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML for
    /// this schema.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Load `path` if it exists, otherwise (or on error) use the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{e:#}. Using default configuration.");
                Self::default()
            }
        }
    }

    /// Directory holding the info cache file.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(crate::paths::cache_dir)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
