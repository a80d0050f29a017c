use dirs::config_dir;
use std::path::PathBuf;

/// Returns the application data directory, or None if no config directory can be resolved.
pub fn try_app_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("CONAN_EXPLORER_HOME") {
        return Some(PathBuf::from(val));
    }
    config_dir().map(|d| d.join("conan_explorer"))
}

/// Returns the application data directory (`<config dir>/conan_explorer`).
///
/// Falls back to a directory under the system temp dir when neither
/// `CONAN_EXPLORER_HOME` is set nor a config directory exists.
pub fn app_home() -> PathBuf {
    try_app_home().unwrap_or_else(|| std::env::temp_dir().join("conan_explorer"))
}

/// Config file: <home>/config.toml
pub fn config_path() -> PathBuf {
    app_home().join("config.toml")
}

/// Directory holding the info cache file
pub fn cache_dir() -> PathBuf {
    app_home()
}
