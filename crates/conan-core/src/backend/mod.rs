//! Version-specific access to Conan.
//!
//! [`ConanBackend`] is the set of primitives the [`ConanApi`](crate::api::ConanApi)
//! facade needs. [`ConanV1`] and [`ConanV2`] implement it on top of the
//! `conan` executable; [`connect`] picks one from `conan --version`.

pub mod runner;
pub mod v1;
pub mod v2;

pub use runner::{CommandOutput, CommandRunner, ProcessRunner};
pub use v1::ConanV1;
pub use v2::ConanV2;

use crate::config::Config;
use crate::error::BackendError;
use conan_schema::{Options, PackageId, PackageInfo, PackageReference, Remote, RemoteAuth, Settings};
use regex::Regex;
use semver::Version;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

static VERSION_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").ok());

/// Everything needed to install one exact configuration.
#[derive(Debug, Clone, Copy)]
pub struct InstallRequest<'a> {
    pub reference: &'a PackageReference,
    pub settings: &'a Settings,
    pub options: &'a Options,
    /// Profile name, empty for the default profile.
    pub profile: &'a str,
    pub update: bool,
}

/// Primitives one Conan major version provides.
pub trait ConanBackend: Send + Sync {
    fn version(&self) -> &Version;

    /// File name of the info cache for this backend.
    fn cache_file_name(&self) -> &'static str;

    /// Clear stale cache locks. No-op where Conan has none.
    fn remove_locks(&self) -> Result<(), BackendError>;

    /// Configured remotes in priority order.
    fn remotes(&self, include_disabled: bool) -> Result<Vec<Remote>, BackendError>;

    fn remote_user_info(&self, remote: &str) -> Result<RemoteAuth, BackendError>;

    fn profiles(&self) -> Result<Vec<String>, BackendError>;

    fn profile_settings(&self, profile: &str) -> Result<Settings, BackendError>;

    /// Settings of the default host profile.
    fn default_settings(&self) -> Result<Settings, BackendError>;

    /// Every recipe in the local cache.
    fn local_refs(&self) -> Result<Vec<PackageReference>, BackendError>;

    /// Binary packages of `reference` in the local cache.
    fn local_packages(&self, reference: &PackageReference) -> Result<Vec<PackageInfo>, BackendError>;

    /// Binary packages of `reference` on `remote`, or in the local cache for
    /// `None`, optionally filtered by a package query.
    fn remote_packages(
        &self,
        reference: &PackageReference,
        remote: Option<&str>,
        query: Option<&str>,
    ) -> Result<Vec<PackageInfo>, BackendError>;

    /// Recipes matching `pattern` on `remote`, or in the local cache for `None`.
    fn search_recipes(
        &self,
        pattern: &str,
        remote: Option<&str>,
    ) -> Result<Vec<PackageReference>, BackendError>;

    /// Search pattern listing every version/user/channel of a recipe name.
    fn alternatives_pattern(&self, name: &str) -> String;

    /// Install one configuration and return the id of the installed binary.
    fn install(&self, request: &InstallRequest<'_>) -> Result<PackageId, BackendError>;

    /// Folder of an installed binary. `None` when Conan does not know it.
    fn package_folder(
        &self,
        reference: &PackageReference,
        package_id: &str,
    ) -> Result<Option<PathBuf>, BackendError>;

    /// Default options declared by the recipe. Runs recipe code.
    fn inspect_default_options(&self, reference: &PackageReference) -> Result<Options, BackendError>;

    /// Package query restricting candidates to the default platform.
    fn package_query(&self, default_settings: &Settings) -> String {
        platform_query(default_settings, &["arch", "os"])
    }
}

/// Probe the installed Conan and build the matching backend.
pub fn connect(config: &Config) -> Result<Arc<dyn ConanBackend>, BackendError> {
    let runner = ProcessRunner::locate(config.conan_executable.as_deref())?;
    let output = runner.version_output(config.probe_timeout())?;
    let version = parse_version(&output)?;
    tracing::info!("Detected Conan {version} at {}", runner.executable().display());
    from_version(version, Box::new(runner))
}

/// Backend for an already known Conan version.
pub fn from_version(
    version: Version,
    runner: Box<dyn CommandRunner>,
) -> Result<Arc<dyn ConanBackend>, BackendError> {
    match version.major {
        1 => Ok(Arc::new(ConanV1::new(version, runner))),
        2 => Ok(Arc::new(ConanV2::new(version, runner))),
        _ => Err(BackendError::UnsupportedVersion(version.to_string())),
    }
}

/// Parse `Conan version 2.0.14` (or any text holding a dotted version).
pub fn parse_version(output: &str) -> Result<Version, BackendError> {
    let re = VERSION_RE
        .as_ref()
        .ok_or_else(|| BackendError::parse("version pattern"))?;
    let caps = re
        .captures(output)
        .ok_or_else(|| BackendError::parse(format!("no version in '{}'", output.trim())))?;
    let part = |i: usize| caps.get(i).map_or("0", |m| m.as_str());
    let text = format!("{}.{}.{}", part(1), part(2), part(3));
    Version::parse(&text).map_err(|e| BackendError::parse(format!("{text}: {e}")))
}

/// `(key=None OR key=<value>) AND ...` over `keys`; unset values render as `None`.
pub fn platform_query(settings: &Settings, keys: &[&str]) -> String {
    keys.iter()
        .map(|key| {
            let value = settings.get(*key).map_or("None", String::as_str);
            format!("({key}=None OR {key}={value})")
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Normalize the `default_options` attribute of a recipe.
///
/// Recipes declare it as a map, a single `name=value` string, or a list of
/// such strings. Values are rendered the way Conan prints them, so booleans
/// become `True`/`False`.
pub fn resolve_default_options(raw: &Value) -> Options {
    let mut options = Options::new();
    match raw {
        Value::Object(map) => {
            for (key, value) in map {
                options.insert(key.clone(), option_value(value));
            }
        }
        Value::String(s) => {
            for line in s.lines() {
                insert_assignment(&mut options, line);
            }
        }
        Value::Array(items) => {
            for item in items.iter().filter_map(Value::as_str) {
                insert_assignment(&mut options, item);
            }
        }
        _ => {}
    }
    options
}

fn insert_assignment(options: &mut Options, text: &str) {
    if let Some((key, value)) = text.split_once('=') {
        options.insert(key.trim().to_string(), value.trim().to_string());
    }
}

fn option_value(value: &Value) -> String {
    match value {
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Null => "None".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// String map out of a JSON object, skipping nested values.
pub(crate) fn string_map(value: Option<&Value>) -> std::collections::BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter(|(_, v)| !v.is_object() && !v.is_array())
                .map(|(k, v)| (k.clone(), option_value(v)))
                .collect()
        })
        .unwrap_or_default()
}

/// `-s`/`-o` style arguments.
pub(crate) fn push_pairs(args: &mut Vec<String>, flag: &str, pairs: Vec<String>) {
    for pair in pairs {
        args.push(flag.to_string());
        args.push(pair);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_version() {
        assert_eq!(
            parse_version("Conan version 2.0.14\n").unwrap(),
            Version::new(2, 0, 14)
        );
        assert_eq!(parse_version("Conan version 1.62").unwrap(), Version::new(1, 62, 0));
        assert!(parse_version("command not found").is_err());
    }

    #[test]
    fn test_unsupported_version() {
        struct Never;
        impl CommandRunner for Never {
            fn run(&self, _args: &[String]) -> Result<CommandOutput, BackendError> {
                unreachable!()
            }
        }
        let err = from_version(Version::new(3, 0, 0), Box::new(Never)).err().unwrap();
        assert!(matches!(err, BackendError::UnsupportedVersion(v) if v == "3.0.0"));
        let v2 = from_version(Version::new(2, 1, 0), Box::new(Never)).unwrap();
        assert_eq!(v2.cache_file_name(), "cacheV2.json");
    }

    #[test]
    fn test_platform_query() {
        let mut settings = Settings::new();
        settings.insert("os".into(), "Linux".into());
        settings.insert("arch".into(), "x86_64".into());
        assert_eq!(
            platform_query(&settings, &["arch", "os"]),
            "(arch=None OR arch=x86_64) AND (os=None OR os=Linux)"
        );
        assert_eq!(
            platform_query(&Settings::new(), &["os_build"]),
            "(os_build=None OR os_build=None)"
        );
    }

    #[test]
    fn test_resolve_default_options_forms() {
        let from_map = resolve_default_options(&json!({"shared": false, "fPIC": true, "level": 3}));
        assert_eq!(from_map["shared"], "False");
        assert_eq!(from_map["fPIC"], "True");
        assert_eq!(from_map["level"], "3");

        let from_str = resolve_default_options(&json!("shared=False"));
        assert_eq!(from_str["shared"], "False");

        let from_list = resolve_default_options(&json!(["shared=True", "fPIC=False"]));
        assert_eq!(from_list.len(), 2);
        assert_eq!(from_list["shared"], "True");

        assert!(resolve_default_options(&Value::Null).is_empty());
    }
}
