//! Conan 2.x backend.
//!
//! Every command is run with `--format=json` and parsed from stdout. List
//! and search results are keyed by origin: `"Local Cache"` or the remote name.

use super::{CommandRunner, ConanBackend, InstallRequest, push_pairs, resolve_default_options, string_map};
use crate::error::BackendError;
use conan_schema::{
    Options, PackageId, PackageInfo, PackageReference, Remote, RemoteAuth, Settings, key_value_pairs,
};
use semver::Version;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;

const LOCAL_CACHE: &str = "Local Cache";

#[derive(Debug, Deserialize)]
struct RemoteEntry {
    name: String,
    url: String,
    #[serde(default = "default_true")]
    verify_ssl: bool,
    #[serde(default = "default_true")]
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct UserEntry {
    name: String,
    #[serde(default)]
    user_name: Option<String>,
    #[serde(default)]
    authenticated: bool,
}

fn default_true() -> bool {
    true
}

/// Drives a Conan 2 installation.
pub struct ConanV2 {
    version: Version,
    runner: Box<dyn CommandRunner>,
}

impl ConanV2 {
    pub fn new(version: Version, runner: Box<dyn CommandRunner>) -> Self {
        Self { version, runner }
    }

    fn json(&self, args: &[&str]) -> Result<Value, BackendError> {
        let mut args: Vec<String> = args.iter().map(ToString::to_string).collect();
        args.push("--format=json".to_string());
        let stdout = self.runner.run_ok(&args)?;
        Ok(serde_json::from_str(&stdout)?)
    }

    fn settings_of_profile(&self, args: &[&str]) -> Result<Settings, BackendError> {
        let value = self.json(args)?;
        Ok(string_map(value.pointer("/host/settings")))
    }

    /// Recipe folder in the local cache, downloading the recipe from the
    /// first remote that has it when it is not cached yet.
    fn recipe_folder(&self, reference: &PackageReference) -> Result<PathBuf, BackendError> {
        let target = reference.to_string();
        if let Ok(path) = self.runner.run_ok(&["cache".into(), "path".into(), target.clone()]) {
            return Ok(PathBuf::from(path.trim()));
        }
        for remote in self.remotes(false)? {
            let download = [
                "download".to_string(),
                target.clone(),
                "-r".to_string(),
                remote.name.clone(),
                "--only-recipe".to_string(),
            ];
            if self.runner.run_ok(&download).is_ok() {
                tracing::debug!("Downloaded recipe {target} from {}", remote.name);
                break;
            }
        }
        let path = self.runner.run_ok(&["cache".into(), "path".into(), target])?;
        Ok(PathBuf::from(path.trim()))
    }
}

/// Results of one origin, failing if Conan reported an error for it.
fn origin_results<'a>(value: &'a Value, origin: &str) -> Result<&'a Map<String, Value>, BackendError> {
    let Some(entry) = value.get(origin) else {
        return Err(BackendError::parse(format!("no results for '{origin}'")));
    };
    if let Some(message) = entry.get("error").and_then(Value::as_str) {
        return Err(BackendError::Remote {
            remote: origin.to_string(),
            message: message.to_string(),
        });
    }
    entry
        .as_object()
        .ok_or_else(|| BackendError::parse(format!("results for '{origin}' are not an object")))
}

fn refs_of(results: &Map<String, Value>) -> Vec<PackageReference> {
    results
        .keys()
        .filter_map(|key| {
            PackageReference::parse(key)
                .inspect_err(|e| tracing::debug!("Skipping recipe '{key}': {e}"))
                .ok()
        })
        .collect()
}

/// Packages of the newest revision in a `conan list ref:*` entry.
fn packages_of(recipe: &Value) -> Vec<PackageInfo> {
    let Some(revisions) = recipe.get("revisions").and_then(Value::as_object) else {
        return Vec::new();
    };
    let timestamp = |rev: &Value| rev.get("timestamp").and_then(Value::as_f64).unwrap_or(0.0);
    let Some(latest) = revisions
        .values()
        .max_by(|a, b| timestamp(a).total_cmp(&timestamp(b)))
    else {
        return Vec::new();
    };

    latest
        .get("packages")
        .and_then(Value::as_object)
        .map(|packages| {
            packages
                .iter()
                .map(|(id, pkg)| {
                    let info = pkg.get("info");
                    PackageInfo {
                        id: id.clone(),
                        options: string_map(info.and_then(|i| i.get("options"))),
                        settings: string_map(info.and_then(|i| i.get("settings"))),
                        requires: info
                            .and_then(|i| i.get("requires"))
                            .and_then(Value::as_array)
                            .map(|reqs| {
                                reqs.iter()
                                    .filter_map(Value::as_str)
                                    .map(str::to_string)
                                    .collect()
                            })
                            .unwrap_or_default(),
                        outdated: false,
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

impl ConanBackend for ConanV2 {
    fn version(&self) -> &Version {
        &self.version
    }

    fn cache_file_name(&self) -> &'static str {
        "cacheV2.json"
    }

    fn remove_locks(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn remotes(&self, include_disabled: bool) -> Result<Vec<Remote>, BackendError> {
        let entries: Vec<RemoteEntry> = serde_json::from_value(self.json(&["remote", "list"])?)?;
        Ok(entries
            .into_iter()
            .filter(|e| include_disabled || e.enabled)
            .map(|e| Remote {
                name: e.name,
                url: e.url,
                verify_ssl: e.verify_ssl,
                disabled: !e.enabled,
                auth: None,
            })
            .collect())
    }

    fn remote_user_info(&self, remote: &str) -> Result<RemoteAuth, BackendError> {
        let users: Vec<UserEntry> =
            serde_json::from_value(self.json(&["remote", "list-users"])?)?;
        users
            .into_iter()
            .find(|u| u.name == remote)
            .map(|u| RemoteAuth {
                user_name: u.user_name.unwrap_or_default(),
                authenticated: u.authenticated,
            })
            .ok_or_else(|| BackendError::Remote {
                remote: remote.to_string(),
                message: "not configured".to_string(),
            })
    }

    fn profiles(&self) -> Result<Vec<String>, BackendError> {
        Ok(serde_json::from_value(self.json(&["profile", "list"])?)?)
    }

    fn profile_settings(&self, profile: &str) -> Result<Settings, BackendError> {
        self.settings_of_profile(&["profile", "show", "-pr:h", profile])
    }

    fn default_settings(&self) -> Result<Settings, BackendError> {
        self.settings_of_profile(&["profile", "show"])
    }

    fn local_refs(&self) -> Result<Vec<PackageReference>, BackendError> {
        let value = self.json(&["list", "*"])?;
        Ok(refs_of(origin_results(&value, LOCAL_CACHE)?))
    }

    fn local_packages(&self, reference: &PackageReference) -> Result<Vec<PackageInfo>, BackendError> {
        self.remote_packages(reference, None, None)
    }

    fn remote_packages(
        &self,
        reference: &PackageReference,
        remote: Option<&str>,
        query: Option<&str>,
    ) -> Result<Vec<PackageInfo>, BackendError> {
        let pattern = format!("{reference}:*");
        let mut args = vec!["list", pattern.as_str()];
        if let Some(remote) = remote {
            args.extend(["-r", remote]);
        }
        if let Some(query) = query {
            args.extend(["-p", query]);
        }
        let value = self.json(&args)?;
        let results = origin_results(&value, remote.unwrap_or(LOCAL_CACHE))?;

        Ok(results
            .iter()
            .find(|(key, _)| PackageReference::parse(key).is_ok_and(|r| &r == reference))
            .map(|(_, recipe)| packages_of(recipe))
            .unwrap_or_default())
    }

    fn search_recipes(
        &self,
        pattern: &str,
        remote: Option<&str>,
    ) -> Result<Vec<PackageReference>, BackendError> {
        let value = match remote {
            Some(remote) => self.json(&["search", pattern, "-r", remote])?,
            None => self.json(&["list", pattern])?,
        };
        Ok(refs_of(origin_results(&value, remote.unwrap_or(LOCAL_CACHE))?))
    }

    fn alternatives_pattern(&self, name: &str) -> String {
        format!("{name}/*")
    }

    fn install(&self, request: &InstallRequest<'_>) -> Result<PackageId, BackendError> {
        let reference = request.reference;
        let mut args = vec![
            "install".to_string(),
            format!("--requires={reference}"),
            "--format=json".to_string(),
        ];
        if !request.profile.is_empty() {
            args.extend(["-pr".to_string(), request.profile.to_string()]);
        }
        push_pairs(&mut args, "-s", key_value_pairs(request.settings));
        let scoped_options = key_value_pairs(request.options)
            .into_iter()
            .map(|pair| format!("{}/*:{pair}", reference.name()))
            .collect();
        push_pairs(&mut args, "-o", scoped_options);
        if request.update {
            args.push("--update".to_string());
        }

        let value: Value = serde_json::from_str(&self.runner.run_ok(&args)?)?;
        value
            .pointer("/graph/nodes")
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(|nodes| nodes.values())
            .find(|node| {
                node.get("ref")
                    .and_then(Value::as_str)
                    .and_then(|r| PackageReference::parse(r).ok())
                    .is_some_and(|r| &r == reference)
            })
            .and_then(|node| node.get("package_id").and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| {
                BackendError::parse(format!("{reference} missing from the installed graph"))
            })
    }

    fn package_folder(
        &self,
        reference: &PackageReference,
        package_id: &str,
    ) -> Result<Option<PathBuf>, BackendError> {
        if package_id.is_empty() {
            return Ok(None);
        }
        let target = format!("{reference}:{package_id}");
        let path = self.runner.run_ok(&["cache".into(), "path".into(), target])?;
        let path = path.trim();
        Ok((!path.is_empty()).then(|| PathBuf::from(path)))
    }

    fn inspect_default_options(&self, reference: &PackageReference) -> Result<Options, BackendError> {
        let conanfile = self.recipe_folder(reference)?.join("conanfile.py");
        let conanfile = conanfile.to_string_lossy();
        let value = self.json(&["inspect", conanfile.as_ref()])?;
        Ok(value
            .get("default_options")
            .map(resolve_default_options)
            .unwrap_or_default())
    }
}
