//! Conan 1.x backend.
//!
//! Conan 1 has no JSON on stdout: commands that support it write a report
//! to the file named by `--json`, everything else is parsed from text.

use super::{
    CommandRunner, ConanBackend, InstallRequest, platform_query, push_pairs,
    resolve_default_options, string_map,
};
use crate::error::BackendError;
use conan_schema::{
    Options, PLACEHOLDER, PackageId, PackageInfo, PackageReference, Remote, RemoteAuth, Settings,
    key_value_pairs,
};
use semver::Version;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Drives a Conan 1 installation.
pub struct ConanV1 {
    version: Version,
    runner: Box<dyn CommandRunner>,
    storage_path: OnceLock<PathBuf>,
}

impl ConanV1 {
    pub fn new(version: Version, runner: Box<dyn CommandRunner>) -> Self {
        Self {
            version,
            runner,
            storage_path: OnceLock::new(),
        }
    }

    /// Run a command with `--json <file>` and parse the report.
    fn json(&self, mut args: Vec<String>) -> Result<Value, BackendError> {
        let dir = tempfile::tempdir()?;
        let report = dir.path().join("report.json");
        args.push("--json".to_string());
        args.push(report.to_string_lossy().into_owned());
        self.runner.run_ok(&args)?;
        let content = std::fs::read_to_string(&report)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn text(&self, args: &[&str]) -> Result<String, BackendError> {
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        self.runner.run_ok(&args)
    }

    fn storage_path(&self) -> Result<PathBuf, BackendError> {
        if let Some(path) = self.storage_path.get() {
            return Ok(path.clone());
        }
        let path = PathBuf::from(self.text(&["config", "get", "storage.path"])?.trim());
        Ok(self.storage_path.get_or_init(|| path).clone())
    }
}

/// Conan 1 needs a trailing `@` on references without user/channel.
fn cli_ref(reference: &PackageReference) -> String {
    if reference.user().is_some() {
        reference.to_string()
    } else {
        format!("{reference}@")
    }
}

/// `results[].items[]` of a search report.
fn search_items(report: &Value) -> impl Iterator<Item = &Value> {
    report
        .get("results")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|result| result.get("items").and_then(Value::as_array))
        .flatten()
}

fn recipe_id(item: &Value) -> Option<PackageReference> {
    let id = item.pointer("/recipe/id").and_then(Value::as_str)?;
    PackageReference::parse(id)
        .inspect_err(|e| tracing::debug!("Skipping recipe '{id}': {e}"))
        .ok()
}

fn package_info(pkg: &Value) -> Option<PackageInfo> {
    Some(PackageInfo {
        id: pkg.get("id").and_then(Value::as_str)?.to_string(),
        options: string_map(pkg.get("options")),
        settings: string_map(pkg.get("settings")),
        requires: pkg
            .get("requires")
            .and_then(Value::as_array)
            .map(|reqs| {
                reqs.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        outdated: pkg.get("outdated").and_then(Value::as_bool).unwrap_or(false),
    })
}

/// `[settings]` section of `conan profile show` output.
fn parse_profile_settings(text: &str) -> Settings {
    let mut settings = Settings::new();
    let mut in_settings = false;
    for line in text.lines().map(str::trim) {
        if line.starts_with('[') {
            in_settings = line == "[settings]";
            continue;
        }
        if !in_settings {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            settings.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    settings
}

/// `conan remote list --raw`: `name url verify_ssl [disabled]` per line.
fn parse_remotes(text: &str) -> Vec<Remote> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            let url = fields.next()?;
            let verify_ssl = fields.next().is_none_or(|v| v.eq_ignore_ascii_case("true"));
            let disabled = fields.next().is_some_and(|v| v.eq_ignore_ascii_case("true"));
            Some(Remote {
                name: name.to_string(),
                url: url.to_string(),
                verify_ssl,
                disabled,
                auth: None,
            })
        })
        .collect()
}

impl ConanBackend for ConanV1 {
    fn version(&self) -> &Version {
        &self.version
    }

    fn cache_file_name(&self) -> &'static str {
        "cache.json"
    }

    fn remove_locks(&self) -> Result<(), BackendError> {
        self.text(&["remove", "--locks"])?;
        tracing::info!("Removed Conan cache locks.");
        Ok(())
    }

    fn remotes(&self, include_disabled: bool) -> Result<Vec<Remote>, BackendError> {
        let text = self.text(&["remote", "list", "--raw"])?;
        Ok(parse_remotes(&text)
            .into_iter()
            .filter(|r| include_disabled || !r.disabled)
            .collect())
    }

    fn remote_user_info(&self, remote: &str) -> Result<RemoteAuth, BackendError> {
        let report = self.json(vec!["user".into(), "-r".into(), remote.into()])?;
        report
            .get("remotes")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .find(|r| r.get("name").and_then(Value::as_str) == Some(remote))
            .map(|r| RemoteAuth {
                user_name: r
                    .get("user_name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                authenticated: r.get("authenticated").and_then(Value::as_bool).unwrap_or(false),
            })
            .ok_or_else(|| BackendError::Remote {
                remote: remote.to_string(),
                message: "not configured".to_string(),
            })
    }

    fn profiles(&self) -> Result<Vec<String>, BackendError> {
        let text = self.text(&["profile", "list"])?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with("No profiles"))
            .map(str::to_string)
            .collect())
    }

    fn profile_settings(&self, profile: &str) -> Result<Settings, BackendError> {
        Ok(parse_profile_settings(&self.text(&["profile", "show", profile])?))
    }

    fn default_settings(&self) -> Result<Settings, BackendError> {
        self.profile_settings("default")
    }

    fn local_refs(&self) -> Result<Vec<PackageReference>, BackendError> {
        let report = self.json(vec!["search".into()])?;
        Ok(search_items(&report).filter_map(recipe_id).collect())
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
        let mut args = vec!["search".to_string(), cli_ref(reference)];
        if let Some(query) = query {
            args.extend(["-q".to_string(), query.to_string()]);
        }
        if let Some(remote) = remote {
            args.extend(["-r".to_string(), remote.to_string()]);
        }
        let report = self.json(args)?;
        Ok(search_items(&report)
            .find(|item| recipe_id(item).is_some_and(|r| &r == reference))
            .and_then(|item| item.get("packages").and_then(Value::as_array))
            .map(|pkgs| pkgs.iter().filter_map(package_info).collect())
            .unwrap_or_default())
    }

    fn search_recipes(
        &self,
        pattern: &str,
        remote: Option<&str>,
    ) -> Result<Vec<PackageReference>, BackendError> {
        let mut args = vec!["search".to_string(), pattern.to_string()];
        if let Some(remote) = remote {
            args.extend(["-r".to_string(), remote.to_string()]);
        }
        let report = self.json(args)?;
        Ok(search_items(&report).filter_map(recipe_id).collect())
    }

    fn alternatives_pattern(&self, name: &str) -> String {
        format!("{name}/*@*/*")
    }

    fn install(&self, request: &InstallRequest<'_>) -> Result<PackageId, BackendError> {
        let reference = request.reference;
        // keeps generated conaninfo/conanbuildinfo files out of the working directory
        let install_folder = tempfile::tempdir()?;
        let mut args = vec![
            "install".to_string(),
            cli_ref(reference),
            "-if".to_string(),
            install_folder.path().to_string_lossy().into_owned(),
        ];
        if !request.profile.is_empty() {
            args.extend(["-pr".to_string(), request.profile.to_string()]);
        }
        push_pairs(&mut args, "-s", key_value_pairs(request.settings));
        let scoped_options = key_value_pairs(request.options)
            .into_iter()
            .map(|pair| format!("{}:{pair}", reference.name()))
            .collect();
        push_pairs(&mut args, "-o", scoped_options);
        if request.update {
            args.push("--update".to_string());
        }

        let report = self.json(args)?;
        report
            .get("installed")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .find(|entry| recipe_id(entry).is_some_and(|r| &r == reference))
            .and_then(|entry| entry.pointer("/packages/0/id").and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| {
                BackendError::parse(format!("{reference} missing from the install report"))
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
        Ok(Some(
            self.storage_path()?
                .join(reference.name())
                .join(reference.version())
                .join(reference.user().unwrap_or(PLACEHOLDER))
                .join(reference.channel().unwrap_or(PLACEHOLDER))
                .join("package")
                .join(package_id),
        ))
    }

    fn inspect_default_options(&self, reference: &PackageReference) -> Result<Options, BackendError> {
        let report = self.json(vec![
            "inspect".into(),
            cli_ref(reference),
            "-a".into(),
            "default_options".into(),
        ])?;
        Ok(report
            .get("default_options")
            .map(resolve_default_options)
            .unwrap_or_default())
    }

    fn package_query(&self, default_settings: &Settings) -> String {
        platform_query(default_settings, &["arch", "os", "arch_build", "os_build"])
    }
}
