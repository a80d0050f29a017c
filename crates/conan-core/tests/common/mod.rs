//! In-memory backend for facade and worker tests.

#![allow(dead_code)]

use conan_core::backend::{ConanBackend, InstallRequest};
use conan_core::{BackendError, Config, ConanApi};
use conan_schema::{Options, PackageId, PackageInfo, PackageReference, Remote, RemoteAuth, Settings};
use semver::Version;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub fn r(s: &str) -> PackageReference {
    PackageReference::parse(s).unwrap()
}

pub fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

pub fn pkg(id: &str, settings: &[(&str, &str)], options: &[(&str, &str)]) -> PackageInfo {
    let mut p = PackageInfo::new(id);
    p.settings = map(settings);
    p.options = map(options);
    p
}

pub struct FakeBackend {
    pub root: PathBuf,
    pub default_settings: Settings,
    pub default_options: Options,
    pub remotes: Vec<Remote>,
    /// (remote, canonical ref) -> packages
    pub remote_packages: BTreeMap<(String, String), Vec<PackageInfo>>,
    /// canonical ref -> packages
    pub local_packages: Mutex<BTreeMap<String, Vec<PackageInfo>>>,
    /// remote (or "" for the local cache) -> recipes
    pub recipes: BTreeMap<String, Vec<PackageReference>>,
    pub install_delay: Duration,
    pub fail_remotes: bool,
    pub queries: Mutex<Vec<(Option<String>, Option<String>)>>,
    pub installs: Mutex<Vec<String>>,
    pub inspections: AtomicUsize,
}

impl FakeBackend {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            default_settings: map(&[
                ("os", "Linux"),
                ("arch", "x86_64"),
                ("compiler", "gcc"),
                ("compiler.version", "12"),
                ("build_type", "Release"),
            ]),
            default_options: Options::new(),
            remotes: vec![Remote::new("conancenter", "https://center.conan.io")],
            remote_packages: BTreeMap::new(),
            local_packages: Mutex::new(BTreeMap::new()),
            recipes: BTreeMap::new(),
            install_delay: Duration::ZERO,
            fail_remotes: false,
            queries: Mutex::new(Vec::new()),
            installs: Mutex::new(Vec::new()),
            inspections: AtomicUsize::new(0),
        }
    }

    pub fn with_remote(mut self, name: &str, url: &str) -> Self {
        self.remotes.push(Remote::new(name, url));
        self
    }

    pub fn with_remote_packages(mut self, remote: &str, reference: &str, pkgs: Vec<PackageInfo>) -> Self {
        self.remote_packages
            .insert((remote.to_string(), r(reference).canonical()), pkgs);
        self
    }

    pub fn with_local_packages(self, reference: &str, pkgs: Vec<PackageInfo>) -> Self {
        self.local_packages
            .lock()
            .unwrap()
            .insert(r(reference).canonical(), pkgs);
        self
    }

    pub fn with_recipes(mut self, remote: &str, refs: &[&str]) -> Self {
        self.recipes
            .insert(remote.to_string(), refs.iter().map(|s| r(s)).collect());
        self
    }

    pub fn folder(&self, reference: &PackageReference, id: &str) -> PathBuf {
        self.root.join(reference.name()).join(reference.version()).join(id)
    }

    pub fn installs(&self) -> Vec<String> {
        self.installs.lock().unwrap().clone()
    }
}

impl ConanBackend for FakeBackend {
    fn version(&self) -> &Version {
        static VERSION: Version = Version::new(2, 0, 14);
        &VERSION
    }

    fn cache_file_name(&self) -> &'static str {
        "cacheV2.json"
    }

    fn remove_locks(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn remotes(&self, include_disabled: bool) -> Result<Vec<Remote>, BackendError> {
        if self.fail_remotes {
            return Err(BackendError::parse("remotes.json is broken"));
        }
        Ok(self
            .remotes
            .iter()
            .filter(|r| include_disabled || !r.disabled)
            .cloned()
            .collect())
    }

    fn remote_user_info(&self, remote: &str) -> Result<RemoteAuth, BackendError> {
        Ok(RemoteAuth {
            user_name: format!("{remote}-user"),
            authenticated: true,
        })
    }

    fn profiles(&self) -> Result<Vec<String>, BackendError> {
        Ok(vec!["default".to_string(), "windows".to_string()])
    }

    fn profile_settings(&self, profile: &str) -> Result<Settings, BackendError> {
        match profile {
            "default" => Ok(self.default_settings.clone()),
            "windows" => Ok(map(&[("os", "Windows"), ("arch", "x86_64")])),
            _ => Err(BackendError::parse(format!("profile {profile} not found"))),
        }
    }

    fn default_settings(&self) -> Result<Settings, BackendError> {
        Ok(self.default_settings.clone())
    }

    fn local_refs(&self) -> Result<Vec<PackageReference>, BackendError> {
        Ok(self
            .local_packages
            .lock()
            .unwrap()
            .keys()
            .map(|k| r(k))
            .collect())
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
        self.queries
            .lock()
            .unwrap()
            .push((remote.map(str::to_string), query.map(str::to_string)));
        let found = match remote {
            Some(remote) => self
                .remote_packages
                .get(&(remote.to_string(), reference.canonical()))
                .cloned(),
            None => self
                .local_packages
                .lock()
                .unwrap()
                .get(&reference.canonical())
                .cloned(),
        };
        found.ok_or_else(|| BackendError::Remote {
            remote: remote.unwrap_or("local").to_string(),
            message: format!("Recipe '{reference}' not found"),
        })
    }

    fn search_recipes(
        &self,
        pattern: &str,
        remote: Option<&str>,
    ) -> Result<Vec<PackageReference>, BackendError> {
        let prefix = pattern.trim_end_matches('*');
        let refs = self
            .recipes
            .get(remote.unwrap_or(""))
            .ok_or_else(|| BackendError::parse("remote unreachable"))?;
        Ok(refs
            .iter()
            .filter(|r| r.to_string().starts_with(prefix))
            .cloned()
            .collect())
    }

    fn alternatives_pattern(&self, name: &str) -> String {
        format!("{name}/*")
    }

    fn install(&self, request: &InstallRequest<'_>) -> Result<PackageId, BackendError> {
        std::thread::sleep(self.install_delay);
        let reference = request.reference;
        let candidates: Vec<&PackageInfo> = self
            .remote_packages
            .iter()
            .filter(|((_, key), _)| *key == reference.canonical())
            .flat_map(|(_, pkgs)| pkgs)
            .collect();
        let chosen = candidates
            .iter()
            .find(|p| p.settings == *request.settings && p.options == *request.options)
            .or_else(|| candidates.first())
            .ok_or_else(|| BackendError::CommandFailed {
                command: format!("install --requires={reference}"),
                status: "exit code 1".to_string(),
                stderr: format!("ERROR: Package '{reference}' not resolved"),
            })?;

        std::fs::create_dir_all(self.folder(reference, &chosen.id))?;
        self.installs.lock().unwrap().push(reference.canonical());
        self.local_packages
            .lock()
            .unwrap()
            .entry(reference.canonical())
            .or_default()
            .push((*chosen).clone());
        Ok(chosen.id.clone())
    }

    fn package_folder(
        &self,
        reference: &PackageReference,
        package_id: &str,
    ) -> Result<Option<PathBuf>, BackendError> {
        if package_id.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.folder(reference, package_id)))
    }

    fn inspect_default_options(&self, reference: &PackageReference) -> Result<Options, BackendError> {
        self.inspections.fetch_add(1, Ordering::SeqCst);
        if self.default_options.is_empty() {
            return Err(BackendError::parse(format!("{reference}: recipe raised")));
        }
        Ok(self.default_options.clone())
    }
}

/// Facade over `backend` with its info cache in a fresh temp dir.
pub struct Harness {
    pub dir: TempDir,
    pub backend: Arc<FakeBackend>,
    pub api: Arc<ConanApi>,
}

pub fn config_in(dir: &Path) -> Config {
    Config {
        cache_dir: Some(dir.join("cache")),
        ..Config::default()
    }
}

impl Harness {
    pub fn new(build: impl FnOnce(FakeBackend) -> FakeBackend) -> Self {
        Self::with_config(build, |c| c)
    }

    pub fn with_config(
        build: impl FnOnce(FakeBackend) -> FakeBackend,
        configure: impl FnOnce(Config) -> Config,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(build(FakeBackend::new(&dir.path().join("packages"))));
        let config = configure(config_in(dir.path()));
        let api = Arc::new(ConanApi::new(backend.clone(), &config));
        Self { dir, backend, api }
    }
}
