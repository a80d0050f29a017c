//! The unified Conan API.
//!
//! [`ConanApi`] offers one operation set over whichever backend was
//! detected and implements package resolution on top of it. It never
//! returns an error: backend failures are logged and answered with an empty
//! value (`None`, an empty list or an empty map).

pub mod matching;

use crate::backend::{ConanBackend, InstallRequest};
use crate::cache::InfoCache;
use crate::config::Config;
use conan_schema::{
    BinaryReference, Options, PackageId, PackageInfo, PackageReference, Remote, Settings,
    build_profile_name_alias, key_value_pairs, remotes_from_same_server,
};
use semver::Version;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result of a successful install or lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    /// Id Conan actually installed.
    pub package_id: PackageId,
    /// Package folder in the local cache.
    pub path: PathBuf,
}

/// Facade over one [`ConanBackend`] plus the shared [`InfoCache`].
pub struct ConanApi {
    backend: Arc<dyn ConanBackend>,
    cache: Arc<InfoCache>,
    search_local_versions: bool,
}

impl fmt::Debug for ConanApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConanApi")
            .field("version", self.backend.version())
            .field("cache", &self.cache.file())
            .field("search_local_versions", &self.search_local_versions)
            .finish()
    }
}

impl ConanApi {
    /// Build the facade and prime the info cache with every local recipe.
    pub fn new(backend: Arc<dyn ConanBackend>, config: &Config) -> Self {
        let cache = Arc::new(InfoCache::new(
            &config.cache_dir(),
            backend.cache_file_name(),
            Vec::new(),
        ));
        if config.read_only_cache {
            cache.set_read_only(true);
        }
        let api = Self {
            backend,
            cache,
            search_local_versions: config.search_local_versions,
        };
        api.init_api();
        api
    }

    /// Clear stale locks and reload the local recipes into the info cache.
    ///
    /// Safe to call again whenever the local cache changed behind our back.
    pub fn init_api(&self) {
        if let Err(e) = self.backend.remove_locks() {
            tracing::warn!("Can't remove Conan cache locks: {e}");
        }
        self.cache.set_local_refs(self.get_all_local_refs());
        tracing::debug!("Initialized Conan {} API wrapper", self.backend.version());
    }

    /// Version of the detected Conan installation.
    pub fn version(&self) -> &Version {
        self.backend.version()
    }

    /// The info cache shared with the worker.
    pub fn info_cache(&self) -> &Arc<InfoCache> {
        &self.cache
    }

    // Remotes

    /// Configured remotes in configuration order.
    pub fn get_remotes(&self, include_disabled: bool) -> Vec<Remote> {
        self.backend
            .remotes(include_disabled)
            .unwrap_or_else(|e| {
                tracing::error!("Error while reading remotes: {e}");
                Vec::new()
            })
    }

    /// `(user_name, authenticated)` of a remote.
    pub fn get_remote_user_info(&self, remote: &str) -> (String, bool) {
        match self.backend.remote_user_info(remote) {
            Ok(auth) => (auth.user_name, auth.authenticated),
            Err(e) => {
                tracing::error!("Can't get remote {remote} user info: {e}");
                (String::new(), false)
            }
        }
    }

    /// Remotes hosted on the same server as `remote`, itself included.
    pub fn get_remotes_from_same_server(&self, remote: &Remote) -> Vec<Remote> {
        remotes_from_same_server(&self.get_remotes(true), remote)
    }

    // Profiles

    /// Names of all profiles.
    pub fn get_profiles(&self) -> Vec<String> {
        self.backend.profiles().unwrap_or_else(|e| {
            tracing::error!("Can't list profiles: {e}");
            Vec::new()
        })
    }

    /// Settings of one profile; empty if it can't be read.
    pub fn get_profile_settings(&self, profile: &str) -> Settings {
        self.backend.profile_settings(profile).unwrap_or_else(|e| {
            tracing::error!("Can't get profile {profile} settings: {e}");
            Settings::new()
        })
    }

    /// Every profile with its settings.
    pub fn get_profiles_with_settings(&self) -> BTreeMap<String, Settings> {
        self.get_profiles()
            .into_iter()
            .map(|profile| {
                let settings = self.get_profile_settings(&profile);
                (profile, settings)
            })
            .collect()
    }

    /// Host settings of the default profile.
    pub fn get_default_settings(&self) -> Settings {
        self.backend.default_settings().unwrap_or_else(|e| {
            tracing::error!("Can't read the default profile: {e}");
            Settings::new()
        })
    }

    // Local packages

    /// Every recipe in the local cache.
    pub fn get_all_local_refs(&self) -> Vec<PackageReference> {
        self.backend.local_refs().unwrap_or_else(|e| {
            tracing::error!("Can't list local recipes: {e}");
            Vec::new()
        })
    }

    /// Installed binaries of `reference`.
    pub fn get_local_pkgs_from_ref(&self, reference: &PackageReference) -> Vec<PackageInfo> {
        self.backend.local_packages(reference).unwrap_or_else(|e| {
            tracing::debug!("Error while getting packages for recipe {reference}: {e}");
            Vec::new()
        })
    }

    /// Installed binary with exactly this id.
    pub fn get_local_pkg_from_id(&self, binary: &BinaryReference) -> Option<PackageInfo> {
        self.get_local_pkgs_from_ref(&binary.reference)
            .into_iter()
            .find(|pkg| pkg.id == binary.package_id)
    }

    /// The local package of `reference` installed at `path`.
    pub fn get_local_pkg_from_path(&self, reference: &PackageReference, path: &Path) -> Option<PackageInfo> {
        self.get_local_pkgs_from_ref(reference)
            .into_iter()
            .find(|pkg| self.get_package_folder(reference, &pkg.id).as_deref() == Some(path))
    }

    /// Folder a binary is (or would be) installed to.
    pub fn get_package_folder(&self, reference: &PackageReference, package_id: &str) -> Option<PathBuf> {
        self.backend
            .package_folder(reference, package_id)
            .unwrap_or_else(|e| {
                tracing::debug!("Can't get package folder of {reference}:{package_id}: {e}");
                None
            })
    }

    // Remote packages

    /// Binary packages of `reference` on `remote` (`None` = local cache),
    /// optionally filtered by a package query.
    pub fn get_remote_pkgs_from_ref(
        &self,
        reference: &PackageReference,
        remote: Option<&str>,
        query: Option<&str>,
    ) -> Vec<PackageInfo> {
        match self.backend.remote_packages(reference, remote, query) {
            Ok(pkgs) => {
                tracing::debug!("Found {} packages of {reference}", pkgs.len());
                pkgs
            }
            Err(e) => {
                tracing::debug!("No packages of {reference} in {}: {e}", remote.unwrap_or("local cache"));
                Vec::new()
            }
        }
    }

    /// First package with the given id on any enabled remote.
    pub fn get_remote_pkg_from_id(&self, binary: &BinaryReference) -> Option<PackageInfo> {
        self.get_remotes(false).into_iter().find_map(|remote| {
            self.get_remote_pkgs_from_ref(&binary.reference, Some(&remote.name), None)
                .into_iter()
                .find(|pkg| pkg.id == binary.package_id)
        })
    }

    /// Recipes matching `pattern` on `remote_name`, or on every enabled remote
    /// for `"all"`. Sorted, unique, and merged into the info cache.
    pub fn search_recipes_in_remotes(&self, pattern: &str, remote_name: &str) -> Vec<PackageReference> {
        let remotes: Vec<String> = if remote_name == "all" {
            self.get_remotes(false).into_iter().map(|r| r.name).collect()
        } else {
            vec![remote_name.to_string()]
        };

        let mut found = Vec::new();
        for remote in &remotes {
            match self.backend.search_recipes(pattern, Some(remote)) {
                Ok(refs) => found.extend(refs),
                Err(e) => tracing::error!("Error while searching for recipe in {remote}: {e}"),
            }
        }
        found.sort();
        found.dedup();
        if !found.is_empty() {
            self.cache.update_remote_package_list(&found, false);
        }
        found
    }

    /// Every version, user and channel of `reference`'s recipe on all
    /// remotes (and the local cache when configured).
    pub fn search_recipe_alternatives_in_remotes(&self, reference: &PackageReference) -> Vec<PackageReference> {
        let pattern = self.backend.alternatives_pattern(reference.name());
        let mut found = Vec::new();
        for remote in self.get_remotes(false) {
            match self.backend.search_recipes(&pattern, Some(&remote.name)) {
                Ok(refs) => found.extend(refs),
                Err(e) => tracing::warn!("Can't search {} in {}: {e}", reference.name(), remote.name),
            }
        }
        if self.search_local_versions {
            match self.backend.search_recipes(&pattern, None) {
                Ok(refs) => found.extend(refs),
                Err(e) => tracing::warn!("Can't search {} in the local cache: {e}", reference.name()),
            }
        }
        found.sort();
        found.dedup();
        if !found.is_empty() {
            self.cache.update_remote_package_list(&found, false);
        }
        found
    }

    // Matching

    /// Packages of `reference` that best fit the default profile and
    /// `options`, searched in `remote` or the local cache for `None`.
    pub fn find_best_matching_packages(
        &self,
        reference: &PackageReference,
        options: &Options,
        remote: Option<&str>,
    ) -> Vec<PackageInfo> {
        if reference.is_invalid() {
            return Vec::new();
        }
        let default_settings = self.get_default_settings();
        let query = self.backend.package_query(&default_settings);
        let candidates = self.get_remote_pkgs_from_ref(reference, remote, Some(&query));
        if candidates.is_empty() {
            return candidates;
        }
        matching::best_matches(candidates, options, &default_settings, || {
            self.get_options_with_default_values(reference)
        })
    }

    /// Best local match plus its folder, remembered in the info cache.
    fn local_best_match(
        &self,
        reference: &PackageReference,
        options: &Options,
    ) -> Option<(PackageInfo, Option<PathBuf>)> {
        let mut packages = self.find_best_matching_packages(reference, options, None);
        if packages.is_empty() {
            return None;
        }
        let package = packages.swap_remove(0);
        if !packages.is_empty() {
            tracing::warn!(
                "Multiple matching packages found for '{reference}'! Choosing this: {} ({})",
                package.id,
                build_profile_name_alias(&package.settings)
            );
        }
        let folder = self
            .get_package_folder(reference, &package.id)
            .filter(|f| f.exists());
        if let Some(folder) = &folder {
            self.cache.update_local_package_path(reference, folder);
        }
        Some((package, folder))
    }

    /// Best match among installed binaries.
    pub fn find_best_matching_local_package(
        &self,
        reference: &PackageReference,
        options: &Options,
    ) -> Option<PackageInfo> {
        self.local_best_match(reference, options).map(|(pkg, _)| pkg)
    }

    /// Best installed match whose folder exists.
    pub fn get_best_matching_local_package_path(
        &self,
        reference: &PackageReference,
        options: &Options,
    ) -> Option<InstalledPackage> {
        match self.local_best_match(reference, options) {
            Some((package, Some(path))) => Some(InstalledPackage {
                package_id: package.id,
                path,
            }),
            _ => {
                tracing::info!("No matching packages found for {reference}");
                None
            }
        }
    }

    /// Best matches on the first enabled remote that has any.
    pub fn find_best_matching_package_in_remotes(
        &self,
        reference: &PackageReference,
        options: &Options,
    ) -> Vec<PackageInfo> {
        for remote in self.get_remotes(false) {
            let packages = self.find_best_matching_packages(reference, options, Some(&remote.name));
            if !packages.is_empty() {
                return packages;
            }
        }
        tracing::info!("Can't find a package for '{reference}' matching the current profile in any remote");
        Vec::new()
    }

    /// Recipe default options. Any failure means "no defaults".
    pub fn get_options_with_default_values(&self, reference: &PackageReference) -> Options {
        self.backend
            .inspect_default_options(reference)
            .unwrap_or_else(|e| {
                tracing::debug!("Error while getting default options for {reference}: {e}");
                Options::new()
            })
    }

    // Install

    /// Install one exact configuration and remember its folder.
    pub fn install_reference(
        &self,
        reference: &PackageReference,
        settings: &Settings,
        options: &Options,
        profile: &str,
        update: bool,
    ) -> Option<InstalledPackage> {
        tracing::info!(
            "Installing '{reference}' with profile: {profile}, settings: {:?}, options: {:?} and update={update}",
            key_value_pairs(settings),
            key_value_pairs(options)
        );
        let request = InstallRequest {
            reference,
            settings,
            options,
            profile,
            update,
        };
        let package_id = match self.backend.install(&request) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("Can't install reference '{reference}': {e}");
                return None;
            }
        };
        let Some(path) = self.get_package_folder(reference, &package_id) else {
            tracing::error!("Installed {reference}:{package_id}, but can't find its package folder");
            return None;
        };
        tracing::info!("Installation of '{reference}' finished");
        self.cache.update_local_package_path(reference, &path);
        Some(InstalledPackage { package_id, path })
    }

    /// Install a previously discovered package configuration.
    pub fn install_package(
        &self,
        reference: &PackageReference,
        package: &PackageInfo,
        update: bool,
    ) -> Option<InstalledPackage> {
        tracing::info!("Installing '{reference}':{} with settings and options of\n{}", package.id, package.pretty());
        let installed = self.install_reference(reference, &package.settings, &package.options, "", update)?;
        if installed.package_id != package.id {
            tracing::warn!(
                "Installed {} instead of selected {}. This can happen if transitive settings \
                 changed since the package was built.",
                installed.package_id,
                package.id
            );
        }
        Some(installed)
    }

    /// Install the best remote match.
    ///
    /// Forgets `reference` in the remote part of the info cache when no
    /// remote has a matching package.
    pub fn install_best_matching_package(
        &self,
        reference: &PackageReference,
        options: &Options,
        update: bool,
    ) -> Option<InstalledPackage> {
        let packages = self.find_best_matching_package_in_remotes(reference, options);
        let Some(package) = packages.first() else {
            self.cache.invalidate_remote_package(reference);
            return None;
        };
        self.install_package(reference, package, update)
            .filter(|installed| installed.path.exists())
    }

    /// Local best match, installing the best remote match if there is none
    /// (or always, with `update`).
    pub fn get_path_or_auto_install(
        &self,
        reference: &PackageReference,
        options: &Options,
        update: bool,
    ) -> Option<InstalledPackage> {
        if !update {
            let local = self.get_best_matching_local_package_path(reference, options);
            if local.is_some() {
                return local;
            }
        }
        self.install_best_matching_package(reference, options, update)
    }
}
