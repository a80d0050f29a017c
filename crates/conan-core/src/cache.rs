//! On-disk info cache.
//!
//! Remembers where packages were found locally and which
//! version/user/channel combinations remotes offered, so repeated lookups
//! avoid network round trips. The whole state is rewritten on every
//! mutation; the file is small compared to package metadata.
//!
//! File layout:
//!
//! ```json
//! {
//!   "read_only": false,
//!   "remote_packages": { "zlib": { "_": ["1.2.13/_"], "me": ["1.0/stable"] } },
//!   "local_packages": { "zlib/1.2.13@_/_": "/home/me/.conan2/p/zlib1234/p" }
//! }
//! ```

use conan_schema::{PLACEHOLDER, PackageReference};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

/// name -> user -> {"version/channel"}
type RemoteMap = BTreeMap<String, BTreeMap<String, BTreeSet<String>>>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheData {
    #[serde(default)]
    read_only: bool,
    #[serde(default)]
    remote_packages: RemoteMap,
    #[serde(default)]
    local_packages: BTreeMap<String, String>,
}

/// Thread-safe cache shared by the API facade and the worker threads.
#[derive(Debug)]
pub struct InfoCache {
    file: PathBuf,
    data: Mutex<CacheData>,
    local_refs: Mutex<Vec<PackageReference>>,
}

impl InfoCache {
    /// Open (or create) `<cache_dir>/<file_name>`.
    ///
    /// A corrupt file is replaced by an empty cache; this never fails.
    pub fn new(cache_dir: &Path, file_name: &str, local_refs: Vec<PackageReference>) -> Self {
        if let Err(e) = std::fs::create_dir_all(cache_dir) {
            tracing::debug!("InfoCache: can't create {}: {e}", cache_dir.display());
        }
        let file = cache_dir.join(file_name);
        let data = load(&file);
        Self {
            file,
            data: Mutex::new(data),
            local_refs: Mutex::new(local_refs),
        }
    }

    /// Path of the backing JSON file.
    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn is_read_only(&self) -> bool {
        self.lock().read_only
    }

    /// Toggle writing to disk. Read-only caches still update in memory.
    pub fn set_read_only(&self, read_only: bool) {
        let mut data = self.lock();
        data.read_only = read_only;
        self.save(&data);
    }

    /// Cached install folder of `reference`.
    ///
    /// Entries whose folder vanished are evicted on read.
    pub fn get_local_package_path(&self, reference: &PackageReference) -> Option<PathBuf> {
        if reference.is_invalid() {
            return None;
        }
        let key = reference.canonical();
        let mut data = self.lock();
        let path = PathBuf::from(data.local_packages.get(&key)?);
        if path.exists() {
            return Some(path);
        }
        tracing::debug!("InfoCache: {} no longer exists, evicting {key}", path.display());
        data.local_packages.remove(&key);
        self.save(&data);
        None
    }

    /// Remember the install folder of `reference`.
    ///
    /// Folders that are not valid UTF-8 can't be stored in the JSON file and
    /// are skipped.
    pub fn update_local_package_path(&self, reference: &PackageReference, folder: &Path) {
        let Some(value) = folder.to_str() else {
            tracing::warn!("InfoCache: not caching non UTF-8 folder {} of {reference}", folder.display());
            return;
        };
        let key = reference.canonical();
        let mut data = self.lock();
        if data.local_packages.get(&key).map(String::as_str) == Some(value) {
            return;
        }
        data.local_packages.insert(key, value.to_string());
        self.save(&data);
    }

    /// Remote references with the same name and user (`*` = any user).
    pub fn get_similar_remote_pkg_refs(&self, name: &str, user: &str) -> Vec<PackageReference> {
        let user = normalize_user(user);
        let data = self.lock();
        let Some(users) = data.remote_packages.get(name) else {
            return Vec::new();
        };

        users
            .iter()
            .filter(|(u, _)| user == "*" || u.as_str() == user)
            .flat_map(|(u, version_channels)| {
                version_channels
                    .iter()
                    .filter_map(move |vc| ref_from_parts(name, u, vc))
            })
            .collect()
    }

    /// Locally installed references with the same name and user (`*` = any user).
    pub fn get_similar_local_pkg_refs(&self, name: &str, user: &str) -> Vec<PackageReference> {
        let user = normalize_user(user);
        self.local_refs()
            .iter()
            .filter(|r| r.name() == name)
            .filter(|r| user == "*" || r.user_or_placeholder() == user)
            .cloned()
            .collect()
    }

    /// Remote matches followed by local matches.
    pub fn get_similar_pkg_refs(&self, name: &str, user: &str) -> Vec<PackageReference> {
        let mut refs = self.get_similar_remote_pkg_refs(name, user);
        refs.extend(self.get_similar_local_pkg_refs(name, user));
        refs
    }

    /// Every reference discovered on remotes so far.
    pub fn get_all_remote_refs(&self) -> Vec<PackageReference> {
        let data = self.lock();
        data.remote_packages
            .iter()
            .flat_map(|(name, users)| {
                users.iter().flat_map(move |(user, version_channels)| {
                    version_channels
                        .iter()
                        .filter_map(move |vc| ref_from_parts(name, user, vc))
                })
            })
            .collect()
    }

    /// Every locally installed reference known at the last refresh.
    pub fn get_all_local_refs(&self) -> Vec<PackageReference> {
        self.local_refs().clone()
    }

    /// Replace the list of locally installed references.
    pub fn set_local_refs(&self, refs: Vec<PackageReference>) {
        *self.local_refs() = refs;
    }

    /// Cached hits for a `name[/version@user/channel]` query as `(local, remote)`.
    ///
    /// Remote hits match on name and user; local hits match the query as a substring.
    pub fn search(&self, query: &str) -> (BTreeSet<PackageReference>, BTreeSet<PackageReference>) {
        let mut parts = query.split('/');
        let name = parts.next().unwrap_or_default();
        let user = parts
            .next()
            .and_then(|rest| rest.split_once('@'))
            .map_or("*", |(_, user)| user);

        let remote = self
            .get_similar_remote_pkg_refs(name, user)
            .into_iter()
            .collect();
        let local = self
            .local_refs()
            .iter()
            .filter(|r| r.to_string().contains(query) || r.canonical().contains(query))
            .cloned()
            .collect();
        (local, remote)
    }

    /// Forget one version/channel of a remote recipe, e.g. after an install
    /// from a stale remote candidate failed.
    pub fn invalidate_remote_package(&self, reference: &PackageReference) {
        let mut data = self.lock();
        let removed = data
            .remote_packages
            .get_mut(reference.name())
            .and_then(|users| users.get_mut(reference.user_or_placeholder()))
            .is_some_and(|vcs| vcs.remove(&reference.version_channel()));
        if removed {
            tracing::debug!("Invalidated {reference} from remote cache.");
            self.save(&data);
        }
    }

    /// Merge newly discovered remote references. `invalidate` clears the
    /// remote map first.
    pub fn update_remote_package_list(&self, refs: &[PackageReference], invalidate: bool) {
        let mut data = self.lock();
        if invalidate {
            data.remote_packages.clear();
        }
        for r in refs {
            data.remote_packages
                .entry(r.name().to_string())
                .or_default()
                .entry(r.user_or_placeholder().to_string())
                .or_default()
                .insert(r.version_channel());
        }
        self.save(&data);
    }

    fn lock(&self) -> MutexGuard<'_, CacheData> {
        self.data.lock()
    }

    fn local_refs(&self) -> MutexGuard<'_, Vec<PackageReference>> {
        self.local_refs.lock()
    }

    fn save(&self, data: &CacheData) {
        if data.read_only {
            return;
        }
        if let Err(e) = write_atomic(&self.file, data) {
            tracing::debug!("InfoCache: can't save {}: {e}", self.file.display());
        }
    }
}

fn normalize_user(user: &str) -> &str {
    if user.is_empty() { PLACEHOLDER } else { user }
}

fn ref_from_parts(name: &str, user: &str, version_channel: &str) -> Option<PackageReference> {
    let (version, channel) = version_channel.split_once('/')?;
    PackageReference::new(name, version, Some(user), Some(channel))
        .inspect_err(|e| tracing::debug!("InfoCache: skipping entry {name}/{version_channel}: {e}"))
        .ok()
}

fn load(file: &Path) -> CacheData {
    let content = match std::fs::read_to_string(file) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let data = CacheData::default();
            if let Err(e) = write_atomic(file, &data) {
                tracing::debug!("InfoCache: can't create {}: {e}", file.display());
            }
            return data;
        }
        Err(e) => return replace_corrupt(file, &e),
    };

    if content.trim().is_empty() {
        return CacheData::default();
    }
    match serde_json::from_str(&content) {
        Ok(data) => data,
        Err(e) => replace_corrupt(file, &e),
    }
}

fn replace_corrupt(file: &Path, reason: &dyn std::fmt::Display) -> CacheData {
    tracing::debug!(
        "InfoCache: can't read {} ({reason}), replacing it.",
        file.display()
    );
    let data = CacheData::default();
    if let Err(e) = write_atomic(file, &data) {
        tracing::debug!("InfoCache: can't replace {}: {e}", file.display());
    }
    data
}

fn write_atomic(file: &Path, data: &CacheData) -> std::io::Result<()> {
    let dir = file.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&mut tmp, data)?;
    tmp.flush()?;
    tmp.persist(file).map_err(|e| e.error)?;
    Ok(())
}
