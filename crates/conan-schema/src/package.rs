//! Binary package metadata as reported by package searches.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Recipe options, e.g. `shared=False`.
pub type Options = BTreeMap<String, String>;

/// Environment settings, e.g. `os=Linux`, `compiler.version=12`.
pub type Settings = BTreeMap<String, String>;

/// Opaque identifier of one built binary.
pub type PackageId = String;

/// One binary package of a recipe.
///
/// Searches always produce fresh instances; nothing mutates a `PackageInfo`
/// after it has been handed out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Package id.
    pub id: PackageId,
    /// Options the binary was built with.
    #[serde(default)]
    pub options: Options,
    /// Settings the binary was built with.
    #[serde(default)]
    pub settings: Settings,
    /// Dependencies, informational only.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Whether the binary is outdated against its recipe.
    #[serde(default)]
    pub outdated: bool,
}

impl PackageInfo {
    /// Create a package with the given id and no options or settings.
    pub fn new(id: impl Into<PackageId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Look up a setting.
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    /// Look up an option.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Whether `build_type` is `Debug` (case-insensitive).
    pub fn is_debug(&self) -> bool {
        self.setting("build_type")
            .is_some_and(|bt| bt.eq_ignore_ascii_case("debug"))
    }

    /// Whether every `key=value` in `wanted` is also an option of this package.
    pub fn has_options(&self, wanted: &Options) -> bool {
        wanted
            .iter()
            .all(|(key, value)| self.options.get(key) == Some(value))
    }

    /// Multi-line `key: value` rendering used in log output.
    pub fn pretty(&self) -> String {
        let mut out = format!("id: {}", self.id);
        if !self.settings.is_empty() {
            out.push_str("\nsettings:");
            for (key, value) in &self.settings {
                let _ = write!(out, "\n    {key}: {value}");
            }
        }
        if !self.options.is_empty() {
            out.push_str("\noptions:");
            for (key, value) in &self.options {
                let _ = write!(out, "\n    {key}: {value}");
            }
        }
        if !self.requires.is_empty() {
            let _ = write!(out, "\nrequires: {}", self.requires.join(", "));
        }
        if self.outdated {
            out.push_str("\noutdated: true");
        }
        out
    }
}

/// Render a map as `name=value` command line arguments.
///
/// Values mentioning `any` or `none` are placeholders for "not set" in recipe
/// metadata and are skipped.
pub fn key_value_pairs(map: &BTreeMap<String, String>) -> Vec<String> {
    map.iter()
        .filter(|(_, value)| {
            let lower = value.to_lowercase();
            !lower.contains("any") && !lower.contains("none")
        })
        .map(|(name, value)| format!("{name}={value}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_is_debug_case_insensitive() {
        let mut pkg = PackageInfo::new("a");
        assert!(!pkg.is_debug());
        pkg.settings = map(&[("build_type", "DEBUG")]);
        assert!(pkg.is_debug());
        pkg.settings = map(&[("build_type", "RelWithDebInfo")]);
        assert!(!pkg.is_debug());
    }

    #[test]
    fn test_has_options_is_subset_test() {
        let mut pkg = PackageInfo::new("a");
        pkg.options = map(&[("shared", "True"), ("fPIC", "True")]);
        assert!(pkg.has_options(&Options::new()));
        assert!(pkg.has_options(&map(&[("shared", "True")])));
        assert!(!pkg.has_options(&map(&[("shared", "False")])));
        assert!(!pkg.has_options(&map(&[("zlib", "True")])));
    }

    #[test]
    fn test_key_value_pairs_skip_placeholders() {
        let pairs = key_value_pairs(&map(&[
            ("shared", "True"),
            ("opt", "ANY"),
            ("other", "None"),
            ("os", "Linux"),
        ]));
        assert_eq!(pairs, vec!["os=Linux", "shared=True"]);
    }

    #[test]
    fn test_deserialize_with_missing_fields() {
        let pkg: PackageInfo = serde_json::from_str(r#"{"id": "abc"}"#).unwrap();
        assert_eq!(pkg, PackageInfo::new("abc"));
    }

    #[test]
    fn test_pretty_lists_settings_and_options() {
        let mut pkg = PackageInfo::new("abc");
        pkg.settings = map(&[("os", "Linux")]);
        pkg.options = map(&[("shared", "False")]);
        let text = pkg.pretty();
        assert!(text.starts_with("id: abc"));
        assert!(text.contains("os: Linux"));
        assert!(text.contains("shared: False"));
        assert!(!text.contains("outdated"));
    }
}
