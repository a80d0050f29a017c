//! Ranking of candidate binaries against the local machine.
//!
//! Binaries are keyed by a hash over all settings and options, so no server
//! can answer "the best package for me". The facade fetches every binary
//! that fits the platform and narrows the list here.
//!
//! Each stage only replaces the candidate list when it keeps at least one
//! package. The one exception is an explicit option mismatch, which is
//! final.

use conan_schema::{Options, PackageInfo, Settings};
use std::collections::BTreeSet;

/// Narrow `candidates` down to the best matches.
///
/// `default_options` is only called when more than one candidate is left
/// after the option filter; it may run recipe code.
pub fn best_matches(
    candidates: Vec<PackageInfo>,
    options: &Options,
    default_settings: &Settings,
    default_options: impl FnOnce() -> Options,
) -> Vec<PackageInfo> {
    let mut candidates = narrow(candidates, |pkg| !pkg.is_debug());

    if !options.is_empty() {
        candidates.retain(|pkg| pkg.has_options(options));
        if candidates.is_empty() {
            return candidates;
        }
    }

    if candidates.len() > 1 {
        let common_keys = common_option_keys(&candidates);
        let mut wanted: Options = default_options()
            .into_iter()
            .filter(|(key, _)| common_keys.contains(key))
            .collect();
        wanted.extend(options.iter().map(|(k, v)| (k.clone(), v.clone())));
        candidates = narrow(candidates, |pkg| pkg.has_options(&wanted));
    }

    // an unset key only matches packages that don't set it either
    for key in ["compiler", "compiler.version"] {
        if candidates.len() <= 1 {
            break;
        }
        let wanted = default_settings.get(key).map_or("", String::as_str);
        candidates = narrow(candidates, |pkg| pkg.setting(key).unwrap_or_default() == wanted);
    }

    candidates
}

/// Keep the packages matching `keep`, unless none does.
fn narrow(candidates: Vec<PackageInfo>, keep: impl Fn(&PackageInfo) -> bool) -> Vec<PackageInfo> {
    if !candidates.iter().any(&keep) {
        return candidates;
    }
    candidates.into_iter().filter(|pkg| keep(pkg)).collect()
}

/// Option names every candidate has.
fn common_option_keys(candidates: &[PackageInfo]) -> BTreeSet<String> {
    let mut sets = candidates
        .iter()
        .map(|pkg| pkg.options.keys().cloned().collect::<BTreeSet<_>>());
    let Some(first) = sets.next() else {
        return BTreeSet::new();
    };
    sets.fold(first, |acc, keys| acc.intersection(&keys).cloned().collect())
}
