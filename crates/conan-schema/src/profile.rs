//! Human readable labels for settings combinations.

use crate::package::Settings;

/// Build a short label like `Windows_x64_vs16_v142_release` from settings.
///
/// Display only; never used for matching.
///
/// ```
/// use conan_schema::{Settings, build_profile_name_alias};
///
/// let settings: Settings = [
///     ("os", "Linux"),
///     ("arch", "x86_64"),
///     ("compiler", "gcc"),
///     ("compiler.version", "12"),
///     ("build_type", "Release"),
/// ]
/// .into_iter()
/// .map(|(k, v)| (k.to_string(), v.to_string()))
/// .collect();
/// assert_eq!(build_profile_name_alias(&settings), "Linux_x64_gcc12_release");
/// ```
pub fn build_profile_name_alias(settings: &Settings) -> String {
    if settings.is_empty() {
        return "No Settings".to_string();
    }

    let first_of = |keys: &[&str]| -> String {
        keys.iter()
            .filter_map(|k| settings.get(*k))
            .find(|v| !v.is_empty())
            .cloned()
            .unwrap_or_default()
    };
    let get = |key: &str| settings.get(key).cloned().unwrap_or_default();

    let os = first_of(&["os", "os_target", "os_build"]);

    let mut arch = first_of(&["arch", "arch_target", "arch_build"]);
    if arch == "x86_64" {
        arch = "x64".to_string();
    }

    let mut compiler = get("compiler");
    if compiler == "Visual Studio" {
        compiler = "vs".to_string();
    }
    let compiler_text = format!(
        "{}{}",
        compiler.to_lowercase(),
        get("compiler.version").to_lowercase()
    );

    let mut alias = os;
    for part in [
        arch.to_lowercase(),
        compiler_text,
        get("compiler.toolset").to_lowercase(),
        get("build_type").to_lowercase(),
    ] {
        if !part.is_empty() {
            alias.push('_');
            alias.push_str(&part);
        }
    }
    alias
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_visual_studio_alias() {
        let s = settings(&[
            ("os", "Windows"),
            ("arch", "x86_64"),
            ("compiler", "Visual Studio"),
            ("compiler.version", "16"),
            ("compiler.toolset", "v142"),
            ("build_type", "Release"),
        ]);
        assert_eq!(build_profile_name_alias(&s), "Windows_x64_vs16_v142_release");
    }

    #[test]
    fn test_fallback_chains() {
        let s = settings(&[("os_build", "Linux"), ("arch_build", "armv8")]);
        assert_eq!(build_profile_name_alias(&s), "Linux_armv8");

        let s = settings(&[("os_target", "Android"), ("os_build", "Linux")]);
        assert_eq!(build_profile_name_alias(&s), "Android");
    }

    #[test]
    fn test_empty_settings() {
        assert_eq!(build_profile_name_alias(&Settings::new()), "No Settings");
    }
}
