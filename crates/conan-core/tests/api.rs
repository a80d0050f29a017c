mod common;

use common::{Harness, map, pkg, r};
use conan_core::InstalledPackage;
use conan_schema::{BinaryReference, Options, PackageReference, Remote};
use std::sync::atomic::Ordering;

fn three_candidates() -> Vec<conan_schema::PackageInfo> {
    vec![
        pkg(
            "dbg",
            &[("build_type", "Debug"), ("compiler", "gcc"), ("compiler.version", "12")],
            &[("shared", "False")],
        ),
        pkg(
            "gcc11",
            &[("build_type", "Release"), ("compiler", "gcc"), ("compiler.version", "11")],
            &[("shared", "False")],
        ),
        pkg(
            "gcc12",
            &[("build_type", "Release"), ("compiler", "gcc"), ("compiler.version", "12")],
            &[("shared", "False")],
        ),
    ]
}

#[test]
fn test_best_match_picks_default_compiler_version() {
    let h = Harness::new(|b| b.with_remote_packages("conancenter", "zlib/1.2.13", three_candidates()));
    let found = h
        .api
        .find_best_matching_packages(&r("zlib/1.2.13"), &Options::new(), Some("conancenter"));
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "gcc12");

    let queries = h.backend.queries.lock().unwrap().clone();
    assert_eq!(
        queries,
        vec![(
            Some("conancenter".to_string()),
            Some("(arch=None OR arch=x86_64) AND (os=None OR os=Linux)".to_string())
        )]
    );
}

#[test]
fn test_best_match_is_repeatable() {
    let h = Harness::new(|b| b.with_remote_packages("conancenter", "zlib/1.2.13", three_candidates()));
    let reference = r("zlib/1.2.13");
    let options = map(&[("shared", "False")]);
    let first = h.api.find_best_matching_packages(&reference, &options, Some("conancenter"));
    let second = h.api.find_best_matching_packages(&reference, &options, Some("conancenter"));
    assert_eq!(first, second);
}

#[test]
fn test_best_match_rejects_invalid_reference() {
    let h = Harness::new(|b| b);
    let found = h
        .api
        .find_best_matching_packages(&PackageReference::invalid(), &Options::new(), None);
    assert!(found.is_empty());
    assert!(h.backend.queries.lock().unwrap().is_empty());
}

#[test]
fn test_best_match_explicit_options_win() {
    let h = Harness::new(|b| b.with_remote_packages("conancenter", "zlib/1.2.13", three_candidates()));
    let found = h.api.find_best_matching_packages(
        &r("zlib/1.2.13"),
        &map(&[("shared", "True")]),
        Some("conancenter"),
    );
    assert!(found.is_empty());
}

#[test]
fn test_recipe_inspection_failure_means_no_defaults() {
    let candidates = vec![
        pkg("a", &[("build_type", "Release")], &[("shared", "True")]),
        pkg("b", &[("build_type", "Release")], &[("shared", "False")]),
    ];
    let h = Harness::new(|b| b.with_remote_packages("conancenter", "zlib/1.2.13", candidates));
    // the fake recipe raises when it declares no default options
    let found = h
        .api
        .find_best_matching_packages(&r("zlib/1.2.13"), &Options::new(), Some("conancenter"));
    assert_eq!(found.len(), 2);
    assert_eq!(h.backend.inspections.load(Ordering::SeqCst), 1);
}

#[test]
fn test_default_options_pick_candidate() {
    let candidates = vec![
        pkg("a", &[("build_type", "Release")], &[("shared", "True")]),
        pkg("b", &[("build_type", "Release")], &[("shared", "False")]),
    ];
    let h = Harness::new(|mut b| {
        b.default_options = map(&[("shared", "False")]);
        b.with_remote_packages("conancenter", "zlib/1.2.13", candidates)
    });
    let found = h
        .api
        .find_best_matching_packages(&r("zlib/1.2.13"), &Options::new(), Some("conancenter"));
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "b");
}

#[test]
fn test_first_remote_with_match_wins() {
    let h = Harness::new(|b| {
        b.with_remote("company", "https://artifactory.example.com/api/conan/main")
            .with_remote_packages("conancenter", "zlib/1.2.13", vec![pkg("center", &[], &[])])
            .with_remote_packages("company", "zlib/1.2.13", vec![pkg("company", &[], &[])])
    });
    let found = h
        .api
        .find_best_matching_package_in_remotes(&r("zlib/1.2.13"), &Options::new());
    assert_eq!(found[0].id, "center");

    let only_company = Harness::new(|b| {
        b.with_remote("company", "https://artifactory.example.com/api/conan/main")
            .with_remote_packages("company", "zlib/1.2.13", vec![pkg("company", &[], &[])])
    });
    let found = only_company
        .api
        .find_best_matching_package_in_remotes(&r("zlib/1.2.13"), &Options::new());
    assert_eq!(found[0].id, "company");
}

#[test]
fn test_auto_install_installs_and_caches() {
    let h = Harness::new(|b| {
        b.with_remote_packages(
            "conancenter",
            "zlib/1.2.13",
            vec![pkg("abc123", &[("build_type", "Release"), ("os", "Linux")], &[])],
        )
    });
    let zlib = r("zlib/1.2.13");

    let installed = h.api.get_path_or_auto_install(&zlib, &Options::new(), false).unwrap();
    assert_eq!(installed.package_id, "abc123");
    assert!(installed.path.is_dir());
    assert_eq!(h.api.info_cache().get_local_package_path(&zlib), Some(installed.path.clone()));

    // second call is served from the local cache
    let again = h.api.get_path_or_auto_install(&zlib, &Options::new(), false).unwrap();
    assert_eq!(again, installed);
    assert_eq!(h.backend.installs().len(), 1);

    // update always reinstalls
    h.api.get_path_or_auto_install(&zlib, &Options::new(), true).unwrap();
    assert_eq!(h.backend.installs().len(), 2);
}

#[test]
fn test_install_without_candidates_invalidates_remote_entry() {
    let h = Harness::new(|b| b);
    let cache = h.api.info_cache();
    cache.update_remote_package_list(&[r("zlib/1.2.13"), r("zlib/1.3.0")], false);

    let installed = h
        .api
        .install_best_matching_package(&r("zlib/1.2.13"), &Options::new(), false);
    assert_eq!(installed, None);
    assert_eq!(cache.get_similar_remote_pkg_refs("zlib", "_"), vec![r("zlib/1.3.0")]);
}

#[test]
fn test_install_reference_failure_is_none() {
    let h = Harness::new(|b| b);
    let installed = h.api.install_reference(
        &r("nope/1.0"),
        &map(&[("os", "Linux")]),
        &Options::new(),
        "",
        false,
    );
    assert_eq!(installed, None);
    assert_eq!(h.api.info_cache().get_local_package_path(&r("nope/1.0")), None);
}

#[test]
fn test_install_package_reports_installed_id() {
    let h = Harness::new(|b| {
        b.with_remote_packages("conancenter", "fmt/10.0.0", vec![pkg("real", &[("os", "Linux")], &[])])
    });
    let wanted = pkg("requested", &[("os", "Windows")], &[]);
    let installed: InstalledPackage = h
        .api
        .install_package(&r("fmt/10.0.0"), &wanted, false)
        .unwrap();
    assert_eq!(installed.package_id, "real");
}

#[test]
fn test_local_lookups() {
    let h = Harness::new(|b| {
        b.with_local_packages(
            "zlib/1.2.13",
            vec![pkg("abc123", &[("build_type", "Release")], &[]), pkg("def456", &[], &[])],
        )
    });
    let zlib = r("zlib/1.2.13");
    assert_eq!(h.api.get_all_local_refs(), vec![zlib.clone()]);
    assert_eq!(h.api.info_cache().get_all_local_refs(), vec![zlib.clone()]);

    let binary = BinaryReference::parse("zlib/1.2.13:def456").unwrap();
    assert_eq!(h.api.get_local_pkg_from_id(&binary).unwrap().id, "def456");

    let folder = h.backend.folder(&zlib, "abc123");
    assert_eq!(h.api.get_local_pkg_from_path(&zlib, &folder).unwrap().id, "abc123");
    assert_eq!(h.api.get_local_pkg_from_id(&BinaryReference::parse("zlib/1.2.13:zzz").unwrap()), None);
}

#[test]
fn test_local_best_match_needs_existing_folder() {
    let h = Harness::new(|b| b.with_local_packages("zlib/1.2.13", vec![pkg("abc123", &[], &[])]));
    let zlib = r("zlib/1.2.13");

    assert_eq!(
        h.api.find_best_matching_local_package(&zlib, &Options::new()).unwrap().id,
        "abc123"
    );
    assert_eq!(h.api.get_best_matching_local_package_path(&zlib, &Options::new()), None);

    std::fs::create_dir_all(h.backend.folder(&zlib, "abc123")).unwrap();
    let found = h
        .api
        .get_best_matching_local_package_path(&zlib, &Options::new())
        .unwrap();
    assert_eq!(found.package_id, "abc123");
    assert_eq!(h.api.info_cache().get_local_package_path(&zlib), Some(found.path));
}

#[test]
fn test_remote_pkg_from_id_searches_every_remote() {
    let h = Harness::new(|b| {
        b.with_remote("company", "https://artifactory.example.com/api/conan/main")
            .with_remote_packages("company", "zlib/1.2.13", vec![pkg("abc123", &[], &[])])
    });
    let binary = BinaryReference::parse("zlib/1.2.13:abc123").unwrap();
    assert_eq!(h.api.get_remote_pkg_from_id(&binary).unwrap().id, "abc123");
}

#[test]
fn test_search_recipes_sorted_unique_and_cached() {
    let h = Harness::new(|b| {
        b.with_remote("company", "https://artifactory.example.com/api/conan/main")
            .with_recipes("conancenter", &["zlib/1.3.0", "zlib/1.2.13"])
            .with_recipes("company", &["zlib/1.2.13", "zlib/1.0@me/stable"])
    });
    let found = h.api.search_recipes_in_remotes("zlib/*", "all");
    assert_eq!(
        found,
        vec![r("zlib/1.0@me/stable"), r("zlib/1.2.13"), r("zlib/1.3.0")]
    );
    assert_eq!(h.api.info_cache().get_similar_remote_pkg_refs("zlib", "*").len(), 3);

    let company_only = h.api.search_recipes_in_remotes("zlib/*", "company");
    assert_eq!(company_only.len(), 2);
}

#[test]
fn test_empty_search_leaves_cache_file_alone() {
    let h = Harness::new(|b| b.with_recipes("conancenter", &["fmt/10.0.0"]));
    let file = h.api.info_cache().file().to_path_buf();
    std::fs::remove_file(&file).unwrap();

    assert!(h.api.search_recipes_in_remotes("zlib/*", "all").is_empty());
    assert!(h.api.search_recipe_alternatives_in_remotes(&r("zlib/1.2.13")).is_empty());
    assert!(!file.exists());

    h.api.search_recipes_in_remotes("fmt/*", "all");
    assert!(file.exists());
}

#[test]
fn test_failing_remote_is_skipped() {
    let h = Harness::new(|b| {
        b.with_remote("offline", "https://offline.example.com")
            .with_recipes("conancenter", &["zlib/1.2.13"])
    });
    assert_eq!(h.api.search_recipes_in_remotes("zlib/*", "all"), vec![r("zlib/1.2.13")]);
}

#[test]
fn test_alternatives_include_local_when_configured() {
    let build = |b: common::FakeBackend| {
        b.with_recipes("conancenter", &["zlib/1.3.0"])
            .with_recipes("", &["zlib/1.0@me/stable"])
    };
    let remote_only = Harness::new(build);
    assert_eq!(
        remote_only.api.search_recipe_alternatives_in_remotes(&r("zlib/1.2.13")),
        vec![r("zlib/1.3.0")]
    );

    let with_local = Harness::with_config(build, |mut c| {
        c.search_local_versions = true;
        c
    });
    assert_eq!(
        with_local.api.search_recipe_alternatives_in_remotes(&r("zlib/1.2.13")),
        vec![r("zlib/1.0@me/stable"), r("zlib/1.3.0")]
    );
}

#[test]
fn test_remotes_profiles_and_errors() {
    let h = Harness::new(|b| {
        b.with_remote("company", "https://artifactory.example.com/api/conan/main")
            .with_remote("company-dev", "https://artifactory.example.com/api/conan/dev")
    });
    assert_eq!(h.api.get_remotes(false).len(), 3);
    let company = Remote::new("company", "https://artifactory.example.com/api/conan/main");
    let same = h.api.get_remotes_from_same_server(&company);
    assert_eq!(
        same.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        vec!["company", "company-dev"]
    );
    assert_eq!(h.api.get_remote_user_info("company"), ("company-user".to_string(), true));

    let profiles = h.api.get_profiles_with_settings();
    assert_eq!(profiles.len(), 2);
    assert_eq!(profiles["windows"]["os"], "Windows");
    assert!(h.api.get_profile_settings("missing").is_empty());

    let broken = Harness::new(|mut b| {
        b.fail_remotes = true;
        b
    });
    assert!(broken.api.get_remotes(true).is_empty());
    assert!(
        broken
            .api
            .find_best_matching_package_in_remotes(&r("zlib/1.2.13"), &Options::new())
            .is_empty()
    );
}

#[test]
fn test_read_only_cache_is_not_written() {
    let h = Harness::with_config(
        |b| b.with_recipes("conancenter", &["zlib/1.2.13"]),
        |mut c| {
            c.read_only_cache = true;
            c
        },
    );
    let file = h.api.info_cache().file().to_path_buf();
    let before = std::fs::read_to_string(&file).unwrap();
    h.api.search_recipes_in_remotes("zlib/*", "all");
    assert_eq!(std::fs::read_to_string(&file).unwrap(), before);
    assert!(h.api.info_cache().is_read_only());
}
