use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use siteext_core::{parse_package_version, InMemoryContent, Package, PackageMetadata};
use siteext_repository::{LocalRepository, PackageRepository, INSTALL_MANIFEST_FILE};

use super::*;

#[derive(Debug, Default)]
struct FakeRepository {
    packages: Vec<Package>,
    forced_updates: Option<Vec<Package>>,
    calls: Rc<Cell<usize>>,
}

impl FakeRepository {
    fn with_packages(packages: Vec<Package>) -> Self {
        Self {
            packages,
            ..Self::default()
        }
    }
}

impl PackageRepository for FakeRepository {
    fn source(&self) -> &str {
        "memory://fake"
    }

    fn packages(&self) -> Result<Vec<Package>> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.packages.clone())
    }

    fn search(&self, terms: &str, allow_prerelease: bool) -> Result<Vec<Package>> {
        self.calls.set(self.calls.get() + 1);
        Ok(self
            .packages
            .iter()
            .filter(|package| package.metadata().matches_terms(terms))
            .filter(|package| allow_prerelease || !package.is_prerelease())
            .cloned()
            .collect())
    }

    fn find_package_versions(&self, id: &str) -> Result<Vec<Package>> {
        Ok(self
            .packages
            .iter()
            .filter(|package| package.metadata().has_id(id))
            .cloned()
            .collect())
    }

    fn exists(&self, package: &PackageMetadata) -> Result<bool> {
        Ok(self
            .packages
            .iter()
            .any(|candidate| candidate.metadata() == package))
    }

    fn updates(
        &self,
        installed: &[Package],
        include_prerelease: bool,
        include_all_versions: bool,
    ) -> Result<Vec<Package>> {
        if let Some(forced) = &self.forced_updates {
            return Ok(forced.clone());
        }
        siteext_repository::resolve_updates(
            installed,
            include_prerelease,
            include_all_versions,
            |id| self.find_package_versions(id),
        )
    }
}

fn test_site_root(label: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    std::env::temp_dir()
        .join(format!(
            "siteext-manager-{label}-{}-{nanos}",
            std::process::id()
        ))
        .join("home")
        .join("site")
}

fn test_manager(label: &str, remote: FakeRepository) -> SiteExtensionManager {
    let site_root = test_site_root(label);
    let local = LocalRepository::open(site_root.join(SITE_EXTENSIONS_DIR));
    fs::create_dir_all(local.root()).expect("must create local repository root");
    SiteExtensionManager::with_repositories(site_root, Box::new(remote), local)
}

fn cleanup(manager: &SiteExtensionManager) {
    let _ = fs::remove_dir_all(
        manager
            .site_root()
            .parent()
            .and_then(Path::parent)
            .expect("test site root has a base"),
    );
}

fn metadata(id: &str, version: &str, downloads: u64) -> PackageMetadata {
    let mut metadata =
        PackageMetadata::new(id, parse_package_version(version).expect("version must parse"));
    metadata.download_count = downloads;
    metadata
}

fn package(id: &str, version: &str, files: &[(&str, &str)]) -> Package {
    let content = files
        .iter()
        .fold(InMemoryContent::new(), |content, (path, body)| {
            content.with_file(*path, body)
        });
    Package::new(metadata(id, version, 0), Arc::new(content))
}

fn listed(id: &str, version: &str, downloads: u64) -> Package {
    Package::without_content(metadata(id, version, downloads))
}

fn installed_files(manager: &SiteExtensionManager, id: &str) -> BTreeMap<String, String> {
    let package_dir = manager.local_repository().package_dir(id);
    let mut files = BTreeMap::new();
    let mut pending = vec![package_dir.clone()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).expect("must read package dir") {
            let path = entry.expect("must read entry").path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let relative = path
                .strip_prefix(&package_dir)
                .expect("must be under package dir")
                .to_string_lossy()
                .replace('\\', "/");
            if relative != INSTALL_MANIFEST_FILE {
                files.insert(relative, fs::read_to_string(&path).expect("must read file"));
            }
        }
    }
    files
}

fn ids(packages: &[Package]) -> Vec<String> {
    packages
        .iter()
        .map(|package| package.to_string())
        .collect()
}

#[test]
fn install_then_uninstall_round_trip_on_disk() {
    let manager = test_manager("scenario", FakeRepository::default());
    let foo = package("Foo", "1.0", &[("index.html", "<h1>hi</h1>")]);
    let package_dir = manager.site_root().join("SiteExtensions").join("Foo");

    manager.install(&foo).expect("must install");
    assert_eq!(
        fs::read(package_dir.join("index.html")).expect("must read installed file"),
        b"<h1>hi</h1>"
    );
    assert!(manager.is_installed(&foo).expect("must check"));

    manager.uninstall(&foo).expect("must uninstall");
    assert!(!package_dir.exists());
    assert!(!manager.is_installed(&foo).expect("must check"));

    cleanup(&manager);
}

#[test]
fn install_creates_nested_directories_and_keeps_last_duplicate() {
    let manager = test_manager("nested", FakeRepository::default());
    let foo = package(
        "Foo",
        "1.0",
        &[
            ("index.html", "first"),
            ("assets/css/site.css", "body {}"),
            ("index.html", "second"),
        ],
    );

    manager.install(&foo).expect("must install");

    let files = installed_files(&manager, "Foo");
    assert_eq!(files.len(), 2);
    assert_eq!(files["index.html"], "second");
    assert_eq!(files["assets/css/site.css"], "body {}");

    cleanup(&manager);
}

#[test]
fn install_truncates_existing_files() {
    let manager = test_manager("truncate", FakeRepository::default());
    manager
        .install(&package("Foo", "1.0", &[("index.html", "a much longer body")]))
        .expect("must install");
    manager
        .install(&package("Foo", "1.0", &[("index.html", "short")]))
        .expect("must reinstall");

    assert_eq!(installed_files(&manager, "Foo")["index.html"], "short");

    cleanup(&manager);
}

#[test]
fn install_failure_keeps_copied_files_and_is_not_installed() {
    let manager = test_manager("partial", FakeRepository::default());
    let broken = package(
        "Foo",
        "1.0",
        &[("index.html", "kept"), ("../outside.html", "never written")],
    );

    let err = manager.install(&broken).expect_err("escaping path must fail");
    assert!(err.to_string().contains("escapes the package directory"));

    assert_eq!(installed_files(&manager, "Foo")["index.html"], "kept");
    assert!(!manager.is_installed(&broken).expect("must check"));
    assert!(!manager.site_root().join("SiteExtensions/outside.html").exists());

    cleanup(&manager);
}

#[test]
fn install_and_uninstall_reject_ids_that_are_not_plain_names() {
    let manager = test_manager("ids", FakeRepository::default());
    for id in ["..", "a/b", "", "."] {
        let bad = Package::without_content(PackageMetadata::new(
            id,
            semver::Version::new(1, 0, 0),
        ));
        assert!(manager.install(&bad).is_err(), "install accepted '{id}'");
        assert!(manager.uninstall(&bad).is_err(), "uninstall accepted '{id}'");
    }
    assert!(manager.site_root().join(SITE_EXTENSIONS_DIR).exists());

    cleanup(&manager);
}

#[test]
fn uninstall_missing_package_is_a_not_found_error() {
    let manager = test_manager("missing", FakeRepository::default());
    let foo = package("Foo", "1.0", &[("index.html", "x")]);

    let err = manager.uninstall(&foo).expect_err("must fail");
    let io_err = err
        .downcast_ref::<io::Error>()
        .expect("source must be an io error");
    assert_eq!(io_err.kind(), io::ErrorKind::NotFound);

    cleanup(&manager);
}

#[test]
fn update_replaces_content_with_new_version() {
    let manager = test_manager("update", FakeRepository::default());
    let v1 = package(
        "Foo",
        "1.0",
        &[("index.html", "v1"), ("old.css", "legacy")],
    );
    let v2 = package("Foo", "2.0", &[("index.html", "v2"), ("app.js", "new")]);

    manager.install(&v1).expect("must install v1");
    manager.update(&v2).expect("must update");

    let files = installed_files(&manager, "Foo");
    assert_eq!(
        files.keys().cloned().collect::<Vec<_>>(),
        vec!["app.js", "index.html"]
    );
    assert_eq!(files["index.html"], "v2");
    assert!(manager.is_installed(&v2).expect("must check"));
    assert!(!manager.is_installed(&v1).expect("must check"));

    cleanup(&manager);
}

#[test]
fn update_replaces_install_stored_under_different_id_casing() {
    let remote = FakeRepository::with_packages(vec![listed("Foo", "2.0", 0)]);
    let manager = test_manager("update-case", remote);
    manager
        .install(&package("foo", "1.0", &[("old.html", "v1")]))
        .expect("must install v1");

    let installed = manager
        .find_installed_package("Foo")
        .expect("must look up")
        .expect("lowercase install must be found");
    assert_eq!(installed.to_string(), "foo 1.0.0");

    let available = manager
        .get_available_update(&installed)
        .expect("must resolve")
        .expect("update must exist");
    assert_eq!(available.to_string(), "Foo 2.0.0");

    let v2 = package("Foo", "2.0", &[("index.html", "v2")]);
    manager.update(&v2).expect("must update across id casing");

    let files = installed_files(&manager, "Foo");
    assert_eq!(files.keys().cloned().collect::<Vec<_>>(), vec!["index.html"]);
    assert!(manager.is_installed(&v2).expect("must check"));
    let all = manager.search_local(None).run().expect("must search");
    assert_eq!(ids(&all), vec!["Foo 2.0.0"]);

    cleanup(&manager);
}

#[test]
fn uninstall_matches_installed_directory_case_insensitively() {
    let manager = test_manager("uninstall-case", FakeRepository::default());
    manager
        .install(&package("foo", "1.0", &[("index.html", "f")]))
        .expect("must install");

    manager
        .uninstall(&listed("FOO", "1.0", 0))
        .expect("must uninstall");
    assert!(manager
        .find_installed_package("foo")
        .expect("must look up")
        .is_none());

    cleanup(&manager);
}

#[test]
fn update_of_package_that_is_not_installed_fails_in_uninstall_step() {
    let manager = test_manager("update-missing", FakeRepository::default());
    let v2 = package("Foo", "2.0", &[("index.html", "v2")]);

    let err = manager.update(&v2).expect_err("must fail");
    assert!(err.downcast_ref::<io::Error>().is_some());
    assert!(!manager.local_repository().package_dir("Foo").exists());

    cleanup(&manager);
}

#[test]
fn search_remote_without_terms_orders_by_downloads() {
    let remote = FakeRepository::with_packages(vec![
        listed("Low", "1.0", 3),
        listed("High", "1.0", 300),
        listed("Beta", "1.0.0-beta", 30),
        listed("Mid", "1.0", 30),
    ]);
    let manager = test_manager("remote-all", remote);

    for terms in [None, Some("")] {
        let results = manager.search_remote(terms).run().expect("must search");
        let downloads = results
            .iter()
            .map(Package::download_count)
            .collect::<Vec<_>>();
        assert!(downloads.windows(2).all(|pair| pair[0] >= pair[1]));
        assert_eq!(
            ids(&results),
            vec!["High 1.0.0", "Beta 1.0.0-beta", "Mid 1.0.0", "Low 1.0.0"]
        );
    }

    cleanup(&manager);
}

#[test]
fn search_remote_sends_whitespace_terms_to_the_search_endpoint() {
    let remote = FakeRepository::with_packages(vec![
        listed("Low", "1.0", 3),
        listed("High", "1.0", 300),
        listed("Beta", "1.0.0-beta", 30),
    ]);
    let manager = test_manager("remote-blank", remote);

    let results = manager
        .search_remote(Some("   "))
        .run()
        .expect("must search");
    assert_eq!(ids(&results), vec!["Low 1.0.0", "High 1.0.0"]);

    cleanup(&manager);
}

#[test]
fn search_remote_with_terms_never_returns_prerelease() {
    let remote = FakeRepository::with_packages(vec![
        listed("JsonViewer", "1.0", 0),
        listed("JsonViewer", "2.0.0-rc.1", 0),
        listed("Logs", "1.0", 0),
    ]);
    let manager = test_manager("remote-terms", remote);

    let results = manager
        .search_remote(Some("json"))
        .run()
        .expect("must search");
    assert_eq!(ids(&results), vec!["JsonViewer 1.0.0"]);

    cleanup(&manager);
}

#[test]
fn search_remote_is_lazy_and_rerunnable() {
    let remote = FakeRepository::with_packages(vec![listed("Foo", "1.0", 1)]);
    let calls = Rc::clone(&remote.calls);
    let manager = test_manager("remote-lazy", remote);

    let query = manager.search_remote(None);
    assert_eq!(calls.get(), 0);
    assert_eq!(query.run().expect("must run").len(), 1);
    assert_eq!(query.iter().expect("must iterate").count(), 1);
    assert_eq!(calls.get(), 2);

    cleanup(&manager);
}

#[test]
fn search_local_includes_prerelease_packages() {
    let manager = test_manager("local-search", FakeRepository::default());
    manager
        .install(&package("Stable", "1.0", &[("index.html", "s")]))
        .expect("must install");
    manager
        .install(&package("Preview", "1.0.0-alpha", &[("index.html", "p")]))
        .expect("must install");

    let all = manager.search_local(None).run().expect("must search");
    assert_eq!(ids(&all), vec!["Preview 1.0.0-alpha", "Stable 1.0.0"]);
    let filtered = manager
        .search_local(Some("stab"))
        .run()
        .expect("must search");
    assert_eq!(ids(&filtered), vec!["Stable 1.0.0"]);

    cleanup(&manager);
}

#[test]
fn search_local_reports_missing_root_lazily() {
    let site_root = test_site_root("no-root");
    let manager = SiteExtensionManager::with_repositories(
        &site_root,
        Box::new(FakeRepository::default()),
        LocalRepository::open(site_root.join(SITE_EXTENSIONS_DIR)),
    );

    let query = manager.search_local(None);
    assert!(query.run().is_err());
}

#[test]
fn list_packages_with_updates_returns_only_updated_packages() {
    let remote = FakeRepository::with_packages(vec![
        listed("Foo", "1.0", 0),
        listed("Foo", "1.1", 0),
        listed("Bar", "1.0", 0),
        listed("Bar", "2.0.0-beta", 0),
    ]);
    let manager = test_manager("updates", remote);
    manager
        .install(&package("Foo", "1.0", &[("index.html", "f")]))
        .expect("must install");
    manager
        .install(&package("Bar", "1.0", &[("index.html", "b")]))
        .expect("must install");

    let updates = manager
        .list_packages_with_updates(Some(""))
        .expect("must list updates");
    assert_eq!(ids(&updates), vec!["Foo 1.1.0"]);

    let filtered = manager
        .list_packages_with_updates(Some("bar"))
        .expect("must list updates");
    assert!(filtered.is_empty());

    cleanup(&manager);
}

#[test]
fn get_available_update_returns_single_candidate_or_none() {
    let remote = FakeRepository::with_packages(vec![
        listed("Foo", "1.0", 0),
        listed("Foo", "1.2", 0),
        listed("Foo", "1.1", 0),
    ]);
    let manager = test_manager("single-update", remote);

    let update = manager
        .get_available_update(&listed("Foo", "1.0", 0))
        .expect("must resolve")
        .expect("update must exist");
    assert_eq!(update.to_string(), "Foo 1.2.0");
    assert!(manager
        .get_available_update(&listed("Foo", "1.2", 0))
        .expect("must resolve")
        .is_none());
    assert!(manager
        .get_available_update(&listed("Unknown", "1.0", 0))
        .expect("must resolve")
        .is_none());

    cleanup(&manager);
}

#[test]
fn get_available_update_rejects_multiple_candidates() {
    let remote = FakeRepository {
        forced_updates: Some(vec![listed("Foo", "1.1", 0), listed("Foo", "1.2", 0)]),
        ..FakeRepository::default()
    };
    let manager = test_manager("ambiguous-update", remote);

    let err = manager
        .get_available_update(&listed("Foo", "1.0", 0))
        .expect_err("must reject");
    assert!(err.to_string().contains("returned 2 updates"));

    cleanup(&manager);
}

#[test]
fn find_remote_package_prefers_highest_stable_or_exact_version() {
    let remote = FakeRepository::with_packages(vec![
        listed("Foo", "1.0", 0),
        listed("Foo", "1.5", 0),
        listed("Foo", "2.0.0-beta", 0),
    ]);
    let manager = test_manager("find-remote", remote);

    let latest = manager
        .find_remote_package("foo", None)
        .expect("must look up")
        .expect("must exist");
    assert_eq!(latest.to_string(), "Foo 1.5.0");

    let beta = parse_package_version("2.0.0-beta").expect("version must parse");
    let exact = manager
        .find_remote_package("Foo", Some(&beta))
        .expect("must look up")
        .expect("must exist");
    assert!(exact.is_prerelease());

    assert!(manager
        .find_remote_package("Missing", None)
        .expect("must look up")
        .is_none());

    cleanup(&manager);
}

#[test]
fn find_installed_package_reads_local_manifest() {
    let manager = test_manager("find-installed", FakeRepository::default());
    assert!(manager
        .find_installed_package("Foo")
        .expect("must look up")
        .is_none());

    manager
        .install(&package("Foo", "1.3", &[("index.html", "f")]))
        .expect("must install");
    let installed = manager
        .find_installed_package("Foo")
        .expect("must look up")
        .expect("must exist");
    assert_eq!(installed.to_string(), "Foo 1.3.0");
    assert_eq!(installed.content_files().expect("must list").len(), 1);

    cleanup(&manager);
}

#[test]
fn new_binds_local_repository_under_site_root() {
    let site_root = test_site_root("new");
    let config = ManagerConfig::default()
        .with_remote_source("http://feed.example.test/api/v2")
        .expect("source must be valid")
        .with_site_root(&site_root);

    let manager = SiteExtensionManager::new(&config).expect("must build manager");
    assert_eq!(manager.site_root(), site_root.as_path());
    assert_eq!(
        manager.local_repository().root(),
        site_root.join("SiteExtensions").as_path()
    );
    assert_eq!(
        manager.source_repository().source(),
        "http://feed.example.test/api/v2/"
    );
    assert!(!site_root.exists(), "construction must not touch the disk");
}

#[test]
fn locator_prefers_existing_system_drive_home() {
    let drive = test_site_root("locator");
    fs::create_dir_all(drive.join("home")).expect("must create home");
    let drive_value = drive.display().to_string();

    let locator = RepositoryLocator::with_lookup(|name: &str| match name {
        "SystemDrive" => Some(drive_value.clone()),
        "HOME" => Some("/fallback/home".to_string()),
        _ => None,
    });
    assert_eq!(locator.resolve_site_root(), drive.join("home"));

    let _ = fs::remove_dir_all(&drive);
}

#[test]
fn locator_falls_back_to_home_without_checking_it() {
    let locator = RepositoryLocator::with_lookup(|name: &str| match name {
        "SystemDrive" => Some("/definitely/not/a/drive".to_string()),
        "HOME" => Some("/fallback/home".to_string()),
        _ => None,
    });
    assert_eq!(locator.resolve_site_root(), PathBuf::from("/fallback/home"));

    let unset = RepositoryLocator::with_lookup(|_: &str| None);
    assert_eq!(unset.resolve_site_root(), PathBuf::from("%HOME%"));
}

#[test]
fn locator_expand_replaces_known_variables_only() {
    let locator = RepositoryLocator::with_lookup(|name: &str| match name {
        "A" => Some("alpha".to_string()),
        "B" => Some("beta".to_string()),
        _ => None,
    });

    assert_eq!(locator.expand("%A%/x"), "alpha/x");
    assert_eq!(locator.expand("%A%%B%"), "alphabeta");
    assert_eq!(locator.expand("%MISSING%/%A%"), "%MISSING%/alpha");
    assert_eq!(locator.expand("%X%B%"), "%Xbeta");
    assert_eq!(locator.expand("100%"), "100%");
    assert_eq!(locator.expand("%%"), "%%");
}

#[test]
fn config_defaults_to_well_known_feed() {
    let config = ManagerConfig::default();
    assert_eq!(
        config.remote_source,
        "http://siteextensions.azurewebsites.net/api/v2/"
    );
    assert!(config.site_root.is_none());
}

#[test]
fn config_parses_toml_and_normalizes_source() {
    let config = ManagerConfig::from_toml_str(
        r#"
remote_source = "https://feed.example.test/api/v2"
site_root = "/srv/site"
"#,
    )
    .expect("config must parse");

    assert_eq!(config.remote_source, "https://feed.example.test/api/v2/");
    assert_eq!(config.site_root, Some(PathBuf::from("/srv/site")));
    assert_eq!(
        config.local_repository_root(),
        PathBuf::from("/srv/site").join("SiteExtensions")
    );
}

#[test]
fn config_rejects_unknown_keys_and_bad_sources() {
    let err = ManagerConfig::from_toml_str("feed = \"x\"").expect_err("must reject key");
    assert!(err.to_string().contains("failed to parse site extensions config"));

    let err = ManagerConfig::from_toml_str("remote_source = \"ftp://feed.example.test\"")
        .expect_err("must reject scheme");
    assert!(err.to_string().contains("http or https"));
}

#[test]
fn config_load_reports_missing_file() {
    let path = test_site_root("config").join("siteext.toml");
    let err = ManagerConfig::load(&path).expect_err("missing file must fail");
    assert!(err.to_string().contains("failed reading config"));
}
