use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use semver::Version;
use siteext_core::{Package, PackageQuery};
use siteext_repository::{LocalRepository, PackageRepository, RemoteRepository};
use tracing::{debug, info};

use crate::config::ManagerConfig;
use crate::install::{content_destination, copy_content_file, validate_package_id};

/// Directory under the site root that holds installed extensions.
pub const SITE_EXTENSIONS_DIR: &str = "SiteExtensions";

/// Coordinates discovery and installation of site extensions between one
/// remote source and the site's local package store.
///
/// Operations are synchronous and unsynchronised: concurrent install, update
/// or uninstall of the same id needs an external lock.
#[derive(Debug)]
pub struct SiteExtensionManager {
    site_root: PathBuf,
    source: Box<dyn PackageRepository>,
    local: LocalRepository,
}

impl SiteExtensionManager {
    /// Binds the site root and both repositories. A missing site root is not
    /// detected here; it surfaces on the first local repository access.
    pub fn new(config: &ManagerConfig) -> Result<Self> {
        let site_root = config.resolve_site_root();
        let source = RemoteRepository::new(&config.remote_source)?;
        let local = LocalRepository::open(site_root.join(SITE_EXTENSIONS_DIR));
        debug!(
            site_root = %site_root.display(),
            remote = %config.remote_source,
            "created site extension manager"
        );
        Ok(Self::with_repositories(site_root, Box::new(source), local))
    }

    pub fn with_repositories(
        site_root: impl Into<PathBuf>,
        source: Box<dyn PackageRepository>,
        local: LocalRepository,
    ) -> Self {
        Self {
            site_root: site_root.into(),
            source,
            local,
        }
    }

    pub fn site_root(&self) -> &Path {
        &self.site_root
    }

    pub fn source_repository(&self) -> &dyn PackageRepository {
        self.source.as_ref()
    }

    pub fn local_repository(&self) -> &LocalRepository {
        &self.local
    }

    /// Absent or empty terms list every remote package, most downloaded
    /// first. Any other terms, whitespace included, search the remote source
    /// for stable versions only.
    pub fn search_remote(&self, terms: Option<&str>) -> PackageQuery<'_> {
        match terms.filter(|terms| !terms.is_empty()) {
            None => PackageQuery::new(move || self.source.packages()).order_by_descending_downloads(),
            Some(terms) => {
                let terms = terms.to_string();
                PackageQuery::new(move || self.source.search(&terms, false))
                    .filter(|package| !package.is_prerelease())
            }
        }
    }

    /// Installed packages matching `terms`, prerelease versions included.
    pub fn search_local(&self, terms: Option<&str>) -> PackageQuery<'_> {
        let terms = terms.unwrap_or_default().to_string();
        PackageQuery::new(move || self.local.search(&terms, true))
    }

    pub fn list_packages_with_updates(&self, terms: Option<&str>) -> Result<Vec<Package>> {
        // update resolution needs the concrete installed set
        let installed = self.search_local(terms).run()?;
        debug!(installed = installed.len(), "resolving updates");
        self.source.updates(&installed, false, false)
    }

    /// Copies every content file of `package` into `{local root}/{id}`, in
    /// order, then records the install manifest. An existing directory whose
    /// name differs from `id` only in case is reused. A failure part way
    /// through leaves the files copied so far in place and no manifest.
    pub fn install(&self, package: &Package) -> Result<()> {
        validate_package_id(package.id())?;
        let package_dir = self.local.resolve_package_dir(package.id())?;
        let files = package
            .content_files()
            .with_context(|| format!("failed reading content of {package}"))?;

        let mut copied_bytes = 0_u64;
        for file in &files {
            let destination = content_destination(&package_dir, file.path())?;
            copied_bytes += copy_content_file(file, &destination)?;
        }

        fs::create_dir_all(&package_dir)
            .with_context(|| format!("failed creating {}", package_dir.display()))?;
        self.local.write_install_manifest(package.metadata())?;
        info!(
            package = %package,
            files = files.len(),
            bytes = copied_bytes,
            target = %package_dir.display(),
            "installed site extension"
        );
        Ok(())
    }

    /// Uninstalls the current copy and installs `package`. The two steps fail
    /// independently: a failed install leaves the package uninstalled.
    pub fn update(&self, package: &Package) -> Result<()> {
        self.uninstall(package)?;
        self.install(package)
    }

    /// Removes the package directory of `id`, matched case-insensitively. A
    /// missing directory is an error whose source is the `NotFound` io error.
    pub fn uninstall(&self, package: &Package) -> Result<()> {
        validate_package_id(package.id())?;
        let package_dir = self.local.resolve_package_dir(package.id())?;
        fs::remove_dir_all(&package_dir)
            .with_context(|| format!("failed removing {}", package_dir.display()))?;
        info!(package = %package, target = %package_dir.display(), "uninstalled site extension");
        Ok(())
    }

    pub fn is_installed(&self, package: &Package) -> Result<bool> {
        self.local.exists(package.metadata())
    }

    /// The newer stable version of `package` offered by the remote source.
    /// More than one candidate is treated as a broken feed.
    pub fn get_available_update(&self, package: &Package) -> Result<Option<Package>> {
        let mut updates = self
            .source
            .updates(std::slice::from_ref(package), false, false)?;
        match updates.len() {
            0 | 1 => Ok(updates.pop()),
            count => anyhow::bail!(
                "remote source returned {count} updates for {package}; expected at most one"
            ),
        }
    }

    /// A remote package by id. Without an explicit version the highest stable
    /// version is chosen.
    pub fn find_remote_package(&self, id: &str, version: Option<&Version>) -> Result<Option<Package>> {
        let candidates = self.source.find_package_versions(id)?;
        Ok(match version {
            Some(version) => candidates
                .into_iter()
                .find(|package| package.metadata().has_id(id) && package.version() == version),
            None => candidates
                .into_iter()
                .filter(|package| package.metadata().has_id(id) && !package.is_prerelease())
                .max_by(|left, right| left.version().cmp(right.version())),
        })
    }

    pub fn find_installed_package(&self, id: &str) -> Result<Option<Package>> {
        Ok(self.local.find_package_versions(id)?.into_iter().next())
    }
}
