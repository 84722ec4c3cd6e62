use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use siteext_core::{ContentFile, ContentSource, Package, PackageMetadata};
use tracing::{debug, warn};

use crate::fs_ops::collect_relative_file_paths;
use crate::PackageRepository;

/// Written into a package directory once all of its content has been copied.
/// Directories without it are not recognised as installed packages.
pub const INSTALL_MANIFEST_FILE: &str = ".siteextension.toml";

/// Filesystem package store: one directory per installed package id.
#[derive(Debug, Clone)]
pub struct LocalRepository {
    root: PathBuf,
    source: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct InstallManifestFile {
    #[serde(default = "manifest_format_version")]
    format_version: u32,
    package: PackageMetadata,
}

/// Content of an installed package, read back from its directory.
#[derive(Debug, Clone)]
struct DirectoryContent {
    root: PathBuf,
}

impl LocalRepository {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            source: root.display().to_string(),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a package with this exact id would be installed to.
    pub fn package_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Directory of the installed copy of `id`, matched case-insensitively.
    /// `None` when no such directory exists or the root is missing.
    pub fn find_package_dir(&self, id: &str) -> Result<Option<PathBuf>> {
        let exact = self.package_dir(id);
        if exact.is_dir() {
            return Ok(Some(exact));
        }
        if !self.root.is_dir() {
            return Ok(None);
        }

        for entry in fs::read_dir(&self.root).with_context(|| {
            format!("failed reading local repository {}", self.root.display())
        })? {
            let entry = entry?;
            let matches = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.eq_ignore_ascii_case(id));
            if matches && entry.file_type()?.is_dir() {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }

    /// The existing directory for `id` when one is installed, otherwise the
    /// exact-case path.
    pub fn resolve_package_dir(&self, id: &str) -> Result<PathBuf> {
        Ok(self
            .find_package_dir(id)?
            .unwrap_or_else(|| self.package_dir(id)))
    }

    pub fn install_manifest_path(&self, id: &str) -> Result<PathBuf> {
        Ok(self.resolve_package_dir(id)?.join(INSTALL_MANIFEST_FILE))
    }

    pub fn read_install_manifest(&self, id: &str) -> Result<Option<PackageMetadata>> {
        match self.find_package_dir(id)? {
            Some(dir) => read_manifest_at(&dir.join(INSTALL_MANIFEST_FILE)),
            None => Ok(None),
        }
    }

    pub fn write_install_manifest(&self, package: &PackageMetadata) -> Result<()> {
        let path = self.install_manifest_path(&package.id)?;
        let manifest = InstallManifestFile {
            format_version: manifest_format_version(),
            package: package.clone(),
        };
        let content = toml::to_string(&manifest)
            .with_context(|| format!("failed serializing install manifest: {}", path.display()))?;
        fs::write(&path, content)
            .with_context(|| format!("failed writing install manifest: {}", path.display()))?;
        debug!(path = %path.display(), "wrote install manifest");
        Ok(())
    }

    fn installed_package(&self, dir: PathBuf, metadata: PackageMetadata) -> Package {
        Package::new(metadata, Arc::new(DirectoryContent { root: dir }))
    }
}

impl PackageRepository for LocalRepository {
    fn source(&self) -> &str {
        &self.source
    }

    fn packages(&self) -> Result<Vec<Package>> {
        let mut installed = Vec::new();
        for entry in fs::read_dir(&self.root).with_context(|| {
            format!("failed reading local repository {}", self.root.display())
        })? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dir = entry.path();
            match read_manifest_at(&dir.join(INSTALL_MANIFEST_FILE)) {
                Ok(Some(metadata)) => installed.push((dir, metadata)),
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        path = %dir.display(),
                        error = %format!("{err:#}"),
                        "skipping package directory with an unreadable install manifest"
                    );
                }
            }
        }

        installed.sort_by(|(_, left), (_, right)| {
            left.id
                .to_lowercase()
                .cmp(&right.id.to_lowercase())
                .then_with(|| left.version.cmp(&right.version))
        });
        Ok(installed
            .into_iter()
            .map(|(dir, metadata)| self.installed_package(dir, metadata))
            .collect())
    }

    fn search(&self, terms: &str, allow_prerelease: bool) -> Result<Vec<Package>> {
        let mut packages = self.packages()?;
        packages.retain(|package| {
            package.metadata().matches_terms(terms)
                && (allow_prerelease || !package.is_prerelease())
        });
        Ok(packages)
    }

    fn find_package_versions(&self, id: &str) -> Result<Vec<Package>> {
        let Some(dir) = self.find_package_dir(id)? else {
            return Ok(Vec::new());
        };
        Ok(read_manifest_at(&dir.join(INSTALL_MANIFEST_FILE))?
            .filter(|metadata| metadata.has_id(id))
            .map(|metadata| self.installed_package(dir, metadata))
            .into_iter()
            .collect())
    }

    fn exists(&self, package: &PackageMetadata) -> Result<bool> {
        Ok(self
            .read_install_manifest(&package.id)?
            .is_some_and(|installed| {
                installed.has_id(&package.id) && installed.version == package.version
            }))
    }
}

impl ContentSource for DirectoryContent {
    fn content_files(&self, _package: &PackageMetadata) -> Result<Vec<ContentFile>> {
        Ok(collect_relative_file_paths(&self.root)?
            .into_iter()
            .filter(|relative| relative.as_path() != Path::new(INSTALL_MANIFEST_FILE))
            .map(|relative| {
                let source = self.root.join(&relative);
                ContentFile::from_file(relative, source)
            })
            .collect())
    }
}

fn read_manifest_at(path: &Path) -> Result<Option<PackageMetadata>> {
    if !path.is_file() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("failed reading install manifest: {}", path.display()))?;
    let manifest: InstallManifestFile = toml::from_str(&content)
        .with_context(|| format!("failed parsing install manifest: {}", path.display()))?;
    Ok(Some(manifest.package))
}

fn manifest_format_version() -> u32 {
    1
}
