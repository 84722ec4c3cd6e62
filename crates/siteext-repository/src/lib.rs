use std::fmt;

use anyhow::Result;
use siteext_core::{Package, PackageMetadata};

mod archive;
mod fs_ops;
mod local;
mod remote;

pub use archive::read_content_entries;
pub use local::{LocalRepository, INSTALL_MANIFEST_FILE};
pub use remote::{parse_source_url, RemoteRepository, DEFAULT_REMOTE_SOURCE};

/// The capabilities shared by the remote feed and the local package store.
pub trait PackageRepository: fmt::Debug {
    /// Where the repository lives: a feed base URL or a root directory.
    fn source(&self) -> &str;

    fn packages(&self) -> Result<Vec<Package>>;

    fn search(&self, terms: &str, allow_prerelease: bool) -> Result<Vec<Package>>;

    /// Every known version of `id`, in no particular order. Unknown ids yield
    /// an empty list.
    fn find_package_versions(&self, id: &str) -> Result<Vec<Package>>;

    fn exists(&self, package: &PackageMetadata) -> Result<bool>;

    fn updates(
        &self,
        installed: &[Package],
        include_prerelease: bool,
        include_all_versions: bool,
    ) -> Result<Vec<Package>> {
        resolve_updates(installed, include_prerelease, include_all_versions, |id| {
            self.find_package_versions(id)
        })
    }
}

/// For each installed package, in order, collects strictly newer versions of
/// the same id. Without `include_all_versions` only the highest candidate is
/// kept.
pub fn resolve_updates<F>(
    installed: &[Package],
    include_prerelease: bool,
    include_all_versions: bool,
    mut load_versions: F,
) -> Result<Vec<Package>>
where
    F: FnMut(&str) -> Result<Vec<Package>>,
{
    let mut updates = Vec::new();
    for current in installed {
        let mut candidates = load_versions(current.id())?
            .into_iter()
            .filter(|candidate| candidate.metadata().has_id(current.id()))
            .filter(|candidate| candidate.version() > current.version())
            .filter(|candidate| include_prerelease || !candidate.is_prerelease())
            .collect::<Vec<_>>();
        candidates.sort_by(|left, right| left.version().cmp(right.version()));

        if include_all_versions {
            updates.extend(candidates);
        } else if let Some(latest) = candidates.pop() {
            updates.push(latest);
        }
    }

    Ok(updates)
}
