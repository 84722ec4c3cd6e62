use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use siteext_core::ContentFile;

/// Ids become directory names under the local repository root, so they must
/// be a single plain path component.
pub(crate) fn validate_package_id(id: &str) -> Result<()> {
    let mut components = Path::new(id).components();
    let single_normal = matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none();
    if id.trim().is_empty() || !single_normal || id.contains(['/', '\\']) {
        anyhow::bail!("invalid package id: '{id}'");
    }
    Ok(())
}

pub(crate) fn content_destination(package_dir: &Path, relative: &Path) -> Result<PathBuf> {
    if relative.as_os_str().is_empty()
        || relative.is_absolute()
        || relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
    {
        anyhow::bail!(
            "content path escapes the package directory: {}",
            relative.display()
        );
    }
    Ok(package_dir.join(relative))
}

/// Copies one content entry. Both handles are scoped to this call and closed
/// on every return path.
pub(crate) fn copy_content_file(file: &ContentFile, destination: &Path) -> Result<u64> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating directory {}", parent.display()))?;
    }

    let mut writer = File::create(destination)
        .with_context(|| format!("failed opening {} for writing", destination.display()))?;
    let mut reader = file
        .open()
        .with_context(|| format!("failed opening content file {}", file.path().display()))?;
    io::copy(&mut reader, &mut writer).with_context(|| {
        format!(
            "failed copying {} to {}",
            file.path().display(),
            destination.display()
        )
    })
}
