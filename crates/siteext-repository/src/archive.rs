use std::io::{Cursor, Read};
use std::path::{Component, Path};

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::Url;
use sha2::{Digest, Sha256};
use siteext_core::{ContentFile, ContentSource, PackageMetadata};
use tracing::debug;

use crate::remote::get_checked;

const CONTENT_PREFIX: &str = "content";

/// Content of a remote package, downloaded when first asked for.
#[derive(Debug, Clone)]
pub(crate) struct ArchiveContent {
    client: Client,
    download_url: Url,
    expected_sha256: Option<String>,
}

impl ArchiveContent {
    pub(crate) fn new(client: Client, download_url: Url, expected_sha256: Option<String>) -> Self {
        Self {
            client,
            download_url,
            expected_sha256,
        }
    }
}

impl ContentSource for ArchiveContent {
    fn content_files(&self, package: &PackageMetadata) -> Result<Vec<ContentFile>> {
        let response = get_checked(&self.client, &self.download_url)?;
        let archive = response
            .bytes()
            .with_context(|| format!("failed downloading package archive {}", self.download_url))?;
        debug!(
            package = %package.id,
            version = %package.version,
            bytes = archive.len(),
            "downloaded package archive"
        );

        if let Some(expected) = &self.expected_sha256 {
            verify_sha256(&archive, expected).with_context(|| {
                format!(
                    "package archive for '{} {}' failed verification",
                    package.id, package.version
                )
            })?;
        }

        read_content_entries(&archive)
    }
}

fn verify_sha256(bytes: &[u8], expected: &str) -> Result<()> {
    let actual = hex::encode(Sha256::digest(bytes));
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        anyhow::bail!("sha256 mismatch: expected {}, got {actual}", expected.trim());
    }
    Ok(())
}

/// Reads the `content/` entries of a package archive, in archive order, with
/// the prefix stripped. Directory entries, entries outside `content/` and
/// names escaping the archive are skipped.
pub fn read_content_entries(archive: &[u8]) -> Result<Vec<ContentFile>> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(archive)).context("failed opening package archive")?;

    let mut files = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .with_context(|| format!("failed reading package archive entry {index}"))?;
        if entry.is_dir() {
            continue;
        }
        let Some(path) = entry.enclosed_name() else {
            continue;
        };
        let Ok(relative) = Path::new(&path).strip_prefix(CONTENT_PREFIX) else {
            continue;
        };
        if relative.as_os_str().is_empty()
            || relative
                .components()
                .any(|component| !matches!(component, Component::Normal(_)))
        {
            continue;
        }
        let relative = relative.to_path_buf();

        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed reading archive entry {}", relative.display()))?;
        files.push(ContentFile::from_bytes(relative, bytes));
    }

    Ok(files)
}
