use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::content::{ContentFile, ContentSource, EmptyContent};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub id: String,
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,
    #[serde(default)]
    pub download_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
}

impl PackageMetadata {
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
            title: None,
            summary: None,
            description: None,
            authors: Vec::new(),
            tags: Vec::new(),
            license_url: None,
            project_url: None,
            download_count: 0,
            published: None,
        }
    }

    pub fn is_prerelease(&self) -> bool {
        !self.version.pre.is_empty()
    }

    /// Package ids compare ASCII case-insensitively.
    pub fn has_id(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id)
    }

    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .unwrap_or(&self.id)
    }

    /// True when any whitespace-separated term is a case-insensitive substring
    /// of the id, title, description or a tag. Blank terms match everything.
    pub fn matches_terms(&self, terms: &str) -> bool {
        let mut terms = terms.split_whitespace().peekable();
        if terms.peek().is_none() {
            return true;
        }

        let haystacks = [
            Some(self.id.as_str()),
            self.title.as_deref(),
            self.description.as_deref(),
        ]
        .into_iter()
        .flatten()
        .chain(self.tags.iter().map(String::as_str))
        .map(str::to_lowercase)
        .collect::<Vec<_>>();

        terms.any(|term| {
            let needle = term.to_lowercase();
            haystacks.iter().any(|haystack| haystack.contains(&needle))
        })
    }
}

/// A package descriptor plus the source of its content files.
#[derive(Clone)]
pub struct Package {
    metadata: PackageMetadata,
    content: Arc<dyn ContentSource>,
}

impl Package {
    pub fn new(metadata: PackageMetadata, content: Arc<dyn ContentSource>) -> Self {
        Self { metadata, content }
    }

    pub fn without_content(metadata: PackageMetadata) -> Self {
        Self::new(metadata, Arc::new(EmptyContent))
    }

    pub fn metadata(&self) -> &PackageMetadata {
        &self.metadata
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn version(&self) -> &Version {
        &self.metadata.version
    }

    pub fn is_prerelease(&self) -> bool {
        self.metadata.is_prerelease()
    }

    pub fn download_count(&self) -> u64 {
        self.metadata.download_count
    }

    pub fn content_files(&self) -> Result<Vec<ContentFile>> {
        self.content.content_files(&self.metadata)
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.metadata == other.metadata
    }
}

impl Eq for Package {}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package")
            .field("metadata", &self.metadata)
            .field("content", &self.content)
            .finish()
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.metadata.id, self.metadata.version)
    }
}
