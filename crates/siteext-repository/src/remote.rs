use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use siteext_core::web::build_query_string;
use siteext_core::{parse_package_version, Package, PackageMetadata};
use tracing::{debug, warn};

use crate::archive::ArchiveContent;
use crate::PackageRepository;

pub const DEFAULT_REMOTE_SOURCE: &str = "http://siteextensions.azurewebsites.net/api/v2/";

/// Read-only package feed served over HTTP as JSON.
#[derive(Debug, Clone)]
pub struct RemoteRepository {
    base: Url,
    source: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct FeedRecord {
    id: String,
    version: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    license_url: Option<String>,
    #[serde(default)]
    project_url: Option<String>,
    #[serde(default)]
    download_count: u64,
    #[serde(default)]
    published: Option<String>,
    #[serde(default)]
    package_hash_sha256: Option<String>,
}

impl RemoteRepository {
    pub fn new(source: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("siteext/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed building HTTP client")?;
        Self::with_client(source, client)
    }

    pub fn with_client(source: &str, client: Client) -> Result<Self> {
        let base = parse_source_url(source)?;
        Ok(Self {
            source: base.to_string(),
            base,
            client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn packages_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("remote source cannot be a base URL: {}", self.base))?
            .pop_if_empty()
            .push("packages")
            .extend(segments);
        Ok(url)
    }

    fn search_url(&self, terms: &str, allow_prerelease: bool) -> Result<Url> {
        let query = build_query_string([
            ("q", terms),
            ("prerelease", if allow_prerelease { "true" } else { "false" }),
        ]);
        self.base
            .join(&format!("search{query}"))
            .with_context(|| format!("failed building search URL for {}", self.base))
    }

    fn fetch_packages(&self, url: &Url) -> Result<Vec<Package>> {
        let response = get_checked(&self.client, url)?;
        self.parse_packages(response, url)
    }

    fn parse_packages(&self, response: Response, url: &Url) -> Result<Vec<Package>> {
        let body = response
            .text()
            .with_context(|| format!("failed reading feed response from {url}"))?;
        let records: Vec<FeedRecord> = serde_json::from_str(&body)
            .with_context(|| format!("failed parsing feed response from {url}"))?;
        debug!(%url, count = records.len(), "parsed feed records");

        let mut packages = Vec::with_capacity(records.len());
        for record in records {
            let id = record.id.clone();
            match self.package_from_record(record) {
                Ok(package) => packages.push(package),
                Err(err) => warn!(
                    %url,
                    package = %id,
                    error = %format!("{err:#}"),
                    "skipping unusable feed record"
                ),
            }
        }
        Ok(packages)
    }

    fn package_from_record(&self, record: FeedRecord) -> Result<Package> {
        let version = parse_package_version(&record.version)
            .with_context(|| format!("invalid feed record for package '{}'", record.id))?;
        let download_url = self.packages_url(&[
            record.id.as_str(),
            record.version.trim(),
            "download",
        ])?;

        let metadata = PackageMetadata {
            id: record.id,
            version,
            title: record.title,
            summary: record.summary,
            description: record.description,
            authors: record.authors,
            tags: record.tags,
            license_url: record.license_url,
            project_url: record.project_url,
            download_count: record.download_count,
            published: record.published,
        };
        let content = ArchiveContent::new(
            self.client.clone(),
            download_url,
            record.package_hash_sha256,
        );
        Ok(Package::new(metadata, Arc::new(content)))
    }
}

impl PackageRepository for RemoteRepository {
    fn source(&self) -> &str {
        &self.source
    }

    fn packages(&self) -> Result<Vec<Package>> {
        self.fetch_packages(&self.packages_url(&[])?)
    }

    fn search(&self, terms: &str, allow_prerelease: bool) -> Result<Vec<Package>> {
        let mut packages = self.fetch_packages(&self.search_url(terms, allow_prerelease)?)?;
        if !allow_prerelease {
            packages.retain(|package| !package.is_prerelease());
        }
        Ok(packages)
    }

    fn find_package_versions(&self, id: &str) -> Result<Vec<Package>> {
        let url = self.packages_url(&[id])?;
        debug!(%url, "requesting remote feed");
        let response = self
            .client
            .get(url.clone())
            .send()
            .with_context(|| format!("failed requesting {url}"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let response = check_status(response, &url)?;
        self.parse_packages(response, &url)
    }

    fn exists(&self, package: &PackageMetadata) -> Result<bool> {
        Ok(self
            .find_package_versions(&package.id)?
            .iter()
            .any(|candidate| candidate.version() == &package.version))
    }
}

/// Parses a feed base URL, requiring http(s) and a trailing slash.
pub fn parse_source_url(source: &str) -> Result<Url> {
    let trimmed = source.trim();
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url =
        Url::parse(&normalized).with_context(|| format!("invalid remote source URL '{source}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("remote source must use http or https: '{source}'");
    }
    Ok(url)
}

pub(crate) fn get_checked(client: &Client, url: &Url) -> Result<Response> {
    debug!(%url, "requesting remote feed");
    let response = client
        .get(url.clone())
        .send()
        .with_context(|| format!("failed requesting {url}"))?;
    check_status(response, url)
}

fn check_status(response: Response, url: &Url) -> Result<Response> {
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("remote feed returned {status} for {url}");
    }
    Ok(response)
}
