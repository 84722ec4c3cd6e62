use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use siteext_repository::{parse_source_url, DEFAULT_REMOTE_SOURCE};

use crate::locator::resolve_site_root;
use crate::manager::SITE_EXTENSIONS_DIR;

/// Process-wide settings, built once at startup and handed to the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    pub remote_source: String,
    pub site_root: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManagerConfigFile {
    #[serde(default)]
    remote_source: Option<String>,
    #[serde(default)]
    site_root: Option<PathBuf>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            remote_source: DEFAULT_REMOTE_SOURCE.to_string(),
            site_root: None,
        }
    }
}

impl ManagerConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let file: ManagerConfigFile =
            toml::from_str(input).context("failed to parse site extensions config")?;

        let mut config = Self::default();
        if let Some(source) = file.remote_source {
            config = config.with_remote_source(&source)?;
        }
        config.site_root = file.site_root;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("failed loading config: {}", path.display()))
    }

    pub fn with_remote_source(mut self, source: &str) -> Result<Self> {
        self.remote_source = parse_source_url(source)?.to_string();
        Ok(self)
    }

    pub fn with_site_root(mut self, site_root: impl Into<PathBuf>) -> Self {
        self.site_root = Some(site_root.into());
        self
    }

    /// The configured override, or the root found in the environment.
    pub fn resolve_site_root(&self) -> PathBuf {
        self.site_root.clone().unwrap_or_else(resolve_site_root)
    }

    pub fn local_repository_root(&self) -> PathBuf {
        self.resolve_site_root().join(SITE_EXTENSIONS_DIR)
    }
}
