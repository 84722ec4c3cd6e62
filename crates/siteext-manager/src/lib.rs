mod config;
mod install;
mod locator;
mod manager;

pub use config::ManagerConfig;
pub use locator::{resolve_site_root, RepositoryLocator};
pub use manager::{SiteExtensionManager, SITE_EXTENSIONS_DIR};

#[cfg(test)]
mod tests;
