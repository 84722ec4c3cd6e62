mod content;
mod package;
mod query;
mod version;
pub mod web;

pub use content::{ContentFile, ContentSource, EmptyContent, InMemoryContent};
pub use package::{Package, PackageMetadata};
pub use query::PackageQuery;
pub use version::parse_package_version;
