use std::fmt;

use anyhow::Result;

use crate::package::Package;

/// A lazily evaluated package query. Nothing runs until `run` or `iter` is
/// called, and every call re-runs the underlying repository request.
pub struct PackageQuery<'a> {
    producer: Box<dyn Fn() -> Result<Vec<Package>> + 'a>,
}

impl<'a> PackageQuery<'a> {
    pub fn new<F>(producer: F) -> Self
    where
        F: Fn() -> Result<Vec<Package>> + 'a,
    {
        Self {
            producer: Box::new(producer),
        }
    }

    pub fn run(&self) -> Result<Vec<Package>> {
        (self.producer)()
    }

    pub fn iter(&self) -> Result<std::vec::IntoIter<Package>> {
        Ok(self.run()?.into_iter())
    }

    /// Orders results by download count, highest first. Equal counts keep the
    /// order the repository produced them in.
    pub fn order_by_descending_downloads(self) -> Self {
        let inner = self.producer;
        Self::new(move || {
            let mut packages = inner()?;
            packages.sort_by(|left, right| right.download_count().cmp(&left.download_count()));
            Ok(packages)
        })
    }

    pub fn filter<P>(self, predicate: P) -> Self
    where
        P: Fn(&Package) -> bool + 'a,
    {
        let inner = self.producer;
        Self::new(move || {
            let mut packages = inner()?;
            packages.retain(|package| predicate(package));
            Ok(packages)
        })
    }
}

impl fmt::Debug for PackageQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageQuery").finish_non_exhaustive()
    }
}
