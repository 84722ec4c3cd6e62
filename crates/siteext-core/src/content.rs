use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::package::PackageMetadata;

/// Produces the ordered content files of a package on demand.
pub trait ContentSource: fmt::Debug + Send + Sync {
    fn content_files(&self, package: &PackageMetadata) -> Result<Vec<ContentFile>>;
}

/// One content entry: a path relative to the package directory and a way to
/// open its bytes.
#[derive(Clone)]
pub struct ContentFile {
    path: PathBuf,
    data: ContentData,
}

#[derive(Clone)]
enum ContentData {
    Bytes(Arc<[u8]>),
    File(PathBuf),
}

impl ContentFile {
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            path: path.into(),
            data: ContentData::Bytes(bytes.into()),
        }
    }

    pub fn from_file(path: impl Into<PathBuf>, source: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            data: ContentData::File(source.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens a fresh reader over the entry's bytes. Each call starts at the
    /// beginning of the content.
    pub fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        match &self.data {
            ContentData::Bytes(bytes) => Ok(Box::new(Cursor::new(&bytes[..]))),
            ContentData::File(source) => Ok(Box::new(File::open(source)?)),
        }
    }
}

impl fmt::Debug for ContentFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("ContentFile");
        debug.field("path", &self.path);
        match &self.data {
            ContentData::Bytes(bytes) => debug.field("bytes", &bytes.len()),
            ContentData::File(source) => debug.field("source", source),
        };
        debug.finish()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyContent;

impl ContentSource for EmptyContent {
    fn content_files(&self, _package: &PackageMetadata) -> Result<Vec<ContentFile>> {
        Ok(Vec::new())
    }
}

/// Content held in memory, returned in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryContent {
    files: Vec<(PathBuf, Arc<[u8]>)>,
}

impl InMemoryContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, bytes: impl AsRef<[u8]>) -> Self {
        self.files.push((path.into(), Arc::from(bytes.as_ref())));
        self
    }
}

impl ContentSource for InMemoryContent {
    fn content_files(&self, _package: &PackageMetadata) -> Result<Vec<ContentFile>> {
        Ok(self
            .files
            .iter()
            .map(|(path, bytes)| ContentFile::from_bytes(path.clone(), Arc::clone(bytes)))
            .collect())
    }
}
