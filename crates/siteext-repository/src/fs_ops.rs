use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Relative paths of every regular file below `root`, sorted.
pub(crate) fn collect_relative_file_paths(root: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    let mut queue: VecDeque<PathBuf> = VecDeque::new();
    queue.push_back(root.to_path_buf());

    while let Some(dir) = queue.pop_front() {
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("failed reading package directory {}", dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                queue.push_back(path);
            } else if file_type.is_file() {
                let relative_path = path.strip_prefix(root).with_context(|| {
                    format!(
                        "failed deriving relative path {} from {}",
                        path.display(),
                        root.display()
                    )
                })?;
                paths.push(relative_path.to_path_buf());
            }
        }
    }

    paths.sort();
    Ok(paths)
}
