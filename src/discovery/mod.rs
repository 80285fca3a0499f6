use anyhow::Result;
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Recursive source-file discovery, filtered by extension and excluded
/// directory names
pub struct FileDiscovery {
    extensions: HashSet<String>,
    exclude_dirs: HashSet<String>,
    max_depth: usize,
}

impl FileDiscovery {
    pub fn new(extensions: &[String], exclude_dirs: &[String], max_depth: usize) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            exclude_dirs: exclude_dirs.iter().cloned().collect(),
            max_depth,
        }
    }

    /// Absolute paths of matching files under `root`, sorted.
    pub fn discover(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            anyhow::bail!("Path is not a directory: {}", root.display());
        }
        let root = root.canonicalize()?;

        let exclude_dirs = self.exclude_dirs.clone();
        let walker = WalkBuilder::new(&root)
            .standard_filters(true)
            .hidden(true) // Skip hidden files
            .max_depth(Some(self.max_depth))
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
                !(is_dir
                    && entry.depth() > 0
                    && exclude_dirs.contains(entry.file_name().to_string_lossy().as_ref()))
            })
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if entry.file_type().map_or(true, |ft| !ft.is_file()) {
                continue;
            }

            let matches = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| self.extensions.contains(&e.to_ascii_lowercase()));
            if matches {
                files.push(entry.into_path());
            }
        }

        files.sort();
        Ok(files)
    }
}
