//! Named resources under a plugin's resources directory.
//!
//! Every path handed out here is relative to the provider root and uses
//! forward slashes, so the same string can be compared against plugin
//! declarations, leftover sets and report entries.

use crate::error::{LintError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResourceEntry {
    /// Root-relative path, `/`-separated.
    pub relative: String,
    pub path: PathBuf,
}

/// Source of resource files for discovery and leftover analysis.
pub trait ResourceProvider {
    fn root(&self) -> &Path;

    /// Every file under `subdir` accepted by `accept`, sorted by path.
    fn list(&self, subdir: &str, accept: &dyn Fn(&str) -> bool) -> Vec<ResourceEntry>;

    fn exists(&self, relative: &str) -> bool;

    fn read_to_string(&self, relative: &str) -> Result<String>;

    fn resolve(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }
}

#[derive(Debug, Clone)]
pub struct FileSystemResources {
    root: PathBuf,
}

impl FileSystemResources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ResourceProvider for FileSystemResources {
    fn root(&self) -> &Path {
        &self.root
    }

    fn list(&self, subdir: &str, accept: &dyn Fn(&str) -> bool) -> Vec<ResourceEntry> {
        let base = self.root.join(subdir);
        if !base.is_dir() {
            return Vec::new();
        }
        let mut out: Vec<ResourceEntry> = WalkDir::new(&base)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let rel = relative_string(&self.root, e.path())?;
                accept(&rel).then(|| ResourceEntry {
                    relative: rel,
                    path: e.into_path(),
                })
            })
            .collect();
        out.sort();
        out
    }

    fn exists(&self, relative: &str) -> bool {
        self.resolve(relative).is_file()
    }

    fn read_to_string(&self, relative: &str) -> Result<String> {
        let path = self.resolve(relative);
        fs::read_to_string(&path).map_err(|e| LintError::io(path, e))
    }
}

/// `path` relative to `root` with `/` separators, if it lies under `root`.
pub fn relative_string(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(rel.to_string_lossy().replace('\\', "/"))
}

/// Normalize a declared resource reference: `\` becomes `/`, leading `/`
/// and `./` segments are dropped, surrounding whitespace is trimmed.
pub fn normalize_reference(reference: &str) -> String {
    let mut s = reference.trim().replace('\\', "/");
    loop {
        if let Some(rest) = s.strip_prefix("./") {
            s = rest.to_string();
        } else if let Some(rest) = s.strip_prefix('/') {
            s = rest.to_string();
        } else {
            break;
        }
    }
    s
}
