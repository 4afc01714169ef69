//! Workspace scanning
//!
//! Walks the workspace once, collecting every recognised source file along
//! with the metadata needed to detect changes between builds.

use crate::error::GraphError;
use crate::imports::Language;
use crate::path::path_to_id;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::{DirEntry, WalkDir};

/// Directory names never descended into
pub const EXCLUDED_DIRS: [&str; 6] = ["target", "node_modules", "__pycache__", "venv", "build", "dist"];

/// A source file discovered during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Root-relative id (`pkg/mod.py`)
    pub id: String,
    /// Absolute path on disk
    pub path: PathBuf,
    /// Detected language
    pub language: Language,
    /// File size in bytes
    pub len: u64,
    /// Modification time as nanoseconds since the epoch (0 if unavailable)
    pub modified: u128,
}

/// Content-independent fingerprint of a workspace's source set
///
/// Changes whenever a source file is added, removed, resized or touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkspaceFingerprint([u8; 32]);

impl WorkspaceFingerprint {
    /// Compute fingerprint over scanned files (order-sensitive; scans are sorted)
    #[must_use]
    pub fn of(files: &[SourceFile]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for file in files {
            hasher.update(file.id.as_bytes());
            hasher.update(&[0]);
            hasher.update(&file.len.to_le_bytes());
            hasher.update(&file.modified.to_le_bytes());
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// Hex form, for logging
    #[must_use]
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

/// Ensure `root` is an existing directory
///
/// # Errors
/// Returns [`GraphError::RootNotFound`] or [`GraphError::NotADirectory`].
pub fn check_root(root: &Path) -> Result<(), GraphError> {
    let meta = std::fs::metadata(root).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            GraphError::RootNotFound(root.to_path_buf())
        } else {
            GraphError::io_error(root, e)
        }
    })?;
    if meta.is_dir() {
        Ok(())
    } else {
        Err(GraphError::NotADirectory(root.to_path_buf()))
    }
}

/// Scan `root` for source files, sorted by id
///
/// Hidden entries and [`EXCLUDED_DIRS`] are skipped. Unreadable entries are
/// logged and ignored.
///
/// # Errors
/// Fails only when `root` itself is unusable.
pub fn scan_workspace(root: &Path) -> Result<Vec<SourceFile>, GraphError> {
    check_root(root)?;

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_excluded(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(language) = Language::from_path(entry.path()) else {
            continue;
        };
        let Some(id) = path_to_id(root, entry.path()) else {
            continue;
        };
        let (len, modified) = match entry.metadata() {
            Ok(meta) => (meta.len(), modified_nanos(meta.modified().ok())),
            Err(_) => (0, 0),
        };
        files.push(SourceFile {
            id,
            path: entry.path().to_path_buf(),
            language,
            len,
            modified,
        });
    }

    files.sort_by(|a, b| a.id.cmp(&b.id));
    tracing::debug!("Scanned {} source files under {}", files.len(), root.display());
    Ok(files)
}

fn is_excluded(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return true;
    }
    entry.file_type().is_dir() && EXCLUDED_DIRS.contains(&name.as_ref())
}

fn modified_nanos(time: Option<SystemTime>) -> u128 {
    time.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x = 1\n").unwrap();
    }

    #[test]
    fn scan_skips_hidden_and_build_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "a.py");
        touch(root, "pkg/b.py");
        touch(root, ".git/hooks/c.py");
        touch(root, "venv/lib/d.py");
        touch(root, "__pycache__/e.py");
        touch(root, "node_modules/x/index.js");
        touch(root, ".hidden.py");
        touch(root, "notes.txt");

        let ids: Vec<_> = scan_workspace(root)
            .unwrap()
            .into_iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, vec!["a.py", "pkg/b.py"]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            scan_workspace(&missing),
            Err(GraphError::RootNotFound(_))
        ));
    }

    #[test]
    fn file_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.py");
        assert!(matches!(
            scan_workspace(&dir.path().join("a.py")),
            Err(GraphError::NotADirectory(_))
        ));
    }

    #[test]
    fn fingerprint_tracks_file_set() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.py");
        let before = WorkspaceFingerprint::of(&scan_workspace(dir.path()).unwrap());
        let again = WorkspaceFingerprint::of(&scan_workspace(dir.path()).unwrap());
        assert_eq!(before, again);

        touch(dir.path(), "b.py");
        let after = WorkspaceFingerprint::of(&scan_workspace(dir.path()).unwrap());
        assert_ne!(before, after);
        assert_eq!(after.to_hex().len(), 64);
    }
}
