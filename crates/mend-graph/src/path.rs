//! File identifiers
//!
//! Every node in the graph is keyed by its path relative to the workspace
//! root, always using `/` as the separator (`pkg/mod.py`).

use std::path::{Component, Path};

/// Convert a path found while walking `root` into a file id
#[must_use]
pub fn path_to_id(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_string()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Normalize a caller-supplied file reference into a file id
///
/// Accepts `./a.py`, `a\b.py`, and absolute paths under `root`. Anything that
/// cannot be expressed relative to the root is returned cleaned but otherwise
/// untouched so the caller still reports it.
#[must_use]
pub fn normalize_file_id(root: &Path, raw: &str) -> String {
    let cleaned = raw.trim().replace('\\', "/");
    let as_path = Path::new(&cleaned);

    if as_path.is_absolute() {
        if let Some(id) = path_to_id(root, as_path) {
            return id;
        }
        if let Ok(canonical_root) = root.canonicalize() {
            if let Some(id) = path_to_id(&canonical_root, as_path) {
                return id;
            }
        }
        return cleaned;
    }

    normalize_relative(&cleaned).unwrap_or(cleaned)
}

/// Collapse `.` and `..` segments of a relative `/`-separated path
///
/// Returns `None` when the path escapes its base.
#[must_use]
pub fn normalize_relative(path: &str) -> Option<String> {
    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop()?;
            }
            other => stack.push(other),
        }
    }
    Some(stack.join("/"))
}

/// Directory part of a file id (`""` for top-level files)
#[must_use]
pub fn parent_dir(id: &str) -> &str {
    id.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Join two `/`-separated fragments, ignoring empty ones
#[must_use]
pub fn join(base: &str, tail: &str) -> String {
    match (base.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{tail}"),
    }
}
