//! Map import requests onto workspace file ids
//!
//! Resolution only ever returns ids that were seen during the scan; imports
//! of the standard library or third-party packages simply resolve to nothing.

use crate::imports::ImportSpec;
use crate::path::{join, normalize_relative, parent_dir};
use std::collections::HashSet;

const ECMA_EXTENSIONS: [&str; 6] = ["ts", "tsx", "js", "jsx", "mjs", "cjs"];

/// Resolves [`ImportSpec`]s against a known set of file ids
#[derive(Debug, Clone)]
pub struct ImportResolver<'a> {
    known: &'a HashSet<String>,
    source_roots: &'a [String],
}

impl<'a> ImportResolver<'a> {
    /// Create resolver over `known` ids, trying each of `source_roots` for
    /// absolute Python modules (`""` is the workspace root itself)
    #[must_use]
    pub fn new(known: &'a HashSet<String>, source_roots: &'a [String]) -> Self {
        Self {
            known,
            source_roots,
        }
    }

    /// Resolve every target `spec` refers to from file `importer`
    #[must_use]
    pub fn resolve(&self, importer: &str, spec: &ImportSpec) -> Vec<String> {
        let mut targets = Vec::new();
        match spec {
            ImportSpec::Module { module, names } => {
                let base = module.replace('.', "/");
                for root in self.source_roots {
                    let root = root.trim_matches('/');
                    let dir = join(root, &base);
                    self.push_python(&dir, names, &mut targets);
                }
            }
            ImportSpec::Relative {
                level,
                module,
                names,
            } => {
                let mut dir = parent_dir(importer).to_string();
                for _ in 1..*level {
                    if dir.is_empty() {
                        return targets;
                    }
                    dir = parent_dir(&dir).to_string();
                }
                let dir = match module {
                    Some(m) => join(&dir, &m.replace('.', "/")),
                    None => dir,
                };
                self.push_python(&dir, names, &mut targets);
            }
            ImportSpec::Path(spec) => {
                if let Some(id) = self.resolve_ecma(importer, spec) {
                    targets.push(id);
                }
            }
        }
        targets.retain(|t| t != importer);
        targets.dedup();
        targets
    }

    /// `a/b` -> `a/b.py` | `a/b/__init__.py`, then `a/b/<name>.py` for each
    /// imported name that is itself a submodule
    fn push_python(&self, module_path: &str, names: &[String], out: &mut Vec<String>) {
        if !module_path.is_empty() {
            if let Some(id) = self.python_module(module_path) {
                push_unique(out, id);
            }
        }
        for name in names {
            if name == "*" {
                continue;
            }
            let candidate = join(module_path, &name.replace('.', "/"));
            if let Some(id) = self.python_module(&candidate) {
                push_unique(out, id);
            }
        }
    }

    fn python_module(&self, module_path: &str) -> Option<String> {
        let file = format!("{module_path}.py");
        if self.known.contains(&file) {
            return Some(file);
        }
        let package = format!("{module_path}/__init__.py");
        self.known.contains(&package).then_some(package)
    }

    fn resolve_ecma(&self, importer: &str, spec: &str) -> Option<String> {
        let joined = join(parent_dir(importer), spec);
        let base = normalize_relative(&joined)?;
        if base.is_empty() {
            return None;
        }
        if self.known.contains(&base) {
            return Some(base);
        }
        ECMA_EXTENSIONS
            .iter()
            .map(|ext| format!("{base}.{ext}"))
            .chain(ECMA_EXTENSIONS.iter().map(|ext| format!("{base}/index.{ext}")))
            .find(|candidate| self.known.contains(candidate))
    }
}

fn push_unique(out: &mut Vec<String>, id: String) {
    if !out.contains(&id) {
        out.push(id);
    }
}
