//! Import extraction
//!
//! One extractor per language family:
//! - Python: tree-sitter AST walk
//! - JavaScript / TypeScript: best-effort text scan of relative specifiers
//!
//! Extractors only report what a file *asks for*; turning a request into a
//! file id is the job of [`ImportResolver`](crate::ImportResolver).

mod ecma;
mod python;

pub use ecma::EcmaImports;
pub use python::PythonImports;

use crate::error::ExtractError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Languages the graph understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    /// Python
    Python,
    /// JavaScript (including JSX and module variants)
    JavaScript,
    /// TypeScript (including TSX)
    TypeScript,
}

impl Language {
    /// Detect language from file extension
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::ALL
            .into_iter()
            .find(|lang| lang.extensions().contains(&ext))
    }

    /// All supported languages
    pub const ALL: [Language; 3] = [Language::Python, Language::JavaScript, Language::TypeScript];

    /// Get file extensions for this language
    #[inline]
    #[must_use]
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py"],
            Language::JavaScript => &["js", "jsx", "mjs", "cjs"],
            Language::TypeScript => &["ts", "tsx"],
        }
    }

    /// Get human-readable name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
        }
    }
}

/// A single import request found in a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSpec {
    /// `import a.b` or `from a.b import c, d`
    Module {
        /// Dotted module path
        module: String,
        /// Names imported from the module (empty for `import a.b`)
        names: Vec<String>,
    },
    /// `from .x import y` / `from .. import y`
    Relative {
        /// Number of leading dots
        level: usize,
        /// Dotted module after the dots, if any
        module: Option<String>,
        /// Names imported
        names: Vec<String>,
    },
    /// Relative path specifier (`./util`, `../lib/x.js`)
    Path(String),
}

/// Extracts import requests from source text
pub trait ImportExtractor {
    /// Language handled by this extractor
    fn language(&self) -> Language;

    /// Extract imports from `source`
    ///
    /// # Errors
    /// Returns [`ExtractError`] when the source cannot be parsed at all.
    fn extract(&mut self, source: &str) -> Result<Vec<ImportSpec>, ExtractError>;
}

/// One extractor of each kind, owned by a single worker thread
///
/// tree-sitter parsers are not `Sync`, so each rayon worker builds its own set.
pub struct Extractors {
    python: Result<PythonImports, ExtractError>,
    ecma: EcmaImports,
}

impl Extractors {
    /// Create a fresh extractor set
    #[must_use]
    pub fn new() -> Self {
        Self {
            python: PythonImports::new(),
            ecma: EcmaImports::new(),
        }
    }

    /// Extract imports for a file of the given language
    ///
    /// # Errors
    /// Propagates the extractor's error, or the grammar load failure for Python.
    pub fn extract(
        &mut self,
        language: Language,
        source: &str,
    ) -> Result<Vec<ImportSpec>, ExtractError> {
        match language {
            Language::Python => match &mut self.python {
                Ok(parser) => parser.extract(source),
                Err(e) => Err(e.clone()),
            },
            Language::JavaScript | Language::TypeScript => self.ecma.extract(source),
        }
    }
}

impl Default for Extractors {
    fn default() -> Self {
        Self::new()
    }
}
