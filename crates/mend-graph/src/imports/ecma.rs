//! JavaScript / TypeScript relative import scan
//!
//! Only relative specifiers (`./`, `../`) can point at workspace files, so
//! bare package names are dropped here.

use super::{ImportExtractor, ImportSpec, Language};
use crate::error::ExtractError;
use once_cell::sync::Lazy;
use regex::Regex;

static SPECIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)(?:\bimport\s+(?:[^'"`;]*?\s+from\s+)?|\bexport\s+[^'"`;]*?\s+from\s+|\brequire\s*\(\s*|\bimport\s*\(\s*)['"]([^'"]+)['"]"#,
    )
    .expect("static regex is valid")
});

/// Regex-based extractor for ES modules and CommonJS `require`
#[derive(Debug, Default, Clone, Copy)]
pub struct EcmaImports;

impl EcmaImports {
    /// Create extractor
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ImportExtractor for EcmaImports {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    fn extract(&mut self, source: &str) -> Result<Vec<ImportSpec>, ExtractError> {
        Ok(SPECIFIER
            .captures_iter(source)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|spec| spec.starts_with('.'))
            .map(|spec| ImportSpec::Path(spec.to_string()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(source: &str) -> Vec<String> {
        EcmaImports::new()
            .extract(source)
            .unwrap()
            .into_iter()
            .filter_map(|spec| match spec {
                ImportSpec::Path(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn finds_all_relative_forms() {
        let source = r#"
import x from './x';
import { a, b } from "../lib/ab";
import './side-effect';
export * from './reexport';
const y = require('./y.js');
const z = await import('./lazy');
"#;
        assert_eq!(
            paths(source),
            vec!["./x", "../lib/ab", "./side-effect", "./reexport", "./y.js", "./lazy"]
        );
    }

    #[test]
    fn bare_packages_are_ignored() {
        assert!(paths("import React from 'react';\nconst fs = require('fs');\n").is_empty());
    }
}
