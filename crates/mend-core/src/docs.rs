//! Documentation proposals
//!
//! - [`DocProposer`] collaborator interface
//! - [`DocstringProposer`]: flags Python definitions with missing or thin
//!   docstrings and asks the generator for replacements

use crate::error::DocError;
use crate::prompts;
use async_trait::async_trait;
use mend_healing::TextGenerator;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::sync::Arc;
use tree_sitter::{Node, Parser};

/// Docstrings shorter than this are treated as insufficient
pub const MIN_DOCSTRING_LEN: usize = 20;

/// Confidence attached to generated docstrings
pub const DOCSTRING_CONFIDENCE: f32 = 0.8;

/// What a proposal changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocChangeKind {
    /// Python function or class docstring
    Docstring,
}

impl DocChangeKind {
    /// Lowercase name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docstring => "docstring",
        }
    }
}

impl fmt::Display for DocChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One proposed documentation change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocProposal {
    /// What is changed
    pub kind: DocChangeKind,
    /// File the definition lives in
    pub file: String,
    /// e.g. `"Line 12: parse"`
    pub location: String,
    /// Why the change is proposed
    pub reason: String,
    /// Existing text, empty when missing
    pub current_text: String,
    /// Replacement text
    pub proposed_text: String,
    /// 0.0 to 1.0
    pub confidence: f32,
}

/// Result of a documentation pass
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocSyncReport {
    /// Whether any proposal was made
    pub changes_detected: bool,
    /// Proposals in source order
    pub proposals: Vec<DocProposal>,
    /// Counts grouped by kind
    pub summary: String,
}

impl DocSyncReport {
    /// Report over `proposals` with a summary grouped by kind
    #[must_use]
    pub fn from_proposals(proposals: Vec<DocProposal>) -> Self {
        let summary = summarize(&proposals);
        Self {
            changes_detected: !proposals.is_empty(),
            proposals,
            summary,
        }
    }
}

fn summarize(proposals: &[DocProposal]) -> String {
    if proposals.is_empty() {
        return "No documentation updates needed.".to_string();
    }
    let mut by_kind: BTreeMap<DocChangeKind, usize> = BTreeMap::new();
    for p in proposals {
        *by_kind.entry(p.kind).or_default() += 1;
    }
    let mut summary = format!("Found {} documentation updates:\n", proposals.len());
    for (kind, count) in by_kind {
        let _ = writeln!(summary, "- {}: {count} changes", kind.as_str().to_uppercase());
    }
    summary
}

/// Proposes documentation updates for generated code
#[async_trait]
pub trait DocProposer: Send + Sync {
    /// Inspect `code` (belonging to `changed_files`) and propose updates
    ///
    /// # Errors
    /// Returns [`DocError`] when the proposer cannot complete.
    async fn propose_changes(
        &self,
        code: &str,
        changed_files: &[String],
    ) -> Result<DocSyncReport, DocError>;
}

/// Python function or class found in source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    /// `"function"` or `"class"`
    pub kind: &'static str,
    /// Identifier
    pub name: String,
    /// Rendered `def` or `class` header
    pub signature: String,
    /// Existing docstring, empty when missing
    pub docstring: String,
    /// 1-based
    pub line: usize,
    /// Full source text of the definition
    pub body: String,
}

impl Definition {
    /// Whether the docstring is missing or too short
    #[must_use]
    pub fn needs_docstring(&self) -> bool {
        self.docstring.chars().count() < MIN_DOCSTRING_LEN
    }
}

/// Extract function and class definitions with their docstrings
///
/// # Errors
/// [`DocError::Grammar`] or [`DocError::Parse`] when tree-sitter cannot run.
pub fn extract_definitions(code: &str) -> Result<Vec<Definition>, DocError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| DocError::Grammar(e.to_string()))?;
    let tree = parser.parse(code, None).ok_or(DocError::Parse)?;
    let mut out = Vec::new();
    collect(tree.root_node(), code.as_bytes(), &mut out);
    Ok(out)
}

fn collect(node: Node<'_>, source: &[u8], out: &mut Vec<Definition>) {
    let kind = match node.kind() {
        "function_definition" => Some("function"),
        "class_definition" => Some("class"),
        _ => None,
    };
    if let Some(kind) = kind {
        if let Some(def) = definition(node, kind, source) {
            out.push(def);
        }
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect(child, source, out);
    }
}

fn definition(node: Node<'_>, kind: &'static str, source: &[u8]) -> Option<Definition> {
    let name = text(node.child_by_field_name("name")?, source)?.to_string();
    let signature = if kind == "class" {
        format!("class {name}")
    } else {
        let params = node
            .child_by_field_name("parameters")
            .and_then(|p| text(p, source))
            .unwrap_or("()");
        match node.child_by_field_name("return_type").and_then(|r| text(r, source)) {
            Some(ret) => format!("def {name}{params} -> {ret}"),
            None => format!("def {name}{params}"),
        }
    };
    let docstring = node
        .child_by_field_name("body")
        .and_then(|body| docstring(body, source))
        .unwrap_or_default();
    Some(Definition {
        kind,
        name,
        signature,
        docstring,
        line: node.start_position().row + 1,
        body: text(node, source).unwrap_or_default().to_string(),
    })
}

fn docstring(body: Node<'_>, source: &[u8]) -> Option<String> {
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0)?;
    if string.kind() != "string" {
        return None;
    }
    let mut cursor = string.walk();
    let content: String = string
        .named_children(&mut cursor)
        .filter(|c| c.kind() == "string_content")
        .filter_map(|c| text(c, source))
        .collect();
    Some(content.trim().to_string())
}

fn text<'a>(node: Node<'_>, source: &'a [u8]) -> Option<&'a str> {
    node.utf8_text(source).ok()
}

/// Default [`DocProposer`]: docstrings written by a [`TextGenerator`]
pub struct DocstringProposer {
    generator: Arc<dyn TextGenerator>,
}

impl DocstringProposer {
    /// Proposer backed by `generator`
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl DocProposer for DocstringProposer {
    async fn propose_changes(
        &self,
        code: &str,
        changed_files: &[String],
    ) -> Result<DocSyncReport, DocError> {
        let file = changed_files
            .first()
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());

        let mut proposals = Vec::new();
        for def in extract_definitions(code)? {
            if !def.needs_docstring() {
                continue;
            }
            tracing::info!("Missing or insufficient docstring for: {}", def.name);
            let prompt = prompts::docstring(def.kind, &def.name, &def.signature, &def.body);
            let response = self.generator.generate(&prompt).await?;
            let reason = if def.docstring.is_empty() {
                "Missing docstring"
            } else {
                "Insufficient docstring"
            };
            proposals.push(DocProposal {
                kind: DocChangeKind::Docstring,
                file: file.clone(),
                location: format!("Line {}: {}", def.line, def.name),
                reason: reason.to_string(),
                current_text: def.docstring,
                proposed_text: clean_docstring(&response),
                confidence: DOCSTRING_CONFIDENCE,
            });
        }

        tracing::info!(
            "Documentation analysis complete: {} potential updates",
            proposals.len()
        );
        Ok(DocSyncReport::from_proposals(proposals))
    }
}

fn clean_docstring(response: &str) -> String {
    let trimmed = response.trim();
    let unquoted = trimmed
        .strip_prefix("\"\"\"")
        .and_then(|s| s.strip_suffix("\"\"\""))
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mend_healing::GenerationError;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = r#"
def documented(a: int) -> int:
    """Return a plus one, used by the counter."""
    return a + 1

def bare(x):
    return x

class Thin:
    """Short."""

    def method(self):
        pass
"#;

    struct Fixed;

    #[async_trait]
    impl TextGenerator for Fixed {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            Ok("\"\"\"Generated docstring.\"\"\"".to_string())
        }
    }

    #[test]
    fn definitions_and_docstrings_are_extracted() {
        let defs = extract_definitions(SOURCE).unwrap();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["documented", "bare", "Thin", "method"]);
        assert_eq!(defs[0].signature, "def documented(a: int) -> int");
        assert_eq!(defs[0].docstring, "Return a plus one, used by the counter.");
        assert_eq!(defs[1].line, 6);
        assert_eq!(defs[2].signature, "class Thin");
        assert_eq!(defs[2].docstring, "Short.");
        assert!(!defs[0].needs_docstring());
        assert!(defs[1].needs_docstring());
        assert!(defs[2].needs_docstring());
    }

    #[tokio::test]
    async fn proposals_cover_missing_and_short_docstrings() {
        let proposer = DocstringProposer::new(Arc::new(Fixed));
        let report = proposer
            .propose_changes(SOURCE, &["pkg/mod.py".to_string()])
            .await
            .unwrap();

        assert!(report.changes_detected);
        let locations: Vec<&str> = report.proposals.iter().map(|p| p.location.as_str()).collect();
        assert_eq!(locations, vec!["Line 6: bare", "Line 9: Thin", "Line 12: method"]);
        assert_eq!(report.proposals[0].reason, "Missing docstring");
        assert_eq!(report.proposals[1].reason, "Insufficient docstring");
        assert_eq!(report.proposals[0].proposed_text, "Generated docstring.");
        assert!(report.proposals.iter().all(|p| p.file == "pkg/mod.py"));
        assert!(report.summary.contains("DOCSTRING: 3 changes"));
        assert!(report.proposals.iter().all(|p| p.kind == DocChangeKind::Docstring));
        assert_eq!(
            serde_json::to_value(&report.proposals[0]).unwrap()["kind"],
            "docstring"
        );
    }

    #[tokio::test]
    async fn no_files_means_unknown_target() {
        let proposer = DocstringProposer::new(Arc::new(Fixed));
        let report = proposer.propose_changes("def f():\n    pass\n", &[]).await.unwrap();
        assert_eq!(report.proposals[0].file, "unknown");
    }

    #[test]
    fn empty_report_summary() {
        let report = DocSyncReport::from_proposals(Vec::new());
        assert!(!report.changes_detected);
        assert_eq!(report.summary, "No documentation updates needed.");
    }
}
