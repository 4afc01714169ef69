//! Failure classification
//!
//! Categories are advisory metadata for fix requests; they never change
//! control flow.

use once_cell::sync::Lazy;
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad kind of test failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Code does not parse
    Syntax,
    /// Missing module or unresolved name
    ImportOrReference,
    /// Wrong type or missing attribute
    Type,
    /// Assertion failed
    AssertionOrLogic,
    /// Other runtime exception
    Runtime,
    /// Nothing recognised
    Unknown,
}

impl FailureCategory {
    /// Short label
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::ImportOrReference => "import",
            Self::Type => "type",
            Self::AssertionOrLogic => "logic",
            Self::Runtime => "runtime",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const PATTERNS: [(FailureCategory, &str); 15] = [
    (FailureCategory::Syntax, r"(?i)SyntaxError"),
    (FailureCategory::Syntax, r"(?i)IndentationError"),
    (FailureCategory::ImportOrReference, r"(?i)ImportError"),
    (FailureCategory::ImportOrReference, r"(?i)ModuleNotFoundError"),
    (FailureCategory::ImportOrReference, r"(?i)\bNameError"),
    (FailureCategory::Type, r"(?i)TypeError"),
    (FailureCategory::Type, r"(?i)AttributeError"),
    (FailureCategory::AssertionOrLogic, r"(?i)AssertionError"),
    (FailureCategory::AssertionOrLogic, r"(?m)^E\s+assert\b"),
    (FailureCategory::Runtime, r"(?i)RuntimeError"),
    (FailureCategory::Runtime, r"(?i)ValueError"),
    (FailureCategory::Runtime, r"(?i)KeyError"),
    (FailureCategory::Runtime, r"(?i)IndexError"),
    (FailureCategory::Runtime, r"(?i)ZeroDivisionError"),
    (FailureCategory::Runtime, r"(?i)RecursionError"),
];

static FAILURE_SET: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new(PATTERNS.iter().map(|(_, p)| *p)).expect("static failure patterns are valid")
});

const FAILURE_MARKERS: [&str; 4] = ["Error:", "FAILED", "ERROR", "Traceback"];

/// Categories found in a single failure message, or `[Unknown]`
#[must_use]
pub fn classify(text: &str) -> Vec<FailureCategory> {
    let mut found: Vec<FailureCategory> = FAILURE_SET
        .matches(text)
        .into_iter()
        .map(|i| PATTERNS[i].0)
        .collect();
    found.sort();
    found.dedup();
    if found.is_empty() {
        found.push(FailureCategory::Unknown);
    }
    found
}

/// Categories across every failure in a test run's output
///
/// `Unknown` only appears when nothing else was recognised.
#[must_use]
pub fn categorize(output: &str) -> Vec<FailureCategory> {
    let mut all: Vec<FailureCategory> = split_failures(output)
        .iter()
        .flat_map(|failure| classify(failure))
        .filter(|c| *c != FailureCategory::Unknown)
        .collect();
    all.sort();
    all.dedup();
    if all.is_empty() {
        all.push(FailureCategory::Unknown);
    }
    all
}

/// Split test output into individual failure chunks
///
/// A new chunk starts at any line containing a failure marker; blank lines
/// are dropped.
#[must_use]
pub fn split_failures(output: &str) -> Vec<String> {
    let mut failures = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in output.lines() {
        if FAILURE_MARKERS.iter().any(|m| line.contains(m)) && !current.is_empty() {
            failures.push(current.join("\n"));
            current.clear();
        }
        if !line.trim().is_empty() {
            current.push(line);
        }
    }
    if !current.is_empty() {
        failures.push(current.join("\n"));
    }
    failures
}

/// Comma-separated labels (`"syntax, type"`)
#[must_use]
pub fn join_labels(categories: &[FailureCategory]) -> String {
    categories
        .iter()
        .map(FailureCategory::label)
        .collect::<Vec<_>>()
        .join(", ")
}
