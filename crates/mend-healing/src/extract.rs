//! Pull code out of a generator response

use once_cell::sync::Lazy;
use regex::Regex;

static PYTHON_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:python|py)[ \t]*\r?\n(.*?)\r?\n[ \t]*```").expect("static regex is valid")
});

static ANY_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)\r?\n[ \t]*```").expect("static regex is valid")
});

/// First ```python block, else first fenced block, else the trimmed response
#[must_use]
pub fn extract_code(response: &str) -> String {
    PYTHON_FENCE
        .captures(response)
        .or_else(|| ANY_FENCE.captures(response))
        .and_then(|caps| caps.get(1))
        .map_or_else(|| response.trim().to_string(), |m| m.as_str().to_string())
}
