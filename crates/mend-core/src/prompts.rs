//! Generator prompts for the workflow stages

use std::fmt::Write as _;

/// Prompt asking for code that implements `request` across `impacted_files`
#[must_use]
pub fn code_generation(request: &str, impacted_files: &[String]) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Implement the following change in Python.");
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Request: {request}");
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Files affected by the change:");
    for file in impacted_files {
        let _ = writeln!(prompt, "- {file}");
    }
    let _ = writeln!(prompt);
    let _ = writeln!(
        prompt,
        "Keep existing callers working. Return the complete code in a ```python block."
    );
    prompt
}

/// Prompt asking for self-contained pytest tests for `code`
#[must_use]
pub fn test_generation(code: &str, request: Option<&str>) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Write pytest tests for the code below.");
    if let Some(request) = request {
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "The code was written for this request: {request}");
    }
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "```python\n{code}\n```");
    let _ = writeln!(prompt);
    let _ = writeln!(
        prompt,
        "The code is importable as `generated_code`. Tests must be self-contained,"
    );
    let _ = writeln!(prompt, "cover normal and edge cases, and come back in a ```python block.");
    prompt
}

/// Prompt asking for a Google-style docstring
#[must_use]
pub fn docstring(kind: &str, name: &str, signature: &str, body: &str) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Write a Google-style docstring for this Python {kind} `{name}`.");
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Signature: {signature}");
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "```python\n{body}\n```");
    let _ = writeln!(prompt);
    let _ = writeln!(
        prompt,
        "Include a summary line, Args, Returns and Raises where they apply."
    );
    let _ = writeln!(prompt, "Return only the docstring text without quotes.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_prompt_lists_request_and_files() {
        let prompt = code_generation("rename foo", &["a.py".into(), "b.py".into()]);
        assert!(prompt.contains("Request: rename foo"));
        assert!(prompt.contains("- a.py"));
        assert!(prompt.contains("- b.py"));
    }

    #[test]
    fn test_prompt_embeds_code() {
        let prompt = test_generation("def f(): pass", None);
        assert!(prompt.contains("def f(): pass"));
        assert!(prompt.contains("pytest"));
        assert!(!prompt.contains("request:"));
    }
}
