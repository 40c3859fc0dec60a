//! Code block unwrapping for model-authored scripts.
//!
//! Language models often wrap the code they write in markdown fences. This
//! module strips the fence so the script can be staged for execution. The
//! result is still untrusted code; unwrapping is purely textual.

use std::sync::LazyLock;

use regex::Regex;

/// A fenced block tagged as Python. A missing closing fence runs to the end.
static PYTHON_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:python3?|py)[ \t]*\r?\n(.*?)(?:```|\z)")
        .expect("Invalid regex for python code block")
});

/// Any fenced block, with an optional language tag on the opening line.
static GENERIC_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:[\w+.-]*[ \t]*\r?\n)?(.*?)(?:```|\z)")
        .expect("Invalid regex for generic code block")
});

/// Extracts the body of a Python-tagged fenced block.
pub fn extract_python_block(content: &str) -> Option<String> {
    let caps = PYTHON_BLOCK.captures(content)?;
    Some(caps.get(1)?.as_str().trim().to_string())
}

/// Extracts the body of the first fenced block of any language.
pub fn extract_any_block(content: &str) -> Option<String> {
    let caps = GENERIC_BLOCK.captures(content)?;
    Some(caps.get(1)?.as_str().trim().to_string())
}

/// Returns the code inside a model response.
///
/// Strategies, in order:
/// 1. The first ```` ```python ```` block
/// 2. The first fenced block of any language
/// 3. The raw text, unchanged
pub fn unwrap_code_block(content: &str) -> String {
    extract_python_block(content)
        .or_else(|| extract_any_block(content))
        .unwrap_or_else(|| content.to_string())
}
