//! Text normalization applied to chunks before embedding.

use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// `..`, `...` and `. .` all collapse to a single period.
static REPEATED_PERIOD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.(?: ?\.)+").expect("period pattern is valid"));

/// Artifact left behind by PDF extractors when a list item ends the line.
const PERIOD_COMMA_ARTIFACT: &str = ". ,";

/// Clean extracted text for embedding.
///
/// Newlines become spaces, whitespace runs collapse to one space, the
/// `". ,"` artifact is removed, repeated periods collapse to one, and the
/// result is trimmed. The pass runs until nothing changes, so
/// `clean(clean(x)) == clean(x)` holds even when a removal exposes a new
/// artifact.
pub fn clean(text: &str) -> String {
    let mut current = clean_pass(text);
    loop {
        let next = clean_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn clean_pass(text: &str) -> String {
    let t = text.replace('\n', " ");
    let t = WHITESPACE_RUN.replace_all(&t, " ");
    let t = t.replace(PERIOD_COMMA_ARTIFACT, "");
    let t = REPEATED_PERIOD.replace_all(&t, ".");
    t.trim().to_string()
}

/// Short single-line preview of a chunk for log lines.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .take(max_chars)
        .collect();
    if text.chars().count() > max_chars {
        format!("{flat}...")
    } else {
        flat
    }
}
