// Strip markdown decoration from a raw backend reply before JSON repair.
// Models wrap JSON in ```json fences despite being told not to.

use std::sync::LazyLock;

use regex::Regex;

/// Opening fence: triple backtick or tilde, optional language tag.
static OPENING_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(```|~~~)[\w.+-]*\s*$").expect("valid regex"));

/// Closing fence: the delimiter alone.
static CLOSING_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(```|~~~)\s*$").expect("valid regex"));

/// Drop a leading fence line and a trailing bare fence line.
///
/// Returns the input unchanged when neither fence is present. Prose around
/// the JSON is left for the repair engine, which slices to the bracket span.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut lines: Vec<&str> = trimmed.lines().collect();
    let mut changed = false;

    if lines
        .first()
        .is_some_and(|line| OPENING_FENCE_RE.is_match(line.trim()))
    {
        lines.remove(0);
        changed = true;
    }

    if lines
        .last()
        .is_some_and(|line| CLOSING_FENCE_RE.is_match(line.trim()))
    {
        lines.pop();
        changed = true;
    }

    if !changed {
        return raw.to_string();
    }

    lines.join("\n").trim().to_string()
}
