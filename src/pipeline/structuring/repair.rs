//! Best-effort JSON recovery for free-text backend replies.
//!
//! The backend is asked for JSON but answers with whatever it likes. Each
//! repair step below targets one common fault, is a pure `&str -> String`
//! function, and leaves strictly valid JSON untouched:
//!
//! 1. `locate_json_span` — slice from the first opener to its last closer
//! 2. `balance_brackets` — close a truncated string and any unclosed `{`/`[`
//! 3. `insert_missing_commas` — `"a": "1" "b": "2"` → `"a": "1", "b": "2"`
//! 4. `remove_trailing_commas` — `[1, 2,]` → `[1, 2]`
//! 5. `escape_control_chars` — raw newlines/tabs inside string literals
//!
//! All steps track string literals, so brackets and commas inside quoted
//! text are never touched.

use serde_json::Value;
use thiserror::Error;

/// Failure to recover a JSON value from a reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// The text holds no `{` or `[` at all.
    #[error("no-json-found")]
    NoJsonFound,

    /// A span was found but still fails strict parsing after repair.
    #[error("unrecoverable: {reason}")]
    Unrecoverable { reason: String, raw: String },
}

impl ParseFailure {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::NoJsonFound => "no-json-found",
            Self::Unrecoverable { .. } => "unrecoverable",
        }
    }

    /// The offending reply text, when there was one worth logging.
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            Self::NoJsonFound => None,
            Self::Unrecoverable { raw, .. } => Some(raw),
        }
    }
}

/// Locate, repair, and strictly parse the JSON embedded in `text`.
///
/// The object span is tried first and the array span is the fallback, unless
/// the array opens first and reaches into the object (an outer array). A
/// valid document is always the first candidate, so it parses as-is.
pub fn repair_and_parse(text: &str) -> Result<Value, ParseFailure> {
    let spans = candidate_spans(text);
    if spans.is_empty() {
        return Err(ParseFailure::NoJsonFound);
    }

    let mut first_error: Option<String> = None;
    for span in spans {
        let repaired = repair_span(span);
        match serde_json::from_str::<Value>(&repaired) {
            Ok(value) => {
                if repaired != span {
                    tracing::debug!(
                        original_len = span.len(),
                        repaired_len = repaired.len(),
                        "Backend JSON repaired before parsing"
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                first_error.get_or_insert_with(|| e.to_string());
            }
        }
    }

    Err(ParseFailure::Unrecoverable {
        reason: first_error.unwrap_or_default(),
        raw: text.to_string(),
    })
}

/// Apply steps 2–5 to an already located span.
pub fn repair_span(span: &str) -> String {
    let balanced = balance_brackets(span);
    let with_commas = insert_missing_commas(&balanced);
    let without_trailing = remove_trailing_commas(&with_commas);
    escape_control_chars(&without_trailing)
}

/// The span starting at the first `{` (or `[`) and ending at the last `}`
/// (or `]`). It runs to end of text when the closer was truncated away, or
/// when the last closer still leaves the opener unclosed.
pub fn locate_json_span(text: &str) -> Option<&str> {
    candidate_spans(text).into_iter().next()
}

fn candidate_spans(text: &str) -> Vec<&str> {
    let object = span_for(text, '{', '}');
    let array = span_for(text, '[', ']');

    match (object, array) {
        (Some(obj), Some(arr)) if arr.start < obj.start && arr.end > obj.start => {
            vec![arr.slice(text), obj.slice(text)]
        }
        (obj, arr) => obj.into_iter().chain(arr).map(|s| s.slice(text)).collect(),
    }
}

#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
}

impl Span {
    fn slice(self, text: &str) -> &str {
        &text[self.start..self.end]
    }
}

fn span_for(text: &str, open: char, close: char) -> Option<Span> {
    let start = text.find(open)?;
    let end = text
        .rfind(close)
        .filter(|&end| end > start)
        .map(|end| end + close.len_utf8())
        .filter(|&end| opener_closes(&text[start..end]))
        .unwrap_or(text.len());
    Some(Span { start, end })
}

/// Whether the span's leading opener is matched somewhere inside it.
fn opener_closes(span: &str) -> bool {
    let mut tracker = StringTracker::default();
    let mut depth = 0usize;
    for ch in span.chars() {
        if tracker.classify(ch) != Token::Structural {
            continue;
        }
        match ch {
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

/// Close an unterminated string literal, then every unclosed `{`/`[` in
/// nesting order. Stray closers are left alone.
pub fn balance_brackets(span: &str) -> String {
    let mut tracker = StringTracker::default();
    let mut expected: Vec<char> = Vec::new();

    for ch in span.chars() {
        if tracker.classify(ch) != Token::Structural {
            continue;
        }
        match ch {
            '{' => expected.push('}'),
            '[' => expected.push(']'),
            '}' | ']' if expected.last() == Some(&ch) => {
                expected.pop();
            }
            _ => {}
        }
    }

    if expected.is_empty() && !tracker.in_string {
        return span.to_string();
    }

    let mut out = span.to_string();
    if tracker.in_string {
        // A dangling backslash would escape the closing quote.
        if tracker.escaped {
            out.pop();
        }
        out.push('"');
    }
    while let Some(closer) = expected.pop() {
        out.push(closer);
    }
    out
}

/// Insert a comma where a value ends and the next member starts with no
/// separator: before a quoted key, or between `}` and `{`.
pub fn insert_missing_commas(span: &str) -> String {
    let mut tracker = StringTracker::default();
    let mut out = String::with_capacity(span.len() + 8);
    // Byte offset just past the last value-ending character, and that character.
    let mut value_end: Option<(usize, char)> = None;

    for ch in span.chars() {
        match tracker.classify(ch) {
            Token::OpenQuote => {
                if let Some((pos, _)) = value_end.take() {
                    out.insert(pos, ',');
                }
                out.push(ch);
            }
            Token::CloseQuote => {
                out.push(ch);
                value_end = Some((out.len(), ch));
            }
            Token::InString => out.push(ch),
            Token::Structural => {
                if ch.is_whitespace() {
                    out.push(ch);
                    continue;
                }
                if ch == '{' {
                    if let Some((pos, '}')) = value_end {
                        out.insert(pos, ',');
                    }
                }
                out.push(ch);
                value_end = if is_value_end(ch) {
                    Some((out.len(), ch))
                } else {
                    None
                };
            }
        }
    }
    out
}

fn is_value_end(ch: char) -> bool {
    matches!(ch, '}' | ']') || ch.is_ascii_alphanumeric() || matches!(ch, '.' | '+' | '-')
}

/// Drop commas that directly precede `}` or `]` (whitespace allowed between).
pub fn remove_trailing_commas(span: &str) -> String {
    let mut tracker = StringTracker::default();
    let mut out = String::with_capacity(span.len());
    let mut pending: Vec<usize> = Vec::new();

    for ch in span.chars() {
        if tracker.classify(ch) == Token::Structural {
            match ch {
                ',' => pending.push(out.len()),
                '}' | ']' => {
                    for pos in pending.drain(..).rev() {
                        out.remove(pos);
                    }
                }
                c if c.is_whitespace() => {}
                _ => pending.clear(),
            }
        } else {
            pending.clear();
        }
        out.push(ch);
    }
    out
}

/// Escape raw newlines, carriage returns, and tabs inside string literals.
pub fn escape_control_chars(span: &str) -> String {
    let mut tracker = StringTracker::default();
    let mut out = String::with_capacity(span.len());

    for ch in span.chars() {
        if tracker.classify(ch) != Token::InString {
            out.push(ch);
            continue;
        }
        match ch {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Where a character sits relative to JSON string literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Structural,
    OpenQuote,
    CloseQuote,
    InString,
}

#[derive(Debug, Default)]
struct StringTracker {
    in_string: bool,
    escaped: bool,
}

impl StringTracker {
    fn classify(&mut self, ch: char) -> Token {
        if !self.in_string {
            if ch == '"' {
                self.in_string = true;
                return Token::OpenQuote;
            }
            return Token::Structural;
        }
        if self.escaped {
            self.escaped = false;
            return Token::InString;
        }
        match ch {
            '\\' => {
                self.escaped = true;
                Token::InString
            }
            '"' => {
                self.in_string = false;
                Token::CloseQuote
            }
            _ => Token::InString,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Count structural openers and closers, ignoring string contents.
    fn structural_counts(text: &str) -> (usize, usize, usize, usize) {
        let mut tracker = StringTracker::default();
        let (mut ob, mut cb, mut os, mut cs) = (0, 0, 0, 0);
        for ch in text.chars() {
            if tracker.classify(ch) != Token::Structural {
                continue;
            }
            match ch {
                '{' => ob += 1,
                '}' => cb += 1,
                '[' => os += 1,
                ']' => cs += 1,
                _ => {}
            }
        }
        (ob, cb, os, cs)
    }

    const VALID_DOCS: &[&str] = &[
        r#"{"specimens": [{"gleason_score": "7", "features": {"HGPIN": 1}}]}"#,
        r#"[{"a": 1}, {"b": [true, false, null]}]"#,
        r#"{"comment": "braces {inside} [strings], and \"quotes\" stay"}"#,
        r#"{"n": -1.5e3, "s": "x\\", "empty": {}, "list": []}"#,
        "{\n  \"a\": \"1\",\n  \"b\": \"2\"\n}",
    ];

    // ── repair_and_parse ───────────────────────────────────────

    #[test]
    fn valid_json_parses_unchanged() {
        for doc in VALID_DOCS {
            let expected: Value = serde_json::from_str(doc).unwrap();
            assert_eq!(repair_and_parse(doc).unwrap(), expected, "doc: {doc}");
            assert_eq!(repair_span(doc), *doc, "doc: {doc}");
        }
    }

    #[test]
    fn truncated_specimen_list_is_closed() {
        let value = repair_and_parse(r#"{"specimens": [{"gleason_score": "7""#).unwrap();
        assert_eq!(value, json!({"specimens": [{"gleason_score": "7"}]}));
    }

    #[test]
    fn truncated_reply_keeps_every_specimen() {
        let value =
            repair_and_parse(r#"{"specimens": [{"gleason_score": "7"}, {"gleason_score": "8""#).unwrap();
        assert_eq!(
            value,
            json!({"specimens": [{"gleason_score": "7"}, {"gleason_score": "8"}]})
        );
    }

    #[test]
    fn truncated_reply_inside_third_specimen_keeps_object() {
        let text = r#"{"specimens": [{"a": "1"}, {"b": "2"}, {"c": "3", "comment": "focal"#;
        let value = repair_and_parse(text).unwrap();
        assert_eq!(value["specimens"].as_array().unwrap().len(), 3);
        assert_eq!(value["specimens"][2]["comment"], "focal");
    }

    #[test]
    fn empty_reply_has_no_json() {
        assert_eq!(repair_and_parse(""), Err(ParseFailure::NoJsonFound));
    }

    #[test]
    fn prose_reply_has_no_json() {
        let result = repair_and_parse("I could not find any specimens in this report.");
        assert_eq!(result, Err(ParseFailure::NoJsonFound));
    }

    #[test]
    fn prose_around_object_is_ignored() {
        let text = "Sure! Here is the data:\n{\"a\": \"1\"}\nLet me know if you need more.";
        assert_eq!(repair_and_parse(text).unwrap(), json!({"a": "1"}));
    }

    #[test]
    fn missing_comma_between_pairs_is_inserted() {
        let text = r#"{"gleason_score": "7" "gleason_pattern": "3+4"}"#;
        assert_eq!(
            repair_and_parse(text).unwrap(),
            json!({"gleason_score": "7", "gleason_pattern": "3+4"})
        );
    }

    #[test]
    fn trailing_comma_is_removed() {
        let text = r#"{"specimens": [{"num_cores": "3/7",}, ],}"#;
        assert_eq!(repair_and_parse(text).unwrap(), json!({"specimens": [{"num_cores": "3/7"}]}));
    }

    #[test]
    fn short_bracket_aside_loses_to_object() {
        let text = "See note [1]: {\"a\": 1}";
        assert_eq!(repair_and_parse(text).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn unrecoverable_carries_raw_text() {
        let text = "{\"a\": : oops}";
        let err = repair_and_parse(text).unwrap_err();
        assert_eq!(err.tag(), "unrecoverable");
        assert_eq!(err.raw_text(), Some(text));
    }

    #[test]
    fn every_prefix_terminates_without_panic() {
        let doc = VALID_DOCS[0];
        for (idx, _) in doc.char_indices() {
            let _ = repair_and_parse(&doc[..idx]);
        }
    }

    // ── locate_json_span ───────────────────────────────────────

    #[test]
    fn span_stops_at_last_closer() {
        assert_eq!(locate_json_span("x {\"a\": {}} y"), Some("{\"a\": {}}"));
    }

    #[test]
    fn span_runs_to_end_when_closer_missing() {
        assert_eq!(locate_json_span("x {\"a\": [1"), Some("{\"a\": [1"));
    }

    #[test]
    fn span_prefers_outer_array() {
        assert_eq!(locate_json_span("[{\"a\": 1}]"), Some("[{\"a\": 1}]"));
    }

    #[test]
    fn span_skips_bracket_aside_before_object() {
        assert_eq!(locate_json_span("ref [1]: {\"a\": 1}"), Some("{\"a\": 1}"));
    }

    #[test]
    fn span_extends_when_last_closer_leaves_object_open() {
        let text = r#"{"specimens": [{"gleason_score": "7"}, {"gleason_score": "8""#;
        assert_eq!(locate_json_span(text), Some(text));
    }

    #[test]
    fn inner_array_after_object_opener_is_fallback_only() {
        let text = r#"note {"specimens": [1, 2]"#;
        assert_eq!(candidate_spans(text), vec![r#"{"specimens": [1, 2]"#, "[1, 2]"]);
    }

    #[test]
    fn no_opener_means_no_span() {
        assert_eq!(locate_json_span("just text }"), None);
    }

    // ── balance_brackets ───────────────────────────────────────

    #[test]
    fn balance_appends_closers_in_nesting_order() {
        assert_eq!(
            balance_brackets(r#"{"specimens": [{"gleason_score": "7""#),
            r#"{"specimens": [{"gleason_score": "7"}]}"#
        );
    }

    #[test]
    fn balance_closes_truncated_string() {
        assert_eq!(balance_brackets(r#"{"comment": "benign gla"#), r#"{"comment": "benign gla"}"#);
    }

    #[test]
    fn balance_drops_dangling_escape() {
        assert_eq!(balance_brackets(r#"{"c": "a\"#), r#"{"c": "a"}"#);
    }

    #[test]
    fn balance_ignores_brackets_in_strings() {
        let text = r#"{"c": "[{"}"#;
        assert_eq!(balance_brackets(text), text);
    }

    #[test]
    fn balance_holds_for_every_prefix() {
        for doc in VALID_DOCS {
            for (idx, _) in doc.char_indices() {
                let balanced = balance_brackets(&doc[..idx]);
                let (ob, cb, os, cs) = structural_counts(&balanced);
                assert_eq!(ob, cb, "braces in {balanced}");
                assert_eq!(os, cs, "brackets in {balanced}");
            }
        }
    }

    // ── insert_missing_commas ──────────────────────────────────

    #[test]
    fn comma_inserted_after_value_not_before_whitespace() {
        assert_eq!(
            insert_missing_commas("{\"a\": \"1\"\n  \"b\": \"2\"}"),
            "{\"a\": \"1\",\n  \"b\": \"2\"}"
        );
    }

    #[test]
    fn comma_inserted_after_number_and_literal() {
        assert_eq!(
            insert_missing_commas(r#"{"HGPIN": 0 "ASAP": true "ATYP": 1}"#),
            r#"{"HGPIN": 0, "ASAP": true, "ATYP": 1}"#
        );
    }

    #[test]
    fn comma_inserted_between_objects() {
        assert_eq!(insert_missing_commas(r#"[{"a": 1} {"b": 2}]"#), r#"[{"a": 1}, {"b": 2}]"#);
    }

    #[test]
    fn comma_insertion_ignores_quotes_in_strings() {
        let text = r#"{"c": "say \"hi\" \"there\""}"#;
        assert_eq!(insert_missing_commas(text), text);
    }

    // ── remove_trailing_commas ─────────────────────────────────

    #[test]
    fn trailing_commas_removed_across_whitespace() {
        assert_eq!(remove_trailing_commas("[1, 2 ,\n ]"), "[1, 2 \n ]");
    }

    #[test]
    fn doubled_trailing_commas_removed() {
        assert_eq!(remove_trailing_commas("[1,,]"), "[1]");
    }

    #[test]
    fn commas_in_strings_kept() {
        let text = r#"{"c": "a,}"}"#;
        assert_eq!(remove_trailing_commas(text), text);
    }

    // ── escape_control_chars ───────────────────────────────────

    #[test]
    fn raw_newline_in_string_is_escaped() {
        let value = repair_and_parse("{\"comment\": \"line one\nline two\"}").unwrap();
        assert_eq!(value, json!({"comment": "line one\nline two"}));
    }

    #[test]
    fn newline_between_tokens_kept() {
        let text = "{\n\"a\": 1\n}";
        assert_eq!(escape_control_chars(text), text);
    }
}
