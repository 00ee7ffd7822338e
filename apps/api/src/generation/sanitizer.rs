//! Best-effort repair of JSON-ish completion text.
//!
//! This is a boundary trim, NOT a parser: it does not balance nested braces,
//! escape control characters or close truncated strings. Callers must treat
//! the subsequent parse as fallible.

use serde_json::{Map, Value};

/// Trims the text, drops everything before the first `{` and after the last
/// `}`, then makes sure the result starts with `{` and ends with `}`.
///
/// Each edge is only cut when its brace exists, so one-sided text keeps its
/// content: `"a":1}` becomes `{"a":1}` and a reply cut off mid-string stays
/// cut off (and fails to parse).
pub fn sanitize(raw: &str) -> String {
    let mut core = raw.trim();
    if let Some(start) = core.find('{') {
        core = &core[start..];
    }
    if let Some(end) = core.rfind('}') {
        core = &core[..=end];
    }

    let mut sanitized = String::with_capacity(core.len() + 2);
    if !core.starts_with('{') {
        sanitized.push('{');
    }
    sanitized.push_str(core);
    if !sanitized.ends_with('}') {
        sanitized.push('}');
    }
    sanitized
}

/// Sanitizes and parses completion text into a JSON object.
pub fn parse_object(raw: &str) -> Result<Map<String, Value>, serde_json::Error> {
    serde_json::from_str(&sanitize(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_surrounding_prose() {
        assert_eq!(
            sanitize("Sure! {\"name\":\"Tacos\"} Enjoy!"),
            "{\"name\":\"Tacos\"}"
        );
    }

    #[test]
    fn test_inserts_missing_braces() {
        assert_eq!(sanitize("\"name\":\"Tacos\""), "{\"name\":\"Tacos\"}");
    }

    #[test]
    fn test_strips_markdown_fences() {
        let raw = "```json\n{\"name\": \"Tacos\", \"tags\": [\"mexican\"]}\n```";
        assert_eq!(sanitize(raw), "{\"name\": \"Tacos\", \"tags\": [\"mexican\"]}");
    }

    #[test]
    fn test_unbalanced_braces_are_not_repaired() {
        let raw = "{\"name\":\"Tacos\",\"steps\":{\"one\":\"fry\"}";
        assert_eq!(sanitize(raw), raw);
        assert!(parse_object(raw).is_err());
    }

    #[test]
    fn test_opening_brace_without_close_keeps_content() {
        let truncated = "{\"name\":\"Leg Day\",\"description\":\"Squats and lun";
        assert_eq!(sanitize(truncated), format!("{truncated}}}"));
        assert!(parse_object(truncated).is_err());
    }

    #[test]
    fn test_closing_brace_without_open_keeps_content() {
        assert_eq!(sanitize("\"name\":\"Tacos\"} Enjoy!"), "{\"name\":\"Tacos\"}");
        assert_eq!(parse_object("\"name\":\"Tacos\"}").unwrap()["name"], "Tacos");
    }

    #[test]
    fn test_close_before_open_drops_the_leading_text() {
        assert_eq!(sanitize("} stray {\"a\":1"), "{\"a\":1}");
    }

    #[test]
    fn test_idempotent_on_braced_text() {
        for input in [
            "{}",
            "{\"a\":1}",
            "{\"a\":{\"b\":2}} trailing }",
            "{ not json at all }",
        ] {
            let braced = sanitize(input);
            assert_eq!(sanitize(&braced), braced, "input: {input}");
        }
    }

    #[test]
    fn test_keeps_inner_braces_between_first_and_last() {
        assert_eq!(sanitize("x {a} y {b} z"), "{a} y {b}");
    }

    #[test]
    fn test_empty_input_becomes_empty_object() {
        assert_eq!(sanitize("   "), "{}");
    }

    #[test]
    fn test_parse_object_accepts_wrapped_json() {
        let parsed = parse_object("Here you go:\n{\"name\":\"Tacos\",\"level\":\"Easy\"}").unwrap();
        assert_eq!(parsed["name"], "Tacos");
    }

    #[test]
    fn test_parse_object_rejects_arrays() {
        assert!(parse_object("[1, 2, 3]").is_err());
    }
}
