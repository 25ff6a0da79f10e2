//! Response normalization — heterogeneous provider output becomes exactly
//! `n` suggestion strings, no matter what came back.
//!
//! Decode and shape failures never propagate: they degrade to placeholder
//! strings that embed the user's instruction, so downstream code never
//! has to special-case array length or missing output. This lenient
//! policy (pad, don't retry) is deliberate.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

/// Why a provider payload could not be decoded. Always recovered locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    /// Not JSON at all.
    Unparseable,
    /// Valid JSON of the wrong shape.
    WrongShape,
}

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").expect("fence regex compiles")
});

/// Strip a fenced code block if the payload is wrapped in one; otherwise
/// return the payload untouched.
pub fn strip_code_fence(content: &str) -> &str {
    match CODE_FENCE.captures(content) {
        Some(caps) => caps.get(1).map_or(content, |m| m.as_str()),
        None => content,
    }
}

/// Decode a bare JSON array of strings.
pub fn decode_string_array(raw: &str) -> Result<Vec<String>, Malformed> {
    let value: Value = serde_json::from_str(raw).map_err(|_| Malformed::Unparseable)?;
    as_string_array(&value).ok_or(Malformed::WrongShape)
}

/// Decode a JSON object whose single `suggestions` key holds an array of
/// strings, optionally wrapped in a fenced code block.
pub fn decode_suggestions_object(raw: &str) -> Result<Vec<String>, Malformed> {
    let value: Value =
        serde_json::from_str(strip_code_fence(raw)).map_err(|_| Malformed::Unparseable)?;
    let arr = value.get("suggestions").ok_or(Malformed::WrongShape)?;
    as_string_array(arr).ok_or(Malformed::WrongShape)
}

fn as_string_array(value: &Value) -> Option<Vec<String>> {
    let arr = value.as_array()?;
    arr.iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// Force a suggestion list to exactly `n` entries: truncate an
/// over-delivery, pad an under-delivery with shortfall placeholders.
pub fn fit_to_count(
    mut suggestions: Vec<String>,
    n: usize,
    provider: &str,
    query: &str,
) -> Vec<String> {
    if suggestions.len() > n {
        suggestions.truncate(n);
    } else if suggestions.len() < n {
        warn!(
            provider,
            returned = suggestions.len(),
            requested = n,
            "provider under-delivered, padding with placeholders"
        );
        while suggestions.len() < n {
            suggestions.push(format!(
                "[Less than {n} {provider} suggestions for '{query}']"
            ));
        }
    }
    suggestions
}

/// Placeholder batch for a payload that failed to decode.
pub fn decode_failure_placeholders(
    failure: Malformed,
    n: usize,
    provider: &str,
    query: &str,
) -> Vec<String> {
    let message = match failure {
        Malformed::Unparseable => format!("[Failed to parse {provider} JSON for '{query}']"),
        Malformed::WrongShape => format!("[{provider} returned invalid JSON for '{query}']"),
    };
    warn!(provider, ?failure, "provider response unusable, substituting placeholders");
    vec![message; n]
}

/// Placeholder batch for a response that carried no output at all.
pub fn empty_response_placeholders(n: usize, provider: &str, query: &str) -> Vec<String> {
    vec![format!("[No {provider} suggestions for '{query}']"); n]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn fence_is_stripped() {
        assert_eq!(
            strip_code_fence("```json\n{\"suggestions\": []}\n```"),
            "{\"suggestions\": []}"
        );
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("{\"plain\": true}"), "{\"plain\": true}");
    }

    #[test]
    fn bare_array_decodes() {
        let got = decode_string_array(r#"["one", "two"]"#).unwrap();
        assert_eq!(got, vec!["one", "two"]);
    }

    #[test]
    fn non_string_elements_are_wrong_shape() {
        assert_eq!(
            decode_string_array(r#"["one", 2]"#),
            Err(Malformed::WrongShape)
        );
        assert_eq!(
            decode_string_array("not json"),
            Err(Malformed::Unparseable)
        );
    }

    #[test]
    fn suggestions_object_decodes_with_and_without_fence() {
        let fenced = "```json\n{\"suggestions\": [\"a\"]}\n```";
        assert_eq!(decode_suggestions_object(fenced).unwrap(), vec!["a"]);
        let bare = r#"{"suggestions": ["b", "c"]}"#;
        assert_eq!(decode_suggestions_object(bare).unwrap(), vec!["b", "c"]);
        assert_eq!(
            decode_suggestions_object(r#"{"other": []}"#),
            Err(Malformed::WrongShape)
        );
    }

    #[test]
    fn over_delivery_truncates() {
        let got = fit_to_count(
            vec!["a".into(), "b".into(), "c".into()],
            2,
            "Gemini",
            "q",
        );
        assert_eq!(got, vec!["a", "b"]);
    }

    #[test]
    fn under_delivery_pads_with_shortfall_note() {
        let got = fit_to_count(vec!["a".into()], 3, "OpenAI", "shorten");
        assert_eq!(got.len(), 3);
        assert_eq!(got[0], "a");
        assert!(got[1].contains("Less than 3 OpenAI suggestions for 'shorten'"));
    }

    proptest! {
        // The contract downstream code relies on: the result is exactly n
        // long for every n in the allowed range and every delivery size.
        #[test]
        fn result_is_always_exactly_n(n in 1usize..=5, delivered in 0usize..12) {
            let input: Vec<String> = (0..delivered).map(|i| format!("s{i}")).collect();
            let out = fit_to_count(input, n, "Gemini", "query");
            prop_assert_eq!(out.len(), n);
        }
    }
}
