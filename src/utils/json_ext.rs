//! JSON extraction from noisy LLM replies.
//!
//! Every LLM-facing component in the pipeline expects a JSON object somewhere
//! in the model's reply, usually wrapped in prose, Markdown fences, or both.
//! [`extract_json_object`] finds the first balanced `{…}` span; [`parse_reply`]
//! deserializes it into a typed value.

use miette::Diagnostic;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors raised while pulling structured data out of an LLM reply.
#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    /// The reply contained no balanced JSON object at all.
    #[error("no JSON object found in reply: {preview}")]
    #[diagnostic(
        code(qasida::parse::no_json),
        help("The model ignored the JSON instruction; retrying at a higher level usually helps.")
    )]
    NoJson { preview: String },

    /// A JSON object was found but did not deserialize into the expected shape.
    #[error("malformed JSON in reply: {reason}")]
    #[diagnostic(code(qasida::parse::malformed))]
    Malformed { reason: String, preview: String },

    /// The parsed object is missing a field the caller requires.
    #[error("reply JSON is missing required field `{field}`")]
    #[diagnostic(code(qasida::parse::missing_field))]
    MissingField { field: &'static str },

    /// The reply was empty after trimming.
    #[error("empty reply")]
    #[diagnostic(code(qasida::parse::empty))]
    Empty,
}

/// Clip a string for error previews.
#[must_use]
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}…")
    }
}

/// Strip Markdown code fences, keeping their content.
///
/// Handles both ```` ```json ```` and bare ```` ``` ```` fences; unfenced text
/// passes through untouched.
fn strip_fences(text: &str) -> String {
    if !text.contains("```") {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Find the first balanced JSON object (`{…}`) in `text`.
///
/// The scanner is string-aware: braces inside JSON string literals (including
/// escaped quotes) do not affect the balance. Preamble and postamble around
/// the object are tolerated, as are Markdown fences.
///
/// # Examples
///
/// ```
/// use qasida::utils::json_ext::extract_json_object;
///
/// let reply = "Sure! Here you go:\n```json\n{\"meter_name\": \"بحر الكامل\"}\n```";
/// let json = extract_json_object(reply).unwrap();
/// assert_eq!(json, "{\"meter_name\": \"بحر الكامل\"}");
/// ```
pub fn extract_json_object(text: &str) -> Result<String, ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }
    let cleaned = strip_fences(trimmed);

    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in cleaned.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        let begin = start.unwrap_or(0);
                        return Ok(cleaned[begin..=i].to_string());
                    }
                }
            }
            _ => {}
        }
    }

    Err(ParseError::NoJson {
        preview: truncate(trimmed, 120),
    })
}

/// Extract and deserialize the first JSON object in an LLM reply.
///
/// # Examples
///
/// ```
/// use serde::Deserialize;
/// use qasida::utils::json_ext::parse_reply;
///
/// #[derive(Deserialize)]
/// struct Selection {
///     selected_candidate: usize,
/// }
///
/// let reply = "After comparing the candidates: {\"selected_candidate\": 2}";
/// let sel: Selection = parse_reply(reply).unwrap();
/// assert_eq!(sel.selected_candidate, 2);
/// ```
pub fn parse_reply<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    let json = extract_json_object(text)?;
    serde_json::from_str(&json).map_err(|e| ParseError::Malformed {
        reason: e.to_string(),
        preview: truncate(&json, 200),
    })
}

/// Extract the first JSON object as an untyped [`serde_json::Value`].
pub fn parse_reply_value(text: &str) -> Result<serde_json::Value, ParseError> {
    parse_reply(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_bare_object() {
        let out = extract_json_object(r#"{"a": 1}"#).unwrap();
        assert_eq!(out, r#"{"a": 1}"#);
    }

    #[test]
    fn tolerates_preamble_and_postamble() {
        let out = extract_json_object("thinking… {\"a\": {\"b\": 2}} done").unwrap();
        assert_eq!(out, "{\"a\": {\"b\": 2}}");
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scanner() {
        let out = extract_json_object(r#"{"text": "a } in a string"}"#).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["text"], json!("a } in a string"));
    }

    #[test]
    fn escaped_quotes_stay_inside_strings() {
        let out = extract_json_object(r#"{"text": "quote \" then } brace"}"#).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&out).is_ok());
    }

    #[test]
    fn strips_markdown_fences() {
        let reply = "```json\n{\"x\": 3}\n```";
        let out = extract_json_object(reply).unwrap();
        assert_eq!(out, "{\"x\": 3}");
    }

    #[test]
    fn no_json_is_an_error() {
        let err = extract_json_object("plain prose, no structure").unwrap_err();
        assert!(matches!(err, ParseError::NoJson { .. }));
    }

    #[test]
    fn empty_reply_is_an_error() {
        assert!(matches!(extract_json_object("  \n"), Err(ParseError::Empty)));
    }

    #[test]
    fn arabic_payloads_round_trip() {
        let reply = "النتيجة: {\"qafiya_letter\": \"ق\", \"harakah\": \"kasra\"}";
        let v = parse_reply_value(reply).unwrap();
        assert_eq!(v["qafiya_letter"], json!("ق"));
    }
}
