//! JSON-as-protocol extraction
//!
//! Gateway replies are free text that usually contains a JSON object,
//! often wrapped in markdown fences or surrounded by prose. Extraction is
//! three-staged: strict parse of the whole reply, parse of a ```json fence
//! body, then first-object extraction via brace matching. Callers that get
//! Err fall back to their rule-based path; this function never blocks the
//! pipeline.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::AgentError;

/// Extract the first JSON object from a gateway reply.
pub fn extract_object(text: &str) -> Result<Value, AgentError> {
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Ok(value);
        }
    }

    if let Some(body) = fenced_body(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(body) {
            if value.is_object() {
                return Ok(value);
            }
        }
    }

    if let Some(candidate) = first_balanced_object(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            if value.is_object() {
                return Ok(value);
            }
        }
    }

    Err(AgentError::GatewayMalformedOutput(preview(trimmed)))
}

/// Extract and deserialize into a concrete shape.
pub fn extract_as<T: DeserializeOwned>(text: &str) -> Result<T, AgentError> {
    let value = extract_object(text)?;
    serde_json::from_value(value).map_err(|e| AgentError::GatewayMalformedOutput(e.to_string()))
}

/// Body of a ```json ... ``` fence (or a bare ``` fence), if present.
fn fenced_body(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let after = after.strip_prefix("json").unwrap_or(after);
    let end = after.find("```")?;
    Some(after[..end].trim())
}

/// First balanced `{...}` span, brace-counting with string/escape awareness.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    if text.chars().count() > MAX {
        format!("{}...", text.chars().take(MAX).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn strict_parse() {
        let v = extract_object(r#"{"a": 1}"#).unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn fenced_json() {
        let v = extract_object("Here you go:\n```json\n{\"a\": 1}\n```\ndone").unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn embedded_object_with_prose() {
        let v = extract_object("Sure! The answer is {\"tool_name\": \"reset_password\"} ok?")
            .unwrap();
        assert_eq!(v["tool_name"], "reset_password");
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_matching() {
        let v = extract_object(r#"{"reasoning": "use {curly} text", "n": 2}"#).unwrap();
        assert_eq!(v["n"], 2);
    }

    #[test]
    fn nested_objects() {
        let v = extract_object(r#"noise {"outer": {"inner": true}} tail"#).unwrap();
        assert_eq!(v["outer"]["inner"], true);
    }

    #[test]
    fn plain_text_is_an_error() {
        assert!(extract_object("I could not figure this out, sorry").is_err());
    }

    #[test]
    fn typed_extraction() {
        #[derive(Deserialize)]
        struct Decision {
            is_simple: bool,
        }
        let d: Decision = extract_as("```json\n{\"is_simple\": false}\n```").unwrap();
        assert!(!d.is_simple);
    }

    #[test]
    fn typed_extraction_wrong_shape_is_an_error() {
        #[derive(Deserialize)]
        #[allow(dead_code)]
        struct Decision {
            is_simple: bool,
        }
        assert!(extract_as::<Decision>(r#"{"is_simple": "maybe"}"#).is_err());
    }
}
