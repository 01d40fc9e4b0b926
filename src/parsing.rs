//! Defensive extraction of JSON from model output.
//!
//! Providers without structured output wrap their JSON in prose, markdown
//! fences, or light syntax errors. [`parse_model_json`] runs a cascade of
//! extraction and repair steps; output that survives none of them is
//! malformed provider output, which the caller treats as a schema violation
//! for retry purposes rather than a transport failure.

use serde_json::Value;
use thiserror::Error;

/// Model output that no extraction step could turn into JSON.
#[derive(Debug, Error)]
#[error("no JSON value found in model output (truncated): {0}")]
pub struct MalformedOutput(pub String);

/// Parse model text into a JSON value.
///
/// Tries, in order: direct parse, markdown fence extraction, first-brace
/// span extraction, and light repair of the best candidate. Deterministic;
/// never calls the model.
pub fn parse_model_json(text: &str) -> Result<Value, MalformedOutput> {
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    if let Some(candidate) = extract_json_candidate(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            return Ok(value);
        }
        if let Some(repaired) = try_repair_json(&candidate) {
            if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
                return Ok(value);
            }
        }
    }

    if let Some(repaired) = try_repair_json(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
            return Ok(value);
        }
    }

    let snippet: String = trimmed.chars().take(200).collect();
    Err(MalformedOutput(snippet))
}

/// Extract JSON content from markdown fenced code blocks.
///
/// Recognizes `` ```json ``, `` ```JSON ``, and plain `` ``` `` fences.
pub fn extract_json_block(text: &str) -> Option<String> {
    for marker in ["```json", "```JSON", "```"] {
        if let Some(start) = text.find(marker) {
            let content_start = start + marker.len();
            if let Some(end) = text[content_start..].find("```") {
                return Some(text[content_start..content_start + end].trim().to_string());
            }
        }
    }
    None
}

/// Locate a JSON object or array embedded in surrounding prose.
///
/// Tries the fenced block first, then the span from the first `{` or `[`
/// to the last matching closer.
pub fn extract_json_candidate(text: &str) -> Option<String> {
    let trimmed = text.trim();

    if let Some(block) = extract_json_block(trimmed) {
        return Some(block);
    }

    let idx = trimmed.find(['{', '['])?;
    let candidate = &trimmed[idx..];
    let close = if candidate.as_bytes()[0] == b'{' { '}' } else { ']' };
    let end = candidate.rfind(close)?;
    Some(candidate[..=end].to_string())
}

/// Attempt to repair common model JSON mistakes.
///
/// Repairs, in order: trailing commas before `}` / `]`, single-quoted
/// strings, unquoted object keys. Returns `None` when the input was already
/// valid or the result still does not parse.
pub fn try_repair_json(broken: &str) -> Option<String> {
    if serde_json::from_str::<Value>(broken).is_ok() {
        return None;
    }

    let mut s = remove_trailing_commas(broken);
    s = replace_single_quotes(&s);
    s = quote_unquoted_keys(&s);

    if serde_json::from_str::<Value>(&s).is_ok() {
        Some(s)
    } else {
        None
    }
}

/// Remove commas that directly precede a closing brace or bracket,
/// skipping string contents.
fn remove_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &c) in chars.iter().enumerate() {
        if escape_next {
            escape_next = false;
            result.push(c);
            continue;
        }
        if in_string {
            if c == '\\' {
                escape_next = true;
            } else if c == '"' {
                in_string = false;
            }
            result.push(c);
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                result.push(c);
            }
            ',' => {
                let next_meaningful = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next_meaningful, Some('}') | Some(']')) {
                    result.push(c);
                }
            }
            _ => result.push(c),
        }
    }
    result
}

/// Convert single-quoted strings to double-quoted, escaping any inner
/// double quotes. Skips apostrophes inside double-quoted strings.
fn replace_single_quotes(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len());
    let mut i = 0;
    let mut in_double = false;
    let mut escape_next = false;

    while i < chars.len() {
        let c = chars[i];
        if escape_next {
            escape_next = false;
            result.push(c);
            i += 1;
            continue;
        }
        if in_double {
            if c == '\\' {
                escape_next = true;
            } else if c == '"' {
                in_double = false;
            }
            result.push(c);
            i += 1;
            continue;
        }
        if c == '"' {
            in_double = true;
            result.push(c);
            i += 1;
            continue;
        }
        if c == '\'' {
            // Consume until the closing single quote.
            result.push('"');
            i += 1;
            while i < chars.len() && chars[i] != '\'' {
                if chars[i] == '"' {
                    result.push('\\');
                }
                if chars[i] == '\\' && i + 1 < chars.len() {
                    result.push(chars[i]);
                    i += 1;
                }
                result.push(chars[i]);
                i += 1;
            }
            result.push('"');
            i += 1;
            continue;
        }
        result.push(c);
        i += 1;
    }
    result
}

/// Quote bare object keys: `{key: 1}` becomes `{"key": 1}`.
fn quote_unquoted_keys(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escape_next = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if escape_next {
            escape_next = false;
            result.push(c);
            i += 1;
            continue;
        }
        if in_string {
            if c == '\\' {
                escape_next = true;
            } else if c == '"' {
                in_string = false;
            }
            result.push(c);
            i += 1;
            continue;
        }
        if c == '"' {
            in_string = true;
            result.push(c);
            i += 1;
            continue;
        }
        if (c == '{' || c == ',') && i + 1 < chars.len() {
            result.push(c);
            i += 1;
            // Skip whitespace, then check for a bare identifier key.
            let mut j = i;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            let start = j;
            while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                j += 1;
            }
            let mut k = j;
            while k < chars.len() && chars[k].is_whitespace() {
                k += 1;
            }
            if j > start && k < chars.len() && chars[k] == ':' {
                for &ws in &chars[i..start] {
                    result.push(ws);
                }
                result.push('"');
                for &kc in &chars[start..j] {
                    result.push(kc);
                }
                result.push('"');
                i = j;
            }
            continue;
        }
        result.push(c);
        i += 1;
    }
    result
}
