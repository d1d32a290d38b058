//! Out-of-band directive lines embedded in assistant text
//!
//! The hosted model has no function-calling channel here, so directives
//! arrive as plain lines appended to the reply:
//!
//! ```text
//! Wow! What a happy dog! What colour is its fur?
//! DIRECTIVE: {"kind": "show_subject_feedback", "subject": "dog"}
//! EMOJIS: 🐶🐕🦴
//! ```

use serde_json::Value;

use super::InferenceReply;
use crate::tools::ToolCall;

/// Prefix of a tool call line (JSON object or array)
pub const DIRECTIVE_PREFIX: &str = "DIRECTIVE:";

/// Prefix of a background emoji line
pub const EMOJIS_PREFIX: &str = "EMOJIS:";

/// Words that earn an encouraging status banner
const PRAISE_WORDS: &[&str] = &["Great", "Wonderful", "Excellent"];

/// Split raw assistant text into display text and tool calls
///
/// Praise detection comes first so an explicit directive in the same reply
/// has the final say over the status text.
#[must_use]
pub fn parse_reply(raw: &str) -> InferenceReply {
    let mut kept = Vec::new();
    let mut directives = Vec::new();

    for line in raw.lines() {
        if let Some(payload) = strip_prefix_ignore_case(line, DIRECTIVE_PREFIX) {
            directives.extend(parse_directive(payload));
        } else if let Some(payload) = strip_prefix_ignore_case(line, EMOJIS_PREFIX) {
            let emojis = payload.trim();
            if !emojis.is_empty() {
                directives.push(ToolCall::ShowBackground {
                    emojis: emojis.to_string(),
                });
            }
        } else {
            kept.push(line);
        }
    }

    let text = kept.join("\n").trim().to_string();

    let mut tool_calls = Vec::new();
    if PRAISE_WORDS.iter().any(|w| text.contains(w)) {
        tool_calls.push(ToolCall::UpdateUi {
            message: format!("⭐ {text}"),
        });
    }
    tool_calls.extend(directives);

    InferenceReply { text, tool_calls }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let line = line.trim_start();
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &line[prefix.len()..])
}

fn parse_directive(payload: &str) -> Vec<ToolCall> {
    match serde_json::from_str::<Value>(payload.trim()) {
        Ok(Value::Array(items)) => items.iter().map(ToolCall::from_value).collect(),
        Ok(value @ Value::Object(_)) => vec![ToolCall::from_value(&value)],
        Ok(other) => {
            tracing::warn!(payload = %other, "directive is not an object, ignoring");
            Vec::new()
        }
        Err(e) => {
            tracing::warn!(error = %e, payload, "malformed directive, ignoring");
            Vec::new()
        }
    }
}
