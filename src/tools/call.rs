//! Tool call model
//!
//! The set of kinds is closed with an explicit `Unknown` arm so that new
//! kinds emitted by a model never fail to parse.

use serde::Deserialize;
use serde_json::Value;

/// A structured directive from the assistant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    /// Present `message` as the current status text
    UpdateUi { message: String },
    /// Present a templated affirmation about `subject`
    ShowSubjectFeedback { subject: String },
    /// Decorate the background with a handful of emojis
    ShowBackground { emojis: String },
    /// Unrecognised or malformed kind
    Unknown { kind: String },
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum KnownCall {
    UpdateUi {
        message: String,
    },
    #[serde(alias = "show_image_feedback")]
    ShowSubjectFeedback {
        subject: String,
    },
    ShowBackground {
        emojis: String,
    },
}

impl From<KnownCall> for ToolCall {
    fn from(call: KnownCall) -> Self {
        match call {
            KnownCall::UpdateUi { message } => Self::UpdateUi { message },
            KnownCall::ShowSubjectFeedback { subject } => Self::ShowSubjectFeedback { subject },
            KnownCall::ShowBackground { emojis } => Self::ShowBackground { emojis },
        }
    }
}

impl ToolCall {
    /// Interpret a JSON object as a tool call
    ///
    /// The kind is read from `kind`, or from `type` for older payloads.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let mut value = value.clone();
        if let Value::Object(map) = &mut value
            && !map.contains_key("kind")
            && let Some(kind) = map.remove("type")
        {
            map.insert("kind".to_string(), kind);
        }

        match serde_json::from_value::<KnownCall>(value.clone()) {
            Ok(call) => call.into(),
            Err(e) => {
                let kind = value
                    .get("kind")
                    .and_then(Value::as_str)
                    .unwrap_or("<missing>")
                    .to_string();
                tracing::debug!(kind = %kind, error = %e, "unrecognised tool call");
                Self::Unknown { kind }
            }
        }
    }

    /// Wire name of this call's kind
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::UpdateUi { .. } => "update_ui",
            Self::ShowSubjectFeedback { .. } => "show_subject_feedback",
            Self::ShowBackground { .. } => "show_background",
            Self::Unknown { kind } => kind,
        }
    }
}
