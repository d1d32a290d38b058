//! Maps tool calls to UI-facing effects

use super::ToolCall;

/// A transient display change; never touches the message log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEffect {
    /// Replace the assistant-facing status text
    Status(String),
    /// Replace the background decoration
    Background(String),
}

/// Result of dispatching one tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Effect(UiEffect),
    /// The call was skipped; `kind` is what the model sent
    Ignored { kind: String },
}

/// Templated affirmation for `show_subject_feedback`
#[must_use]
pub fn subject_feedback(subject: &str) -> String {
    format!("Great observation about the {subject}!")
}

/// Interprets tool calls
///
/// Every call maps to a value the display is set to, so dispatching the
/// same call twice looks the same as dispatching it once.
#[derive(Debug, Default, Clone, Copy)]
pub struct ToolCallProcessor;

impl ToolCallProcessor {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Dispatch a single call
    #[must_use]
    pub fn dispatch(&self, call: &ToolCall) -> Dispatch {
        match call {
            ToolCall::UpdateUi { message } => {
                tracing::debug!(message = %message, "ui updated by tool call");
                Dispatch::Effect(UiEffect::Status(message.clone()))
            }
            ToolCall::ShowSubjectFeedback { subject } => {
                Dispatch::Effect(UiEffect::Status(subject_feedback(subject)))
            }
            ToolCall::ShowBackground { emojis } => {
                Dispatch::Effect(UiEffect::Background(emojis.trim().to_string()))
            }
            ToolCall::Unknown { kind } => {
                tracing::warn!(kind = %kind, "ignoring unknown tool call");
                Dispatch::Ignored { kind: kind.clone() }
            }
        }
    }

    /// Dispatch calls in the order received
    #[must_use]
    pub fn process(&self, calls: &[ToolCall]) -> Vec<Dispatch> {
        calls.iter().map(|call| self.dispatch(call)).collect()
    }
}
