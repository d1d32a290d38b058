//! Read-only projections of orchestrator state for a presentation layer

use super::{ConversationState, Message};

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Explicit end command
    User,
    /// Session timer expired
    Timeout,
}

impl EndReason {
    /// Closing notice shown to the user
    #[must_use]
    pub const fn notice(self) -> &'static str {
        match self {
            Self::User => "Conversation ended! Great job!",
            Self::Timeout => "Time's up! Conversation ended! Great job!",
        }
    }
}

/// Category of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Missing or invalid configuration; the session cannot start
    Configuration,
    /// Speech capture problem
    Capture,
    /// A turn could not be answered
    Inference,
    /// Session closed
    Ended,
}

/// Event published to subscribers
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    /// State machine moved to a new state
    StateChanged(ConversationState),
    /// Live (interim) or committed (final) transcript text
    Transcript { text: String, is_final: bool },
    /// Current assistant-facing display text
    Display(String),
    /// Error or status notice; never recorded in the message log
    Notice { kind: NoticeKind, text: String },
    /// Full history after a change
    History(Vec<Message>),
    /// Background decoration requested by the tutor
    Background(String),
    /// A tool call of an unrecognised kind was skipped
    ToolIgnored { kind: String },
    /// The session ended
    Ended { reason: EndReason },
}
