//! Conversation state machine states

use serde::Serialize;

/// Where the active session is in its lifecycle
///
/// This is the single source of truth for "listening" and "processing";
/// UI indicators are derived from it rather than tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    /// No session; waiting for a start command
    #[default]
    Idle,
    /// Greeting requested or being delivered
    Greeting,
    /// Capture is running and waiting for a final transcript
    Listening,
    /// A user turn is being answered
    Processing,
    /// Session finished (terminal for this session)
    Ended,
}

impl ConversationState {
    /// Whether a session exists and has not ended
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Greeting | Self::Listening | Self::Processing)
    }

    /// Listening indicator
    #[must_use]
    pub const fn is_listening(self) -> bool {
        matches!(self, Self::Listening)
    }

    /// Processing indicator (greeting counts as processing)
    #[must_use]
    pub const fn is_processing(self) -> bool {
        matches!(self, Self::Greeting | Self::Processing)
    }

    /// Whether a start command is accepted in this state
    #[must_use]
    pub const fn can_start(self) -> bool {
        matches!(self, Self::Idle | Self::Ended)
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Greeting => "greeting",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Ended => "ended",
        };
        f.write_str(name)
    }
}
