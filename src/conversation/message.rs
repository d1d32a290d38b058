//! Conversation turns and the append-only message log

use serde::Serialize;
use tokio::time::Instant;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person talking to the tutor
    User,
    /// The AI tutor
    Assistant,
}

impl Role {
    /// Wire name used by chat completion APIs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recorded turn
///
/// Fields are private so a message cannot change once it is in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    role: Role,
    content: String,
    timestamp: Instant,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Instant::now(),
        }
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Monotonic time the turn was appended
    #[must_use]
    pub const fn timestamp(&self) -> Instant {
        self.timestamp
    }
}

/// Ordered record of the turns in the active session
///
/// Turns are only ever appended. The whole log is cleared when a new
/// session starts; nothing else removes or rewrites an entry.
#[derive(Debug, Default, Clone)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// Append a turn and return it
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> &Message {
        let message = Message::new(role, content);
        tracing::trace!(role = %message.role, index = self.messages.len(), "message appended");
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    /// Append a user turn
    pub fn push_user(&mut self, content: impl Into<String>) -> &Message {
        self.append(Role::User, content)
    }

    /// Append an assistant turn
    pub fn push_assistant(&mut self, content: impl Into<String>) -> &Message {
        self.append(Role::Assistant, content)
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Owned copy for UI projections
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Drop every turn (session start only)
    pub(crate) fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_conversational_order() {
        let mut log = MessageLog::new();
        log.push_assistant("Hello! What do you see?");
        log.push_user("I see a dog");
        log.push_assistant("Wow! What colour is it?");

        let roles: Vec<Role> = log.messages().iter().map(Message::role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);
        assert_eq!(log.last().map(Message::content), Some("Wow! What colour is it?"));
    }

    #[tokio::test(start_paused = true)]
    async fn timestamps_are_monotonic() {
        let mut log = MessageLog::new();
        let first = log.push_user("one").timestamp();
        tokio::time::advance(std::time::Duration::from_millis(10)).await;
        let second = log.push_assistant("two").timestamp();
        assert!(second > first);
    }

    #[test]
    fn clear_empties_log() {
        let mut log = MessageLog::new();
        log.push_user("hi");
        assert_eq!(log.len(), 1);
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn snapshot_is_detached() {
        let mut log = MessageLog::new();
        log.push_user("hi");
        let snap = log.snapshot();
        log.push_assistant("hello");
        assert_eq!(snap.len(), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn role_wire_names() {
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }
}
