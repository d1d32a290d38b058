//! Conversation core
//!
//! The orchestrator owns the session state machine and the message log.
//! Capture, synthesis and tool effects report back to it; nothing else
//! mutates conversation state.

mod events;
mod message;
mod orchestrator;
mod state;
mod subject;

pub use events::{ConversationEvent, EndReason, NoticeKind};
pub use message::{Message, MessageLog, Role};
pub use orchestrator::{ConversationHandle, ConversationOrchestrator, Snapshot};
pub use state::ConversationState;
pub use subject::{PRESETS, SubjectContext, preset};
