//! picturetalk - spoken conversations with an AI tutor about a picture
//!
//! This library provides the pieces of a turn-based voice conversation:
//! - Conversation orchestration (state machine, message log, session timer)
//! - Speech capture (microphone, utterance segmentation, Whisper STT)
//! - Speech synthesis (TTS, cancellable playback, voice selection)
//! - Inference over an OpenAI-compatible chat completions endpoint
//! - Tool calls that drive UI-facing effects
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 Presentation (CLI)                    │
//! │        commands ▼                  ▲ events           │
//! └──────────────────────────────────────────────────────┘
//! ┌──────────────────────────────────────────────────────┐
//! │              ConversationOrchestrator                 │
//! │   state  │  message log  │  timer  │  grace delays    │
//! └──────┬─────────────┬───────────────┬─────────────────┘
//!        │             │               │
//! ┌──────▼──────┐ ┌────▼──────┐ ┌──────▼───────────────┐
//! │   Capture   │ │ Inference │ │ Tools  │ Synthesizer │
//! └─────────────┘ └───────────┘ └──────────────────────┘
//! ```

pub mod config;
pub mod conversation;
pub mod error;
pub mod inference;
pub mod tools;
pub mod voice;

pub use config::Config;
pub use conversation::{
    ConversationEvent, ConversationHandle, ConversationOrchestrator, ConversationState, EndReason,
    Message, MessageLog, NoticeKind, Role, Snapshot, SubjectContext,
};
pub use error::{Error, Result};
pub use inference::{ChatCompletionsClient, InferenceClient, InferenceReply, InferenceRequest, Turn};
pub use tools::{ToolCall, ToolCallProcessor};
