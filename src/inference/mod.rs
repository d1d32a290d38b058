//! Inference collaborator: request/response contract and the hosted client
//!
//! The orchestrator only sees [`InferenceClient`]; the chat completions
//! client, prompt text and directive parsing live behind it.

mod client;
pub mod directive;
pub mod prompt;

use async_trait::async_trait;

pub use client::ChatCompletionsClient;

use crate::Result;
use crate::conversation::{Message, SubjectContext};
use crate::tools::ToolCall;

/// The new turn a request answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    /// Synthetic opening turn; asks for a greeting
    Initial,
    /// A final transcript from the user
    User(String),
}

impl Turn {
    #[must_use]
    pub const fn is_initial(&self) -> bool {
        matches!(self, Self::Initial)
    }
}

/// Everything needed to answer one turn
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    /// Picture under discussion
    pub subject: SubjectContext,
    /// Turns recorded before `turn`, in order
    pub history: Vec<Message>,
    /// Turn to answer
    pub turn: Turn,
}

/// A successful reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferenceReply {
    /// Text to display and speak, with directive lines removed
    pub text: String,
    /// Directives extracted from the reply
    pub tool_calls: Vec<ToolCall>,
}

/// Produces assistant replies
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Answer one turn
    ///
    /// # Errors
    ///
    /// Returns `Error::Inference` for transport, status or payload problems
    async fn complete(&self, request: InferenceRequest) -> Result<InferenceReply>;
}
