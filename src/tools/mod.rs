//! Tool calls issued by the tutor and the UI effects they map to

mod call;
mod processor;

pub use call::ToolCall;
pub use processor::{Dispatch, ToolCallProcessor, UiEffect, subject_feedback};
