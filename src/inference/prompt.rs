//! Prompt construction for the tutor

use std::fmt::Write as _;

use serde::Serialize;

use super::{InferenceRequest, Turn};
use crate::conversation::SubjectContext;

/// A chat message on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Whether `text` contains Devanagari script (U+0900..=U+097F)
#[must_use]
pub fn contains_devanagari(text: &str) -> bool {
    text.chars().any(|c| ('\u{0900}'..='\u{097F}').contains(&c))
}

/// Content of the synthetic opening turn
#[must_use]
pub fn initial_turn(subject: &SubjectContext) -> String {
    format!(
        "I'm looking at an image titled \"{}\" showing: {}. Let's talk about it!",
        subject.title,
        subject.visual_context()
    )
}

/// System instructions for a turn
#[must_use]
pub fn system_prompt(subject: &SubjectContext, turn: &Turn) -> String {
    let description = if subject.description.is_empty() {
        "An educational image"
    } else {
        subject.description.as_str()
    };

    let mut prompt = format!(
        "You are a friendly, encouraging tutor having an educational conversation with a child \
about the picture they are looking at.

THE CHILD IS LOOKING AT THIS PICTURE:
Title: {title}
Content: {description}

Stay on the picture:
- Ask about visual details and encourage the child to describe what they see
- Connect every reply to the picture; do not drift to general topics

Speak in both Hindi and English:
- Say every line in Hindi first, then English, e.g. \"यह बहुत सुंदर है! This is very beautiful!\"
- Use simple, child-friendly words and warm Indian English expressions

If the child speaks Hindi (Devanagari script), your only task is to teach the English:
acknowledge warmly, give the English translation, and ask them to repeat it. Nothing else.

Style: 1-3 short sentences, enthusiastic feedback (\"शाबाश! Excellent!\"), one question at a time.

Directives (optional, each on its own line after the reply):
- When the child names something in the picture, add
  DIRECTIVE: {{\"kind\": \"show_subject_feedback\", \"subject\": \"<the thing>\"}}
- Always finish with EMOJIS: followed by 3-5 emojis matching what the child said

",
        title = subject.title,
    );

    match turn {
        Turn::Initial => prompt.push_str(
            "START with a warm bilingual greeting and ask what they see in the picture, e.g. \
\"नमस्ते! Hello! इस तस्वीर में तुम्हें क्या दिखाई दे रहा है? What do you see in this picture?\"",
        ),
        Turn::User(utterance) => {
            prompt.push_str(
                "Continue discussing the picture in both Hindi and English and refer to what the child said.",
            );
            if contains_devanagari(utterance) {
                let _ = write!(
                    prompt,
                    "\n\nIMPORTANT: The child just spoke in Hindi: \"{utterance}\". Only teach the \
English translation now and ask them to repeat it. Do not ask other questions."
                );
            }
        }
    }

    prompt
}

/// Full ordered message list for a request
#[must_use]
pub fn build_messages(request: &InferenceRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(ChatMessage::new(
        "system",
        system_prompt(&request.subject, &request.turn),
    ));
    messages.extend(
        request
            .history
            .iter()
            .map(|m| ChatMessage::new(m.role().as_str(), m.content())),
    );

    let content = match &request.turn {
        Turn::Initial => initial_turn(&request.subject),
        Turn::User(text) => text.clone(),
    };
    messages.push(ChatMessage::new("user", content));
    messages
}
