//! The subject being discussed

/// Title and description of the displayed subject
///
/// Supplied by whatever presents the picture; read-only for a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectContext {
    pub title: String,
    pub description: String,
}

impl SubjectContext {
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }

    /// `title: description`, or just the title when there is no description
    #[must_use]
    pub fn visual_context(&self) -> String {
        if self.description.is_empty() {
            self.title.clone()
        } else {
            format!("{}: {}", self.title, self.description)
        }
    }
}

impl Default for SubjectContext {
    fn default() -> Self {
        Self::new("an image", "")
    }
}

/// Built-in pictures for the CLI
pub const PRESETS: &[(&str, &str)] = &[
    ("Friendly Dog", "A happy golden retriever playing outdoors"),
    (
        "Starry Night Sky",
        "There are houses and trees under a beautiful starry night sky also mountain is in the background",
    ),
    ("Mountain Landscape", "Beautiful mountain scenery"),
    ("Ocean Waves", "Peaceful ocean landscape"),
    ("Butterfly Garden", "Orange colored butterflies sitting in a garden"),
];

/// Look up a preset by zero-based index
#[must_use]
pub fn preset(index: usize) -> Option<SubjectContext> {
    PRESETS
        .get(index)
        .map(|(title, description)| SubjectContext::new(*title, *description))
}
