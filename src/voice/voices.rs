//! Voice catalogue and locale-based voice selection
//!
//! The catalogue is process-wide state published through a `watch`
//! channel. Publishing the first list is the initialization event;
//! publishing again is a change. Each [`VoiceSelector`] re-evaluates its
//! choice when it sees a change, and only then.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// A synthesis voice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    /// Backend identifier (e.g. "nova")
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// BCP 47 locale tag (e.g. "en-IN")
    pub locale: String,
}

impl Voice {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            locale: locale.into(),
        }
    }
}

/// Which locales to look for, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoicePreference {
    pub preferred_locale: String,
    pub fallback_locale: String,
}

impl Default for VoicePreference {
    fn default() -> Self {
        Self {
            preferred_locale: "en-IN".to_string(),
            fallback_locale: "en-US".to_string(),
        }
    }
}

/// Voices offered by the `OpenAI` speech endpoint
#[must_use]
pub fn default_catalogue() -> Vec<Voice> {
    ["alloy", "echo", "fable", "onyx", "nova", "shimmer"]
        .into_iter()
        .map(|id| {
            let mut name = id.to_string();
            if let Some(first) = name.get_mut(..1) {
                first.make_ascii_uppercase();
            }
            Voice::new(id, name, "en-US")
        })
        .collect()
}

fn same_locale(a: &str, b: &str) -> bool {
    let normalize = |s: &str| s.trim().replace('_', "-").to_ascii_lowercase();
    normalize(a) == normalize(b)
}

/// Pick a voice: preferred locale, else fallback locale, else `None`
/// (meaning the backend's default voice)
#[must_use]
pub fn select_voice<'a>(voices: &'a [Voice], preference: &VoicePreference) -> Option<&'a Voice> {
    voices
        .iter()
        .find(|v| same_locale(&v.locale, &preference.preferred_locale))
        .or_else(|| {
            voices
                .iter()
                .find(|v| same_locale(&v.locale, &preference.fallback_locale))
        })
}

/// Shared voice catalogue
///
/// `None` means the catalogue has not been loaded yet.
#[derive(Debug, Clone)]
pub struct VoiceCatalogue {
    tx: watch::Sender<Option<Vec<Voice>>>,
}

impl Default for VoiceCatalogue {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceCatalogue {
    /// Create an empty, not yet loaded catalogue
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Create a catalogue that is already loaded
    #[must_use]
    pub fn loaded(voices: Vec<Voice>) -> Self {
        let (tx, _) = watch::channel(Some(voices));
        Self { tx }
    }

    /// Publish a new list of voices
    pub fn publish(&self, voices: Vec<Voice>) {
        tracing::debug!(count = voices.len(), "voice catalogue updated");
        self.tx.send_replace(Some(voices));
    }

    /// Current voices, if loaded
    #[must_use]
    pub fn voices(&self) -> Option<Vec<Voice>> {
        self.tx.borrow().clone()
    }

    /// Create a selector bound to this catalogue
    #[must_use]
    pub fn selector(&self, preference: VoicePreference) -> VoiceSelector {
        VoiceSelector::new(preference, self.tx.subscribe())
    }
}

/// Holds the voice chosen for a synthesizer
#[derive(Debug)]
pub struct VoiceSelector {
    preference: VoicePreference,
    rx: watch::Receiver<Option<Vec<Voice>>>,
    selected: Option<Voice>,
}

impl VoiceSelector {
    fn new(preference: VoicePreference, rx: watch::Receiver<Option<Vec<Voice>>>) -> Self {
        let mut selector = Self {
            preference,
            rx,
            selected: None,
        };
        selector.evaluate();
        selector
    }

    /// Selected voice, re-evaluated if the catalogue changed since last call
    pub fn current(&mut self) -> Option<&Voice> {
        if self.rx.has_changed().unwrap_or(false) {
            self.evaluate();
        }
        self.selected.as_ref()
    }

    #[must_use]
    pub const fn preference(&self) -> &VoicePreference {
        &self.preference
    }

    fn evaluate(&mut self) {
        let voices = self.rx.borrow_and_update();
        let Some(voices) = voices.as_deref() else {
            tracing::trace!("voice catalogue not loaded yet");
            return;
        };

        self.selected = select_voice(voices, &self.preference).cloned();
        if let Some(voice) = &self.selected {
            tracing::debug!(voice = %voice.id, locale = %voice.locale, "voice selected");
        } else {
            tracing::debug!(
                preferred = %self.preference.preferred_locale,
                fallback = %self.preference.fallback_locale,
                "no matching voice, using platform default"
            );
        }
    }
}
