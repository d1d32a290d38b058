//! Speech capture session
//!
//! Wraps a [`RecognitionEngine`] and applies the capture policy: idempotent
//! start/stop, interim vs final transcripts, final fragment concatenation
//! and error classification. The session never restarts itself.

use super::recognizer::{Fragment, RecognitionEngine, RecognitionEvent, RecognitionReceiver};
use crate::Result;

/// Classification of a capture failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureErrorKind {
    /// Nothing was heard
    NoSpeech,
    /// Microphone access refused
    PermissionDenied,
    /// Transport or recognition service failure
    Network,
    /// Audio device failure
    AudioCapture,
    /// Recognition was aborted
    Aborted,
    /// Anything else the engine reports
    Other(String),
}

impl CaptureErrorKind {
    /// Parse an engine classification string
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "no-speech" => Self::NoSpeech,
            "not-allowed" | "permission-denied" | "service-not-allowed" => Self::PermissionDenied,
            "network" => Self::Network,
            "audio-capture" => Self::AudioCapture,
            "aborted" => Self::Aborted,
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::NoSpeech => "no-speech",
            Self::PermissionDenied => "permission-denied",
            Self::Network => "network",
            Self::AudioCapture => "audio-capture",
            Self::Aborted => "aborted",
            Self::Other(raw) => raw,
        }
    }

    /// Whether an automatic restart is worth trying
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::NoSpeech | Self::Network | Self::Aborted)
    }
}

impl std::fmt::Display for CaptureErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event delivered to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Live guess; display only
    Interim(String),
    /// Committed, trimmed transcript
    Final(String),
    /// The stream failed and is no longer active
    Error(CaptureErrorKind),
    /// The stream stopped on its own and is no longer active
    Ended,
}

/// Capture session over a recognition engine
pub struct SpeechCaptureSession {
    engine: Box<dyn RecognitionEngine>,
    events: RecognitionReceiver,
    active: bool,
    pending: String,
    discarded_finals: u64,
}

impl SpeechCaptureSession {
    #[must_use]
    pub fn new(engine: Box<dyn RecognitionEngine>, events: RecognitionReceiver) -> Self {
        Self {
            engine,
            events,
            active: false,
            pending: String::new(),
            discarded_finals: 0,
        }
    }

    /// Start capturing; no-op when already active
    ///
    /// Events queued while the session was stopped are discarded first.
    ///
    /// # Errors
    ///
    /// Returns error if the engine fails to start
    pub fn start(&mut self) -> Result<()> {
        if self.active {
            return Ok(());
        }
        self.discard_queued();
        self.engine.start()?;
        self.active = true;
        tracing::debug!("capture started");
        Ok(())
    }

    /// Stop capturing; no-op when already stopped
    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.engine.stop();
        self.active = false;
        self.discard_queued();
        tracing::debug!("capture stopped");
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Number of final results discarded while stopped, since the last call
    pub fn take_discarded_finals(&mut self) -> u64 {
        std::mem::take(&mut self.discarded_finals)
    }

    /// Wait for the next event
    ///
    /// Events arriving while the session is stopped are dropped. Returns
    /// `None` once the engine has gone away. Cancel safe.
    pub async fn next_event(&mut self) -> Option<CaptureEvent> {
        loop {
            let event = self.events.recv().await?;
            if !self.active {
                tracing::trace!(?event, "dropping event from inactive capture");
                self.count_discarded(&event);
                continue;
            }
            if let Some(event) = self.apply(event) {
                return Some(event);
            }
        }
    }

    fn apply(&mut self, event: RecognitionEvent) -> Option<CaptureEvent> {
        match event {
            RecognitionEvent::Results(fragments) => self.apply_results(&fragments),
            RecognitionEvent::Error(raw) => {
                let kind = CaptureErrorKind::parse(&raw);
                tracing::warn!(kind = %kind, "capture error");
                self.deactivate();
                Some(CaptureEvent::Error(kind))
            }
            RecognitionEvent::Ended => {
                tracing::debug!("capture stream ended");
                self.deactivate();
                Some(CaptureEvent::Ended)
            }
        }
    }

    fn apply_results(&mut self, fragments: &[Fragment]) -> Option<CaptureEvent> {
        let mut interim = String::new();
        let mut saw_final = false;

        for fragment in fragments {
            if fragment.is_final {
                saw_final = true;
                let text = fragment.text.trim();
                if text.is_empty() {
                    continue;
                }
                if !self.pending.is_empty() {
                    self.pending.push(' ');
                }
                self.pending.push_str(text);
            } else {
                interim.push_str(&fragment.text);
            }
        }

        if saw_final {
            let transcript = std::mem::take(&mut self.pending).trim().to_string();
            if !transcript.is_empty() {
                return Some(CaptureEvent::Final(transcript));
            }
        }

        let interim = interim.trim();
        if interim.is_empty() {
            None
        } else {
            Some(CaptureEvent::Interim(interim.to_string()))
        }
    }

    fn deactivate(&mut self) {
        self.engine.stop();
        self.active = false;
        self.pending.clear();
    }

    fn count_discarded(&mut self, event: &RecognitionEvent) {
        if let RecognitionEvent::Results(fragments) = event
            && fragments.iter().any(|f| f.is_final && !f.text.trim().is_empty())
        {
            self.discarded_finals += 1;
        }
    }

    fn discard_queued(&mut self) {
        let mut dropped = 0usize;
        while let Ok(event) = self.events.try_recv() {
            self.count_discarded(&event);
            dropped += 1;
        }
        self.pending.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "discarded stale capture events");
        }
    }
}
