//! Speech synthesis with a single active utterance
//!
//! [`SpeechSynthesizer`] owns at most one utterance at a time: speaking
//! again cancels whatever is still playing. Completion is reported through
//! [`Playback`], which resolves exactly once and never fails.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::playback::AudioPlayback;
use super::tts::{DEFAULT_VOICE, TextToSpeech};
use super::voices::{Voice, VoiceSelector};
use crate::{Error, Result};

/// Something that can turn text into audible speech
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Speak `text` and return once playback has finished
    ///
    /// Implementations should stop promptly once `cancel` fires.
    async fn speak(&self, text: &str, voice: Option<&Voice>, cancel: CancellationToken)
    -> Result<()>;
}

/// How an utterance finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Finished,
    Cancelled,
    /// Synthesis or playback failed; already logged
    Failed,
}

/// Completion signal for one utterance
#[derive(Debug)]
pub struct Playback {
    rx: oneshot::Receiver<PlaybackOutcome>,
}

impl Playback {
    fn resolved(outcome: PlaybackOutcome) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self { rx }
    }
}

impl Future for Playback {
    type Output = PlaybackOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(PlaybackOutcome::Cancelled))
    }
}

/// Speaks assistant replies, one at a time
pub struct SpeechSynthesizer {
    backend: Arc<dyn SpeechBackend>,
    voices: VoiceSelector,
    current: Option<CancellationToken>,
}

impl SpeechSynthesizer {
    #[must_use]
    pub fn new(backend: Arc<dyn SpeechBackend>, voices: VoiceSelector) -> Self {
        Self {
            backend,
            voices,
            current: None,
        }
    }

    /// Speak `text`, cancelling any utterance still in progress
    ///
    /// Must be called within a Tokio runtime.
    pub fn speak(&mut self, text: &str) -> Playback {
        self.cancel();

        let text = text.trim();
        if text.is_empty() {
            return Playback::resolved(PlaybackOutcome::Finished);
        }

        let cancel = CancellationToken::new();
        self.current = Some(cancel.clone());

        let voice = self.voices.current().cloned();
        let backend = Arc::clone(&self.backend);
        let text = text.to_string();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => PlaybackOutcome::Cancelled,
                result = backend.speak(&text, voice.as_ref(), cancel.clone()) => match result {
                    Ok(()) if cancel.is_cancelled() => PlaybackOutcome::Cancelled,
                    Ok(()) => PlaybackOutcome::Finished,
                    Err(e) => {
                        tracing::warn!(error = %e, "speech synthesis failed");
                        PlaybackOutcome::Failed
                    }
                },
            };
            tracing::debug!(?outcome, "utterance complete");
            let _ = tx.send(outcome);
        });

        Playback { rx }
    }

    /// Cancel the current utterance, if any
    pub fn cancel(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
        }
    }

    /// Voice that the next utterance will use
    pub fn selected_voice(&mut self) -> Option<&Voice> {
        self.voices.current()
    }
}

impl Drop for SpeechSynthesizer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Backend that synthesizes with the `OpenAI` speech API and plays locally
pub struct CloudSpeech {
    tts: Arc<TextToSpeech>,
}

impl CloudSpeech {
    #[must_use]
    pub fn new(tts: TextToSpeech) -> Self {
        Self { tts: Arc::new(tts) }
    }
}

#[async_trait]
impl SpeechBackend for CloudSpeech {
    async fn speak(
        &self,
        text: &str,
        voice: Option<&Voice>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let voice = voice.map_or(DEFAULT_VOICE, |v| v.id.as_str());
        let mp3 = self.tts.synthesize(text, voice).await?;
        if cancel.is_cancelled() {
            return Ok(());
        }

        tracing::debug!(bytes = mp3.len(), voice, "playing synthesized speech");
        tokio::task::spawn_blocking(move || AudioPlayback::new()?.play_mp3(&mp3, &cancel))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }
}

/// Backend used when voice output is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSpeech;

#[async_trait]
impl SpeechBackend for SilentSpeech {
    async fn speak(&self, text: &str, _voice: Option<&Voice>, _cancel: CancellationToken) -> Result<()> {
        tracing::debug!(chars = text.chars().count(), "voice output disabled");
        Ok(())
    }
}
