//! Energy-based utterance segmentation
//!
//! Splits a continuous microphone stream into utterances: speech starts
//! when block energy crosses a threshold and ends after a run of silence.

use super::capture::{SAMPLE_RATE, rms};

/// Minimum block energy considered speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum utterance length (0.3s at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Silence that ends an utterance (0.8s)
const SILENCE_SAMPLES: usize = 12_800;

/// Longest utterance before it is cut (15s)
const MAX_UTTERANCE_SAMPLES: usize = SAMPLE_RATE as usize * 15;

/// Segmenter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// Waiting for speech
    Quiet,
    /// Accumulating an utterance
    Speaking,
}

/// Turns sample blocks into complete utterances
#[derive(Debug)]
pub struct UtteranceSegmenter {
    state: SegmenterState,
    buffer: Vec<f32>,
    silence: usize,
}

impl Default for UtteranceSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl UtteranceSegmenter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SegmenterState::Quiet,
            buffer: Vec::new(),
            silence: 0,
        }
    }

    /// Feed a block of samples
    ///
    /// Returns the utterance once it is complete.
    pub fn process(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        let energy = rms(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            SegmenterState::Quiet => {
                if is_speech {
                    self.state = SegmenterState::Speaking;
                    self.buffer.clear();
                    self.buffer.extend_from_slice(samples);
                    self.silence = 0;
                    tracing::trace!(energy, "speech started");
                }
                None
            }
            SegmenterState::Speaking => {
                self.buffer.extend_from_slice(samples);
                if is_speech {
                    self.silence = 0;
                } else {
                    self.silence += samples.len();
                }

                let speech_len = self.buffer.len().saturating_sub(self.silence);
                if self.silence > SILENCE_SAMPLES {
                    if speech_len > MIN_SPEECH_SAMPLES {
                        tracing::debug!(samples = self.buffer.len(), "utterance complete");
                        return Some(self.finish());
                    }
                    tracing::trace!("too short, discarding");
                    self.reset();
                } else if self.buffer.len() >= MAX_UTTERANCE_SAMPLES {
                    tracing::debug!("utterance reached maximum length");
                    return Some(self.finish());
                }
                None
            }
        }
    }

    /// Discard any partial utterance
    pub fn reset(&mut self) {
        self.state = SegmenterState::Quiet;
        self.buffer.clear();
        self.silence = 0;
    }

    #[must_use]
    pub const fn state(&self) -> SegmenterState {
        self.state
    }

    fn finish(&mut self) -> Vec<f32> {
        let utterance = std::mem::take(&mut self.buffer);
        self.reset();
        utterance
    }
}
