//! Continuous recognition engines
//!
//! An engine turns audio into recognition events and pushes them into an
//! unbounded channel owned by a [`SpeechCaptureSession`](super::SpeechCaptureSession).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc;

use super::capture::{Microphone, SAMPLE_RATE, samples_to_wav};
use super::segmenter::UtteranceSegmenter;
use super::stt::SpeechToText;
use crate::{Error, Result};

/// Microphone polling interval
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One recognized piece of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    /// The engine has committed to this text
    pub is_final: bool,
}

impl Fragment {
    #[must_use]
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    #[must_use]
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Raw output of a recognition engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// A batch of results, in order
    Results(Vec<Fragment>),
    /// The stream failed; carries a classification such as "no-speech"
    Error(String),
    /// The stream stopped on its own
    Ended,
}

/// Sender half handed to engines
pub type RecognitionSender = mpsc::UnboundedSender<RecognitionEvent>;

/// Receiver half owned by the capture session
pub type RecognitionReceiver = mpsc::UnboundedReceiver<RecognitionEvent>;

/// A continuous speech recognizer
///
/// Start and stop must be cheap and must not block.
pub trait RecognitionEngine: Send {
    /// Begin producing events
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot start listening
    fn start(&mut self) -> Result<()>;

    /// Stop producing events
    fn stop(&mut self);
}

#[derive(Debug, Default)]
struct Control {
    listening: AtomicBool,
    shutdown: AtomicBool,
    /// Bumped on every stop so late transcriptions can be discarded
    epoch: AtomicU64,
}

impl Control {
    fn resume(&self) {
        self.listening.store(true, Ordering::SeqCst);
    }

    fn pause(&self) {
        self.listening.store(false, Ordering::SeqCst);
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }
}

/// Segmentation bound to the capture epoch its audio was recorded in
///
/// Audio never crosses a stop: a new epoch resets the segmenter, and an
/// utterance that completes after a stop is dropped.
struct EpochSegmenter {
    segmenter: UtteranceSegmenter,
    epoch: u64,
}

impl EpochSegmenter {
    const fn new(epoch: u64) -> Self {
        Self {
            segmenter: UtteranceSegmenter::new(),
            epoch,
        }
    }

    fn reset(&mut self) {
        self.segmenter.reset();
    }

    /// Feed one poll of audio, recorded after `epoch` was read
    fn process(
        &mut self,
        control: &Control,
        epoch: u64,
        samples: &[f32],
    ) -> Option<(u64, Vec<f32>)> {
        if epoch != self.epoch {
            // Buffered audio may predate the stop
            self.segmenter.reset();
            self.epoch = epoch;
            return None;
        }

        let utterance = self.segmenter.process(samples)?;
        if !control.is_listening() || control.epoch() != epoch {
            tracing::debug!("dropping utterance recorded across a stop");
            return None;
        }
        Some((epoch, utterance))
    }
}

/// Microphone + energy segmentation + Whisper transcription
///
/// The microphone lives on a dedicated thread (cpal streams are not
/// `Send`); transcription runs as a tokio task. Each transcribed utterance
/// is one final fragment.
pub struct MicrophoneRecognizer {
    control: Arc<Control>,
    thread: Option<JoinHandle<()>>,
}

impl MicrophoneRecognizer {
    /// Spawn the capture thread and transcription task
    ///
    /// # Errors
    ///
    /// Returns error if called outside a tokio runtime or the thread
    /// cannot be spawned
    pub fn spawn(stt: SpeechToText, events: RecognitionSender) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Capture(format!("no tokio runtime: {e}")))?;

        let control = Arc::new(Control::default());
        let (segment_tx, segment_rx) = mpsc::unbounded_channel();

        let thread = {
            let control = Arc::clone(&control);
            let events = events.clone();
            std::thread::Builder::new()
                .name("picturetalk-mic".to_string())
                .spawn(move || capture_loop(&control, &segment_tx, &events))?
        };

        runtime.spawn(transcribe_loop(stt, segment_rx, Arc::clone(&control), events));

        Ok(Self {
            control,
            thread: Some(thread),
        })
    }
}

impl RecognitionEngine for MicrophoneRecognizer {
    fn start(&mut self) -> Result<()> {
        self.control.resume();
        tracing::debug!("microphone recognizer listening");
        Ok(())
    }

    fn stop(&mut self) {
        self.control.pause();
        tracing::debug!("microphone recognizer paused");
    }
}

impl Drop for MicrophoneRecognizer {
    fn drop(&mut self) {
        self.control.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::warn!("microphone thread panicked");
        }
    }
}

fn capture_loop(
    control: &Control,
    segments: &mpsc::UnboundedSender<(u64, Vec<f32>)>,
    events: &RecognitionSender,
) {
    let mut microphone = match Microphone::open() {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(error = %e, "failed to open microphone");
            let _ = events.send(RecognitionEvent::Error("audio-capture".to_string()));
            return;
        }
    };
    let mut segmenter = EpochSegmenter::new(control.epoch());

    while !control.shutdown.load(Ordering::SeqCst) {
        let epoch = control.epoch();
        if !control.is_listening() {
            if microphone.is_running() {
                microphone.stop();
                segmenter.reset();
            }
            std::thread::sleep(POLL_INTERVAL);
            continue;
        }

        if !microphone.is_running()
            && let Err(e) = microphone.start()
        {
            tracing::error!(error = %e, "failed to start microphone");
            control.listening.store(false, Ordering::SeqCst);
            let _ = events.send(RecognitionEvent::Error("audio-capture".to_string()));
            continue;
        }

        std::thread::sleep(POLL_INTERVAL);
        let samples = microphone.take_samples();
        if samples.is_empty() {
            continue;
        }

        if let Some(segment) = segmenter.process(control, epoch, &samples)
            && segments.send(segment).is_err()
        {
            break;
        }
    }

    microphone.stop();
    tracing::debug!("microphone thread exiting");
}

async fn transcribe_loop(
    stt: SpeechToText,
    mut segments: mpsc::UnboundedReceiver<(u64, Vec<f32>)>,
    control: Arc<Control>,
    events: RecognitionSender,
) {
    while let Some((epoch, samples)) = segments.recv().await {
        let event = match samples_to_wav(&samples, SAMPLE_RATE) {
            Ok(wav) => match stt.transcribe(&wav).await {
                Ok(text) if text.trim().is_empty() => RecognitionEvent::Error("no-speech".to_string()),
                Ok(text) => RecognitionEvent::Results(vec![Fragment::final_text(text)]),
                Err(e) => {
                    tracing::warn!(error = %e, "transcription failed");
                    RecognitionEvent::Error("network".to_string())
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode utterance");
                RecognitionEvent::Error("audio-capture".to_string())
            }
        };

        if control.epoch() != epoch {
            tracing::debug!("discarding transcription from a stopped capture");
            continue;
        }
        if events.send(event).is_err() {
            break;
        }
    }
}
