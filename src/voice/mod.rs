//! Voice processing module
//!
//! Microphone capture, utterance segmentation, speech-to-text, speech
//! synthesis and playback. The conversation only sees the two seams:
//! [`SpeechCaptureSession`] for listening and [`SpeechSynthesizer`] for
//! speaking.

mod capture;
mod playback;
mod recognizer;
mod segmenter;
mod session;
mod stt;
mod synthesizer;
mod tts;
mod voices;

pub use capture::{Microphone, SAMPLE_RATE, rms, samples_to_wav};
pub use playback::{AudioPlayback, PLAYBACK_SAMPLE_RATE, decode_mp3};
pub use recognizer::{
    Fragment, MicrophoneRecognizer, RecognitionEngine, RecognitionEvent, RecognitionReceiver,
    RecognitionSender,
};
pub use segmenter::{SegmenterState, UtteranceSegmenter};
pub use session::{CaptureErrorKind, CaptureEvent, SpeechCaptureSession};
pub use stt::SpeechToText;
pub use synthesizer::{
    CloudSpeech, Playback, PlaybackOutcome, SilentSpeech, SpeechBackend, SpeechSynthesizer,
};
pub use tts::{DEFAULT_VOICE, TextToSpeech};
pub use voices::{
    Voice, VoiceCatalogue, VoicePreference, VoiceSelector, default_catalogue, select_voice,
};
