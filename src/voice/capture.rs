//! Microphone input
//!
//! Samples are downmixed to mono inside the stream callback, so a device
//! that only offers stereo at 16kHz is still usable.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Mono 16kHz input from the default device
///
/// Holds a `cpal` stream, which is not `Send`; keep it on the thread that
/// created it.
pub struct Microphone {
    device: Device,
    config: StreamConfig,
    samples: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl Microphone {
    /// Open the default input device
    ///
    /// # Errors
    ///
    /// Returns error if there is no input device or none of its configs
    /// run at 16kHz with one or two channels
    pub fn open() -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;
        let config = input_config(&device)?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            channels = config.channels,
            "microphone opened"
        );

        Ok(Self {
            device,
            config,
            samples: Arc::default(),
            stream: None,
        })
    }

    /// Start the input stream; no-op when already running
    ///
    /// Anything buffered by an earlier run is discarded.
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be built or started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        self.discard();

        let samples = Arc::clone(&self.samples);
        let channels = usize::from(self.config.channels);
        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = samples.lock() {
                        downmix_into(&mut buf, data, channels);
                    }
                },
                |err| tracing::error!(error = %err, "microphone stream error"),
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);
        tracing::debug!("microphone started");
        Ok(())
    }

    /// Stop the input stream and drop unread samples
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            self.discard();
            tracing::debug!("microphone stopped");
        }
    }

    /// Mono samples captured since the last call
    #[must_use]
    pub fn take_samples(&self) -> Vec<f32> {
        self.samples
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    fn discard(&self) {
        if let Ok(mut buf) = self.samples.lock() {
            buf.clear();
        }
    }
}

/// 16kHz input config, mono preferred over stereo
fn input_config(device: &Device) -> Result<StreamConfig> {
    let rate = SampleRate(SAMPLE_RATE);
    let ranges: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
        .collect();

    [1, 2]
        .into_iter()
        .find_map(|channels| ranges.iter().find(|c| c.channels() == channels))
        .map(|c| c.clone().with_sample_rate(rate).config())
        .ok_or_else(|| Error::Audio("no 16kHz input config found".to_string()))
}

/// Append interleaved frames to `out` as their channel average
fn downmix_into(out: &mut Vec<f32>, data: &[f32], channels: usize) {
    if channels <= 1 {
        out.extend_from_slice(data);
        return;
    }
    #[allow(clippy::cast_precision_loss)]
    let scale = 1.0 / channels as f32;
    out.extend(
        data.chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}

#[allow(clippy::cast_possible_truncation)]
fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}

/// Encode mono samples as a 16-bit WAV file for the transcription API
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let wav_error = |e: hound::Error| Error::Audio(format!("wav encoding: {e}"));

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_error)?;
    for &sample in samples {
        writer.write_sample(to_pcm16(sample)).map_err(wav_error)?;
    }
    writer.finalize().map_err(wav_error)?;

    Ok(cursor.into_inner())
}

/// Root-mean-square energy of a block of samples
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
