//! Text-to-speech via the `OpenAI` speech API

use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};

/// Speech synthesis endpoint
const SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";

/// Voice used when none was selected
pub const DEFAULT_VOICE: &str = "alloy";

/// Synthesizes MP3 audio from text
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    speed: f64,
}

impl TextToSpeech {
    /// Create a synthesizer client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn new(api_key: SecretString, model: String, speed: f64) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            speed: speed.clamp(0.25, 4.0),
        })
    }

    /// Synthesize `text` with `voice`
    ///
    /// # Errors
    ///
    /// Returns `Error::Synthesis` if the request fails or is rejected
    pub async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f64,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post(SPEECH_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("TTS request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}
