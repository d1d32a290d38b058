//! Configuration management for picturetalk
//!
//! Values are layered env > TOML file > built-in default.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::voice::{Voice, VoicePreference, default_catalogue};
use crate::{Error, Result};

pub use file::ConfigFile;

/// Default chat completions endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Default inference model
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// picturetalk configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Inference endpoint configuration
    pub inference: InferenceConfig,

    /// Conversation timing and policy
    pub conversation: ConversationConfig,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Inference endpoint configuration
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Chat completions URL
    pub endpoint: String,

    /// Model identifier
    pub model: String,

    /// Sampling temperature (fixed for consistent, short replies)
    pub temperature: f32,

    /// Maximum reply length in tokens
    pub max_tokens: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 150,
        }
    }
}

/// Conversation timing and policy
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Session countdown started when the greeting begins
    pub session: Duration,

    /// Pause before capture resumes after the tutor speaks
    pub resume_grace: Duration,

    /// A final transcript equal to the previous one within this window is dropped
    pub duplicate_window: Duration,

    /// Start the grace delay only after playback has finished
    pub wait_for_playback: bool,

    /// Automatic capture restarts after transient errors
    pub capture_retry_limit: u32,

    /// Base backoff between capture restarts (doubles per attempt)
    pub capture_retry_base: Duration,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            session: Duration::from_secs(60),
            resume_grace: Duration::from_millis(500),
            duplicate_window: Duration::from_millis(1500),
            wait_for_playback: true,
            capture_retry_limit: 3,
            capture_retry_base: Duration::from_millis(500),
        }
    }
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Speak replies aloud (capture stays on)
    pub enabled: bool,

    /// STT model (e.g. "whisper-1")
    pub stt_model: String,

    /// TTS model (e.g. "tts-1")
    pub tts_model: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub speed: f64,

    /// Locale preference for voice selection
    pub preference: VoicePreference,

    /// Available voices
    pub catalogue: Vec<Voice>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stt_model: "whisper-1".to_string(),
            tts_model: "tts-1".to_string(),
            speed: 0.9,
            preference: VoicePreference::default(),
            catalogue: default_catalogue(),
        }
    }
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// Chat completions key (`PICTURETALK_API_KEY` or `GROQ_API_KEY`)
    pub inference: Option<SecretString>,

    /// `OpenAI` key for Whisper and TTS
    pub openai: Option<SecretString>,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// `PICTURETALK_CONFIG` overrides the config file path.
    ///
    /// # Errors
    ///
    /// Returns error if a numeric environment override cannot be parsed
    pub fn load() -> Result<Self> {
        let path = std::env::var("PICTURETALK_CONFIG").ok().map(PathBuf::from);
        let fc = file::load_config_file(path.as_deref());
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a numeric environment override cannot be parsed
    pub fn from_sources(fc: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let inference = InferenceConfig {
            endpoint: env("PICTURETALK_ENDPOINT")
                .or(fc.inference.endpoint)
                .unwrap_or(defaults.inference.endpoint),
            model: env("PICTURETALK_MODEL")
                .or(fc.inference.model)
                .unwrap_or(defaults.inference.model),
            temperature: fc
                .inference
                .temperature
                .unwrap_or(defaults.inference.temperature),
            max_tokens: fc
                .inference
                .max_tokens
                .unwrap_or(defaults.inference.max_tokens),
        };

        let conv = &fc.conversation;
        let conversation = ConversationConfig {
            session: parse_env(&env, "PICTURETALK_SESSION_SECS")?
                .or(conv.session_secs)
                .map_or(defaults.conversation.session, Duration::from_secs),
            resume_grace: parse_env(&env, "PICTURETALK_RESUME_GRACE_MS")?
                .or(conv.resume_grace_ms)
                .map_or(defaults.conversation.resume_grace, Duration::from_millis),
            duplicate_window: conv
                .duplicate_window_ms
                .map_or(defaults.conversation.duplicate_window, Duration::from_millis),
            wait_for_playback: conv
                .wait_for_playback
                .unwrap_or(defaults.conversation.wait_for_playback),
            capture_retry_limit: conv
                .capture_retry_limit
                .unwrap_or(defaults.conversation.capture_retry_limit),
            capture_retry_base: conv
                .capture_retry_base_ms
                .map_or(defaults.conversation.capture_retry_base, Duration::from_millis),
        };

        let voice_file = fc.voice;
        let voice = VoiceConfig {
            enabled: env("PICTURETALK_DISABLE_VOICE")
                .map(|v| !(v == "1" || v.eq_ignore_ascii_case("true")))
                .or(voice_file.enabled)
                .unwrap_or(defaults.voice.enabled),
            stt_model: env("PICTURETALK_STT_MODEL")
                .or(voice_file.stt_model)
                .unwrap_or(defaults.voice.stt_model),
            tts_model: env("PICTURETALK_TTS_MODEL")
                .or(voice_file.tts_model)
                .unwrap_or(defaults.voice.tts_model),
            speed: voice_file.speed.unwrap_or(defaults.voice.speed),
            preference: VoicePreference {
                preferred_locale: env("PICTURETALK_VOICE_LOCALE")
                    .or(voice_file.preferred_locale)
                    .unwrap_or(defaults.voice.preference.preferred_locale),
                fallback_locale: voice_file
                    .fallback_locale
                    .unwrap_or(defaults.voice.preference.fallback_locale),
            },
            catalogue: if voice_file.voices.is_empty() {
                defaults.voice.catalogue
            } else {
                voice_file.voices
            },
        };

        let api_keys = ApiKeys {
            inference: env("PICTURETALK_API_KEY")
                .or_else(|| env("GROQ_API_KEY"))
                .or(fc.api_keys.inference)
                .filter(|k| !k.trim().is_empty())
                .map(SecretString::from),
            openai: env("OPENAI_API_KEY")
                .or(fc.api_keys.openai)
                .filter(|k| !k.trim().is_empty())
                .map(SecretString::from),
        };

        Ok(Self {
            inference,
            conversation,
            voice,
            api_keys,
        })
    }

    /// The inference credential
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no key is configured
    pub fn inference_key(&self) -> Result<SecretString> {
        self.api_keys.inference.clone().ok_or_else(|| {
            Error::Config(
                "inference API key not configured; set PICTURETALK_API_KEY or GROQ_API_KEY"
                    .to_string(),
            )
        })
    }

    /// The `OpenAI` credential used for speech
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no key is configured
    pub fn openai_key(&self) -> Result<SecretString> {
        self.api_keys.openai.clone().ok_or_else(|| {
            Error::Config("OpenAI API key required for speech; set OPENAI_API_KEY".to_string())
        })
    }
}

fn parse_env(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::Config(format!("{key}: invalid number {raw:?}: {e}")))
        })
        .transpose()
}
