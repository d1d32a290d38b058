//! TOML configuration file loading
//!
//! Supports `~/.config/picturetalk/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::voice::Voice;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Inference endpoint configuration
    #[serde(default)]
    pub inference: InferenceFileConfig,

    /// Conversation timing and policy
    #[serde(default)]
    pub conversation: ConversationFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Inference-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct InferenceFileConfig {
    /// Chat completions URL
    pub endpoint: Option<String>,

    /// Model identifier (e.g. "llama-3.3-70b-versatile")
    pub model: Option<String>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Maximum reply length in tokens
    pub max_tokens: Option<u32>,
}

/// Conversation timing and policy
#[derive(Debug, Default, Deserialize)]
pub struct ConversationFileConfig {
    /// Session length in seconds
    pub session_secs: Option<u64>,

    /// Pause before capture resumes after the tutor speaks
    pub resume_grace_ms: Option<u64>,

    /// Window in which a repeated final transcript is treated as a duplicate
    pub duplicate_window_ms: Option<u64>,

    /// Wait for playback to finish before the grace delay starts
    pub wait_for_playback: Option<bool>,

    /// Automatic capture restarts after transient errors
    pub capture_retry_limit: Option<u32>,

    /// Base backoff between capture restarts
    pub capture_retry_base_ms: Option<u64>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Enable microphone and speaker
    pub enabled: Option<bool>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// Preferred voice locale (e.g. "en-IN")
    pub preferred_locale: Option<String>,

    /// Secondary voice locale (e.g. "en-US")
    pub fallback_locale: Option<String>,

    /// TTS speed multiplier
    pub speed: Option<f64>,

    /// Voice catalogue override
    #[serde(default)]
    pub voices: Vec<Voice>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    /// Key for the chat completions endpoint
    pub inference: Option<String>,
    /// Key for Whisper and TTS
    pub openai: Option<String>,
}

/// Load the TOML config file from `path`, or the standard path when `None`
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> ConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return ConfigFile::default();
    };

    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the TOML is malformed
pub fn parse_config(content: &str) -> crate::Result<ConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Return the config file path: `~/.config/picturetalk/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("picturetalk").join("config.toml"))
}
