use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_max_tokens() -> u32 {
    70
}

fn default_temperature() -> f32 {
    0.5
}

fn default_upstream_timeout_ms() -> u64 {
    5_000
}

fn default_synthesis_base_url() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_voice_id() -> String {
    "2zRM7PkgwBPiau2jvVXc".to_string()
}

fn default_synthesis_model_id() -> String {
    "eleven_turbo_v2".to_string()
}

fn default_voice_setting() -> f32 {
    0.5
}

fn default_audio_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_telephony_base_url() -> String {
    "https://api.twilio.com".to_string()
}

fn default_telephony_timeout_ms() -> u64 {
    10_000
}

/// Chat-completion settings for reply generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API, without the trailing
    /// `/chat/completions`.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Completion token ceiling. Keeps replies short enough to synthesize and
    /// play before the caller loses patience.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_ms: default_upstream_timeout_ms(),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Text-to-speech settings and the directory synthesized audio is written to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default = "default_synthesis_base_url")]
    pub base_url: String,
    #[serde(default = "default_voice_id")]
    pub voice_id: String,
    #[serde(default = "default_synthesis_model_id")]
    pub model_id: String,
    #[serde(default = "default_voice_setting")]
    pub stability: f32,
    #[serde(default = "default_voice_setting")]
    pub similarity_boost: f32,
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,
    /// Directory served under `/static`; synthesized files land here.
    #[serde(default = "default_audio_dir")]
    pub audio_dir: PathBuf,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            base_url: default_synthesis_base_url(),
            voice_id: default_voice_id(),
            model_id: default_synthesis_model_id(),
            stability: default_voice_setting(),
            similarity_boost: default_voice_setting(),
            timeout_ms: default_upstream_timeout_ms(),
            audio_dir: default_audio_dir(),
        }
    }
}

impl SynthesisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Carrier REST API settings for placing outbound calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelephonyConfig {
    #[serde(default = "default_telephony_base_url")]
    pub base_url: String,
    #[serde(default = "default_telephony_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            base_url: default_telephony_base_url(),
            timeout_ms: default_telephony_timeout_ms(),
        }
    }
}

impl TelephonyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
