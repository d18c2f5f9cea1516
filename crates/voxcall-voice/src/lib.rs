//! Upstream adapters for the call assistant.
//!
//! Wraps the three remote services a call depends on: the chat-completion
//! API that writes replies, the text-to-speech API that voices them, and the
//! carrier API that places outbound calls. Also renders the call-control
//! markup returned from webhooks.

pub mod config;
pub mod error;
pub mod llm;
pub mod telephony;
pub mod tts;
pub mod twiml;

pub use config::{LlmConfig, SynthesisConfig, TelephonyConfig};
pub use error::{Upstream, VoiceError};
pub use llm::ResponseGenerator;
pub use telephony::{PlacedCall, TelephonyClient};
pub use tts::{sanitize_file_stem, AudioArtifact, SpeechSynthesizer};
pub use twiml::{Gather, Verb, VoiceResponse};
