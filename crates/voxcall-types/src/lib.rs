//! Shared types for the voxcall workspace.
//!
//! This crate holds the domain vocabulary every other crate speaks: the
//! conversation [`Turn`], the [`CallLeg`] a webhook belongs to, the persisted
//! [`CallSession`] and the set of [`CredentialKey`]s the operator manages.
//!
//! Nothing here touches the network or the database, which keeps the
//! dependency graph flat: storage, voice and server crates all depend on
//! `voxcall-types` and never on each other's internals.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Who spoke a [`Turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The person on the phone.
    User,
    /// The language-model reply played back to the caller.
    Assistant,
}

impl Speaker {
    /// Returns the label used when rendering a transcript line.
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "AI",
        }
    }
}

/// A single utterance in a call transcript.
///
/// Turns are immutable once appended to a session; ordering is insertion
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
        }
    }
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.speaker.label(), self.text)
    }
}

/// Direction of the call a webhook belongs to.
///
/// The carrier reports both parties on every callback; which one is the
/// person we are talking to depends on who placed the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallLeg {
    /// The caller dialed our number. The remote party is `From`.
    #[default]
    Inbound,
    /// We placed the call. The remote party is `To`.
    Outbound,
}

impl CallLeg {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }

    /// Picks the remote party's address out of the carrier's `From`/`To` pair.
    pub fn remote_party<'a>(self, from: &'a str, to: &'a str) -> &'a str {
        match self {
            Self::Inbound => from,
            Self::Outbound => to,
        }
    }
}

impl fmt::Display for CallLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a recognised [`CallLeg`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown call leg: {0}")]
pub struct ParseCallLegError(pub String);

impl FromStr for CallLeg {
    type Err = ParseCallLegError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inbound" => Ok(Self::Inbound),
            "outbound" => Ok(Self::Outbound),
            other => Err(ParseCallLegError(other.to_string())),
        }
    }
}

/// A persisted call transcript plus the per-call context needed to continue
/// the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSession {
    /// Carrier-issued call identifier.
    pub call_sid: String,
    pub leg: CallLeg,
    /// Address of the party that placed the call (`From`).
    pub caller: Option<String>,
    /// Address of the party that received the call (`To`).
    pub callee: Option<String>,
    /// Operator directive framing every completion for this call.
    pub directive: Option<String>,
    /// Conversation turns in chronological order.
    pub turns: Vec<Turn>,
    /// Creation timestamp (SQLite `datetime('now')`, UTC).
    pub created_at: String,
    /// Timestamp of the most recent write.
    pub updated_at: String,
}

/// Lightweight listing entry for the transcript browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub call_sid: String,
    pub leg: CallLeg,
    pub caller: Option<String>,
    pub callee: Option<String>,
    pub turn_count: usize,
    pub updated_at: String,
}

/// Credentials the operator stores for the upstream providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialKey {
    #[serde(rename = "TWILIO_ACCOUNT_SID")]
    TwilioAccountSid,
    #[serde(rename = "TWILIO_AUTH_TOKEN")]
    TwilioAuthToken,
    #[serde(rename = "TWILIO_PHONE_NUMBER")]
    TwilioPhoneNumber,
    #[serde(rename = "OPENAI_API_KEY")]
    OpenAiApiKey,
    #[serde(rename = "ELEVEN_LABS_API_KEY")]
    ElevenLabsApiKey,
    /// Prepaid call credit balance, stored as a decimal string.
    #[serde(rename = "CREDITS")]
    Credits,
}

impl CredentialKey {
    /// Every key the operator API accepts.
    pub const ALL: [CredentialKey; 6] = [
        Self::TwilioAccountSid,
        Self::TwilioAuthToken,
        Self::TwilioPhoneNumber,
        Self::OpenAiApiKey,
        Self::ElevenLabsApiKey,
        Self::Credits,
    ];

    /// Keys that must be present before an outbound call can be placed.
    pub const CALL_PLACEMENT: [CredentialKey; 3] = [
        Self::TwilioAccountSid,
        Self::TwilioAuthToken,
        Self::TwilioPhoneNumber,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TwilioAccountSid => "TWILIO_ACCOUNT_SID",
            Self::TwilioAuthToken => "TWILIO_AUTH_TOKEN",
            Self::TwilioPhoneNumber => "TWILIO_PHONE_NUMBER",
            Self::OpenAiApiKey => "OPENAI_API_KEY",
            Self::ElevenLabsApiKey => "ELEVEN_LABS_API_KEY",
            Self::Credits => "CREDITS",
        }
    }

    /// Whether the value is a secret that must be redacted in listings.
    pub fn is_secret(self) -> bool {
        matches!(
            self,
            Self::TwilioAuthToken | Self::OpenAiApiKey | Self::ElevenLabsApiKey
        )
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known [`CredentialKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown credential key: {0}")]
pub struct ParseCredentialKeyError(pub String);

impl FromStr for CredentialKey {
    type Err = ParseCredentialKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| ParseCredentialKeyError(s.to_string()))
    }
}
