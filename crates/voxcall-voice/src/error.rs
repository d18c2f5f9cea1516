use std::fmt;
use thiserror::Error;

/// The upstream provider a request was sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    LanguageModel,
    Synthesis,
    Telephony,
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LanguageModel => "language model",
            Self::Synthesis => "speech synthesis",
            Self::Telephony => "telephony",
        })
    }
}

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("{service} request timed out after {timeout_ms} ms")]
    Timeout { service: Upstream, timeout_ms: u64 },

    #[error("{service} unreachable: {reason}")]
    Unreachable { service: Upstream, reason: String },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: Upstream,
        status: u16,
        body: String,
    },

    #[error("{service} returned an unusable response: {reason}")]
    InvalidResponse { service: Upstream, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Audio storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl VoiceError {
    /// True for failures of the remote provider, as opposed to bad input or
    /// local configuration.
    pub fn is_upstream_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::Unreachable { .. }
                | Self::Status { .. }
                | Self::InvalidResponse { .. }
        )
    }

    pub(crate) fn from_reqwest(service: Upstream, timeout_ms: u64, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                service,
                timeout_ms,
            }
        } else if err.is_decode() {
            Self::InvalidResponse {
                service,
                reason: err.to_string(),
            }
        } else {
            Self::Unreachable {
                service,
                reason: err.to_string(),
            }
        }
    }
}

/// Maximum number of error-body bytes kept in a [`VoiceError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Turns a non-2xx response into a [`VoiceError::Status`], keeping a bounded
/// prefix of the body for logs.
pub(crate) async fn status_error(service: Upstream, response: reqwest::Response) -> VoiceError {
    let status = response.status().as_u16();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    VoiceError::Status {
        service,
        status,
        body,
    }
}
