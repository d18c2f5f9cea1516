//! Outbound call placement through the carrier's REST API.

use crate::config::TelephonyConfig;
use crate::error::{status_error, Upstream, VoiceError};
use serde::Deserialize;

/// The carrier's acknowledgement of a placed call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlacedCall {
    pub sid: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct TelephonyClient {
    client: reqwest::Client,
    config: TelephonyConfig,
}

impl TelephonyClient {
    /// # Errors
    ///
    /// Returns `VoiceError::Config` if the HTTP client cannot be built.
    pub fn new(config: TelephonyConfig) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build telephony client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Asks the carrier to dial `to` from `from` and run `twiml` once the
    /// callee answers.
    ///
    /// # Errors
    ///
    /// Returns `VoiceError::InvalidInput` for a malformed account sid or a
    /// blank number, and an upstream-class error when the carrier rejects or
    /// fails the request.
    pub async fn place_call(
        &self,
        account_sid: &str,
        auth_token: &str,
        from: &str,
        to: &str,
        twiml: &str,
    ) -> Result<PlacedCall, VoiceError> {
        if account_sid.is_empty() || !account_sid.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(VoiceError::InvalidInput(
                "account sid must be non-empty and alphanumeric".to_string(),
            ));
        }
        if from.trim().is_empty() || to.trim().is_empty() {
            return Err(VoiceError::InvalidInput(
                "both the calling and called numbers are required".to_string(),
            ));
        }

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.config.base_url.trim_end_matches('/'),
            account_sid
        );
        let service = Upstream::Telephony;
        let timeout_ms = self.config.timeout_ms;

        let response = self
            .client
            .post(&url)
            .basic_auth(account_sid, Some(auth_token))
            .form(&[("To", to.trim()), ("From", from.trim()), ("Twiml", twiml)])
            .send()
            .await
            .map_err(|e| VoiceError::from_reqwest(service, timeout_ms, e))?;

        if !response.status().is_success() {
            return Err(status_error(service, response).await);
        }

        let placed: PlacedCall = response
            .json()
            .await
            .map_err(|e| VoiceError::from_reqwest(service, timeout_ms, e))?;
        if placed.sid.is_empty() {
            return Err(VoiceError::InvalidResponse {
                service,
                reason: "call resource had no sid".to_string(),
            });
        }

        tracing::info!(call_sid = %placed.sid, status = %placed.status, "outbound call placed");
        Ok(placed)
    }
}
