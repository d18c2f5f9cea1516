//! Operator credential management and credit top-ups.

use crate::api::ApiError;
use crate::AppState;
use axum::{extract::Extension, Json};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use voxcall_types::CredentialKey;

/// Keys a fully working deployment needs: carrier account plus both
/// provider API keys.
pub const REQUIRED_KEYS: [CredentialKey; 5] = [
    CredentialKey::TwilioAccountSid,
    CredentialKey::TwilioAuthToken,
    CredentialKey::TwilioPhoneNumber,
    CredentialKey::OpenAiApiKey,
    CredentialKey::ElevenLabsApiKey,
];

#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialStatus {
    pub key: CredentialKey,
    pub set: bool,
    /// Stored value; secrets are masked down to their last four characters.
    pub value: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialsResponse {
    pub credentials: Vec<CredentialStatus>,
    pub missing: Vec<CredentialKey>,
}

#[derive(Debug, Deserialize)]
pub struct AddCreditsRequest {
    pub amount: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreditsResponse {
    pub credits: i64,
}

/// Masks a secret, keeping only its last four characters when it is long
/// enough that doing so reveals little.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

async fn credentials_view(state: &AppState) -> Result<CredentialsResponse, ApiError> {
    let stored: HashMap<CredentialKey, String> = state.credentials.list().await?.into_iter().collect();
    let credentials = CredentialKey::ALL
        .into_iter()
        .map(|key| {
            let value = stored.get(&key).filter(|v| !v.trim().is_empty());
            CredentialStatus {
                key,
                set: value.is_some(),
                value: value.map(|v| {
                    if key.is_secret() {
                        mask_secret(v)
                    } else {
                        v.clone()
                    }
                }),
            }
        })
        .collect();
    let missing = state.credentials.missing(&REQUIRED_KEYS).await?;
    Ok(CredentialsResponse {
        credentials,
        missing,
    })
}

/// Handler for `GET /api/credentials`.
pub async fn get_credentials_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<CredentialsResponse>, ApiError> {
    Ok(Json(credentials_view(&state).await?))
}

/// Handler for `PUT /api/credentials`.
///
/// Accepts a JSON object of key to value. Unknown keys and blank values are
/// rejected before anything is written.
pub async fn put_credentials_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<BTreeMap<String, String>>,
) -> Result<Json<CredentialsResponse>, ApiError> {
    if payload.is_empty() {
        return Err(ApiError::BadRequest("no credentials supplied".to_string()));
    }

    let mut entries = Vec::with_capacity(payload.len());
    for (name, value) in payload {
        let key: CredentialKey = name
            .parse()
            .map_err(|e: voxcall_types::ParseCredentialKeyError| ApiError::BadRequest(e.to_string()))?;
        let value = value.trim().to_string();
        if value.is_empty() {
            return Err(ApiError::BadRequest(format!("{} must not be blank", key)));
        }
        if key == CredentialKey::Credits && value.parse::<u64>().is_err() {
            return Err(ApiError::BadRequest(
                "CREDITS must be a non-negative integer".to_string(),
            ));
        }
        entries.push((key, value));
    }

    let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
    tracing::info!(keys = ?keys, "credentials updated");
    state.credentials.set_many(entries).await?;

    Ok(Json(credentials_view(&state).await?))
}

/// Handler for `POST /api/credits`.
pub async fn add_credits_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<AddCreditsRequest>,
) -> Result<Json<CreditsResponse>, ApiError> {
    if payload.amount < 0 {
        return Err(ApiError::BadRequest(
            "amount must not be negative".to_string(),
        ));
    }
    let credits = state.credentials.add_credits(payload.amount).await?;
    tracing::info!(added = payload.amount, balance = credits, "credits added");
    Ok(Json(CreditsResponse { credits }))
}
