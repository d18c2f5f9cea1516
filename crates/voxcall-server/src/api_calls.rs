//! Outbound call triggers: single call and bulk calls.

use crate::api::{external_base, run_blocking, ApiError};
use crate::conversation::gather_action;
use crate::AppState;
use axum::{
    extract::{Extension, Query},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use voxcall_sessions::{start_session, CallParties};
use voxcall_types::{CallLeg, CredentialKey};
use voxcall_voice::{Gather, PlacedCall, VoiceResponse};

/// Maximum numbers accepted in one bulk request.
const MAX_BULK_NUMBERS: usize = 500;

/// Query parameters for `GET /make_call`.
#[derive(Debug, Deserialize)]
pub struct MakeCallQuery {
    pub phone_number: Option<String>,
    pub prompt: Option<String>,
    /// Spoken when the callee answers. Defaults to the prompt.
    pub greeting: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MakeCallResponse {
    pub message: String,
    pub status: String,
    pub call_sid: String,
}

/// Request body for `POST /api/calls/bulk`.
#[derive(Debug, Deserialize)]
pub struct BulkCallRequest {
    pub phone_numbers: Vec<String>,
    pub prompt: String,
    #[serde(default)]
    pub greeting: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkCallResult {
    pub phone_number: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_sid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkCallResponse {
    pub results: Vec<BulkCallResult>,
    pub placed: usize,
    pub failed: usize,
}

/// Carrier credentials, read once per request.
struct CarrierAccount {
    account_sid: String,
    auth_token: String,
    phone_number: String,
}

impl CarrierAccount {
    async fn load(state: &AppState) -> Result<Self, ApiError> {
        let mut values = state
            .credentials
            .require_all(&CredentialKey::CALL_PLACEMENT)
            .await?
            .into_iter();
        let mut next = || {
            values.next().ok_or_else(|| {
                ApiError::InternalServerError("credential lookup returned too few values".into())
            })
        };
        Ok(Self {
            account_sid: next()?,
            auth_token: next()?,
            phone_number: next()?,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Places one outbound call and registers its session with `prompt` as the
/// directive.
async fn place_outbound_call(
    state: &AppState,
    account: &CarrierAccount,
    base: &str,
    phone_number: &str,
    prompt: &str,
    greeting: Option<&str>,
) -> Result<PlacedCall, ApiError> {
    let opening = greeting.unwrap_or(prompt);
    let twiml = VoiceResponse::new()
        .say(opening)
        .gather(Gather::new(
            gather_action(base, CallLeg::Outbound, Some(prompt)),
            state.config.call.gather_timeout_secs,
        ))
        .render();

    let placed = state
        .telephony
        .place_call(
            &account.account_sid,
            &account.auth_token,
            &account.phone_number,
            phone_number,
            &twiml,
        )
        .await
        .map_err(|e| {
            tracing::warn!(to = phone_number, error = %e, "call placement failed");
            ApiError::from(e)
        })?;

    let parties = CallParties::new(
        CallLeg::Outbound,
        Some(account.phone_number.clone()),
        Some(phone_number.to_string()),
    );
    let sid = placed.sid.clone();
    let directive = prompt.to_string();
    let register = run_blocking(state, move |conn| {
        Ok(start_session(conn, &sid, &parties, Some(&directive))?)
    });
    // The call is already ringing; the prompt on the webhook URL still
    // carries the directive.
    match tokio::time::timeout(state.config.call.store_timeout(), register).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(call_sid = %placed.sid, error = %e, "failed to register outbound call")
        }
        Err(_) => tracing::warn!(call_sid = %placed.sid, "outbound call registration timed out"),
    }

    Ok(placed)
}

/// Handler for `GET /make_call`.
pub async fn make_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<MakeCallQuery>,
) -> Result<Json<MakeCallResponse>, ApiError> {
    let (Some(phone_number), Some(prompt)) =
        (non_blank(params.phone_number), non_blank(params.prompt))
    else {
        return Err(ApiError::BadRequest(
            "Phone number and prompt are required".to_string(),
        ));
    };
    let greeting = non_blank(params.greeting);

    let account = CarrierAccount::load(&state).await?;
    let base = external_base(&state, &headers);
    let placed = place_outbound_call(
        &state,
        &account,
        &base,
        &phone_number,
        &prompt,
        greeting.as_deref(),
    )
    .await?;

    Ok(Json(MakeCallResponse {
        message: format!("Call initiated to {}", phone_number),
        status: "Call initiated.".to_string(),
        call_sid: placed.sid,
    }))
}

/// Handler for `POST /api/calls/bulk`.
///
/// Numbers are dialed one after another. A failure on one number is reported
/// in its result and does not stop the rest.
pub async fn bulk_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<BulkCallRequest>,
) -> Result<Json<BulkCallResponse>, ApiError> {
    let prompt = payload.prompt.trim().to_string();
    if prompt.is_empty() {
        return Err(ApiError::BadRequest("prompt is required".to_string()));
    }
    if payload.phone_numbers.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one phone number is required".to_string(),
        ));
    }
    if payload.phone_numbers.len() > MAX_BULK_NUMBERS {
        return Err(ApiError::BadRequest(format!(
            "too many phone numbers: {} (limit: {})",
            payload.phone_numbers.len(),
            MAX_BULK_NUMBERS
        )));
    }
    let greeting = non_blank(payload.greeting);

    let account = CarrierAccount::load(&state).await?;
    let base = external_base(&state, &headers);

    let mut results = Vec::with_capacity(payload.phone_numbers.len());
    for raw in payload.phone_numbers {
        let phone_number = raw.trim().to_string();
        if phone_number.is_empty() {
            results.push(BulkCallResult {
                phone_number,
                ok: false,
                call_sid: None,
                error: Some("empty phone number".to_string()),
            });
            continue;
        }
        let outcome = place_outbound_call(
            &state,
            &account,
            &base,
            &phone_number,
            &prompt,
            greeting.as_deref(),
        )
        .await;
        results.push(match outcome {
            Ok(placed) => BulkCallResult {
                phone_number,
                ok: true,
                call_sid: Some(placed.sid),
                error: None,
            },
            Err(e) => BulkCallResult {
                phone_number,
                ok: false,
                call_sid: None,
                error: Some(e.to_string()),
            },
        });
    }

    let placed = results.iter().filter(|r| r.ok).count();
    let failed = results.len() - placed;
    tracing::info!(placed, failed, "bulk call run finished");
    Ok(Json(BulkCallResponse {
        results,
        placed,
        failed,
    }))
}
