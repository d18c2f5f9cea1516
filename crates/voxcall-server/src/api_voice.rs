//! Carrier webhooks: inbound call answer, speech results and greeting
//! playback. Every handler answers with call-control markup, never with a
//! JSON error.

use crate::api::{external_base, run_blocking};
use crate::conversation::{gather_action, run_turn, SpeechEvent};
use crate::AppState;
use axum::{
    extract::{rejection::FormRejection, rejection::QueryRejection, Extension, Form, Query},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use voxcall_sessions::{start_session, CallParties};
use voxcall_types::CallLeg;
use voxcall_voice::{Gather, VoiceResponse};

/// A rendered call-control document served as `text/xml`.
#[derive(Debug, Clone)]
pub struct Twiml(pub VoiceResponse);

impl IntoResponse for Twiml {
    fn into_response(self) -> Response {
        (
            [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
            self.0.render(),
        )
            .into_response()
    }
}

/// Fields the carrier posts with every voice webhook.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookForm {
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
    #[serde(rename = "From")]
    pub from: Option<String>,
    #[serde(rename = "To")]
    pub to: Option<String>,
    #[serde(rename = "SpeechResult")]
    pub speech_result: Option<String>,
}

/// Parameters we put on our own webhook URLs.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    pub leg: Option<String>,
    pub prompt: Option<String>,
}

fn form_or_default(form: Result<Form<WebhookForm>, FormRejection>) -> WebhookForm {
    match form {
        Ok(Form(form)) => form,
        Err(e) => {
            tracing::warn!(error = %e, "unreadable webhook body, treating as empty");
            WebhookForm::default()
        }
    }
}

fn query_or_default(query: Result<Query<WebhookQuery>, QueryRejection>) -> WebhookQuery {
    match query {
        Ok(Query(query)) => query,
        Err(e) => {
            tracing::warn!(error = %e, "unreadable webhook query, treating as empty");
            WebhookQuery::default()
        }
    }
}

/// URL of the pre-recorded greeting, if the file exists.
async fn greeting_url(state: &AppState, base: &str) -> Option<String> {
    let file = state.config.call.greeting_file.trim();
    if file.is_empty() || file.contains("..") || file.starts_with('/') {
        return None;
    }
    let path = state.synthesizer.audio_dir().join(file);
    match tokio::fs::try_exists(&path).await {
        Ok(true) => Some(format!("{}/static/{}", base, file)),
        _ => {
            tracing::warn!(path = %path.display(), "greeting file not found, skipping playback");
            None
        }
    }
}

async fn speech_webhook(
    state: &AppState,
    headers: &HeaderMap,
    route_leg: CallLeg,
    query: WebhookQuery,
    form: WebhookForm,
) -> Twiml {
    let leg = match query.leg.as_deref() {
        Some(raw) => raw.parse::<CallLeg>().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring leg override");
            route_leg
        }),
        None => route_leg,
    };

    let event = SpeechEvent {
        call_sid: form.call_sid,
        leg,
        from: form.from,
        to: form.to,
        utterance: form.speech_result,
        prompt: query.prompt,
    };
    let base = external_base(state, headers);
    Twiml(run_turn(state, event, &base).await.response)
}

/// Handler for `GET|POST /handle_speech`: speech results on calls we placed.
pub async fn outbound_speech_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<WebhookQuery>, QueryRejection>,
    form: Result<Form<WebhookForm>, FormRejection>,
) -> Twiml {
    speech_webhook(
        &state,
        &headers,
        CallLeg::Outbound,
        query_or_default(query),
        form_or_default(form),
    )
    .await
}

/// Handler for `GET|POST /handle_speech1`: speech results on calls we
/// received.
pub async fn inbound_speech_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<WebhookQuery>, QueryRejection>,
    form: Result<Form<WebhookForm>, FormRejection>,
) -> Twiml {
    speech_webhook(
        &state,
        &headers,
        CallLeg::Inbound,
        query_or_default(query),
        form_or_default(form),
    )
    .await
}

/// Handler for `POST /voice`: answers an inbound call.
///
/// Registers the call session (with the `prompt` query parameter as its
/// directive, if given), plays the greeting and starts listening.
pub async fn voice_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<WebhookQuery>, QueryRejection>,
    form: Result<Form<WebhookForm>, FormRejection>,
) -> Twiml {
    let query = query_or_default(query);
    let form = form_or_default(form);
    let prompt = query
        .prompt
        .filter(|p| !p.trim().is_empty());

    tracing::info!(
        call_sid = form.call_sid.as_deref().unwrap_or("-"),
        from = form.from.as_deref().unwrap_or("-"),
        "incoming call"
    );

    if let Some(call_sid) = form.call_sid.clone().filter(|s| !s.trim().is_empty()) {
        let parties = CallParties::new(CallLeg::Inbound, form.from.clone(), form.to.clone());
        let directive = prompt.clone();
        let sid = call_sid.clone();
        let register = run_blocking(&state, move |conn| {
            Ok(start_session(conn, &sid, &parties, directive.as_deref())?)
        });
        match tokio::time::timeout(state.config.call.store_timeout(), register).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(call_sid = %call_sid, error = %e, "failed to register call"),
            Err(_) => tracing::warn!(call_sid = %call_sid, "call registration timed out"),
        }
    }

    let base = external_base(&state, &headers);
    let mut response = VoiceResponse::new();
    if let Some(url) = greeting_url(&state, &base).await {
        response = response.play(url);
    }
    response = response.gather(Gather::new(
        gather_action(&base, CallLeg::Inbound, prompt.as_deref()),
        state.config.call.gather_timeout_secs,
    ));
    Twiml(response)
}

/// Handler for `GET|POST /response_audio`: plays the greeting file.
pub async fn response_audio_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Twiml {
    let base = external_base(&state, &headers);
    let response = match greeting_url(&state, &base).await {
        Some(url) => VoiceResponse::new().play(url),
        None => VoiceResponse::new(),
    };
    Twiml(response)
}
