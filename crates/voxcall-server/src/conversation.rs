//! The per-call conversation loop.
//!
//! Every "speech captured" webhook is one step of a small state machine:
//!
//! ```text
//! AwaitingSpeech --no speech--> AwaitingSpeech (listen again)
//! AwaitingSpeech --utterance--> Processing --reply--> RespondedAndListening
//!                                          \--goodbye--> Terminated
//! ```
//!
//! Nothing is kept in memory between webhooks. The only state that survives
//! a step is the call session row: the transcript and the operator directive.
//!
//! A step never fails. Upstream, credential and storage failures degrade the
//! reply, but the carrier always gets a document that either listens again or
//! hangs up. Everything before the transcript write shares one deadline,
//! `call.turn_budget_ms`, so the reply reaches the carrier well inside its
//! webhook timeout.

use crate::api::run_blocking;
use crate::AppState;
use std::time::Duration;
use tokio::time::Instant;
use voxcall_sessions::{append_turns, find_session, start_session, CallParties};
use voxcall_types::{CallLeg, CredentialKey, Turn};
use voxcall_voice::{Gather, VoiceResponse};

/// Webhook route for calls we placed.
pub const OUTBOUND_SPEECH_ROUTE: &str = "/handle_speech";
/// Webhook route for calls we received.
pub const INBOUND_SPEECH_ROUTE: &str = "/handle_speech1";

/// The webhook route a leg's speech results are posted to.
pub fn speech_route(leg: CallLeg) -> &'static str {
    match leg {
        CallLeg::Inbound => INBOUND_SPEECH_ROUTE,
        CallLeg::Outbound => OUTBOUND_SPEECH_ROUTE,
    }
}

/// Absolute (or host-relative, when `base` is empty) URL of the speech
/// webhook for `leg`, carrying `prompt` as a query parameter when given.
pub fn gather_action(base: &str, leg: CallLeg, prompt: Option<&str>) -> String {
    let route = speech_route(leg);
    match prompt.map(str::trim).filter(|p| !p.is_empty()) {
        Some(prompt) => {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("prompt", prompt)
                .finish();
            format!("{}{}?{}", base, route, query)
        }
        None => format!("{}{}", base, route),
    }
}

/// Where a call currently is in the conversation loop.
///
/// Nothing about the state is stored between webhooks. The carrier holds the
/// call while we are not answering, so every webhook starts from
/// [`CallState::for_webhook`] and ends in `AwaitingSpeech`,
/// `RespondedAndListening` or `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Listening for the caller.
    AwaitingSpeech,
    /// An utterance arrived and a reply is being produced.
    Processing,
    /// A reply was played and the carrier is listening again.
    RespondedAndListening,
    /// The caller said goodbye; the call is hung up.
    Terminated,
}

impl CallState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingSpeech => "awaiting_speech",
            Self::Processing => "processing",
            Self::RespondedAndListening => "responded_and_listening",
            Self::Terminated => "terminated",
        }
    }

    /// Initial state for a webhook carrying `utterance`.
    pub fn for_webhook(utterance: Option<&str>) -> Self {
        match utterance {
            None => Self::AwaitingSpeech,
            Some(_) => Self::Processing,
        }
    }

    /// Transition once the reply for the current utterance is ready. Only
    /// `Processing` moves.
    pub fn on_reply(self, farewell: bool) -> Self {
        match self {
            Self::Processing if farewell => Self::Terminated,
            Self::Processing => Self::RespondedAndListening,
            other => other,
        }
    }
}

/// A decoded "speech captured" webhook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeechEvent {
    pub call_sid: Option<String>,
    pub leg: CallLeg,
    /// Carrier `From` address.
    pub from: Option<String>,
    /// Carrier `To` address.
    pub to: Option<String>,
    /// Recognized speech, as reported by the carrier.
    pub utterance: Option<String>,
    /// Directive supplied on the webhook URL.
    pub prompt: Option<String>,
}

impl SpeechEvent {
    /// The trimmed utterance, or `None` when nothing was said.
    pub fn utterance(&self) -> Option<&str> {
        self.utterance
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    pub fn call_sid(&self) -> Option<&str> {
        self.call_sid
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn parties(&self) -> CallParties {
        CallParties::new(self.leg, self.from.clone(), self.to.clone())
    }

    /// The person we are talking to: `From` on inbound calls, `To` on
    /// outbound ones.
    pub fn remote_party(&self) -> Option<&str> {
        match self.leg {
            CallLeg::Inbound => self.from.as_deref(),
            CallLeg::Outbound => self.to.as_deref(),
        }
    }

    /// Builds the model input for this turn.
    ///
    /// Returns `None` when the webhook carried no speech.
    pub fn into_turn_input(
        self,
        session_directive: Option<&str>,
        default_directive: &str,
    ) -> Option<TurnInput> {
        let utterance = self.utterance()?.to_string();
        let (directive, source) =
            resolve_directive(session_directive, self.prompt.as_deref(), default_directive);
        Some(TurnInput {
            remote_party: self.remote_party().map(str::to_string),
            utterance,
            directive,
            source,
        })
    }
}

/// Where the directive for a turn came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveSource {
    Session,
    Request,
    Default,
}

impl DirectiveSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Request => "request",
            Self::Default => "default",
        }
    }
}

/// Picks the directive for a turn: the one stored on the session, then the
/// one on the webhook URL, then the configured default.
pub fn resolve_directive(
    session: Option<&str>,
    request: Option<&str>,
    default: &str,
) -> (String, DirectiveSource) {
    fn present(d: Option<&str>) -> Option<&str> {
        d.map(str::trim).filter(|d| !d.is_empty())
    }
    if let Some(d) = present(session) {
        (d.to_string(), DirectiveSource::Session)
    } else if let Some(d) = present(request) {
        (d.to_string(), DirectiveSource::Request)
    } else {
        (default.to_string(), DirectiveSource::Default)
    }
}

/// What the language model is asked on a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnInput {
    pub utterance: String,
    pub directive: String,
    pub source: DirectiveSource,
    pub remote_party: Option<String>,
}

/// Result of one loop step.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub state: CallState,
    pub response: VoiceResponse,
    /// Generated reply text, if generation succeeded.
    pub reply: Option<String>,
    /// URL of the synthesized reply, if synthesis succeeded.
    pub audio_url: Option<String>,
}

/// Runs one step of the conversation loop for `event`.
///
/// `base` is the externally reachable base URL used for audio and webhook
/// links in the returned document.
pub async fn run_turn(state: &AppState, event: SpeechEvent, base: &str) -> TurnOutcome {
    let call = &state.config.call;
    let gather = Gather::new(
        gather_action(base, event.leg, event.prompt.as_deref()),
        call.gather_timeout_secs,
    );

    let mut call_state = CallState::for_webhook(event.utterance());
    if call_state == CallState::AwaitingSpeech {
        tracing::debug!(
            call_sid = event.call_sid().unwrap_or("-"),
            leg = %event.leg,
            "no speech captured, listening again"
        );
        return TurnOutcome {
            state: call_state,
            response: VoiceResponse::new().gather(gather),
            reply: None,
            audio_url: None,
        };
    }

    let deadline = Instant::now() + call.turn_budget();
    let call_sid = event.call_sid().map(str::to_string);
    let session_directive = match call_sid.as_deref() {
        Some(sid) => load_directive(state, sid, deadline).await,
        None => None,
    };

    let parties = event.parties();
    let Some(input) = event.into_turn_input(session_directive.as_deref(), &call.default_directive)
    else {
        // for_webhook already established an utterance is present.
        return TurnOutcome {
            state: CallState::AwaitingSpeech,
            response: VoiceResponse::new().gather(gather),
            reply: None,
            audio_url: None,
        };
    };

    tracing::info!(
        call_sid = call_sid.as_deref().unwrap_or("-"),
        leg = %parties.leg,
        remote_party = input.remote_party.as_deref().unwrap_or("-"),
        directive_source = input.source.as_str(),
        "speech received"
    );

    let reply = generate_reply(state, &input, deadline).await;
    let audio_url = match reply.as_deref() {
        Some(text) => synthesize_reply(state, text, base, deadline).await,
        None => None,
    };

    let persisted_directive =
        (input.source == DirectiveSource::Request).then(|| input.directive.clone());
    let turns = vec![
        Turn::user(input.utterance.clone()),
        Turn::assistant(reply.clone().unwrap_or_default()),
    ];
    match call_sid {
        Some(sid) => record_turns(state, sid, parties, persisted_directive, turns).await,
        None => tracing::warn!("speech webhook carried no CallSid, transcript not recorded"),
    }

    let farewell = call.is_farewell(&input.utterance);
    call_state = call_state.on_reply(farewell);

    let mut response = VoiceResponse::new();
    if let Some(url) = audio_url.as_deref() {
        response = response.play(url);
    } else if let Some(text) = reply.as_deref() {
        if call.say_on_synthesis_failure {
            response = response.say(text);
        }
    }
    response = if farewell {
        response.say(call.farewell_line.clone()).hangup()
    } else {
        response.gather(gather)
    };

    tracing::debug!(state = call_state.as_str(), "turn complete");
    TurnOutcome {
        state: call_state,
        response,
        reply,
        audio_url,
    }
}

/// Time left before `deadline`, capped at `limit`.
fn remaining(deadline: Instant, limit: Duration) -> Duration {
    deadline.saturating_duration_since(Instant::now()).min(limit)
}

async fn load_directive(state: &AppState, call_sid: &str, deadline: Instant) -> Option<String> {
    let sid = call_sid.to_string();
    let lookup = run_blocking(state, move |conn| Ok(find_session(conn, &sid)?));
    let limit = remaining(deadline, state.config.call.store_timeout());
    match tokio::time::timeout(limit, lookup).await {
        Ok(Ok(session)) => session.and_then(|s| s.directive),
        Ok(Err(e)) => {
            tracing::warn!(call_sid, error = %e, "failed to load call session");
            None
        }
        Err(_) => {
            tracing::warn!(call_sid, "call session lookup timed out");
            None
        }
    }
}

async fn provider_key(state: &AppState, key: CredentialKey, deadline: Instant) -> Option<String> {
    let limit = remaining(deadline, state.config.call.store_timeout());
    match tokio::time::timeout(limit, state.credentials.require(key)).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            tracing::warn!(key = key.as_str(), error = %e, "provider credential unavailable");
            None
        }
        Err(_) => {
            tracing::warn!(key = key.as_str(), "credential read timed out");
            None
        }
    }
}

async fn generate_reply(state: &AppState, input: &TurnInput, deadline: Instant) -> Option<String> {
    let api_key = provider_key(state, CredentialKey::OpenAiApiKey, deadline).await?;
    let generate = state
        .generator
        .generate(&api_key, &input.utterance, &input.directive);
    match tokio::time::timeout_at(deadline, generate).await {
        Ok(Ok(text)) => Some(text),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "reply generation failed");
            None
        }
        Err(_) => {
            tracing::warn!("reply generation ran out of turn budget");
            None
        }
    }
}

async fn synthesize_reply(
    state: &AppState,
    text: &str,
    base: &str,
    deadline: Instant,
) -> Option<String> {
    let api_key = provider_key(state, CredentialKey::ElevenLabsApiKey, deadline).await?;
    match tokio::time::timeout_at(deadline, state.synthesizer.synthesize(&api_key, text)).await {
        Ok(Ok(artifact)) => Some(format!("{}/static/{}", base, artifact.file_name)),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "speech synthesis failed");
            None
        }
        Err(_) => {
            tracing::warn!("speech synthesis ran out of turn budget");
            None
        }
    }
}

async fn record_turns(
    state: &AppState,
    call_sid: String,
    parties: CallParties,
    directive: Option<String>,
    turns: Vec<Turn>,
) {
    let sid = call_sid.clone();
    let write = run_blocking(state, move |conn| {
        if directive.is_some() {
            start_session(conn, &sid, &parties, directive.as_deref())?;
        }
        Ok(append_turns(conn, &sid, &parties, &turns)?)
    });
    match tokio::time::timeout(state.config.call.store_timeout(), write).await {
        Ok(Ok(total)) => tracing::debug!(call_sid = %call_sid, total, "transcript updated"),
        Ok(Err(e)) => tracing::warn!(call_sid = %call_sid, error = %e, "failed to record turns"),
        Err(_) => tracing::warn!(call_sid = %call_sid, "transcript write timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_transitions() {
        assert_eq!(CallState::for_webhook(None), CallState::AwaitingSpeech);
        let processing = CallState::for_webhook(Some("hi"));
        assert_eq!(processing, CallState::Processing);
        assert_eq!(processing.on_reply(false), CallState::RespondedAndListening);
        assert_eq!(processing.on_reply(true), CallState::Terminated);
        assert_eq!(
            CallState::AwaitingSpeech.on_reply(true),
            CallState::AwaitingSpeech
        );
    }

    #[test]
    fn remaining_is_capped_and_never_negative() {
        let later = Instant::now() + Duration::from_secs(60);
        assert_eq!(remaining(later, Duration::from_secs(2)), Duration::from_secs(2));
        let past = Instant::now() - Duration::from_millis(10);
        assert_eq!(remaining(past, Duration::from_secs(2)), Duration::ZERO);
    }

    #[test]
    fn directive_prefers_session_then_request_then_default() {
        assert_eq!(
            resolve_directive(Some("stored"), Some("query"), "fallback"),
            ("stored".to_string(), DirectiveSource::Session)
        );
        assert_eq!(
            resolve_directive(Some("  "), Some("query"), "fallback"),
            ("query".to_string(), DirectiveSource::Request)
        );
        assert_eq!(
            resolve_directive(None, None, "fallback"),
            ("fallback".to_string(), DirectiveSource::Default)
        );
    }

    #[test]
    fn blank_speech_has_no_turn_input() {
        let event = SpeechEvent {
            utterance: Some("   ".to_string()),
            ..SpeechEvent::default()
        };
        assert!(event.utterance().is_none());
        assert!(event.into_turn_input(None, "d").is_none());
    }

    #[test]
    fn remote_party_follows_leg() {
        let mut event = SpeechEvent {
            from: Some("+1555".to_string()),
            to: Some("+1666".to_string()),
            utterance: Some(" hello ".to_string()),
            leg: CallLeg::Inbound,
            ..SpeechEvent::default()
        };
        assert_eq!(event.remote_party(), Some("+1555"));
        event.leg = CallLeg::Outbound;
        let input = event.into_turn_input(None, "d").unwrap();
        assert_eq!(input.remote_party.as_deref(), Some("+1666"));
        assert_eq!(input.utterance, "hello");
    }

    #[test]
    fn gather_action_routes_by_leg_and_encodes_prompt() {
        assert_eq!(
            gather_action("https://x.test", CallLeg::Outbound, None),
            "https://x.test/handle_speech"
        );
        assert_eq!(
            gather_action("", CallLeg::Inbound, Some("  ")),
            "/handle_speech1"
        );
        assert_eq!(
            gather_action("https://x.test", CallLeg::Outbound, Some("Sell cakes & pies")),
            "https://x.test/handle_speech?prompt=Sell+cakes+%26+pies"
        );
    }
}
