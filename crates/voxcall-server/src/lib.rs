//! voxcall server library logic.

pub mod api;
pub mod api_calls;
pub mod api_credentials;
pub mod api_transcripts;
pub mod api_voice;
pub mod config;
pub mod conversation;
pub mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};
use config::Config;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use voxcall_credentials::CredentialStore;
use voxcall_db::DbPool;
use voxcall_voice::{ResponseGenerator, SpeechSynthesizer, TelephonyClient, VoiceError};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Live-read provider credentials.
    pub credentials: CredentialStore,
    /// Reply generation client.
    pub generator: ResponseGenerator,
    /// Text-to-speech client and audio writer.
    pub synthesizer: SpeechSynthesizer,
    /// Carrier client for outbound calls.
    pub telephony: TelephonyClient,
    pub config: Arc<Config>,
}

impl AppState {
    /// Builds the upstream clients from `config`.
    ///
    /// # Errors
    ///
    /// Returns `VoiceError::Config` if a client cannot be constructed from the
    /// given settings.
    pub fn new(config: Config, pool: DbPool) -> Result<Self, VoiceError> {
        let credentials = CredentialStore::with_ttl(pool.clone(), config.credentials.cache_ttl());
        let generator = ResponseGenerator::new(config.llm.clone())?;
        let synthesizer = SpeechSynthesizer::new(config.synthesis.clone())?;
        let telephony = TelephonyClient::new(config.telephony.clone())?;
        Ok(Self {
            pool,
            credentials,
            generator,
            synthesizer,
            telephony,
            config: Arc::new(config),
        })
    }
}

/// Maximum request body size (64 KiB). Webhook forms and operator payloads
/// are small.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let operator_routes = Router::new()
        .route("/make_call", get(api_calls::make_call_handler))
        .route("/api/calls/bulk", post(api_calls::bulk_call_handler))
        .route(
            "/api/credentials",
            get(api_credentials::get_credentials_handler)
                .put(api_credentials::put_credentials_handler),
        )
        .route("/api/credits", post(api_credentials::add_credits_handler))
        .route(
            "/api/transcripts",
            get(api_transcripts::list_transcripts_handler),
        )
        .route(
            "/api/transcripts/{call_sid}",
            get(api_transcripts::get_transcript_handler),
        )
        .layer(axum::middleware::from_fn(middleware::operator_auth_middleware));

    let audio_dir = state.synthesizer.audio_dir().to_path_buf();
    tracing::info!(path = %audio_dir.display(), "serving audio files at /static");

    Router::new()
        .route("/", get(api::index_handler))
        .route("/health", get(api::health_handler))
        .route(
            "/voice",
            post(api_voice::voice_handler).get(api_voice::voice_handler),
        )
        .route(
            "/response_audio",
            get(api_voice::response_audio_handler).post(api_voice::response_audio_handler),
        )
        .route(
            conversation::OUTBOUND_SPEECH_ROUTE,
            get(api_voice::outbound_speech_handler).post(api_voice::outbound_speech_handler),
        )
        .route(
            conversation::INBOUND_SPEECH_ROUTE,
            get(api_voice::inbound_speech_handler).post(api_voice::inbound_speech_handler),
        )
        .merge(operator_routes)
        .nest_service("/static", ServeDir::new(audio_dir))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}

