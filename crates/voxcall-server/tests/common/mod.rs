#![allow(dead_code)]

use axum::{
    body::Body,
    extract::{Form, Path, State},
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;
use voxcall_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use voxcall_server::{app, config::Config, AppState};
use voxcall_types::CredentialKey;

pub const PUBLIC_URL: &str = "https://calls.example.test";
pub const CARRIER_NUMBER: &str = "+15550001111";
pub const ACCOUNT_SID: &str = "AC0123456789";
pub const DEFAULT_REPLY: &str = "We open at nine.";
pub const FAKE_MP3: &[u8] = b"ID3\x04\x00fake-mpeg-frames";

/// Stand-in for the completion, synthesis and carrier APIs.
pub struct MockUpstreams {
    pub reply: Mutex<String>,
    pub fail_llm: AtomicBool,
    pub fail_tts: AtomicBool,
    pub fail_carrier: AtomicBool,
    /// Extra latency before answering, in milliseconds.
    pub llm_delay_ms: AtomicU64,
    pub tts_delay_ms: AtomicU64,
    pub llm_requests: Mutex<Vec<Value>>,
    pub tts_requests: Mutex<Vec<Value>>,
    pub placed_calls: Mutex<Vec<HashMap<String, String>>>,
    next_call: AtomicUsize,
}

impl MockUpstreams {
    fn new() -> Self {
        Self {
            reply: Mutex::new(DEFAULT_REPLY.to_string()),
            fail_llm: AtomicBool::new(false),
            fail_tts: AtomicBool::new(false),
            fail_carrier: AtomicBool::new(false),
            llm_delay_ms: AtomicU64::new(0),
            tts_delay_ms: AtomicU64::new(0),
            llm_requests: Mutex::new(Vec::new()),
            tts_requests: Mutex::new(Vec::new()),
            placed_calls: Mutex::new(Vec::new()),
            next_call: AtomicUsize::new(1),
        }
    }

    pub fn llm_count(&self) -> usize {
        self.llm_requests.lock().unwrap().len()
    }

    pub fn tts_count(&self) -> usize {
        self.tts_requests.lock().unwrap().len()
    }

    pub fn call_count(&self) -> usize {
        self.placed_calls.lock().unwrap().len()
    }

    /// System message of the most recent completion request.
    pub fn last_directive(&self) -> Option<String> {
        let requests = self.llm_requests.lock().unwrap();
        let messages = requests.last()?["messages"].as_array()?.clone();
        messages
            .iter()
            .find(|m| m["role"] == "system")
            .and_then(|m| m["content"].as_str())
            .map(str::to_string)
    }
}

async fn delay(ms: &AtomicU64) {
    let ms = ms.load(Ordering::SeqCst);
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

async fn completions(State(mock): State<Arc<MockUpstreams>>, Json(body): Json<Value>) -> Response {
    mock.llm_requests.lock().unwrap().push(body);
    delay(&mock.llm_delay_ms).await;
    if mock.fail_llm.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "overloaded").into_response();
    }
    let reply = mock.reply.lock().unwrap().clone();
    Json(json!({
        "choices": [{ "message": { "role": "assistant", "content": reply } }]
    }))
    .into_response()
}

async fn synthesize(
    State(mock): State<Arc<MockUpstreams>>,
    Path(_voice_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    mock.tts_requests.lock().unwrap().push(body);
    delay(&mock.tts_delay_ms).await;
    if mock.fail_tts.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "synthesis backend down").into_response();
    }
    FAKE_MP3.to_vec().into_response()
}

async fn create_call(
    State(mock): State<Arc<MockUpstreams>>,
    Path(_account_sid): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    if mock.fail_carrier.load(Ordering::SeqCst) {
        return (StatusCode::BAD_REQUEST, "The 'To' number is not a valid phone number.")
            .into_response();
    }
    mock.placed_calls.lock().unwrap().push(form);
    let n = mock.next_call.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::CREATED,
        Json(json!({ "sid": format!("CAmock{:04}", n), "status": "queued" })),
    )
        .into_response()
}

async fn spawn_upstreams() -> (String, Arc<MockUpstreams>) {
    let mock = Arc::new(MockUpstreams::new());
    let router = Router::new()
        .route("/chat/completions", post(completions))
        .route("/v1/text-to-speech/{voice_id}", post(synthesize))
        .route("/2010-04-01/Accounts/{account_sid}/Calls.json", post(create_call))
        .with_state(mock.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{}", addr), mock)
}

pub struct TestApp {
    pub router: Router,
    pub pool: DbPool,
    pub mock: Arc<MockUpstreams>,
    pub audio_dir: TempDir,
}

/// App with every credential stored and default settings.
pub async fn test_app() -> TestApp {
    build_app(true, |_| {}).await
}

pub async fn build_app(seed_credentials: bool, customize: impl FnOnce(&mut Config)) -> TestApp {
    let (upstream_url, mock) = spawn_upstreams().await;
    let audio_dir = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.server.public_url = Some(PUBLIC_URL.to_string());
    config.database.path = ":memory:".to_string();
    config.llm.base_url = upstream_url.clone();
    config.synthesis.base_url = upstream_url.clone();
    config.synthesis.audio_dir = audio_dir.path().to_path_buf();
    config.telephony.base_url = upstream_url;
    config.credentials.cache_ttl_ms = 0;
    customize(&mut config);

    let pool = create_pool(":memory:", DbRuntimeSettings::default()).unwrap();
    {
        let conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
        if seed_credentials {
            for (key, value) in [
                (CredentialKey::TwilioAccountSid, ACCOUNT_SID),
                (CredentialKey::TwilioAuthToken, "twilio-token-secret"),
                (CredentialKey::TwilioPhoneNumber, CARRIER_NUMBER),
                (CredentialKey::OpenAiApiKey, "sk-test-openai-key"),
                (CredentialKey::ElevenLabsApiKey, "xi-test-eleven-key"),
            ] {
                voxcall_credentials::set_credential(&conn, key, value).unwrap();
            }
        }
    }

    let state = AppState::new(config, pool.clone()).unwrap();
    TestApp {
        router: app(state),
        pool,
        mock,
        audio_dir,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Posts a carrier webhook with form-encoded `fields`.
    pub async fn webhook(&self, uri: &str, fields: &[(&str, &str)]) -> Response {
        self.send(form_request(uri, fields)).await
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub fn session(&self, call_sid: &str) -> Option<voxcall_types::CallSession> {
        let conn = self.pool.get().unwrap();
        voxcall_sessions::find_session(&conn, call_sid).unwrap()
    }

    /// Files currently in the audio directory.
    pub fn audio_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.audio_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub fn form_request(uri: &str, fields: &[(&str, &str)]) -> Request<Body> {
    let body = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields)
        .finish();
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}
