use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Form, Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use voxcall_voice::{TelephonyClient, TelephonyConfig, Upstream, VoiceError};

type Seen = Arc<Mutex<Vec<(String, HashMap<String, String>, Option<String>)>>>;

async fn carrier() -> (String, Seen) {
    let seen: Seen = Arc::default();
    let router = Router::new()
        .route(
            "/2010-04-01/Accounts/{sid}/Calls.json",
            post(
                |State(seen): State<Seen>,
                 Path(sid): Path<String>,
                 headers: HeaderMap,
                 Form(form): Form<HashMap<String, String>>| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    seen.lock().unwrap().push((sid, form, auth));
                    (
                        StatusCode::CREATED,
                        Json(json!({ "sid": "CA0001", "status": "queued" })),
                    )
                },
            ),
        )
        .with_state(seen.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{}", addr), seen)
}

fn client(base_url: String) -> TelephonyClient {
    TelephonyClient::new(TelephonyConfig {
        base_url,
        ..TelephonyConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn places_call_with_inline_markup() {
    let (url, seen) = carrier().await;
    let placed = client(url)
        .place_call("AC123", "secret", "+15550001111", "+15552223333", "<Response/>")
        .await
        .unwrap();
    assert_eq!(placed.sid, "CA0001");
    assert_eq!(placed.status, "queued");

    let seen = seen.lock().unwrap();
    let (sid, form, auth) = &seen[0];
    assert_eq!(sid, "AC123");
    assert_eq!(form["To"], "+15552223333");
    assert_eq!(form["From"], "+15550001111");
    assert_eq!(form["Twiml"], "<Response/>");
    assert!(auth.as_deref().unwrap().starts_with("Basic "));
}

#[tokio::test]
async fn malformed_account_sid_is_rejected_locally() {
    let (url, seen) = carrier().await;
    let err = client(url)
        .place_call("../AC1", "t", "+1", "+2", "<Response/>")
        .await
        .unwrap_err();
    assert!(matches!(err, VoiceError::InvalidInput(_)));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn carrier_rejection_surfaces_status() {
    let router = Router::new().route(
        "/2010-04-01/Accounts/{sid}/Calls.json",
        post(|| async { (StatusCode::BAD_REQUEST, "invalid To number") }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let err = client(format!("http://{}", addr))
        .place_call("AC1", "t", "+1", "+2", "<Response/>")
        .await
        .unwrap_err();
    match err {
        VoiceError::Status { service, status, body } => {
            assert_eq!(service, Upstream::Telephony);
            assert_eq!(status, 400);
            assert_eq!(body, "invalid To number");
        }
        other => panic!("expected Status, got {other:?}"),
    }
}
