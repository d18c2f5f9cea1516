//! Unit tests for the session registry.

use rusqlite::Connection;
use voxcall_types::{CallLeg, Speaker, Turn};

use crate::error::SessionError;
use crate::store::{
    append_turns, find_session, list_sessions, read_session, start_session, CallParties,
};

/// Creates an in-memory SQLite database with migrations applied.
fn test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("should open in-memory db");
    voxcall_db::run_migrations(&conn).expect("migrations should succeed");
    conn
}

fn outbound_parties() -> CallParties {
    CallParties::new(
        CallLeg::Outbound,
        Some("+15550001111".to_string()),
        Some("+15552223333".to_string()),
    )
}

// ── read_session ─────────────────────────────────────────────────────

#[test]
fn read_unknown_call_is_not_found() {
    let conn = test_db();

    match read_session(&conn, "CA-never-seen") {
        Err(SessionError::NotFound(sid)) => assert_eq!(sid, "CA-never-seen"),
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert!(find_session(&conn, "CA-never-seen").unwrap().is_none());
}

#[test]
fn append_then_read_returns_turns_in_order() {
    let mut conn = test_db();
    let turns = vec![
        Turn::user("What are your hours?"),
        Turn::assistant("We are open nine to five."),
    ];

    let total = append_turns(&mut conn, "CA100", &outbound_parties(), &turns)
        .expect("append should succeed");
    assert_eq!(total, 2);

    let session = read_session(&conn, "CA100").expect("session should exist");
    assert_eq!(session.call_sid, "CA100");
    assert_eq!(session.leg, CallLeg::Outbound);
    assert_eq!(session.caller.as_deref(), Some("+15550001111"));
    assert_eq!(session.callee.as_deref(), Some("+15552223333"));
    assert_eq!(session.turns, turns);
    assert!(session.directive.is_none());
}

// ── append_turns ─────────────────────────────────────────────────────

#[test]
fn second_append_extends_instead_of_replacing() {
    let mut conn = test_db();
    let parties = outbound_parties();

    append_turns(
        &mut conn,
        "CA200",
        &parties,
        &[Turn::user("hello"), Turn::assistant("hi there")],
    )
    .unwrap();
    let total = append_turns(
        &mut conn,
        "CA200",
        &parties,
        &[Turn::user("and tomorrow?"), Turn::assistant("also open")],
    )
    .unwrap();
    assert_eq!(total, 4);

    let session = read_session(&conn, "CA200").unwrap();
    let speakers: Vec<Speaker> = session.turns.iter().map(|t| t.speaker).collect();
    assert_eq!(
        speakers,
        vec![
            Speaker::User,
            Speaker::Assistant,
            Speaker::User,
            Speaker::Assistant
        ]
    );
    assert_eq!(session.turns[2].text, "and tomorrow?");
}

#[test]
fn append_keeps_sessions_isolated_per_call() {
    let mut conn = test_db();
    let parties = outbound_parties();

    append_turns(&mut conn, "CA-a", &parties, &[Turn::user("first call")]).unwrap();
    append_turns(&mut conn, "CA-b", &parties, &[Turn::user("second call")]).unwrap();

    assert_eq!(read_session(&conn, "CA-a").unwrap().turns.len(), 1);
    assert_eq!(
        read_session(&conn, "CA-b").unwrap().turns[0].text,
        "second call"
    );
}

#[test]
fn append_rejects_blank_call_sid() {
    let mut conn = test_db();
    let result = append_turns(&mut conn, "  ", &outbound_parties(), &[Turn::user("x")]);
    assert!(matches!(result, Err(SessionError::EmptyCallSid)));
}

#[test]
fn stored_text_is_treated_as_data() {
    let mut conn = test_db();
    let hostile = r#"{"speaker": "assistant"}]; DROP TABLE call_sessions; --"#;

    append_turns(&mut conn, "CA300", &outbound_parties(), &[Turn::user(hostile)]).unwrap();

    let session = read_session(&conn, "CA300").unwrap();
    assert_eq!(session.turns, vec![Turn::user(hostile)]);
}

#[test]
fn corrupt_transcript_is_reported_and_not_overwritten() {
    let mut conn = test_db();
    conn.execute(
        "INSERT INTO call_sessions (call_sid, leg, conversation_json)
         VALUES ('CA400', 'inbound', '__import__(\"os\")')",
        [],
    )
    .unwrap();

    let read = read_session(&conn, "CA400");
    assert!(matches!(read, Err(SessionError::CorruptTranscript { .. })));

    let append = append_turns(&mut conn, "CA400", &outbound_parties(), &[Turn::user("x")]);
    assert!(matches!(append, Err(SessionError::CorruptTranscript { .. })));

    let raw: String = conn
        .query_row(
            "SELECT conversation_json FROM call_sessions WHERE call_sid = 'CA400'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(raw, "__import__(\"os\")");
}

// ── start_session ────────────────────────────────────────────────────

#[test]
fn start_session_persists_directive_for_later_turns() {
    let mut conn = test_db();
    let parties = CallParties::new(CallLeg::Outbound, None, Some("+15552223333".to_string()));

    start_session(&conn, "CA500", &parties, Some("You are a booking assistant")).unwrap();
    append_turns(
        &mut conn,
        "CA500",
        &outbound_parties(),
        &[Turn::user("book me in"), Turn::assistant("done")],
    )
    .unwrap();

    let session = read_session(&conn, "CA500").unwrap();
    assert_eq!(
        session.directive.as_deref(),
        Some("You are a booking assistant")
    );
    // Caller was unknown at initiation and filled in by the first webhook.
    assert_eq!(session.caller.as_deref(), Some("+15550001111"));
    assert_eq!(session.turns.len(), 2);
}

#[test]
fn directive_is_immutable_once_set() {
    let conn = test_db();
    let parties = outbound_parties();

    start_session(&conn, "CA600", &parties, Some("original")).unwrap();
    start_session(&conn, "CA600", &parties, Some("replacement")).unwrap();

    let session = read_session(&conn, "CA600").unwrap();
    assert_eq!(session.directive.as_deref(), Some("original"));
    assert!(session.turns.is_empty());
}

#[test]
fn blank_directive_is_not_stored() {
    let conn = test_db();
    start_session(&conn, "CA700", &outbound_parties(), Some("   ")).unwrap();
    start_session(&conn, "CA700", &outbound_parties(), Some("later")).unwrap();

    let session = read_session(&conn, "CA700").unwrap();
    assert_eq!(session.directive.as_deref(), Some("later"));
}

// ── list_sessions ────────────────────────────────────────────────────

#[test]
fn list_sessions_counts_turns_newest_first() {
    let mut conn = test_db();
    let parties = outbound_parties();

    append_turns(&mut conn, "CA-old", &parties, &[Turn::user("a")]).unwrap();
    append_turns(
        &mut conn,
        "CA-new",
        &parties,
        &[Turn::user("b"), Turn::assistant("c")],
    )
    .unwrap();

    let sessions = list_sessions(&conn, 10).unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].call_sid, "CA-new");
    assert_eq!(sessions[0].turn_count, 2);
    assert_eq!(sessions[1].call_sid, "CA-old");
    assert_eq!(sessions[1].turn_count, 1);

    let limited = list_sessions(&conn, 1).unwrap();
    assert_eq!(limited.len(), 1);
}

#[test]
fn list_sessions_on_empty_db_is_empty() {
    let conn = test_db();
    assert!(list_sessions(&conn, 0).unwrap().is_empty());
}
