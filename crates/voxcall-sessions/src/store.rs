//! Persistence operations for call sessions.
//!
//! One row per call identifier in `call_sessions`. Appends run inside an
//! immediate transaction so two writers for the same call serialise on the
//! SQLite write lock instead of losing each other's turns.

use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use voxcall_types::{CallLeg, CallSession, SessionSummary, Turn};

use crate::error::SessionError;

/// Default page size for [`list_sessions`].
pub const DEFAULT_LIST_LIMIT: u32 = 50;

/// Upper bound for [`list_sessions`] page size.
const MAX_LIST_LIMIT: u32 = 500;

/// Who is on the call and which way it was placed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallParties {
    pub leg: CallLeg,
    /// `From` address reported by the carrier.
    pub caller: Option<String>,
    /// `To` address reported by the carrier.
    pub callee: Option<String>,
}

impl CallParties {
    pub fn new(leg: CallLeg, caller: Option<String>, callee: Option<String>) -> Self {
        Self {
            leg,
            caller: caller.filter(|s| !s.trim().is_empty()),
            callee: callee.filter(|s| !s.trim().is_empty()),
        }
    }
}

fn ensure_call_sid(call_sid: &str) -> Result<(), SessionError> {
    if call_sid.trim().is_empty() {
        return Err(SessionError::EmptyCallSid);
    }
    Ok(())
}

fn decode_turns(call_sid: &str, json: &str) -> Result<Vec<Turn>, SessionError> {
    serde_json::from_str(json).map_err(|source| SessionError::CorruptTranscript {
        call_sid: call_sid.to_string(),
        source,
    })
}

/// Registers a call before its first turn, recording the operator directive.
///
/// If the session already exists nothing is overwritten: missing parties and
/// a missing directive are filled in, everything else is kept.
///
/// # Errors
///
/// Returns `SessionError::EmptyCallSid` for a blank identifier and
/// `SessionError::Database` on SQL failure.
pub fn start_session(
    conn: &Connection,
    call_sid: &str,
    parties: &CallParties,
    directive: Option<&str>,
) -> Result<(), SessionError> {
    ensure_call_sid(call_sid)?;
    let directive = directive.filter(|d| !d.trim().is_empty());

    conn.execute(
        "INSERT INTO call_sessions (call_sid, leg, caller, callee, directive)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(call_sid) DO UPDATE SET
            caller = COALESCE(call_sessions.caller, excluded.caller),
            callee = COALESCE(call_sessions.callee, excluded.callee),
            directive = COALESCE(call_sessions.directive, excluded.directive),
            updated_at = datetime('now')",
        params![
            call_sid,
            parties.leg.as_str(),
            parties.caller,
            parties.callee,
            directive,
        ],
    )?;

    tracing::debug!(call_sid, leg = %parties.leg, "call session registered");
    Ok(())
}

/// Appends turns to a call's transcript, creating the session if needed.
///
/// Returns the total number of turns stored for the call afterwards.
///
/// # Errors
///
/// Returns `SessionError::CorruptTranscript` if the stored transcript cannot
/// be decoded (nothing is written in that case), and `SessionError::Database`
/// on SQL failure.
pub fn append_turns(
    conn: &mut Connection,
    call_sid: &str,
    parties: &CallParties,
    turns: &[Turn],
) -> Result<usize, SessionError> {
    ensure_call_sid(call_sid)?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existing: Option<String> = tx
        .query_row(
            "SELECT conversation_json FROM call_sessions WHERE call_sid = ?1",
            [call_sid],
            |row| row.get(0),
        )
        .optional()?;

    let total = match existing {
        Some(json) => {
            let mut conversation = decode_turns(call_sid, &json)?;
            conversation.extend_from_slice(turns);
            tx.execute(
                "UPDATE call_sessions SET
                    conversation_json = ?2,
                    caller = COALESCE(caller, ?3),
                    callee = COALESCE(callee, ?4),
                    updated_at = datetime('now')
                 WHERE call_sid = ?1",
                params![
                    call_sid,
                    serde_json::to_string(&conversation)?,
                    parties.caller,
                    parties.callee,
                ],
            )?;
            conversation.len()
        }
        None => {
            tx.execute(
                "INSERT INTO call_sessions (call_sid, leg, caller, callee, conversation_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    call_sid,
                    parties.leg.as_str(),
                    parties.caller,
                    parties.callee,
                    serde_json::to_string(turns)?,
                ],
            )?;
            turns.len()
        }
    };

    tx.commit()?;

    tracing::debug!(call_sid, appended = turns.len(), total, "turns appended");
    Ok(total)
}

fn map_row_to_session(row: &Row<'_>) -> rusqlite::Result<(CallSession, String)> {
    let leg: String = row.get(1)?;
    let leg = leg.parse::<CallLeg>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok((
        CallSession {
            call_sid: row.get(0)?,
            leg,
            caller: row.get(2)?,
            callee: row.get(3)?,
            directive: row.get(4)?,
            turns: Vec::new(),
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        },
        row.get(5)?,
    ))
}

/// Looks up a session, returning `None` when the call is unknown.
///
/// # Errors
///
/// Returns `SessionError::CorruptTranscript` or `SessionError::Database`.
pub fn find_session(conn: &Connection, call_sid: &str) -> Result<Option<CallSession>, SessionError> {
    let found = conn
        .query_row(
            "SELECT call_sid, leg, caller, callee, directive, conversation_json,
                    created_at, updated_at
             FROM call_sessions WHERE call_sid = ?1",
            [call_sid],
            map_row_to_session,
        )
        .optional()?;

    match found {
        Some((mut session, json)) => {
            session.turns = decode_turns(call_sid, &json)?;
            Ok(Some(session))
        }
        None => Ok(None),
    }
}

/// Reads the full session for a call.
///
/// # Errors
///
/// Returns `SessionError::NotFound` when no session exists for `call_sid`.
pub fn read_session(conn: &Connection, call_sid: &str) -> Result<CallSession, SessionError> {
    find_session(conn, call_sid)?.ok_or_else(|| SessionError::NotFound(call_sid.to_string()))
}

/// Lists the most recently updated sessions, newest first.
///
/// `limit` is clamped to `1..=500`.
///
/// # Errors
///
/// Returns `SessionError::Database` on SQL failure.
pub fn list_sessions(conn: &Connection, limit: u32) -> Result<Vec<SessionSummary>, SessionError> {
    let limit = limit.clamp(1, MAX_LIST_LIMIT);
    let mut stmt = conn.prepare(
        "SELECT call_sid, leg, caller, callee, json_array_length(conversation_json), updated_at
         FROM call_sessions
         ORDER BY updated_at DESC, rowid DESC
         LIMIT ?1",
    )?;

    let rows = stmt.query_map([limit], |row| {
        let leg: String = row.get(1)?;
        let leg = leg.parse::<CallLeg>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let turn_count: i64 = row.get(4)?;
        Ok(SessionSummary {
            call_sid: row.get(0)?,
            leg,
            caller: row.get(2)?,
            callee: row.get(3)?,
            turn_count: usize::try_from(turn_count).unwrap_or(0),
            updated_at: row.get(5)?,
        })
    })?;

    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row?);
    }
    Ok(sessions)
}
