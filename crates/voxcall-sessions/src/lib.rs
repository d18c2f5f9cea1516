//! Call session registry.
//!
//! Maps a carrier call identifier to the ordered conversation turns of that
//! call, together with the per-call context (leg, parties, operator
//! directive) the conversation loop needs on every webhook.
//!
//! # Contract
//!
//! - Sessions are created on first write, either by [`start_session`] when a
//!   call is initiated or by the first [`append_turns`].
//! - [`append_turns`] is append-only. Existing turns are never replaced.
//! - The directive is immutable once set: later writes only fill it in when
//!   the session has none.
//! - Unknown identifiers read back as [`SessionError::NotFound`].
//!
//! The transcript is stored as a JSON array of `{speaker, text}` records and
//! decoded with serde. Stored text is data, never code.

mod error;
mod store;

pub use error::SessionError;
pub use store::{
    append_turns, find_session, list_sessions, read_session, start_session, CallParties,
    DEFAULT_LIST_LIMIT,
};

#[cfg(test)]
mod tests;
