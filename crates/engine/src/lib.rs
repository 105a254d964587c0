//! Layout state engine for the Cultigrid cart grid.
//!
//! Edits flow through [`transition`] into a [`history::History`] and out to a
//! [`store::LayoutStore`]; [`session::Session`] decides what to do with
//! snapshots coming back from the store, and [`runtime`] runs one session as a
//! single serialized task.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use time::format_description::well_known::Rfc3339;

pub mod error;
pub mod history;
pub mod layout;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod sqlite;
pub mod store;
pub mod transition;

pub use error::{HistoryError, LayoutError, SessionError, TransitionError};
pub use history::{History, HistoryConfig};
pub use runtime::{spawn_session, SessionHandle};
pub use session::{Reception, Session};
pub use sqlite::SqliteStore;
pub use store::{LayoutStore, MemoryStore};
pub use transition::{apply, try_apply, EditCommand};

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Identity of whoever drives a session. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_id_rejects_blank() {
        assert!(ActorId::new("").is_none());
        assert!(ActorId::new("   ").is_none());
        assert_eq!(ActorId::new(" u1 ").unwrap().as_str(), "u1");
    }

    #[test]
    fn rfc3339_stamp_parses_back() {
        let s = now_rfc3339();
        assert!(time::OffsetDateTime::parse(&s, &Rfc3339).is_ok());
    }
}
