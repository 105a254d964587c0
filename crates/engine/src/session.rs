//! Reconciliation between locally applied edits and snapshots from the store.
//!
//! A [`Session`] is plain state: it never talks to the store itself. The
//! runtime feeds it remote snapshots and local commands one at a time and
//! performs whatever publish the session asks for.
//!
//! The first snapshot a session sees (or the default grid, when the store is
//! empty) seeds both the layout and the history. Every later snapshot only
//! replaces the layout; remote states never enter the history, so only local
//! edits can be undone.

use crate::error::SessionError;
use crate::history::{History, HistoryConfig};
use crate::layout;
use crate::transition::{try_apply, EditCommand};
use crate::ActorId;
use cultigrid_protocol::{Layout, LayoutDocument, PublishStatus, SessionView, StoredDocument};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reception {
    /// Layout and history were established. `publish_default` is set when the
    /// store had no document and the default grid should be written back.
    Seeded { publish_default: bool },
    /// Live update: layout replaced, history untouched.
    Updated,
    /// Stale, invalid, or empty snapshot after initialization. Never returned
    /// for the first snapshot.
    Ignored,
}

#[derive(Debug)]
pub struct Session {
    actor: Option<ActorId>,
    layout: Option<Arc<Layout>>,
    history: Option<History>,
    history_config: HistoryConfig,
    /// Highest store revision adopted or published.
    seen_rev: i64,
    status: PublishStatus,
    needs_publish: bool,
}

impl Session {
    pub fn new(actor: Option<ActorId>, history_config: HistoryConfig) -> Self {
        Self {
            actor,
            layout: None,
            history: None,
            history_config,
            seen_rev: 0,
            status: PublishStatus::Idle,
            needs_publish: false,
        }
    }

    pub fn actor(&self) -> Option<&ActorId> {
        self.actor.as_ref()
    }

    pub fn set_actor(&mut self, actor: ActorId) {
        self.actor = Some(actor);
    }

    pub fn is_initialized(&self) -> bool {
        self.history.is_some()
    }

    pub fn layout(&self) -> Option<&Arc<Layout>> {
        self.layout.as_ref()
    }

    pub fn history(&self) -> Option<&History> {
        self.history.as_ref()
    }

    pub fn status(&self) -> PublishStatus {
        self.status
    }

    /// The current layout still has to reach the store (seeded default that
    /// could not be written yet).
    pub fn needs_publish(&self) -> bool {
        self.needs_publish
    }

    pub fn on_remote_snapshot(&mut self, snapshot: Option<StoredDocument>) -> Reception {
        if !self.is_initialized() {
            return self.seed(snapshot);
        }

        let Some(stored) = snapshot else {
            return Reception::Ignored;
        };
        if stored.rev <= self.seen_rev {
            tracing::debug!(rev = stored.rev, seen = self.seen_rev, "stale snapshot ignored");
            return Reception::Ignored;
        }
        let incoming = stored.document.layout();
        if let Err(err) = layout::validate(&incoming) {
            tracing::warn!(rev = stored.rev, error = %err, "invalid snapshot rejected");
            return Reception::Ignored;
        }
        tracing::info!(
            rev = stored.rev,
            by = stored.document.updated_by.as_str(),
            "remote layout adopted"
        );
        self.seen_rev = stored.rev;
        self.layout = Some(Arc::new(incoming));
        // Someone else wrote first; a pending default seed must not overwrite it.
        self.needs_publish = false;
        Reception::Updated
    }

    fn seed(&mut self, snapshot: Option<StoredDocument>) -> Reception {
        let (initial, publish_default) = match snapshot {
            Some(stored) => {
                let incoming = stored.document.layout();
                self.seen_rev = stored.rev;
                match layout::validate(&incoming) {
                    Ok(()) => {
                        tracing::info!(rev = stored.rev, "session seeded from store");
                        (incoming, false)
                    }
                    Err(err) => {
                        // Every session would reject this document, so replace it.
                        tracing::warn!(
                            rev = stored.rev,
                            error = %err,
                            "stored layout is invalid; seeding default grid over it"
                        );
                        self.status = PublishStatus::Failed;
                        (layout::default_grid(), true)
                    }
                }
            }
            None => {
                tracing::info!("store is empty; seeding default grid");
                (layout::default_grid(), true)
            }
        };
        let history = History::with_config(initial, self.history_config.clone());
        self.layout = Some(history.current().clone());
        self.history = Some(history);
        self.needs_publish = publish_default;
        Reception::Seeded { publish_default }
    }

    /// Apply a local edit. Returns the new layout when something changed and
    /// must be published; `None` when the edit was a no-op.
    pub fn edit(
        &mut self,
        command: &EditCommand,
        now_ms: i64,
    ) -> Result<Option<Arc<Layout>>, SessionError> {
        let actor = self.actor.clone().ok_or(SessionError::AuthUnavailable)?;
        let (Some(current), Some(history)) = (self.layout.as_ref(), self.history.as_mut()) else {
            return Err(SessionError::NotReady);
        };

        let next = match try_apply(current, command, &actor, now_ms) {
            Ok(Some(next)) => next,
            Ok(None) => return Ok(None),
            Err(err) => {
                tracing::warn!(actor = actor.as_str(), error = %err, "edit ignored");
                return Ok(None);
            }
        };
        history.record(next);
        let layout = history.current().clone();
        self.layout = Some(layout.clone());
        Ok(Some(layout))
    }

    pub fn undo(&mut self) -> Result<Arc<Layout>, SessionError> {
        self.step(History::undo)
    }

    pub fn redo(&mut self) -> Result<Arc<Layout>, SessionError> {
        self.step(History::redo)
    }

    fn step(
        &mut self,
        f: impl FnOnce(&mut History) -> Result<Arc<Layout>, crate::HistoryError>,
    ) -> Result<Arc<Layout>, SessionError> {
        if self.actor.is_none() {
            return Err(SessionError::AuthUnavailable);
        }
        let history = self.history.as_mut().ok_or(SessionError::NotReady)?;
        let layout = f(history)?;
        self.layout = Some(layout.clone());
        Ok(layout)
    }

    /// The document to write for the current layout, stamped with this
    /// session's actor.
    pub fn outgoing(&self, updated_at: impl Into<String>) -> Result<LayoutDocument, SessionError> {
        let actor = self.actor.as_ref().ok_or(SessionError::AuthUnavailable)?;
        let layout = self.layout.as_ref().ok_or(SessionError::NotReady)?;
        Ok(LayoutDocument::new(layout, actor.as_str(), updated_at))
    }

    pub fn begin_publish(&mut self) {
        self.status = PublishStatus::Saving;
    }

    pub fn publish_succeeded(&mut self, rev: i64) {
        self.seen_rev = self.seen_rev.max(rev);
        self.status = PublishStatus::Saved;
        self.needs_publish = false;
    }

    /// Local state stands; only the status reflects the failure.
    pub fn publish_failed(&mut self) {
        self.status = PublishStatus::Failed;
    }

    pub fn fetch_failed(&mut self) {
        self.status = PublishStatus::Failed;
    }

    pub fn view(&self) -> SessionView {
        let (cursor, history_len, can_undo, can_redo) = match &self.history {
            Some(h) => (h.cursor(), h.len(), h.can_undo(), h.can_redo()),
            None => (0, 0, false, false),
        };
        SessionView {
            actor: self.actor.as_ref().map(|a| a.as_str().to_string()),
            initialized: self.is_initialized(),
            layout: self.layout.as_deref().cloned(),
            cursor,
            history_len,
            can_undo,
            can_redo,
            status: self.status,
        }
    }
}
