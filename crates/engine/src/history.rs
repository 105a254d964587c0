//! Linear undo/redo over full layout snapshots.
//!
//! ```text
//! entries: [s0, s1, s2]   cursor: 2
//! undo     -> cursor 1, returns s1
//! record s3 -> entries [s0, s1, s3], cursor 2 (s2 is gone)
//! ```
//!
//! Snapshots are held as `Arc<Layout>`, and a layout shares its untouched carts
//! with its predecessor, so a long history mostly costs the carts that changed.

use crate::error::HistoryError;
use cultigrid_protocol::Layout;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct HistoryConfig {
    /// Oldest entries are evicted past this many. `None` keeps everything.
    pub max_depth: Option<usize>,
}

/// # Invariants
///
/// 1. `entries` is never empty.
/// 2. `cursor < entries.len()`.
/// 3. `undo`/`redo` only move `cursor`; `record` always leaves it at the tail.
#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<Arc<Layout>>,
    cursor: usize,
    config: HistoryConfig,
}

impl History {
    pub fn new(initial: Layout) -> Self {
        Self::with_config(initial, HistoryConfig::default())
    }

    pub fn with_config(initial: Layout, config: HistoryConfig) -> Self {
        Self {
            entries: vec![Arc::new(initial)],
            cursor: 0,
            config,
        }
    }

    /// Drop everything after the cursor, append `layout`, move the cursor to it.
    pub fn record(&mut self, layout: Layout) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push(Arc::new(layout));
        self.cursor = self.entries.len() - 1;
        self.enforce_depth();
    }

    pub fn undo(&mut self) -> Result<Arc<Layout>, HistoryError> {
        if !self.can_undo() {
            return Err(HistoryError::NothingToUndo);
        }
        self.cursor -= 1;
        Ok(self.current().clone())
    }

    pub fn redo(&mut self) -> Result<Arc<Layout>, HistoryError> {
        if !self.can_redo() {
            return Err(HistoryError::NothingToRedo);
        }
        self.cursor += 1;
        Ok(self.current().clone())
    }

    pub fn current(&self) -> &Arc<Layout> {
        &self.entries[self.cursor]
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Arc<Layout>] {
        &self.entries
    }

    fn enforce_depth(&mut self) {
        let Some(max) = self.config.max_depth else {
            return;
        };
        let max = max.max(1);
        if self.entries.len() > max {
            let excess = self.entries.len() - max;
            self.entries.drain(..excess);
            self.cursor -= excess;
        }
    }
}
