//! The remote document store as seen by a session: one document, read, overwritten
//! whole, and watched for changes.

use anyhow::bail;
use cultigrid_protocol::{LayoutDocument, StoredDocument};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

pub const NOTIFY_CAPACITY: usize = 64;

pub trait LayoutStore: Send + Sync + 'static {
    /// The current document, or `None` if nothing was ever written.
    fn get(&self) -> anyhow::Result<Option<StoredDocument>>;

    /// Overwrite the document. Returns the revision assigned to the write.
    fn put(&self, document: &LayoutDocument) -> anyhow::Result<i64>;

    /// Change notifications, one per accepted write.
    fn subscribe(&self) -> broadcast::Receiver<StoredDocument>;
}

impl<S: LayoutStore + ?Sized> LayoutStore for Arc<S> {
    fn get(&self) -> anyhow::Result<Option<StoredDocument>> {
        (**self).get()
    }

    fn put(&self, document: &LayoutDocument) -> anyhow::Result<i64> {
        (**self).put(document)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoredDocument> {
        (**self).subscribe()
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    rev: i64,
    current: Option<StoredDocument>,
}

/// In-process store. Clones share the same document.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
    notify: broadcast::Sender<StoredDocument>,
    available: Arc<AtomicBool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(MemoryInner::default())),
            notify,
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A store that already holds `document` at revision 1.
    pub fn with_document(document: LayoutDocument) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.rev = 1;
            inner.current = Some(StoredDocument { rev: 1, document });
        }
        store
    }

    /// While unavailable, `get` and `put` fail.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> anyhow::Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            bail!("memory store is offline");
        }
        Ok(())
    }
}

impl LayoutStore for MemoryStore {
    fn get(&self) -> anyhow::Result<Option<StoredDocument>> {
        self.check_available()?;
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.current.clone())
    }

    fn put(&self, document: &LayoutDocument) -> anyhow::Result<i64> {
        self.check_available()?;
        let stored = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.rev += 1;
            let stored = StoredDocument {
                rev: inner.rev,
                document: document.clone(),
            };
            inner.current = Some(stored.clone());
            stored
        };
        let rev = stored.rev;
        // No subscribers is fine.
        let _ = self.notify.send(stored);
        Ok(rev)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoredDocument> {
        self.notify.subscribe()
    }
}
