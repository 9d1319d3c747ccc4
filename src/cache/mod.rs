//! Identity cache: at most one live instance per persisted identity.
//!
//! Each document type owns one [`IdentityCache`]. Entries are weak, so the
//! cache never keeps an instance alive; when the last [`Document`] handle is
//! dropped the instance removes its own entry (see `DocumentCell`'s `Drop`).
//! [`IdentityCache::sweep`] purges anything a drop hook could not reach.
//!
//! The entry map lock covers only the in-memory check-and-insert. Callers
//! must never hold it across gateway I/O, and no `Document` handle is ever
//! dropped while it is held (the drop hook takes the same lock).

use crate::core::DocumentId;
use crate::document::{Document, DocumentCell};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError, Weak};

/// Outcome of [`IdentityCache::register`].
#[derive(Debug)]
pub enum CacheRegistration {
    /// The instance is now the resident one.
    Inserted,
    /// Another live instance already holds this identity; use it instead.
    Existing(Document),
}

pub struct IdentityCache {
    type_name: String,
    entries: Mutex<HashMap<DocumentId, Weak<DocumentCell>>>,
}

impl IdentityCache {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DocumentId, Weak<DocumentCell>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The resident instance for `id`, if one is still alive.
    pub fn lookup(&self, id: &DocumentId) -> Option<Document> {
        let entries = self.lock();
        let found = entries.get(id).and_then(Weak::upgrade);
        drop(entries);
        found.map(Document::from_cell)
    }

    /// Installs `document` for `id` unless a live instance is already there.
    pub fn register(&self, id: &DocumentId, document: &Document) -> CacheRegistration {
        let mut entries = self.lock();
        if let Some(existing) = entries.get(id).and_then(Weak::upgrade) {
            drop(entries);
            let existing = Document::from_cell(existing);
            if Document::ptr_eq(&existing, document) {
                return CacheRegistration::Inserted;
            }
            return CacheRegistration::Existing(existing);
        }
        entries.insert(*id, document.downgrade());
        CacheRegistration::Inserted
    }

    /// Removes the entry for `id` only if it still points at `cell`.
    pub(crate) fn evict(&self, id: &DocumentId, cell: *const DocumentCell) -> bool {
        let mut entries = self.lock();
        let owned = entries
            .get(id)
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), cell));
        if owned {
            entries.remove(id);
        }
        owned
    }

    /// Removes the entry for `id` if `document` is the resident instance.
    pub fn forget(&self, id: &DocumentId, document: &Document) -> bool {
        self.evict(id, document.cell_ptr())
    }

    /// Drops entries whose instance is gone. Returns how many were purged.
    pub fn sweep(&self) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, weak| weak.strong_count() > 0);
        before - entries.len()
    }

    /// Number of entries, live or not yet swept.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.lock()
            .get(id)
            .is_some_and(|weak| weak.strong_count() > 0)
    }
}

impl std::fmt::Debug for IdentityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityCache")
            .field("type_name", &self.type_name)
            .field("entries", &self.len())
            .finish()
    }
}
