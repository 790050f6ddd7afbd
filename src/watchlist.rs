//! Per-user watchlists
//!
//! A watchlist is an ordered list of saved titles, unique by id, scoped to
//! the email of the session it was loaded for. Every mutation is written
//! straight through to storage.

use crate::session::Session;
use crate::storage::{KeyValueStore, StorageError, load_json, store_json, watchlist_key};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A saved title
///
/// Only `id` carries meaning for the watchlist. Fields the catalog sends that
/// are not modelled here are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    /// Catalog id, unique within one watchlist
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Movie title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Series name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_air_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_average: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl WatchlistEntry {
    /// Creates a bare entry carrying just an id and a title
    pub fn new(id: u64, title: impl Into<String>) -> Self {
        Self {
            id,
            media_type: None,
            title: Some(title.into()),
            name: None,
            poster_path: None,
            release_date: None,
            first_air_date: None,
            vote_average: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Title for display, falling back to the series name
    pub fn display_title(&self) -> &str {
        crate::tmdb::display_title(self.title.as_deref(), self.name.as_deref())
    }
}

/// The watchlist of the current session
pub struct Watchlist {
    store: Arc<dyn KeyValueStore>,
    /// Email of the session the entries belong to
    owner: Option<String>,
    entries: Vec<WatchlistEntry>,
    /// Set when the stored list could not be read; it is re-read before
    /// any write so an unreadable list is never overwritten
    unread: bool,
}

impl Watchlist {
    /// Creates a watchlist loaded for the given session
    ///
    /// A list that cannot be read is logged and shown empty until a later
    /// read succeeds.
    pub fn load(store: Arc<dyn KeyValueStore>, session: Option<&Session>) -> Self {
        let mut watchlist = Self {
            store,
            owner: None,
            entries: Vec::new(),
            unread: false,
        };
        if let Err(e) = watchlist.reload_for(session) {
            tracing::warn!(error = %e, "Failed to load watchlist");
        }
        watchlist
    }

    /// Replaces the in-memory list with the one persisted for `session`
    ///
    /// Anything held for the previous session is dropped. Without a session,
    /// or when the stored list is corrupt, the watchlist is empty. When the
    /// stored list cannot be read the watchlist is empty too, and every
    /// mutation fails until the list has been read.
    pub fn reload_for(&mut self, session: Option<&Session>) -> Result<(), StorageError> {
        self.owner = session.map(|s| s.email.clone());
        self.entries = Vec::new();
        self.unread = self.owner.is_some();
        self.read_stored()?;

        tracing::debug!(
            owner = ?self.owner,
            count = self.entries.len(),
            "Loaded watchlist"
        );
        Ok(())
    }

    fn read_stored(&mut self) -> Result<(), StorageError> {
        if !self.unread {
            return Ok(());
        }
        if let Some(email) = &self.owner {
            self.entries = load_json(self.store.as_ref(), &watchlist_key(email))?.unwrap_or_default();
        }
        self.unread = false;
        Ok(())
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[WatchlistEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_in_watchlist(&self, id: u64) -> bool {
        self.entries.iter().any(|m| m.id == id)
    }

    /// Appends an entry
    ///
    /// Returns `Ok(false)` without touching anything when there is no
    /// session or the id is already present.
    pub fn add_to_watchlist(&mut self, entry: WatchlistEntry) -> Result<bool, StorageError> {
        self.read_stored()?;
        if self.owner.is_none() || self.is_in_watchlist(entry.id) {
            return Ok(false);
        }

        let mut updated = self.entries.clone();
        updated.push(entry);
        self.save(updated)?;

        Ok(true)
    }

    /// Removes the entry with the given id, if any. No-op without a session.
    pub fn remove_from_watchlist(&mut self, id: u64) -> Result<(), StorageError> {
        if self.owner.is_none() {
            return Ok(());
        }
        self.read_stored()?;

        let updated = self.entries.iter().filter(|m| m.id != id).cloned().collect();
        self.save(updated)
    }

    fn save(&mut self, updated: Vec<WatchlistEntry>) -> Result<(), StorageError> {
        if let Some(email) = &self.owner {
            store_json(self.store.as_ref(), &watchlist_key(email), &updated)?;
            self.entries = updated;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FailingStore, MemoryStore};
    use std::sync::atomic::Ordering;

    fn session(email: &str) -> Session {
        Session {
            email: email.to_string(),
            name: "Tester".to_string(),
        }
    }

    fn store() -> Arc<dyn KeyValueStore> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn test_no_session_rejects_changes() {
        let mut watchlist = Watchlist::load(store(), None);

        assert!(!watchlist.add_to_watchlist(WatchlistEntry::new(1, "Alien")).unwrap());
        watchlist.remove_from_watchlist(1).unwrap();
        assert!(watchlist.is_empty());
        assert!(!watchlist.is_in_watchlist(1));
    }

    #[test]
    fn test_duplicate_add_is_suppressed() {
        let mut watchlist = Watchlist::load(store(), Some(&session("a@example.com")));

        assert!(watchlist.add_to_watchlist(WatchlistEntry::new(7, "Heat")).unwrap());
        assert!(!watchlist.add_to_watchlist(WatchlistEntry::new(7, "Heat")).unwrap());

        assert_eq!(watchlist.len(), 1);
        assert_eq!(watchlist.entries()[0].id, 7);
    }

    #[test]
    fn test_remove_missing_id_is_harmless() {
        let mut watchlist = Watchlist::load(store(), Some(&session("a@example.com")));
        watchlist.add_to_watchlist(WatchlistEntry::new(1, "Up")).unwrap();

        watchlist.remove_from_watchlist(99).unwrap();
        assert_eq!(watchlist.len(), 1);

        watchlist.remove_from_watchlist(1).unwrap();
        assert!(watchlist.is_empty());
    }

    #[test]
    fn test_reload_preserves_order() {
        let store = store();
        let owner = session("order@example.com");

        let mut watchlist = Watchlist::load(Arc::clone(&store), Some(&owner));
        for (id, title) in [(3, "C"), (1, "A"), (2, "B")] {
            watchlist.add_to_watchlist(WatchlistEntry::new(id, title)).unwrap();
        }
        drop(watchlist);

        let reloaded = Watchlist::load(store, Some(&owner));
        let ids: Vec<u64> = reloaded.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_switching_owner_replaces_entries() {
        let store = store();
        let alice = session("alice@example.com");
        let bob = session("bob@example.com");

        let mut watchlist = Watchlist::load(Arc::clone(&store), Some(&bob));
        watchlist.add_to_watchlist(WatchlistEntry::new(10, "Bob's pick")).unwrap();

        watchlist.reload_for(Some(&alice)).unwrap();
        watchlist.add_to_watchlist(WatchlistEntry::new(20, "Alice's pick")).unwrap();

        watchlist.reload_for(Some(&bob)).unwrap();
        assert!(watchlist.is_in_watchlist(10));
        assert!(!watchlist.is_in_watchlist(20));
    }

    #[test]
    fn test_corrupt_list_loads_empty() {
        let store = store();
        store.set(&watchlist_key("c@example.com"), "[{\"id\":").unwrap();

        let watchlist = Watchlist::load(store, Some(&session("c@example.com")));
        assert!(watchlist.is_empty());
    }

    #[test]
    fn test_unreadable_list_is_never_overwritten() {
        let failing = Arc::new(FailingStore::default());
        let owner = session("d@example.com");

        let mut watchlist = Watchlist::load(failing.clone(), Some(&owner));
        watchlist.add_to_watchlist(WatchlistEntry::new(1, "Alien")).unwrap();
        watchlist.add_to_watchlist(WatchlistEntry::new(2, "Aliens")).unwrap();

        failing.fail_reads.store(true, Ordering::SeqCst);
        assert!(watchlist.reload_for(Some(&owner)).is_err());
        assert!(watchlist.is_empty());
        assert!(watchlist.add_to_watchlist(WatchlistEntry::new(3, "Alien 3")).is_err());
        assert!(watchlist.remove_from_watchlist(1).is_err());

        // The next mutation after the store recovers sees the stored list
        failing.fail_reads.store(false, Ordering::SeqCst);
        assert!(watchlist.add_to_watchlist(WatchlistEntry::new(3, "Alien 3")).unwrap());
        let ids: Vec<u64> = watchlist.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_title_shows_series_name() {
        let entry = WatchlistEntry {
            title: Some(String::new()),
            name: Some("Dark".to_string()),
            ..WatchlistEntry::new(70523, "")
        };
        assert_eq!(entry.display_title(), "Dark");
    }

    #[test]
    fn test_unknown_fields_are_preserved() {
        let raw = r#"{"id":27205,"title":"Inception","genre_ids":[28,878],"adult":false}"#;
        let entry: WatchlistEntry = serde_json::from_str(raw).unwrap();

        assert_eq!(entry.display_title(), "Inception");
        assert_eq!(entry.extra["genre_ids"], serde_json::json!([28, 878]));

        let written = serde_json::to_value(&entry).unwrap();
        assert_eq!(written["adult"], serde_json::json!(false));
        assert!(written.get("name").is_none());
    }
}
