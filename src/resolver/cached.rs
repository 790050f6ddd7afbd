//! Cached catalog lookups
//!
//! This module provides a caching wrapper for catalog lookups that stores
//! successful id translations in the local key-value store.

use super::{CatalogLookup, FilmInfo, LookupError};
use crate::storage::{KeyValueStore, load_json, store_json};
use std::sync::Arc;

/// A caching wrapper for catalog lookups
///
/// Only positive answers are cached, so a title the catalog did not know
/// yesterday is looked up again today. Cache failures never prevent a
/// lookup.
pub struct CachedLookup<L> {
    /// The underlying catalog
    lookup: L,
    /// Store holding cached answers
    store: Arc<dyn KeyValueStore>,
}

impl<L: CatalogLookup> CachedLookup<L> {
    pub fn new(lookup: L, store: Arc<dyn KeyValueStore>) -> Self {
        Self { lookup, store }
    }

    fn cached_or_fetch<T, F>(&self, key: String, fetch: F) -> Result<Option<T>, LookupError>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
        F: FnOnce(&L) -> Result<Option<T>, LookupError>,
    {
        match load_json(self.store.as_ref(), &key) {
            Ok(Some(hit)) => {
                tracing::debug!(key = %key, "Catalog cache hit");
                return Ok(Some(hit));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(key = %key, error = %e, "Failed to read catalog cache"),
        }

        let fetched = fetch(&self.lookup)?;

        if let Some(value) = &fetched {
            // Ignore errors to avoid failing the lookup
            if let Err(e) = store_json(self.store.as_ref(), &key, value) {
                tracing::warn!(key = %key, error = %e, "Failed to cache catalog answer");
            }
        }

        Ok(fetched)
    }
}

/// Cache key for a lookup
///
/// Keys are namespaced so they can share the store with account data.
fn cache_key(kind: &str, parts: &[&str]) -> String {
    format!("streamx_kp_{}_{}", kind, parts.join("_").to_lowercase())
}

impl<L: CatalogLookup> CatalogLookup for CachedLookup<L> {
    fn translate_imdb(&self, imdb_id: &str) -> Result<Option<String>, LookupError> {
        self.cached_or_fetch(cache_key("imdb", &[imdb_id]), |l| l.translate_imdb(imdb_id))
    }

    fn search_title(&self, title: &str, year: Option<i32>) -> Result<Option<String>, LookupError> {
        let year_part = year.map(|y| y.to_string()).unwrap_or_default();
        self.cached_or_fetch(cache_key("title", &[title, year_part.as_str()]), |l| {
            l.search_title(title, year)
        })
    }

    fn film_info(&self, kinopoisk_id: &str) -> Result<Option<FilmInfo>, LookupError> {
        self.cached_or_fetch(cache_key("film", &[kinopoisk_id]), |l| l.film_info(kinopoisk_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::cell::Cell;

    struct CountingCatalog {
        answer: Option<String>,
        calls: Cell<usize>,
    }

    impl CatalogLookup for CountingCatalog {
        fn translate_imdb(&self, _imdb_id: &str) -> Result<Option<String>, LookupError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.answer.clone())
        }

        fn search_title(&self, _title: &str, _year: Option<i32>) -> Result<Option<String>, LookupError> {
            self.calls.set(self.calls.get() + 1);
            Err(LookupError::RequestError("offline".to_string()))
        }

        fn film_info(&self, _kinopoisk_id: &str) -> Result<Option<FilmInfo>, LookupError> {
            Ok(None)
        }
    }

    #[test]
    fn test_positive_answers_are_cached() {
        let catalog = CountingCatalog {
            answer: Some("123".to_string()),
            calls: Cell::new(0),
        };
        let cached = CachedLookup::new(&catalog, Arc::new(MemoryStore::new()));

        assert_eq!(cached.translate_imdb("tt1").unwrap().as_deref(), Some("123"));
        assert_eq!(cached.translate_imdb("tt1").unwrap().as_deref(), Some("123"));
        assert_eq!(catalog.calls.get(), 1);
    }

    #[test]
    fn test_misses_and_errors_are_not_cached() {
        let catalog = CountingCatalog {
            answer: None,
            calls: Cell::new(0),
        };
        let cached = CachedLookup::new(&catalog, Arc::new(MemoryStore::new()));

        assert_eq!(cached.translate_imdb("tt2").unwrap(), None);
        assert_eq!(cached.translate_imdb("tt2").unwrap(), None);
        assert!(cached.search_title("Film", Some(1999)).is_err());
        assert!(cached.search_title("Film", Some(1999)).is_err());
        assert_eq!(catalog.calls.get(), 4);
    }

    #[test]
    fn test_cache_key_namespacing() {
        assert_eq!(cache_key("imdb", &["tt1375666"]), "streamx_kp_imdb_tt1375666");
        assert_eq!(
            cache_key("title", &["Inception", "2010"]),
            "streamx_kp_title_inception_2010"
        );
    }
}
