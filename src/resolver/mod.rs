//! Resolution of a title to the Kinopoisk id used by the players.
//!
//! A title may arrive with its Kinopoisk id already known, with only an
//! IMDb id, or with nothing but a title and year. The resolver walks a fixed
//! list of strategies and stops at the first one that yields an id.
mod cached;
mod kinobd;
mod kinobd_types;

pub use cached::CachedLookup;
pub use kinobd::{KINOBD_API_URL, KINOBD_PLAYER_SCRIPT, KinoBdClient, KinoBdEmbed};
pub use kinobd_types::FilmInfo;

use thiserror::Error;

/// Errors that can occur during a catalog lookup.
///
/// These never escape [`IdentifierResolver::resolve`]; a failed lookup only
/// moves resolution on to the next strategy.
#[derive(Debug, Error)]
pub enum LookupError {
    /// Request to the catalog failed
    #[error("Request failed: {0}")]
    RequestError(String),

    /// Failed to parse the catalog's JSON response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),
}

/// Everything known about a title before resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TitleIdentifiers {
    /// Kinopoisk id, if the caller already has it
    pub kinopoisk_id: Option<String>,
    /// IMDb id such as `tt1375666`
    pub imdb_id: Option<String>,
    pub title: Option<String>,
    pub year: Option<i32>,
}

/// Read-only catalog used to translate identifiers.
///
/// Implementors return `Ok(None)` when the catalog answered but had no
/// usable id.
pub trait CatalogLookup {
    /// Translates an IMDb id to a Kinopoisk id.
    fn translate_imdb(&self, imdb_id: &str) -> Result<Option<String>, LookupError>;

    /// Searches the catalog by title and optional release year.
    fn search_title(&self, title: &str, year: Option<i32>) -> Result<Option<String>, LookupError>;

    /// Fetches the catalog record for a Kinopoisk id.
    fn film_info(&self, kinopoisk_id: &str) -> Result<Option<FilmInfo>, LookupError>;
}

impl<L: CatalogLookup + ?Sized> CatalogLookup for &L {
    fn translate_imdb(&self, imdb_id: &str) -> Result<Option<String>, LookupError> {
        (**self).translate_imdb(imdb_id)
    }

    fn search_title(&self, title: &str, year: Option<i32>) -> Result<Option<String>, LookupError> {
        (**self).search_title(title, year)
    }

    fn film_info(&self, kinopoisk_id: &str) -> Result<Option<FilmInfo>, LookupError> {
        (**self).film_info(kinopoisk_id)
    }
}

/// One way of obtaining a Kinopoisk id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    /// The id was supplied by the caller
    Known,
    /// Translated from the IMDb id
    CrossReference,
    /// Found by searching for the title
    TitleSearch,
}

impl ResolutionStrategy {
    /// Strategies in the order they are tried
    pub const ORDER: [ResolutionStrategy; 3] = [
        ResolutionStrategy::Known,
        ResolutionStrategy::CrossReference,
        ResolutionStrategy::TitleSearch,
    ];
}

/// Outcome of one resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found {
        kinopoisk_id: String,
        strategy: ResolutionStrategy,
    },
    /// No strategy applied or every applicable one failed
    NotFound,
}

impl Resolution {
    pub fn kinopoisk_id(&self) -> Option<&str> {
        match self {
            Resolution::Found { kinopoisk_id, .. } => Some(kinopoisk_id),
            Resolution::NotFound => None,
        }
    }
}

/// Walks the resolution strategies against a catalog.
pub struct IdentifierResolver<L> {
    lookup: L,
}

impl<L: CatalogLookup> IdentifierResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self { lookup }
    }

    /// Returns the underlying catalog
    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    /// Resolves a Kinopoisk id in a single pass without retries.
    ///
    /// Strategies run strictly one after another; the first success wins.
    pub fn resolve(&self, ids: &TitleIdentifiers) -> Resolution {
        for strategy in ResolutionStrategy::ORDER {
            if let Some(kinopoisk_id) = self.attempt(strategy, ids) {
                tracing::debug!(?strategy, %kinopoisk_id, "Resolved Kinopoisk id");
                return Resolution::Found {
                    kinopoisk_id,
                    strategy,
                };
            }
        }

        tracing::info!(?ids, "No Kinopoisk id found");
        Resolution::NotFound
    }

    /// Runs one strategy. `None` covers both "not applicable" and "failed".
    fn attempt(&self, strategy: ResolutionStrategy, ids: &TitleIdentifiers) -> Option<String> {
        let result = match strategy {
            ResolutionStrategy::Known => return non_empty(ids.kinopoisk_id.as_deref()),
            ResolutionStrategy::CrossReference => {
                let imdb_id = non_empty(ids.imdb_id.as_deref())?;
                self.lookup.translate_imdb(&imdb_id)
            }
            ResolutionStrategy::TitleSearch => {
                let title = non_empty(ids.title.as_deref())?;
                self.lookup.search_title(&title, ids.year)
            }
        };

        match result {
            Ok(found) => non_empty(found.as_deref()),
            Err(e) => {
                tracing::warn!(?strategy, error = %e, "Catalog lookup failed");
                None
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Scripted catalog that records which operations were called
    #[derive(Default)]
    struct FakeCatalog {
        imdb: Option<Result<Option<String>, String>>,
        search: Option<Result<Option<String>, String>>,
        calls: RefCell<Vec<&'static str>>,
    }

    fn answer(scripted: &Option<Result<Option<String>, String>>) -> Result<Option<String>, LookupError> {
        match scripted {
            Some(Ok(id)) => Ok(id.clone()),
            Some(Err(e)) => Err(LookupError::RequestError(e.clone())),
            None => Ok(None),
        }
    }

    impl CatalogLookup for FakeCatalog {
        fn translate_imdb(&self, _imdb_id: &str) -> Result<Option<String>, LookupError> {
            self.calls.borrow_mut().push("imdb");
            answer(&self.imdb)
        }

        fn search_title(&self, _title: &str, _year: Option<i32>) -> Result<Option<String>, LookupError> {
            self.calls.borrow_mut().push("search");
            answer(&self.search)
        }

        fn film_info(&self, _kinopoisk_id: &str) -> Result<Option<FilmInfo>, LookupError> {
            Ok(None)
        }
    }

    #[test]
    fn test_known_id_skips_lookups() {
        let catalog = FakeCatalog::default();
        let resolver = IdentifierResolver::new(&catalog);

        let resolution = resolver.resolve(&TitleIdentifiers {
            kinopoisk_id: Some("447301".to_string()),
            imdb_id: Some("tt1375666".to_string()),
            ..Default::default()
        });

        assert_eq!(
            resolution,
            Resolution::Found {
                kinopoisk_id: "447301".to_string(),
                strategy: ResolutionStrategy::Known,
            }
        );
        assert!(catalog.calls.borrow().is_empty());
    }

    #[test]
    fn test_cross_reference_short_circuits_search() {
        let catalog = FakeCatalog {
            imdb: Some(Ok(Some("123".to_string()))),
            search: Some(Ok(Some("999".to_string()))),
            ..Default::default()
        };
        let resolver = IdentifierResolver::new(&catalog);

        let resolution = resolver.resolve(&TitleIdentifiers {
            imdb_id: Some("tt0000001".to_string()),
            title: Some("Anything".to_string()),
            ..Default::default()
        });

        assert_eq!(resolution.kinopoisk_id(), Some("123"));
        assert_eq!(*catalog.calls.borrow(), vec!["imdb"]);
    }

    #[test]
    fn test_failed_cross_reference_falls_back_to_title_search() {
        let catalog = FakeCatalog {
            imdb: Some(Err("connection reset".to_string())),
            search: Some(Ok(Some("27205".to_string()))),
            ..Default::default()
        };
        let resolver = IdentifierResolver::new(&catalog);

        let resolution = resolver.resolve(&TitleIdentifiers {
            imdb_id: Some("tt1375666".to_string()),
            title: Some("Inception".to_string()),
            year: Some(2010),
            ..Default::default()
        });

        assert_eq!(
            resolution,
            Resolution::Found {
                kinopoisk_id: "27205".to_string(),
                strategy: ResolutionStrategy::TitleSearch,
            }
        );
        assert_eq!(*catalog.calls.borrow(), vec!["imdb", "search"]);
    }

    #[test]
    fn test_empty_answer_counts_as_failure() {
        let catalog = FakeCatalog {
            imdb: Some(Ok(Some("  ".to_string()))),
            search: Some(Ok(None)),
            ..Default::default()
        };
        let resolver = IdentifierResolver::new(&catalog);

        let resolution = resolver.resolve(&TitleIdentifiers {
            imdb_id: Some("tt1".to_string()),
            title: Some("Nothing".to_string()),
            ..Default::default()
        });

        assert_eq!(resolution, Resolution::NotFound);
        assert_eq!(*catalog.calls.borrow(), vec!["imdb", "search"]);
    }

    #[test]
    fn test_nothing_to_resolve_with() {
        let catalog = FakeCatalog::default();
        let resolver = IdentifierResolver::new(&catalog);

        assert_eq!(resolver.resolve(&TitleIdentifiers::default()), Resolution::NotFound);
        assert!(catalog.calls.borrow().is_empty());
    }
}
