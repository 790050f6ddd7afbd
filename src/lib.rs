//! StreamX - Movie and TV discovery companion
//!
//! This library keeps local accounts and per-user watchlists, resolves titles
//! to the identifiers third-party players understand, and decides which
//! embeddable players can show a given title.

pub mod config;
mod resolver;
mod session;
mod sources;
mod storage;
mod tmdb;
mod watchlist;

pub use config::{Config, ConfigError};
pub use resolver::{
    CachedLookup, CatalogLookup, FilmInfo, IdentifierResolver, KINOBD_API_URL,
    KINOBD_PLAYER_SCRIPT, KinoBdClient, KinoBdEmbed, LookupError, Resolution, ResolutionStrategy,
    TitleIdentifiers,
};
pub use session::{
    AuthError, CredentialRecord, Session, SessionManager, validate_login_form,
    validate_signup_form,
};
pub use sources::{
    AvailableSource, EmbedLoad, PlaybackError, PlayerIdentifiers, SourceKind, SourceSelector,
};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use tmdb::{
    Category, Credits, DiscoverFilters, Genre, MediaType, MetadataError, Page, TitleDetails,
    TitleSummary, TmdbClient,
};
pub use watchlist::{Watchlist, WatchlistEntry};

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Top-level error type for StreamX operations
#[derive(Debug, Error)]
pub enum StreamXError {
    /// Error while loading configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error in local persistence
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Login or signup was rejected
    #[error("{0}")]
    Auth(#[from] AuthError),

    /// Error while talking to the metadata provider
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// Error while talking to the player catalog
    #[error("Catalog lookup error: {0}")]
    Lookup(#[from] LookupError),

    /// Error from the source selector
    #[error("{0}")]
    Playback(#[from] PlaybackError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Session and watchlist for the running application
///
/// Created once at startup by rehydrating from storage and handed by
/// reference to whatever needs it. Every session change goes through here so
/// the watchlist is always the one belonging to the current session.
pub struct AppState {
    sessions: SessionManager,
    watchlist: Watchlist,
}

impl AppState {
    /// Restores the persisted session and its watchlist
    pub fn restore(store: Arc<dyn KeyValueStore>) -> Self {
        let sessions = SessionManager::restore(Arc::clone(&store));
        let watchlist = Watchlist::load(store, sessions.current());

        Self {
            sessions,
            watchlist,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.sessions.current()
    }

    pub fn watchlist(&self) -> &Watchlist {
        &self.watchlist
    }

    pub fn watchlist_mut(&mut self) -> &mut Watchlist {
        &mut self.watchlist
    }

    pub fn login(&mut self, email: &str, password: &str) -> Result<Session, AuthError> {
        let session = self.sessions.login(email, password)?;
        self.reload_watchlist();
        Ok(session)
    }

    pub fn signup(&mut self, name: &str, email: &str, password: &str) -> Result<Session, AuthError> {
        let session = self.sessions.signup(name, email, password)?;
        self.reload_watchlist();
        Ok(session)
    }

    pub fn logout(&mut self) {
        self.sessions.logout();
        self.reload_watchlist();
    }

    /// The session change itself has already happened; an unreadable list
    /// stays empty and refuses writes until it can be read.
    fn reload_watchlist(&mut self) {
        if let Err(e) = self.watchlist.reload_for(self.sessions.current()) {
            tracing::warn!(error = %e, "Failed to load watchlist");
        }
    }
}

/// What is known about a title the user wants to watch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackRequest {
    pub tmdb_id: Option<u64>,
    pub kinopoisk_id: Option<String>,
    pub imdb_id: Option<String>,
    pub title: String,
    pub year: Option<i32>,
}

impl From<&TitleDetails> for PlaybackRequest {
    fn from(details: &TitleDetails) -> Self {
        Self {
            tmdb_id: Some(details.id),
            kinopoisk_id: None,
            imdb_id: details.imdb_id().map(str::to_string),
            title: details.display_title().to_string(),
            year: details.release_year(),
        }
    }
}

/// Everything the view needs to offer playback of one title
#[derive(Debug)]
pub struct PlaybackPlan {
    /// Outcome of Kinopoisk id resolution
    pub resolution: Resolution,
    /// KinoBD player, when an id was resolved
    pub kinobd: Option<KinoBdEmbed>,
    /// Voiceover players, or the reason there are none
    pub sources: Result<SourceSelector, PlaybackError>,
}

/// Resolves identifiers and builds the available player sources for a title
///
/// Neither step fails hard: an unresolved id and an empty source list are
/// both reported in the returned plan.
pub fn plan_playback<L>(resolver: &IdentifierResolver<L>, request: &PlaybackRequest) -> PlaybackPlan
where
    L: CatalogLookup,
{
    let resolution = resolver.resolve(&TitleIdentifiers {
        kinopoisk_id: request.kinopoisk_id.clone(),
        imdb_id: request.imdb_id.clone(),
        title: Some(request.title.clone()),
        year: request.year,
    });

    let kinobd = resolution.kinopoisk_id().map(KinoBdEmbed::new);

    let sources = SourceSelector::new(&PlayerIdentifiers {
        tmdb_id: request.tmdb_id,
        imdb_id: request.imdb_id.clone(),
        title: request.title.clone(),
        year: request.year,
    });

    PlaybackPlan {
        resolution,
        kinobd,
        sources,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> (Arc<dyn KeyValueStore>, AppState) {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let state = AppState::restore(Arc::clone(&store));
        (store, state)
    }

    #[test]
    fn test_logout_disables_watchlist() {
        let (_, mut app) = state();
        app.signup("Ann", "ann@example.com", "pw").unwrap();
        assert!(app.watchlist_mut().add_to_watchlist(WatchlistEntry::new(1, "Alien")).unwrap());

        app.logout();

        assert!(app.watchlist().is_empty());
        assert!(!app.watchlist().is_in_watchlist(1));
        assert!(!app.watchlist_mut().add_to_watchlist(WatchlistEntry::new(2, "Aliens")).unwrap());
        app.watchlist_mut().remove_from_watchlist(1).unwrap();

        // Ann's list was untouched by the calls made without a session
        app.login("ann@example.com", "pw").unwrap();
        let ids: Vec<u64> = app.watchlist().entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_switching_users_never_leaks_entries() {
        let (_, mut app) = state();

        app.signup("Bob", "bob@example.com", "pw").unwrap();
        app.watchlist_mut().add_to_watchlist(WatchlistEntry::new(10, "Heat")).unwrap();

        app.signup("Alice", "alice@example.com", "pw").unwrap();
        assert!(app.watchlist().is_empty());
        app.watchlist_mut().add_to_watchlist(WatchlistEntry::new(20, "Up")).unwrap();

        app.login("bob@example.com", "pw").unwrap();
        assert!(app.watchlist().is_in_watchlist(10));
        assert!(!app.watchlist().is_in_watchlist(20));
    }

    #[test]
    fn test_failed_login_keeps_watchlist() {
        let (_, mut app) = state();
        app.signup("Cy", "cy@example.com", "pw").unwrap();
        app.watchlist_mut().add_to_watchlist(WatchlistEntry::new(5, "Jaws")).unwrap();

        assert!(app.login("cy@example.com", "nope").is_err());
        assert!(app.watchlist().is_in_watchlist(5));
    }

    #[test]
    fn test_restart_restores_session_and_watchlist() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::at(dir.path()).unwrap());
            let mut app = AppState::restore(store);
            app.signup("Di", "di@example.com", "pw").unwrap();
            for (id, title) in [(3, "Three"), (1, "One"), (2, "Two")] {
                app.watchlist_mut().add_to_watchlist(WatchlistEntry::new(id, title)).unwrap();
            }
        }

        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::at(dir.path()).unwrap());
        let app = AppState::restore(store);

        assert_eq!(app.session().map(|s| s.name.as_str()), Some("Di"));
        let titles: Vec<&str> = app.watchlist().entries().iter().map(|e| e.display_title()).collect();
        assert_eq!(titles, vec!["Three", "One", "Two"]);
    }

    struct StaticCatalog;

    impl CatalogLookup for StaticCatalog {
        fn translate_imdb(&self, _imdb_id: &str) -> Result<Option<String>, LookupError> {
            Err(LookupError::RequestError("offline".to_string()))
        }

        fn search_title(&self, title: &str, year: Option<i32>) -> Result<Option<String>, LookupError> {
            Ok((title == "Inception" && year == Some(2010)).then(|| "27205".to_string()))
        }

        fn film_info(&self, _kinopoisk_id: &str) -> Result<Option<FilmInfo>, LookupError> {
            Ok(None)
        }
    }

    #[test]
    fn test_plan_playback() {
        let resolver = IdentifierResolver::new(StaticCatalog);
        let plan = plan_playback(
            &resolver,
            &PlaybackRequest {
                tmdb_id: Some(27205),
                imdb_id: Some("tt1375666".to_string()),
                title: "Inception".to_string(),
                year: Some(2010),
                ..Default::default()
            },
        );

        assert_eq!(plan.resolution.kinopoisk_id(), Some("27205"));
        assert_eq!(plan.kinobd, Some(KinoBdEmbed::new("27205")));
        assert_eq!(plan.sources.unwrap().available().len(), 6);
    }

    #[test]
    fn test_plan_playback_without_anything() {
        let resolver = IdentifierResolver::new(StaticCatalog);
        let plan = plan_playback(&resolver, &PlaybackRequest::default());

        assert_eq!(plan.resolution, Resolution::NotFound);
        assert_eq!(plan.kinobd, None);
        assert!(matches!(plan.sources, Err(PlaybackError::NoSources)));
    }
}
