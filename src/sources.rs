//! Embeddable player sources
//!
//! The source catalog is a fixed, ordered list of third-party players. Order
//! is priority: sources believed to be more reliable come first. For a given
//! title only the sources that can build an embed URL are offered, and the
//! viewer may switch between them.

use reqwest::Url;
use thiserror::Error;

/// Errors surfaced by the source selector
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaybackError {
    /// None of the catalog sources can play this title
    #[error("No players with a Russian voiceover were found for this title")]
    NoSources,

    /// The requested index is not in the available source list
    #[error("Source #{index} does not exist ({available} available)")]
    InvalidSelection { index: usize, available: usize },
}

/// Identifiers a player URL can be built from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerIdentifiers {
    pub tmdb_id: Option<u64>,
    pub imdb_id: Option<String>,
    pub title: String,
    pub year: Option<i32>,
}

impl PlayerIdentifiers {
    fn imdb(&self) -> Option<&str> {
        self.imdb_id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }

    fn title(&self) -> Option<&str> {
        Some(self.title.trim()).filter(|title| !title.is_empty())
    }
}

/// The players known to the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Kodik,
    HdvbPlayer,
    Alloha,
    VideoCdn,
    Collaps,
    /// Title-based aggregator of voiceovers
    Aggregator,
}

impl SourceKind {
    /// The catalog in priority order
    pub const CATALOG: [SourceKind; 6] = [
        SourceKind::Kodik,
        SourceKind::HdvbPlayer,
        SourceKind::Alloha,
        SourceKind::VideoCdn,
        SourceKind::Collaps,
        SourceKind::Aggregator,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SourceKind::Kodik => "Kodik",
            SourceKind::HdvbPlayer => "HDVB Player",
            SourceKind::Alloha => "Alloha",
            SourceKind::VideoCdn => "VideoCDN",
            SourceKind::Collaps => "Collaps",
            SourceKind::Aggregator => "Pleer.Online",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            SourceKind::Kodik => "🇷🇺",
            SourceKind::HdvbPlayer => "🎬",
            SourceKind::Alloha => "🌸",
            SourceKind::VideoCdn => "⚡",
            SourceKind::Collaps => "📺",
            SourceKind::Aggregator => "🎥",
        }
    }

    pub fn quality(self) -> &'static str {
        match self {
            SourceKind::Kodik | SourceKind::HdvbPlayer => "HD/Full HD",
            _ => "HD",
        }
    }

    pub fn voiceovers(self) -> &'static str {
        match self {
            SourceKind::Kodik => "Many dubbing studios",
            SourceKind::HdvbPlayer => "2-3 voiceovers",
            SourceKind::Alloha => "Russian voiceover + subtitles",
            SourceKind::VideoCdn => "Russian voiceover",
            SourceKind::Collaps => "Several voiceovers",
            SourceKind::Aggregator => "All available voiceovers",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SourceKind::Kodik => "Largest library with Russian voiceovers",
            SourceKind::HdvbPlayer => "HD quality, professional voiceover",
            SourceKind::Alloha => "Russian voiceover for anime and films",
            SourceKind::VideoCdn => "Russian CDN, fast loading",
            SourceKind::Collaps => "Stable source with voiceovers",
            SourceKind::Aggregator => "Aggregator of Russian voiceovers",
        }
    }

    /// Builds the embed URL, or `None` when a required identifier is missing
    pub fn embed_url(self, ids: &PlayerIdentifiers) -> Option<String> {
        match self {
            // Title search; the direct link needs both ids
            SourceKind::Kodik => match (ids.title(), ids.imdb(), ids.tmdb_id) {
                (Some(title), _, _) => with_query("https://kodik.cc/search", &[("q", title.to_string())]),
                (None, Some(imdb), Some(tmdb)) => {
                    Some(format!("https://kodik.info/go/seria/{tmdb}/hash/imdb/{imdb}/"))
                }
                _ => None,
            },
            SourceKind::HdvbPlayer => match (ids.imdb(), ids.tmdb_id) {
                (Some(imdb), _) => Some(format!("https://hdvb.tv/video/{imdb}")),
                (None, Some(tmdb)) => Some(format!("https://hdvb.tv/video/tmdb-{tmdb}")),
                (None, None) => None,
            },
            SourceKind::Alloha => match (ids.imdb(), ids.tmdb_id) {
                (Some(imdb), _) => with_query("https://alloha.tv/", &[("imdb", imdb.to_string())]),
                (None, Some(tmdb)) => with_query("https://alloha.tv/", &[("tmdb", tmdb.to_string())]),
                (None, None) => None,
            },
            SourceKind::VideoCdn => ids.imdb().map(|imdb| format!("https://videocdn.tv/video/{imdb}")),
            SourceKind::Collaps => ids
                .imdb()
                .map(|imdb| format!("https://video.colapse.net/embed/{imdb}")),
            SourceKind::Aggregator => {
                let title = ids.title()?;
                let mut params = vec![("title", title.to_string())];
                if let Some(year) = ids.year {
                    params.push(("year", year.to_string()));
                }
                with_query("https://pleer.ru/embed", &params)
            }
        }
    }
}

fn with_query(base: &str, params: &[(&str, String)]) -> Option<String> {
    Url::parse_with_params(base, params)
        .map(String::from)
        .ok()
}

/// A catalog source that can play the current title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableSource {
    pub kind: SourceKind,
    pub url: String,
}

/// Instruction to (re)mount the embedded player
///
/// `key` changes whenever the source changes; the view must tear down the
/// previous player and mount a new one rather than update it in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedLoad {
    pub key: String,
    pub index: usize,
    pub kind: SourceKind,
    pub url: String,
}

/// The available sources for one title and the viewer's current choice
#[derive(Debug, Clone)]
pub struct SourceSelector {
    available: Vec<AvailableSource>,
    selected: usize,
}

impl SourceSelector {
    /// Builds the available source list for `ids`
    ///
    /// Fails with [`PlaybackError::NoSources`] when no catalog source can
    /// build a URL. Otherwise the highest-priority source is selected.
    pub fn new(ids: &PlayerIdentifiers) -> Result<Self, PlaybackError> {
        let available: Vec<AvailableSource> = SourceKind::CATALOG
            .iter()
            .filter_map(|&kind| {
                kind.embed_url(ids)
                    .filter(|url| !url.is_empty())
                    .map(|url| AvailableSource { kind, url })
            })
            .collect();

        tracing::debug!(
            title = %ids.title,
            available = available.len(),
            "Built source list"
        );

        if available.is_empty() {
            return Err(PlaybackError::NoSources);
        }

        Ok(Self {
            available,
            selected: 0,
        })
    }

    pub fn available(&self) -> &[AvailableSource] {
        &self.available
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn current(&self) -> &AvailableSource {
        &self.available[self.selected]
    }

    /// Load instruction for the current selection
    pub fn embed(&self) -> EmbedLoad {
        let source = self.current();
        EmbedLoad {
            key: format!("{}-{}", self.selected, source.url),
            index: self.selected,
            kind: source.kind,
            url: source.url.clone(),
        }
    }

    /// Switches to the source at `index` and returns the player to mount
    pub fn select(&mut self, index: usize) -> Result<EmbedLoad, PlaybackError> {
        if index >= self.available.len() {
            return Err(PlaybackError::InvalidSelection {
                index,
                available: self.available.len(),
            });
        }

        self.selected = index;
        tracing::debug!(index, source = self.current().kind.name(), "Selected source");
        Ok(self.embed())
    }

    /// Moves on to the next source after the current one fails
    ///
    /// Returns `None` once the last source has been tried.
    pub fn fallback(&mut self) -> Option<EmbedLoad> {
        let next = self.selected + 1;
        if next < self.available.len() {
            self.select(next).ok()
        } else {
            None
        }
    }
}
