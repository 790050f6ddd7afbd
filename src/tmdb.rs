//! TMDB metadata client
//!
//! Trending and category lists, search, discovery, genres and title details
//! from The Movie Database. The details request appends external ids so the
//! IMDb id needed by the players and the resolver comes back in the same
//! response, along with credits and related titles.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to TMDB
#[derive(Debug, Error)]
pub enum MetadataError {
    /// No API key was configured
    #[error("TMDB API key is not configured (set tmdb.api_key or STREAMX_TMDB_API_KEY)")]
    MissingApiKey,

    /// Request to TMDB failed
    #[error("Request failed: {0}")]
    RequestError(String),

    /// Failed to parse the JSON response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// The requested title does not exist
    #[error("Title not found: {0}")]
    NotFound(String),
}

/// Kind of title
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }
}

/// Curated lists served under `/movie/{category}` and `/tv/{category}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Category {
    Popular,
    TopRated,
    /// Movies only
    Upcoming,
    /// Movies only
    NowPlaying,
    /// Series only
    AiringToday,
    /// Series only
    OnTheAir,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Popular => "popular",
            Category::TopRated => "top_rated",
            Category::Upcoming => "upcoming",
            Category::NowPlaying => "now_playing",
            Category::AiringToday => "airing_today",
            Category::OnTheAir => "on_the_air",
        }
    }
}

/// Filters for the discover endpoints
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoverFilters {
    /// Defaults to `popularity.desc`
    pub sort_by: Option<String>,
    pub genre_ids: Vec<u64>,
    pub year: Option<i32>,
    pub min_rating: Option<f64>,
}

impl DiscoverFilters {
    /// Query parameters for one page of results
    pub fn params(&self, media_type: MediaType, page: u32) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", page.to_string()),
            (
                "sort_by",
                self.sort_by
                    .clone()
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "popularity.desc".to_string()),
            ),
        ];

        if !self.genre_ids.is_empty() {
            let genres: Vec<String> = self.genre_ids.iter().map(u64::to_string).collect();
            params.push(("with_genres", genres.join(",")));
        }
        if let Some(year) = self.year {
            let key = match media_type {
                MediaType::Movie => "year",
                MediaType::Tv => "first_air_date_year",
            };
            params.push((key, year.to_string()));
        }
        if let Some(rating) = self.min_rating {
            params.push(("vote_average.gte", rating.to_string()));
        }

        params
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Genre {
    pub id: u64,
    pub name: String,
}

#[derive(Deserialize)]
struct GenreList {
    genres: Vec<Genre>,
}

/// A title as returned by list endpoints (trending, search)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TitleSummary {
    pub id: u64,
    /// Absent on single-type endpoints; people show up as `person` in search
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
}

/// A page of list results
#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    pub page: u32,
    pub results: Vec<TitleSummary>,
    #[serde(default)]
    pub total_pages: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalIds {
    #[serde(default)]
    pub imdb_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Video {
    pub key: String,
    pub site: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub official: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Videos {
    #[serde(default)]
    pub results: Vec<Video>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CastMember {
    pub name: String,
    #[serde(default)]
    pub character: Option<String>,
    #[serde(default)]
    pub profile_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrewMember {
    pub name: String,
    #[serde(default)]
    pub job: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credits {
    #[serde(default)]
    pub cast: Vec<CastMember>,
    #[serde(default)]
    pub crew: Vec<CrewMember>,
}

impl Credits {
    /// Names of the crew members with the given job, e.g. `Director`
    pub fn with_job<'a>(&'a self, job: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.crew
            .iter()
            .filter(move |c| c.job.as_deref() == Some(job))
            .map(|c| c.name.as_str())
    }
}

/// Full record of one title
#[derive(Debug, Clone, Deserialize)]
pub struct TitleDetails {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    /// Only present for movies; series carry it in `external_ids`
    #[serde(default)]
    pub imdb_id: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    /// Movie runtime in minutes
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub number_of_seasons: Option<u32>,
    #[serde(default)]
    pub external_ids: ExternalIds,
    #[serde(default)]
    pub videos: Videos,
    #[serde(default)]
    pub credits: Credits,
    #[serde(default)]
    pub similar: Option<Page>,
    #[serde(default)]
    pub recommendations: Option<Page>,
}

impl TitleDetails {
    pub fn display_title(&self) -> &str {
        display_title(self.title.as_deref(), self.name.as_deref())
    }

    pub fn release_year(&self) -> Option<i32> {
        release_year(first_non_empty(
            self.release_date.as_deref(),
            self.first_air_date.as_deref(),
        ))
    }

    /// IMDb id from the record itself or its external ids
    pub fn imdb_id(&self) -> Option<&str> {
        self.imdb_id
            .as_deref()
            .or(self.external_ids.imdb_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    pub fn trailer_url(&self) -> Option<String> {
        trailer_url(&self.videos.results)
    }
}

impl TitleSummary {
    pub fn display_title(&self) -> &str {
        display_title(self.title.as_deref(), self.name.as_deref())
    }

    pub fn release_year(&self) -> Option<i32> {
        release_year(first_non_empty(
            self.release_date.as_deref(),
            self.first_air_date.as_deref(),
        ))
    }
}

/// Movie title, series name, or a placeholder
///
/// Empty strings count as missing.
pub fn display_title<'a>(title: Option<&'a str>, name: Option<&'a str>) -> &'a str {
    first_non_empty(title, name).unwrap_or("Untitled")
}

pub(crate) fn first_non_empty<'a>(first: Option<&'a str>, second: Option<&'a str>) -> Option<&'a str> {
    first
        .filter(|s| !s.is_empty())
        .or(second.filter(|s| !s.is_empty()))
}

/// Year of a `YYYY-MM-DD` date
pub fn release_year(date: Option<&str>) -> Option<i32> {
    date?.get(..4)?.parse().ok()
}

/// Picks an official YouTube trailer, then any YouTube trailer, then a teaser
pub fn trailer_url(videos: &[Video]) -> Option<String> {
    let youtube = |v: &&Video| v.site == "YouTube";

    videos
        .iter()
        .filter(youtube)
        .find(|v| v.kind == "Trailer" && v.official)
        .or_else(|| videos.iter().filter(youtube).find(|v| v.kind == "Trailer"))
        .or_else(|| videos.iter().filter(youtube).find(|v| v.kind == "Teaser"))
        .map(|v| format!("https://www.youtube.com/watch?v={}", v.key))
}

/// TMDB API client
pub struct TmdbClient {
    client: reqwest::blocking::Client,
    base_url: String,
    image_base_url: String,
    api_key: String,
    language: String,
}

impl TmdbClient {
    pub fn new(config: &crate::config::TmdbConfig, timeout: Duration) -> Result<Self, MetadataError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(MetadataError::MissingApiKey)?;

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MetadataError::RequestError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            image_base_url: config.image_base_url.trim_end_matches('/').to_string(),
            api_key,
            language: config.language.clone(),
        })
    }

    /// URL of a poster at the given size, or a placeholder image
    pub fn image_url(&self, path: Option<&str>, size: &str) -> String {
        match path {
            Some(path) if !path.is_empty() => format!("{}/{}{}", self.image_base_url, size, path),
            _ => "https://via.placeholder.com/500x750/1a1a1a/ffffff?text=No+Poster".to_string(),
        }
    }

    /// Trending titles; `media_type` is `all`, `movie` or `tv`, `window` is `day` or `week`
    pub fn trending(&self, media_type: &str, window: &str) -> Result<Page, MetadataError> {
        self.get(&format!("trending/{}/{}", media_type, window), &[])
    }

    pub fn search_multi(&self, query: &str, page: u32) -> Result<Page, MetadataError> {
        self.get(
            "search/multi",
            &[("query", query.to_string()), ("page", page.to_string())],
        )
    }

    /// One page of a curated list such as popular or top rated
    pub fn by_category(&self, media_type: MediaType, category: Category, page: u32) -> Result<Page, MetadataError> {
        self.get(
            &format!("{}/{}", media_type.as_str(), category.as_str()),
            &[("page", page.to_string())],
        )
    }

    pub fn discover(&self, media_type: MediaType, filters: &DiscoverFilters, page: u32) -> Result<Page, MetadataError> {
        self.get(
            &format!("discover/{}", media_type.as_str()),
            &filters.params(media_type, page),
        )
    }

    pub fn genres(&self, media_type: MediaType) -> Result<Vec<Genre>, MetadataError> {
        let list: GenreList = self.get(&format!("genre/{}/list", media_type.as_str()), &[])?;
        Ok(list.genres)
    }

    pub fn details(&self, media_type: MediaType, id: u64) -> Result<TitleDetails, MetadataError> {
        self.get(
            &format!("{}/{}", media_type.as_str(), id),
            &[(
                "append_to_response",
                "external_ids,videos,credits,similar,recommendations".to_string(),
            )],
        )
    }

    fn get<T>(&self, path: &str, params: &[(&str, String)]) -> Result<T, MetadataError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);
        tracing::debug!(%url, ?params, "Querying TMDB");

        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str()), ("language", self.language.as_str())])
            .query(params)
            .send()
            .map_err(|e| MetadataError::RequestError(e.to_string()))?;

        if response.status() == 404 {
            return Err(MetadataError::NotFound(path.to_string()));
        }

        if !response.status().is_success() {
            return Err(MetadataError::RequestError(format!(
                "HTTP {} {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        response
            .json()
            .map_err(|e| MetadataError::ParseError(e.to_string()))
    }
}
