/// KinoBD catalog client.
use super::kinobd_types::{FilmInfo, FilmsResponse};
use super::{CatalogLookup, LookupError};
use std::time::Duration;

/// Default base URL of the KinoBD films endpoint
pub const KINOBD_API_URL: &str = "https://kinobd.net/api/films";

/// Script that renders the KinoBD player into a `#kinobd` element
pub const KINOBD_PLAYER_SCRIPT: &str = "https://kinobd.net/js/player_.js";

/// Catalog lookups against the KinoBD API.
///
/// This client translates IMDb ids and searches titles using the films
/// endpoint's query parameters.
pub struct KinoBdClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl KinoBdClient {
    /// Creates a client for the given endpoint with a bounded request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LookupError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LookupError::RequestError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Issues a GET and parses the JSON body
    fn get_films(&self, url: &str, query: &[(&str, String)]) -> Result<FilmsResponse, LookupError> {
        tracing::debug!(url, ?query, "Querying KinoBD");

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|e| LookupError::RequestError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LookupError::RequestError(format!(
                "HTTP {} {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        response
            .json()
            .map_err(|e| LookupError::ParseError(e.to_string()))
    }
}

impl CatalogLookup for KinoBdClient {
    fn translate_imdb(&self, imdb_id: &str) -> Result<Option<String>, LookupError> {
        let films = self.get_films(&self.base_url, &[("imdb_id", imdb_id.to_string())])?;
        Ok(films.first_kp_id())
    }

    fn search_title(&self, title: &str, year: Option<i32>) -> Result<Option<String>, LookupError> {
        let mut query = vec![("title", title.to_string())];
        if let Some(year) = year {
            query.push(("year", year.to_string()));
        }

        let films = self.get_films(&self.base_url, &query)?;
        Ok(films.first_kp_id())
    }

    fn film_info(&self, kinopoisk_id: &str) -> Result<Option<FilmInfo>, LookupError> {
        let url = format!("{}/{}", self.base_url, kinopoisk_id);

        Ok(match self.get_films(&url, &[])? {
            FilmsResponse::One(film) => Some(film),
            FilmsResponse::Many(films) => films.into_iter().next(),
        })
    }
}

/// Script-driven KinoBD player for a resolved film.
///
/// The view mounts an element with id `kinobd` carrying the
/// `data-kinopoisk` attribute and loads [`KINOBD_PLAYER_SCRIPT`] once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KinoBdEmbed {
    pub kinopoisk_id: String,
}

impl KinoBdEmbed {
    pub fn new(kinopoisk_id: impl Into<String>) -> Self {
        Self {
            kinopoisk_id: kinopoisk_id.into(),
        }
    }

    pub fn script_url(&self) -> &'static str {
        KINOBD_PLAYER_SCRIPT
    }

    /// Markup for the player mount point
    pub fn mount_html(&self) -> String {
        format!(
            r#"<div id="kinobd" data-kinopoisk="{}"></div>"#,
            self.kinopoisk_id.replace('"', "&quot;")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_dropped() {
        let client = KinoBdClient::new("https://kinobd.net/api/films/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url, KINOBD_API_URL);
    }

    #[test]
    fn test_unreachable_catalog_is_a_request_error() {
        let client = KinoBdClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(matches!(
            client.translate_imdb("tt1375666"),
            Err(LookupError::RequestError(_))
        ));
    }

    #[test]
    fn test_embed_markup() {
        let embed = KinoBdEmbed::new("447301");
        assert_eq!(embed.script_url(), KINOBD_PLAYER_SCRIPT);
        assert_eq!(
            embed.mount_html(),
            r#"<div id="kinobd" data-kinopoisk="447301"></div>"#
        );
    }
}
