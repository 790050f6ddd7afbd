/// KinoBD API response types for deserialization.
///
/// These structures mirror the JSON response format of the KinoBD films
/// endpoint. The API is loose about types: `kp_id` shows up both as a string
/// and as a number, and searches answer with either a list or one object.
use serde::{Deserialize, Deserializer, Serialize};

/// A film record from the KinoBD API.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilmInfo {
    /// Kinopoisk id
    #[serde(default, deserialize_with = "lenient_id")]
    pub kp_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub imdb_id: Option<String>,
    #[serde(default)]
    pub name_russian: Option<String>,
    #[serde(default)]
    pub name_original: Option<String>,
    #[serde(default, deserialize_with = "lenient_year")]
    pub year: Option<i32>,
}

/// Body of a lookup or search response.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum FilmsResponse {
    Many(Vec<FilmInfo>),
    One(FilmInfo),
}

impl FilmsResponse {
    /// Kinopoisk id of the first film in the response
    pub fn first_kp_id(self) -> Option<String> {
        match self {
            FilmsResponse::Many(films) => films.into_iter().next().and_then(|f| f.kp_id),
            FilmsResponse::One(film) => film.kp_id,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Integer(i64),
    Float(f64),
}

/// Accepts an id given as string or number; empty strings become `None`.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<StringOrNumber>::deserialize(deserializer)?;
    Ok(match value {
        Some(StringOrNumber::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(StringOrNumber::Integer(n)) => Some(n.to_string()),
        Some(StringOrNumber::Float(n)) if n.fract() == 0.0 => Some((n as i64).to_string()),
        _ => None,
    })
}

/// Accepts a year given as string or number; anything unparseable becomes `None`.
fn lenient_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<StringOrNumber>::deserialize(deserializer)?;
    Ok(match value {
        Some(StringOrNumber::String(s)) => s.trim().parse().ok(),
        Some(StringOrNumber::Integer(n)) => i32::try_from(n).ok(),
        Some(StringOrNumber::Float(n)) => Some(n as i32),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_object_with_numeric_id() {
        let response: FilmsResponse =
            serde_json::from_str(r#"{"kp_id": 447301, "imdb_id": "tt1375666"}"#).unwrap();
        assert_eq!(response.first_kp_id().as_deref(), Some("447301"));
    }

    #[test]
    fn test_list_takes_first_element() {
        let response: FilmsResponse = serde_json::from_str(
            r#"[{"kp_id": "27205", "year": "2010"}, {"kp_id": "1"}]"#,
        )
        .unwrap();
        assert_eq!(response.first_kp_id().as_deref(), Some("27205"));
    }

    #[test]
    fn test_missing_or_empty_id() {
        let empty: FilmsResponse = serde_json::from_str("[]").unwrap();
        assert_eq!(empty.first_kp_id(), None);

        let blank: FilmsResponse = serde_json::from_str(r#"{"kp_id": ""}"#).unwrap();
        assert_eq!(blank.first_kp_id(), None);

        let null: FilmsResponse = serde_json::from_str(r#"{"kp_id": null}"#).unwrap();
        assert_eq!(null.first_kp_id(), None);
    }

    #[test]
    fn test_film_info_fields() {
        let film: FilmInfo = serde_json::from_str(
            r#"{"kp_id": 258687, "name_russian": "Интерстеллар", "name_original": "Interstellar", "year": 2014, "rating": 8.6}"#,
        )
        .unwrap();
        assert_eq!(film.kp_id.as_deref(), Some("258687"));
        assert_eq!(film.name_original.as_deref(), Some("Interstellar"));
        assert_eq!(film.year, Some(2014));
    }
}
