use crate::config::Config;
use crate::model::Genre;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("catalog returned status {0}")]
    Status(u16),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct MovieSummary {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<u64>,
}

impl MovieSummary {
    pub fn release_year(&self) -> Option<i64> {
        self.release_date
            .as_deref()
            .and_then(|date| date.get(..4))
            .and_then(|year| year.parse().ok())
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PersonSummary {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub known_for_department: Option<String>,
    #[serde(default)]
    pub known_for: Vec<serde_json::Value>,
}

/// Bounds on the primary release date, as `YYYY-MM-DD`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReleaseWindow {
    pub from: Option<String>,
    pub until: Option<String>,
}

impl ReleaseWindow {
    pub fn is_open(&self) -> bool {
        self.from.is_none() && self.until.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoverQuery {
    pub genre: Option<Genre>,
    /// Person id the movie's crew must include.
    pub crew: Option<u64>,
    pub window: ReleaseWindow,
    pub page: u32,
}

pub trait Catalog {
    fn search_movies(&self, title: &str) -> Result<Vec<MovieSummary>, CatalogError>;
    fn discover(&self, query: &DiscoverQuery) -> Result<Vec<MovieSummary>, CatalogError>;
    fn search_people(&self, name: &str) -> Result<Vec<PersonSummary>, CatalogError>;
    fn director_of(&self, movie_id: u64) -> Result<Option<String>, CatalogError>;
}

#[derive(Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Deserialize)]
struct CrewMember {
    #[serde(default)]
    job: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct Credits {
    #[serde(default)]
    crew: Vec<CrewMember>,
}

const MIN_VOTES: &str = "50";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn discover_params(query: &DiscoverQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("sort_by", "vote_average.desc".to_owned()),
        ("vote_count.gte", MIN_VOTES.to_owned()),
        ("page", query.page.max(1).to_string()),
    ];
    if let Some(genre) = query.genre {
        params.push(("with_genres", genre.tmdb_id().to_string()));
    }
    if let Some(person) = query.crew {
        params.push(("with_crew", person.to_string()));
    }
    if let Some(from) = &query.window.from {
        params.push(("primary_release_date.gte", from.clone()));
    }
    if let Some(until) = &query.window.until {
        params.push(("primary_release_date.lte", until.clone()));
    }
    params
}

fn first_director(credits: Credits) -> Option<String> {
    credits
        .crew
        .into_iter()
        .find(|member| member.job.as_deref() == Some("Director"))
        .and_then(|member| member.name)
}

pub struct TmdbClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl TmdbClient {
    pub fn new(config: &Config) -> Result<Self, CatalogError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(TmdbClient {
            client,
            base_url: config.tmdb_url.trim_end_matches('/').to_owned(),
            api_key: config.tmdb_api_key.clone(),
        })
    }

    fn request(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<reqwest::blocking::Request, CatalogError> {
        Ok(self
            .client
            .get(&format!("{}{}", self.base_url, path))
            .query(&[("api_key", self.api_key.as_str())])
            .query(params)
            .build()?)
    }

    fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, CatalogError> {
        debug!("GET {}{} {:?}", self.base_url, path, params);
        let response = self.client.execute(self.request(path, params)?)?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }
        Ok(response.json()?)
    }
}

impl Catalog for TmdbClient {
    fn search_movies(&self, title: &str) -> Result<Vec<MovieSummary>, CatalogError> {
        let page: Page<MovieSummary> =
            self.get("/search/movie", &[("query", title.to_owned())])?;
        Ok(page.results)
    }

    fn discover(&self, query: &DiscoverQuery) -> Result<Vec<MovieSummary>, CatalogError> {
        let page: Page<MovieSummary> = self.get("/discover/movie", &discover_params(query))?;
        Ok(page.results)
    }

    fn search_people(&self, name: &str) -> Result<Vec<PersonSummary>, CatalogError> {
        let page: Page<PersonSummary> =
            self.get("/search/person", &[("query", name.to_owned())])?;
        Ok(page.results)
    }

    fn director_of(&self, movie_id: u64) -> Result<Option<String>, CatalogError> {
        let credits: Credits = self.get(&format!("/movie/{}/credits", movie_id), &[])?;
        Ok(first_director(credits))
    }
}
