use crate::catalog::{Catalog, CatalogError, DiscoverQuery, MovieSummary, PersonSummary};
use crate::interpreter::{LanguageModel, ModelError};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

pub fn temp_db() -> sled::Db {
    sled::Config::new().temporary(true).open().unwrap()
}

pub fn summary(id: u64, title: &str, date: &str, rating: f64, genres: &[u64]) -> MovieSummary {
    MovieSummary {
        id,
        title: Some(title.to_owned()),
        release_date: Some(date.to_owned()),
        vote_average: Some(rating),
        overview: Some(format!("About {}", title)),
        genre_ids: genres.to_vec(),
    }
}

pub fn person(id: u64, name: &str, department: Option<&str>, known_for: usize) -> PersonSummary {
    PersonSummary {
        id,
        name: name.to_owned(),
        known_for_department: department.map(str::to_owned),
        known_for: (0..known_for).map(|i| serde_json::json!({ "id": i })).collect(),
    }
}

pub struct ScriptedModel {
    replies: RefCell<VecDeque<Result<String, ModelError>>>,
    calls: Cell<usize>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<String, ModelError>>) -> Self {
        ScriptedModel {
            replies: RefCell::new(replies.into()),
            calls: Cell::new(0),
        }
    }

    pub fn replying(json: serde_json::Value) -> Self {
        ScriptedModel::new(vec![Ok(json.to_string())])
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl LanguageModel for ScriptedModel {
    fn complete(&self, _system: &str, _prompt: &str) -> Result<String, ModelError> {
        self.calls.set(self.calls.get() + 1);
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Transport("script exhausted".to_owned())))
    }
}

/// A catalog over a fixed list of movies. Discovery honours genre and release
/// window, ignores crew, and pages through results best-rated first.
pub struct FakeCatalog {
    movies: Vec<MovieSummary>,
    directors: HashMap<u64, String>,
    people: Vec<PersonSummary>,
    page_size: usize,
    failing: bool,
    discovered: RefCell<Vec<DiscoverQuery>>,
    searches: RefCell<Vec<String>>,
}

impl FakeCatalog {
    pub fn new(movies: Vec<MovieSummary>) -> Self {
        FakeCatalog {
            movies,
            directors: HashMap::new(),
            people: Vec::new(),
            page_size: 20,
            failing: false,
            discovered: RefCell::new(Vec::new()),
            searches: RefCell::new(Vec::new()),
        }
    }

    pub fn with_director(mut self, movie_id: u64, name: &str) -> Self {
        self.directors.insert(movie_id, name.to_owned());
        self
    }

    pub fn with_people(mut self, people: Vec<PersonSummary>) -> Self {
        self.people = people;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn discovered(&self) -> Vec<DiscoverQuery> {
        self.discovered.borrow().clone()
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches.borrow().clone()
    }

    fn check(&self) -> Result<(), CatalogError> {
        if self.failing {
            Err(CatalogError::Status(503))
        } else {
            Ok(())
        }
    }
}

impl Catalog for FakeCatalog {
    fn search_movies(&self, title: &str) -> Result<Vec<MovieSummary>, CatalogError> {
        self.searches.borrow_mut().push(title.to_owned());
        self.check()?;
        let needle = title.to_lowercase();
        Ok(self
            .movies
            .iter()
            .filter(|m| {
                m.title
                    .as_deref()
                    .map_or(false, |t| t.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect())
    }

    fn discover(&self, query: &DiscoverQuery) -> Result<Vec<MovieSummary>, CatalogError> {
        self.discovered.borrow_mut().push(query.clone());
        self.check()?;
        let date = |m: &MovieSummary| m.release_date.clone().unwrap_or_default();
        let mut hits: Vec<MovieSummary> = self
            .movies
            .iter()
            .filter(|m| query.genre.map_or(true, |g| m.genre_ids.contains(&g.tmdb_id())))
            .filter(|m| query.window.from.as_ref().map_or(true, |from| date(m) >= *from))
            .filter(|m| query.window.until.as_ref().map_or(true, |until| date(m) <= *until))
            .cloned()
            .collect();
        hits.sort_by(|a, b| {
            b.vote_average
                .partial_cmp(&a.vote_average)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let skip = (query.page.max(1) as usize - 1) * self.page_size;
        Ok(hits.into_iter().skip(skip).take(self.page_size).collect())
    }

    fn search_people(&self, name: &str) -> Result<Vec<PersonSummary>, CatalogError> {
        self.check()?;
        let needle = name.to_lowercase();
        Ok(self
            .people
            .iter()
            .filter(|p| p.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    fn director_of(&self, movie_id: u64) -> Result<Option<String>, CatalogError> {
        self.check()?;
        Ok(self.directors.get(&movie_id).cloned())
    }
}
