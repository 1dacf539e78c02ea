use crate::catalog::{Catalog, DiscoverQuery, MovieSummary, PersonSummary, ReleaseWindow};
use crate::database::{Cached, MovieDb};
use crate::error::Result;
use crate::filter::{Filter, Op};
use crate::model::{Genre, Movie};
use log::{debug, info, warn};
use std::fmt;

pub const MAX_PAGES: u32 = 5;
pub const TITLE_SEARCH_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    Director { name: String, genre: Option<String> },
    Genre(String),
    TopRated,
}

impl Strategy {
    pub fn select(filter: &Filter) -> Strategy {
        let hint = |field: &str| {
            filter
                .text_hint(field)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };
        match (hint("director"), hint("genre")) {
            (Some(name), genre) => Strategy::Director { name, genre },
            (None, Some(genre)) => Strategy::Genre(genre),
            (None, None) => Strategy::TopRated,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Director { name, genre: None } => write!(f, "director {}", name),
            Strategy::Director {
                name,
                genre: Some(genre),
            } => write!(f, "director {} ({})", name, genre),
            Strategy::Genre(genre) => write!(f, "genre {}", genre),
            Strategy::TopRated => f.write_str("top rated"),
        }
    }
}

pub fn release_window(filter: &Filter) -> ReleaseWindow {
    let mut window = ReleaseWindow::default();
    let ops = match filter.ops("release_year") {
        Some(ops) => ops,
        None => return window,
    };
    let year = |v: &crate::value::Value| v.as_i64();
    for op in ops {
        match op {
            Op::Gt(v) => {
                if let Some(y) = year(v) {
                    window.from = Some(format!("{}-01-01", y + 1));
                }
            }
            Op::Gte(v) => {
                if let Some(y) = year(v) {
                    window.from = Some(format!("{}-01-01", y));
                }
            }
            Op::Lt(v) | Op::Lte(v) => {
                if let Some(y) = year(v) {
                    window.until = Some(format!("{}-12-31", y));
                }
            }
            _ => {}
        }
    }
    // an exact year wins over any range
    if let Some(y) = ops.iter().find_map(|op| match op {
        Op::Eq(v) => year(v),
        _ => None,
    }) {
        window.from = Some(format!("{}-01-01", y));
        window.until = Some(format!("{}-12-31", y));
    }
    window
}

/// Picks the person a director name most likely refers to: names containing
/// the query, preferring people known for directing with more known credits.
/// The first of equally good candidates wins.
pub fn best_director_match(name: &str, people: Vec<PersonSummary>) -> Option<PersonSummary> {
    let needle = name.to_lowercase();
    let score = |p: &PersonSummary| match p.known_for_department.as_deref() {
        Some("Directing") => 1 + p.known_for.len(),
        _ => 0,
    };
    let mut best: Option<(usize, PersonSummary)> = None;
    for person in people
        .into_iter()
        .filter(|p| p.name.to_lowercase().contains(&needle))
    {
        let s = score(&person);
        if best.as_ref().map_or(true, |(top, _)| s > *top) {
            best = Some((s, person));
        }
    }
    best.map(|(_, person)| person)
}

fn movie_from_summary(
    summary: &MovieSummary,
    genre: Option<Genre>,
    director: Option<String>,
) -> Option<Movie> {
    let title = summary.title.clone().filter(|t| !t.is_empty())?;
    Some(Movie {
        title,
        release_year: summary.release_year(),
        rating: summary.vote_average,
        overview: summary.overview.clone().unwrap_or_default(),
        genre,
        director,
    })
}

/// A movie found by exact title, locally or in the catalog. `id` is absent
/// when the catalog record could not be cached.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedMovie {
    pub id: Option<u64>,
    pub movie: Movie,
}

pub struct Supplier<'a, C> {
    db: &'a sled::Db,
    catalog: &'a C,
}

impl<'a, C: Catalog> Supplier<'a, C> {
    pub fn new(db: &'a sled::Db, catalog: &'a C) -> Self {
        Supplier { db, catalog }
    }

    pub fn fill_shortfall(&self, filter: &Filter, wanted: usize) -> Result<Vec<String>> {
        let strategy = Strategy::select(filter);
        let window = release_window(filter);
        if window.is_open() {
            info!("supplementing {} movies by {}", wanted, strategy);
        } else {
            info!(
                "supplementing {} movies by {} within {:?}",
                wanted, strategy, window
            );
        }
        self.supplement(&strategy, &window, wanted)
    }

    pub fn supplement(
        &self,
        strategy: &Strategy,
        window: &ReleaseWindow,
        wanted: usize,
    ) -> Result<Vec<String>> {
        if wanted == 0 {
            return Ok(Vec::new());
        }
        match strategy {
            Strategy::Director { name, genre } => {
                self.by_director(name, genre.as_deref(), window, wanted)
            }
            Strategy::Genre(name) => self.by_genre(name, window, wanted),
            Strategy::TopRated => self.top_rated(window, wanted),
        }
    }

    pub fn by_genre(&self, name: &str, window: &ReleaseWindow, wanted: usize) -> Result<Vec<String>> {
        let genre = match Genre::from_name(name) {
            Some(genre) => genre,
            None => {
                warn!("genre '{}' not recognized", name);
                return Ok(Vec::new());
            }
        };
        let query = DiscoverQuery {
            genre: Some(genre),
            window: window.clone(),
            ..DiscoverQuery::default()
        };
        self.discover_pages(query, wanted, |summary, director| {
            movie_from_summary(summary, Some(genre), director)
        })
    }

    pub fn top_rated(&self, window: &ReleaseWindow, wanted: usize) -> Result<Vec<String>> {
        let query = DiscoverQuery {
            window: window.clone(),
            ..DiscoverQuery::default()
        };
        self.discover_pages(query, wanted, |summary, director| {
            movie_from_summary(summary, Genre::first_of(&summary.genre_ids), director)
        })
    }

    pub fn by_director(
        &self,
        name: &str,
        genre: Option<&str>,
        window: &ReleaseWindow,
        wanted: usize,
    ) -> Result<Vec<String>> {
        let person = match self.resolve_director(name) {
            Some(person) => person,
            None => return Ok(Vec::new()),
        };
        info!("best match for director '{}': {}", name, person.name);
        let genre = genre.and_then(|g| {
            let parsed = Genre::from_name(g);
            if parsed.is_none() {
                warn!("genre '{}' not recognized, searching all genres", g);
            }
            parsed
        });
        let canonical = person.name.to_lowercase();
        let query = DiscoverQuery {
            genre,
            crew: Some(person.id),
            window: window.clone(),
            ..DiscoverQuery::default()
        };
        self.discover_pages(query, wanted, |summary, director| {
            // crew matches include movies the person only wrote or produced
            if director.as_deref().map(str::to_lowercase) != Some(canonical.clone()) {
                debug!("dropping {:?}: directed by {:?}", summary.title, director);
                return None;
            }
            movie_from_summary(summary, Genre::first_of(&summary.genre_ids), director)
        })
    }

    fn resolve_director(&self, name: &str) -> Option<PersonSummary> {
        let people = match self.catalog.search_people(name) {
            Ok(people) => people,
            Err(err) => {
                warn!("person search for '{}' failed: {}", name, err);
                return None;
            }
        };
        let best = best_director_match(name, people);
        if best.is_none() {
            warn!("no catalog person matches '{}'", name);
        }
        best
    }

    fn director_of(&self, movie_id: u64) -> Option<String> {
        match self.catalog.director_of(movie_id) {
            Ok(director) => director,
            Err(err) => {
                warn!("credits lookup for movie {} failed: {}", movie_id, err);
                None
            }
        }
    }

    fn cache(&self, movie: Movie, inserted: &mut Vec<String>) -> Result<Cached> {
        let title = movie.title.clone();
        let cached = self.db.add_movie_if_absent(movie)?;
        if cached.is_inserted() {
            inserted.push(title);
        } else {
            debug!("not caching '{}': {:?}", title, cached);
        }
        Ok(cached)
    }

    fn discover_pages<F>(&self, mut query: DiscoverQuery, wanted: usize, build: F) -> Result<Vec<String>>
    where
        F: Fn(&MovieSummary, Option<String>) -> Option<Movie>,
    {
        let mut inserted = Vec::new();
        for page in 1..=MAX_PAGES {
            if inserted.len() >= wanted {
                break;
            }
            query.page = page;
            let results = match self.catalog.discover(&query) {
                Ok(results) => results,
                Err(err) => {
                    warn!("catalog discovery failed on page {}: {}", page, err);
                    break;
                }
            };
            if results.is_empty() {
                break;
            }
            for summary in &results {
                if inserted.len() >= wanted {
                    break;
                }
                let director = self.director_of(summary.id);
                if let Some(movie) = build(summary, director) {
                    self.cache(movie, &mut inserted)?;
                }
            }
        }
        Ok(inserted)
    }

    pub fn search_title(&self, keyword: &str, limit: usize) -> Result<Vec<String>> {
        let results = match self.catalog.search_movies(keyword) {
            Ok(results) => results,
            Err(err) => {
                warn!("catalog search for '{}' failed: {}", keyword, err);
                return Ok(Vec::new());
            }
        };
        let mut inserted = Vec::new();
        for summary in results.iter().take(limit) {
            let director = self.director_of(summary.id);
            if let Some(movie) =
                movie_from_summary(summary, Genre::first_of(&summary.genre_ids), director)
            {
                self.cache(movie, &mut inserted)?;
            }
        }
        Ok(inserted)
    }

    pub fn movie_by_title(&self, title: &str) -> Result<Option<LocatedMovie>> {
        if let Some(doc) = self.db.get_movie_by_title(title)? {
            return Ok(Some(LocatedMovie {
                id: doc.id(),
                movie: Movie::from_document(&doc),
            }));
        }
        info!("'{}' is not stored locally, asking the catalog", title);
        let first = match self.catalog.search_movies(title) {
            Ok(results) => results.into_iter().next(),
            Err(err) => {
                warn!("catalog search for '{}' failed: {}", title, err);
                return Ok(None);
            }
        };
        let summary = match first {
            Some(summary) => summary,
            None => return Ok(None),
        };
        let director = self.director_of(summary.id);
        let movie =
            match movie_from_summary(&summary, Genre::first_of(&summary.genre_ids), director) {
                Some(movie) => movie,
                None => return Ok(None),
            };
        let cached = self.cache(movie.clone(), &mut Vec::new())?;
        Ok(Some(LocatedMovie {
            id: cached.id(),
            movie,
        }))
    }
}
