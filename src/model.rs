use crate::value::{fields_to_json, Fields, Value};
use std::fmt;

pub const ID: &str = "_id";

/// A stored document. The identifier is kept under `_id` next to the other
/// fields so filters can address it like any other field.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    fields: Fields,
}

impl Document {
    pub fn new(id: u64, mut fields: Fields) -> Self {
        fields.insert(ID.to_owned(), Value::Id(id));
        Document { fields }
    }

    pub(crate) fn from_stored(fields: Fields) -> Self {
        Document { fields }
    }

    pub fn id(&self) -> Option<u64> {
        self.fields.get(ID).and_then(Value::as_id)
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Object(fields) => fields.get(part)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn merge(&mut self, changes: &Fields) -> bool {
        let mut changed = false;
        for (key, value) in changes {
            if key == ID {
                continue;
            }
            if self.fields.get(key) != Some(value) {
                self.fields.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }

    pub fn to_json(&self) -> serde_json::Value {
        let present: Fields = self
            .fields
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        fields_to_json(&present)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Genre {
    Action,
    Adventure,
    Animation,
    Comedy,
    Crime,
    Documentary,
    Drama,
    Family,
    Fantasy,
    History,
    Horror,
    Music,
    Mystery,
    Romance,
    ScienceFiction,
    TvMovie,
    Thriller,
    War,
    Western,
}

impl Genre {
    pub const ALL: [Genre; 19] = [
        Genre::Action,
        Genre::Adventure,
        Genre::Animation,
        Genre::Comedy,
        Genre::Crime,
        Genre::Documentary,
        Genre::Drama,
        Genre::Family,
        Genre::Fantasy,
        Genre::History,
        Genre::Horror,
        Genre::Music,
        Genre::Mystery,
        Genre::Romance,
        Genre::ScienceFiction,
        Genre::TvMovie,
        Genre::Thriller,
        Genre::War,
        Genre::Western,
    ];

    pub fn tmdb_id(self) -> u64 {
        match self {
            Genre::Action => 28,
            Genre::Adventure => 12,
            Genre::Animation => 16,
            Genre::Comedy => 35,
            Genre::Crime => 80,
            Genre::Documentary => 99,
            Genre::Drama => 18,
            Genre::Family => 10751,
            Genre::Fantasy => 14,
            Genre::History => 36,
            Genre::Horror => 27,
            Genre::Music => 10402,
            Genre::Mystery => 9648,
            Genre::Romance => 10749,
            Genre::ScienceFiction => 878,
            Genre::TvMovie => 10770,
            Genre::Thriller => 53,
            Genre::War => 10752,
            Genre::Western => 37,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Genre::Action => "Action",
            Genre::Adventure => "Adventure",
            Genre::Animation => "Animation",
            Genre::Comedy => "Comedy",
            Genre::Crime => "Crime",
            Genre::Documentary => "Documentary",
            Genre::Drama => "Drama",
            Genre::Family => "Family",
            Genre::Fantasy => "Fantasy",
            Genre::History => "History",
            Genre::Horror => "Horror",
            Genre::Music => "Music",
            Genre::Mystery => "Mystery",
            Genre::Romance => "Romance",
            Genre::ScienceFiction => "Science Fiction",
            Genre::TvMovie => "TV Movie",
            Genre::Thriller => "Thriller",
            Genre::War => "War",
            Genre::Western => "Western",
        }
    }

    pub fn from_name(name: &str) -> Option<Genre> {
        let name = name.trim();
        match name.to_lowercase().as_str() {
            "sci-fi" | "scifi" => return Some(Genre::ScienceFiction),
            _ => {}
        }
        Genre::ALL
            .iter()
            .copied()
            .find(|g| g.name().eq_ignore_ascii_case(name))
    }

    /// First genre of the enumeration present in a catalog id list.
    pub fn first_of(ids: &[u64]) -> Option<Genre> {
        Genre::ALL.iter().copied().find(|g| ids.contains(&g.tmdb_id()))
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq)]
pub struct Movie {
    pub title: String,
    pub release_year: Option<i64>,
    pub rating: Option<f64>,
    pub overview: String,
    pub genre: Option<Genre>,
    pub director: Option<String>,
}

impl Movie {
    pub fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("title".to_owned(), Value::String(self.title));
        fields.insert(
            "release_year".to_owned(),
            self.release_year.map(Value::Int).unwrap_or(Value::Null),
        );
        fields.insert(
            "rating".to_owned(),
            self.rating.map(Value::Float).unwrap_or(Value::Null),
        );
        fields.insert("overview".to_owned(), Value::String(self.overview));
        fields.insert(
            "genre".to_owned(),
            Value::from(self.genre.map(Genre::name).unwrap_or(NOT_AVAILABLE)),
        );
        fields.insert(
            "director".to_owned(),
            Value::String(self.director.unwrap_or_else(|| NOT_AVAILABLE.to_owned())),
        );
        fields
    }

    pub fn from_document(doc: &Document) -> Movie {
        let known = |key: &str| doc.str_field(key).filter(|s| *s != NOT_AVAILABLE);
        Movie {
            title: doc.str_field("title").unwrap_or_default().to_owned(),
            release_year: doc.get("release_year").and_then(Value::as_i64),
            rating: doc.get("rating").and_then(Value::as_f64),
            overview: doc.str_field("overview").unwrap_or_default().to_owned(),
            genre: known("genre").and_then(Genre::from_name),
            director: known("director").map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WishlistEntry {
    pub user_id: u64,
    pub movie_id: u64,
    pub added_date: String,
}

impl WishlistEntry {
    pub fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("user_id".to_owned(), Value::Id(self.user_id));
        fields.insert("movie_id".to_owned(), Value::Id(self.movie_id));
        fields.insert("added_date".to_owned(), Value::String(self.added_date));
        fields
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatchedEntry {
    pub user_id: u64,
    pub movie_id: u64,
    pub watched_date: String,
    pub rating: Value,
}

impl WatchedEntry {
    pub fn unrated() -> Value {
        Value::from(NOT_AVAILABLE)
    }

    pub fn into_fields(self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("user_id".to_owned(), Value::Id(self.user_id));
        fields.insert("movie_id".to_owned(), Value::Id(self.movie_id));
        fields.insert("watched_date".to_owned(), Value::String(self.watched_date));
        fields.insert("rating".to_owned(), self.rating);
        fields
    }
}
