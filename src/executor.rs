use crate::catalog::Catalog;
use crate::collections::Collection;
use crate::database::{DocumentDb, Joined, MovieDb, UserDb};
use crate::descriptor::Action;
use crate::error::Result;
use crate::filter::{Filter, Limit, Op, Sort};
use crate::model::{Document, WatchedEntry, WishlistEntry};
use crate::supplement::{Supplier, TITLE_SEARCH_LIMIT};
use crate::value::{fields_to_json, Fields, Value};
use chrono::Utc;
use log::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    UserNotFound(String),
    MovieNotFound(String),
    UserOrMovieNotFound { user: String, movie: String },
    MovieNotCached(String),
    MissingPayload,
    MissingQueryOrData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteScope {
    Everything,
    User(String),
    Entry { user: String, movie: String },
    Matching(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRow {
    pub entry: Document,
    pub movie: Document,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinedView {
    pub collection: Collection,
    pub username: String,
    pub rows: Vec<JoinedRow>,
    /// Entries whose movie no longer exists.
    pub broken: Vec<Document>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Found {
        collection: Collection,
        documents: Vec<Document>,
        fetched: Vec<String>,
    },
    NotFound {
        keyword: String,
    },
    Joined(JoinedView),
    Inserted {
        collection: Collection,
        document: Document,
    },
    Linked {
        collection: Collection,
        user: String,
        movie: String,
    },
    Updated {
        collection: Collection,
        query: serde_json::Value,
        data: serde_json::Value,
        matched: bool,
    },
    EntryUpdated {
        collection: Collection,
        user: String,
        movie: String,
        matched: bool,
    },
    Deleted {
        collection: Collection,
        count: usize,
        scope: DeleteScope,
    },
    Counted {
        collection: Collection,
        count: usize,
        query: serde_json::Value,
    },
    Rejected(Rejection),
}

fn user_key(user_id: u64) -> Filter {
    Filter::by("user_id", Value::Id(user_id))
}

fn entry_key(user_id: u64, movie_id: u64) -> Filter {
    user_key(user_id).and("movie_id", Value::Id(movie_id))
}

/// Text a movie query searches titles for, if it searches titles loosely.
fn title_keyword(query: &Filter) -> Option<String> {
    query.ops("title")?.iter().find_map(|op| match op {
        Op::Contains(text) => Some(text.clone()),
        Op::Matches { pattern, .. } => Some(pattern.clone()),
        _ => None,
    })
}

pub struct Executor<'a, C> {
    db: &'a sled::Db,
    supplier: Supplier<'a, C>,
}

impl<'a, C: Catalog> Executor<'a, C> {
    pub fn new(db: &'a sled::Db, catalog: &'a C) -> Self {
        Executor {
            db,
            supplier: Supplier::new(db, catalog),
        }
    }

    pub fn execute(&self, collection: Collection, action: Action) -> Result<Outcome> {
        match action {
            Action::Find { query, sort, limit } => self.find(collection, &query, &sort, limit),
            Action::Insert { data } => self.insert(collection, data),
            Action::Update { query, data } => self.update(collection, &query, &data),
            Action::Delete { query } => self.delete(collection, &query),
            Action::Count { query } => self.count(collection, query),
        }
    }

    fn resolve_user(&self, username: &str) -> Result<Option<u64>> {
        Ok(self
            .db
            .get_user_by_username(username)?
            .and_then(|user| user.id()))
    }

    fn resolve_pair(&self, username: &str, title: &str) -> Result<Option<(u64, u64)>> {
        let user_id = match self.resolve_user(username)? {
            Some(id) => id,
            None => return Ok(None),
        };
        Ok(self
            .db
            .get_movie_by_title(title)?
            .and_then(|movie| movie.id())
            .map(|movie_id| (user_id, movie_id)))
    }

    fn find(
        &self,
        collection: Collection,
        query: &Filter,
        sort: &Sort,
        limit: Limit,
    ) -> Result<Outcome> {
        if collection.is_join() {
            if let Some(user) = query.text_hint("user") {
                return self.joined_view(collection, user);
            }
        }

        let mut documents = self.db.find(collection, query, sort, limit)?;
        let mut fetched = Vec::new();
        if collection != Collection::Movies {
            return Ok(Outcome::Found {
                collection,
                documents,
                fetched,
            });
        }

        if let Some(wanted) = limit.get() {
            if documents.len() < wanted && !query.contains_key("title") {
                info!(
                    "found {} of {} requested movies, supplementing from the catalog",
                    documents.len(),
                    wanted
                );
                fetched = self
                    .supplier
                    .fill_shortfall(query, wanted - documents.len())?;
                if !fetched.is_empty() {
                    documents = self.db.find(collection, query, sort, limit)?;
                }
            }
        }

        if documents.is_empty() {
            if let Some(keyword) = title_keyword(query) {
                info!("no local match for '{}', searching the catalog", keyword);
                fetched = self.supplier.search_title(&keyword, TITLE_SEARCH_LIMIT)?;
                documents = self.db.find(collection, query, sort, limit)?;
                if documents.is_empty() {
                    return Ok(Outcome::NotFound { keyword });
                }
            }
        }

        Ok(Outcome::Found {
            collection,
            documents,
            fetched,
        })
    }

    fn joined_view(&self, collection: Collection, username: &str) -> Result<Outcome> {
        let user_id = match self.resolve_user(username)? {
            Some(id) => id,
            None => return Ok(Outcome::Rejected(Rejection::UserNotFound(username.to_owned()))),
        };
        let mut view = JoinedView {
            collection,
            username: username.to_owned(),
            rows: Vec::new(),
            broken: Vec::new(),
        };
        for Joined { entry, linked } in
            self.db
                .lookup(collection, &user_key(user_id), Collection::Movies, "movie_id")?
        {
            match linked {
                Some(movie) => view.rows.push(JoinedRow { entry, movie }),
                None => {
                    warn!("{} entry {:?} points at a missing movie", collection, entry.id());
                    view.broken.push(entry);
                }
            }
        }
        Ok(Outcome::Joined(view))
    }

    fn insert(&self, collection: Collection, data: Fields) -> Result<Outcome> {
        if data.is_empty() {
            return Ok(Outcome::Rejected(Rejection::MissingPayload));
        }
        if collection.is_join() {
            let text = |key: &str| data.get(key).and_then(Value::as_str);
            if let (Some(user), Some(movie)) = (text("user"), text("movie")) {
                return self.link(collection, user, movie, data.get("rating"));
            }
        }
        let id = self.db.insert_one(collection, data.clone())?;
        Ok(Outcome::Inserted {
            collection,
            document: Document::new(id, data),
        })
    }

    fn link(
        &self,
        collection: Collection,
        username: &str,
        title: &str,
        rating: Option<&Value>,
    ) -> Result<Outcome> {
        let user_id = match self.resolve_user(username)? {
            Some(id) => id,
            None => return Ok(Outcome::Rejected(Rejection::UserNotFound(username.to_owned()))),
        };
        let located = match self.supplier.movie_by_title(title)? {
            Some(located) => located,
            None => return Ok(Outcome::Rejected(Rejection::MovieNotFound(title.to_owned()))),
        };
        let movie_id = match located.id {
            Some(id) => id,
            None => {
                return Ok(Outcome::Rejected(Rejection::MovieNotCached(
                    located.movie.title,
                )))
            }
        };

        let now = Utc::now();
        let fields = match collection {
            Collection::Watched => WatchedEntry {
                user_id,
                movie_id,
                watched_date: now.to_rfc3339(),
                rating: rating
                    .filter(|r| !r.is_null())
                    .cloned()
                    .unwrap_or_else(WatchedEntry::unrated),
            }
            .into_fields(),
            _ => WishlistEntry {
                user_id,
                movie_id,
                added_date: now.format("%Y-%m-%d").to_string(),
            }
            .into_fields(),
        };
        self.db.insert_one(collection, fields)?;
        Ok(Outcome::Linked {
            collection,
            user: username.to_owned(),
            movie: located.movie.title,
        })
    }

    fn update(&self, collection: Collection, query: &Filter, data: &Fields) -> Result<Outcome> {
        if query.is_empty() || data.is_empty() {
            return Ok(Outcome::Rejected(Rejection::MissingQueryOrData));
        }
        if collection == Collection::Watched {
            if let (Some(user), Some(movie)) = (query.text_hint("user"), query.text_hint("movie")) {
                let (user_id, movie_id) = match self.resolve_pair(user, movie)? {
                    Some(ids) => ids,
                    None => {
                        return Ok(Outcome::Rejected(Rejection::UserOrMovieNotFound {
                            user: user.to_owned(),
                            movie: movie.to_owned(),
                        }))
                    }
                };
                let result = self
                    .db
                    .update_one(collection, &entry_key(user_id, movie_id), data)?;
                return Ok(Outcome::EntryUpdated {
                    collection,
                    user: user.to_owned(),
                    movie: movie.to_owned(),
                    matched: result.matched,
                });
            }
        }
        let result = self.db.update_one(collection, query, data)?;
        if result.matched && !result.modified {
            info!("update on {} left the document unchanged", collection);
        }
        Ok(Outcome::Updated {
            collection,
            query: query.to_json(),
            data: fields_to_json(data),
            matched: result.matched,
        })
    }

    fn delete(&self, collection: Collection, query: &Filter) -> Result<Outcome> {
        if query.is_empty() {
            let count = self.db.delete_many(collection, query)?;
            return Ok(Outcome::Deleted {
                collection,
                count,
                scope: DeleteScope::Everything,
            });
        }
        if collection.is_join() {
            if let Some(user) = query.text_hint("user") {
                return match query.text_hint("movie") {
                    Some(movie) => self.delete_entry(collection, user, movie),
                    None => self.delete_for_user(collection, user),
                };
            }
        }
        let count = self.db.delete_one(collection, query)?;
        Ok(Outcome::Deleted {
            collection,
            count,
            scope: DeleteScope::Matching(query.to_json()),
        })
    }

    fn delete_entry(&self, collection: Collection, user: &str, movie: &str) -> Result<Outcome> {
        let (user_id, movie_id) = match self.resolve_pair(user, movie)? {
            Some(ids) => ids,
            None => {
                return Ok(Outcome::Rejected(Rejection::UserOrMovieNotFound {
                    user: user.to_owned(),
                    movie: movie.to_owned(),
                }))
            }
        };
        let count = self
            .db
            .delete_one(collection, &entry_key(user_id, movie_id))?;
        Ok(Outcome::Deleted {
            collection,
            count,
            scope: DeleteScope::Entry {
                user: user.to_owned(),
                movie: movie.to_owned(),
            },
        })
    }

    fn delete_for_user(&self, collection: Collection, user: &str) -> Result<Outcome> {
        let user_id = match self.resolve_user(user)? {
            Some(id) => id,
            None => return Ok(Outcome::Rejected(Rejection::UserNotFound(user.to_owned()))),
        };
        let count = self.db.delete_many(collection, &user_key(user_id))?;
        Ok(Outcome::Deleted {
            collection,
            count,
            scope: DeleteScope::User(user.to_owned()),
        })
    }

    fn count(&self, collection: Collection, mut query: Filter) -> Result<Outcome> {
        if collection.is_join() {
            if let Some(user) = query.text_hint("user").map(str::to_owned) {
                let user_id = match self.resolve_user(&user)? {
                    Some(id) => id,
                    None => return Ok(Outcome::Rejected(Rejection::UserNotFound(user))),
                };
                query.remove("user");
                query.set("user_id", vec![Op::Eq(Value::Id(user_id))]);
            }
        }
        let count = self.db.count(collection, &query)?;
        Ok(Outcome::Counted {
            collection,
            count,
            query: query.to_json(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Descriptor;
    use crate::model::{Genre, Movie};
    use crate::normalize::normalize;
    use crate::testing::{summary, temp_db, FakeCatalog};
    use crate::value::fields_from_json;
    use serde_json::json;

    fn action(value: serde_json::Value, prompt: &str) -> Action {
        normalize(Descriptor::from_json(value).unwrap(), prompt).action
    }

    fn add_user(db: &sled::Db, name: &str) -> u64 {
        let fields = fields_from_json(
            json!({"username": name, "email": format!("{}@example.org", name), "age": 30})
                .as_object()
                .unwrap()
                .clone(),
        );
        db.insert_one(Collection::Users, fields).unwrap()
    }

    fn add_movie(db: &sled::Db, title: &str, year: i64, rating: f64, genre: Option<Genre>) -> u64 {
        db.add_movie_if_absent(Movie {
            title: title.to_owned(),
            release_year: Some(year),
            rating: Some(rating),
            overview: String::new(),
            genre,
            director: None,
        })
        .unwrap()
        .id()
        .unwrap()
    }

    fn titles(outcome: &Outcome) -> Vec<String> {
        match outcome {
            Outcome::Found { documents, .. } => documents
                .iter()
                .map(|d| d.str_field("title").unwrap_or_default().to_owned())
                .collect(),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn delete_all_movies() {
        let db = temp_db();
        let catalog = FakeCatalog::new(vec![]);
        for i in 0..4 {
            add_movie(&db, &format!("Movie {}", i), 2000 + i, 7.0, None);
        }
        let executor = Executor::new(&db, &catalog);
        let outcome = executor
            .execute(
                Collection::Movies,
                action(json!({"collection": "movies", "action": "delete", "query": {}}), "Delete all movies"),
            )
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::Deleted {
                collection: Collection::Movies,
                count: 4,
                scope: DeleteScope::Everything
            }
        );
        assert_eq!(db.count(Collection::Movies, &Filter::all()).unwrap(), 0);
    }

    #[test]
    fn top_thrillers_are_supplemented_from_the_catalog() {
        let db = temp_db();
        add_movie(&db, "Local One", 2021, 6.5, Some(Genre::Thriller));
        add_movie(&db, "Local Two", 2023, 7.1, Some(Genre::Thriller));
        add_movie(&db, "Too Old", 2019, 9.9, Some(Genre::Thriller));
        let catalog = FakeCatalog::new(vec![
            summary(1, "Remote A", "2022-03-01", 8.0, &[53]),
            summary(2, "Remote B", "2021-06-01", 7.4, &[53, 80]),
            summary(3, "Remote C", "2024-01-20", 6.9, &[53]),
            summary(4, "Remote D", "2020-12-31", 9.5, &[53]),
            summary(5, "Local Two", "2023-02-02", 7.1, &[53]),
        ]);
        let executor = Executor::new(&db, &catalog);
        let outcome = executor
            .execute(
                Collection::Movies,
                action(
                    json!({
                        "collection": "movies",
                        "action": "find",
                        "query": { "genre": "Thriller", "release_year": { "$gt": 2020 } },
                        "sort": { "rating": -1 },
                        "limit": 5
                    }),
                    "Top 5 thriller movies after 2020",
                ),
            )
            .unwrap();

        assert_eq!(
            titles(&outcome),
            vec!["Remote A", "Remote B", "Local Two", "Remote C", "Local One"]
        );
        match &outcome {
            Outcome::Found { fetched, .. } => {
                assert_eq!(fetched, &vec!["Remote A", "Remote B", "Remote C"])
            }
            other => panic!("unexpected {:?}", other),
        }
        let first = &catalog.discovered()[0];
        assert_eq!(first.genre, Some(Genre::Thriller));
        assert_eq!(first.window.from.as_deref(), Some("2021-01-01"));
    }

    #[test]
    fn shortfall_with_nothing_left_returns_what_exists() {
        let db = temp_db();
        add_movie(&db, "Only One", 2001, 7.0, Some(Genre::Western));
        let catalog = FakeCatalog::new(vec![]).failing();
        let executor = Executor::new(&db, &catalog);
        let outcome = executor
            .execute(
                Collection::Movies,
                action(json!({"query": {"genre": "Western"}, "limit": 5}), "five westerns"),
            )
            .unwrap();
        assert_eq!(titles(&outcome), vec!["Only One"]);
    }

    #[test]
    fn unlimited_finds_never_supplement() {
        let db = temp_db();
        add_movie(&db, "Only One", 2001, 7.0, None);
        let catalog = FakeCatalog::new(vec![summary(1, "Remote", "2001-01-01", 9.0, &[])]);
        let executor = Executor::new(&db, &catalog);
        let outcome = executor
            .execute(Collection::Movies, action(json!({"query": {}}), "show all movies"))
            .unwrap();
        assert_eq!(titles(&outcome), vec!["Only One"]);
        assert!(catalog.discovered().is_empty());
    }

    #[test]
    fn title_search_falls_back_to_the_catalog() {
        let db = temp_db();
        let catalog = FakeCatalog::new(vec![
            summary(1, "The Matrix", "1999-03-30", 8.2, &[28, 878]),
            summary(2, "The Matrix Reloaded", "2003-05-15", 7.0, &[28]),
        ]);
        let executor = Executor::new(&db, &catalog);
        let outcome = executor
            .execute(
                Collection::Movies,
                action(json!({"query": {"title": "matrix"}}), "find the matrix"),
            )
            .unwrap();
        assert_eq!(titles(&outcome), vec!["The Matrix", "The Matrix Reloaded"]);
        assert!(catalog.discovered().is_empty());

        let outcome = executor
            .execute(
                Collection::Movies,
                action(json!({"query": {"title": "Nonexistent"}}), "find Nonexistent"),
            )
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::NotFound {
                keyword: "Nonexistent".to_owned()
            }
        );
    }

    #[test]
    fn wishlist_insert_fetches_unknown_movies() {
        let db = temp_db();
        let alice = add_user(&db, "Alice");
        let catalog = FakeCatalog::new(vec![summary(475557, "Joker", "2019-10-01", 8.2, &[80, 53])])
            .with_director(475557, "Todd Phillips");
        let executor = Executor::new(&db, &catalog);
        let outcome = executor
            .execute(
                Collection::Wishlist,
                action(
                    json!({"collection": "wishlist", "action": "insert", "data": {"user": "alice", "movie": "Joker"}}),
                    "Alice wants to see Joker",
                ),
            )
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::Linked {
                collection: Collection::Wishlist,
                user: "alice".to_owned(),
                movie: "Joker".to_owned()
            }
        );
        let joker = db.get_movie_by_title("Joker").unwrap().unwrap();
        assert_eq!(joker.str_field("director"), Some("Todd Phillips"));
        let entry = db
            .find_one(Collection::Wishlist, &Filter::by("user_id", Value::Id(alice)))
            .unwrap()
            .unwrap();
        assert_eq!(entry.get("movie_id"), Some(&Value::Id(joker.id().unwrap())));
        assert!(entry.str_field("added_date").is_some());
    }

    #[test]
    fn inserts_report_unknown_users_and_movies() {
        let db = temp_db();
        add_user(&db, "Alice");
        let catalog = FakeCatalog::new(vec![]);
        let executor = Executor::new(&db, &catalog);
        let outcome = executor
            .execute(
                Collection::Wishlist,
                action(json!({"collection": "wishlist", "action": "insert", "data": {"user": "Bob", "movie": "Joker"}}), "Bob wants Joker"),
            )
            .unwrap();
        assert_eq!(outcome, Outcome::Rejected(Rejection::UserNotFound("Bob".to_owned())));
        assert!(catalog.searches().is_empty());

        let outcome = executor
            .execute(
                Collection::Wishlist,
                action(json!({"collection": "wishlist", "action": "insert", "data": {"user": "Alice", "movie": "Joker"}}), "Alice wants Joker"),
            )
            .unwrap();
        assert_eq!(outcome, Outcome::Rejected(Rejection::MovieNotFound("Joker".to_owned())));

        let outcome = executor
            .execute(Collection::Users, action(json!({"action": "insert"}), "add a user"))
            .unwrap();
        assert_eq!(outcome, Outcome::Rejected(Rejection::MissingPayload));
        assert_eq!(db.count(Collection::Wishlist, &Filter::all()).unwrap(), 0);
    }

    #[test]
    fn plain_inserts_store_the_payload() {
        let db = temp_db();
        let catalog = FakeCatalog::new(vec![]);
        let executor = Executor::new(&db, &catalog);
        let outcome = executor
            .execute(
                Collection::Users,
                action(
                    json!({"collection": "users", "action": "insert", "data": {"username": "Jasper", "age": 20}}),
                    "add user Jasper aged 20",
                ),
            )
            .unwrap();
        let id = match outcome {
            Outcome::Inserted { document, .. } => document.id().unwrap(),
            other => panic!("unexpected {:?}", other),
        };
        let stored = db.get_by_id(Collection::Users, id).unwrap().unwrap();
        assert_eq!(stored.get("age"), Some(&Value::Int(20)));
    }

    #[test]
    fn update_jaspers_age() {
        let db = temp_db();
        let jasper = add_user(&db, "Jasper");
        let catalog = FakeCatalog::new(vec![]);
        let executor = Executor::new(&db, &catalog);
        let outcome = executor
            .execute(
                Collection::Users,
                action(
                    json!({"collection": "users", "action": "update", "query": {"username": "Jasper"}, "data": {"age": 1}}),
                    "Update Jasper's age to 1",
                ),
            )
            .unwrap();
        assert!(matches!(outcome, Outcome::Updated { matched: true, .. }));
        let stored = db.get_by_id(Collection::Users, jasper).unwrap().unwrap();
        assert_eq!(stored.get("age"), Some(&Value::Int(1)));
        assert_eq!(stored.str_field("username"), Some("Jasper"));
        assert_eq!(stored.str_field("email"), Some("Jasper@example.org"));
        assert_eq!(stored.fields().len(), 4);

        let outcome = executor
            .execute(
                Collection::Users,
                action(json!({"action": "update", "query": {"username": "Jasper"}}), "update Jasper"),
            )
            .unwrap();
        assert_eq!(outcome, Outcome::Rejected(Rejection::MissingQueryOrData));
    }

    #[test]
    fn watched_entries_record_and_update_ratings() {
        let db = temp_db();
        let jinyi = add_user(&db, "Jinyi");
        let inception = add_movie(&db, "Inception", 2010, 8.4, Some(Genre::Action));
        let catalog = FakeCatalog::new(vec![]);
        let executor = Executor::new(&db, &catalog);
        executor
            .execute(
                Collection::Watched,
                action(
                    json!({"collection": "watched", "action": "insert", "data": {"user": "Jinyi", "movie": "inception", "rating": 9.5}}),
                    "Jinyi watched Inception and gave 9.5",
                ),
            )
            .unwrap();
        let key = entry_key(jinyi, inception);
        let entry = db.find_one(Collection::Watched, &key).unwrap().unwrap();
        assert_eq!(entry.get("rating"), Some(&Value::Float(9.5)));
        assert!(entry.str_field("watched_date").is_some());

        let outcome = executor
            .execute(
                Collection::Watched,
                action(
                    json!({"collection": "watched", "action": "update", "query": {"user": "jinyi", "movie": "Inception"}, "data": {"rating": 7}}),
                    "Jinyi now rates Inception 7",
                ),
            )
            .unwrap();
        assert!(matches!(outcome, Outcome::EntryUpdated { matched: true, .. }));
        let entry = db.find_one(Collection::Watched, &key).unwrap().unwrap();
        assert_eq!(entry.get("rating"), Some(&Value::Int(7)));

        let outcome = executor
            .execute(
                Collection::Watched,
                action(
                    json!({"collection": "watched", "action": "update", "query": {"user": "Jinyi", "movie": "Dune"}, "data": {"rating": 7}}),
                    "Jinyi rates Dune 7",
                ),
            )
            .unwrap();
        assert!(matches!(outcome, Outcome::Rejected(Rejection::UserOrMovieNotFound { .. })));
    }

    #[test]
    fn unrated_watched_entries_say_na() {
        let db = temp_db();
        add_user(&db, "Jinyi");
        add_movie(&db, "Heat", 1995, 8.3, None);
        let catalog = FakeCatalog::new(vec![]);
        let executor = Executor::new(&db, &catalog);
        executor
            .execute(
                Collection::Watched,
                action(json!({"collection": "watched", "action": "insert", "data": {"user": "Jinyi", "movie": "Heat"}}), "Jinyi watched Heat"),
            )
            .unwrap();
        let entry = db.find_one(Collection::Watched, &Filter::all()).unwrap().unwrap();
        assert_eq!(entry.str_field("rating"), Some("N/A"));
    }

    #[test]
    fn joined_view_skips_broken_links() {
        let db = temp_db();
        let alice = add_user(&db, "Alice");
        let heat = add_movie(&db, "Heat", 1995, 8.3, None);
        for movie_id in &[heat, heat + 500] {
            db.insert_one(
                Collection::Wishlist,
                WishlistEntry {
                    user_id: alice,
                    movie_id: *movie_id,
                    added_date: "2025-04-18".to_owned(),
                }
                .into_fields(),
            )
            .unwrap();
        }
        let catalog = FakeCatalog::new(vec![]);
        let executor = Executor::new(&db, &catalog);
        let outcome = executor
            .execute(
                Collection::Wishlist,
                action(json!({"collection": "wishlist", "query": {"user": "ALICE"}}), "show alice wishlist"),
            )
            .unwrap();
        match outcome {
            Outcome::Joined(view) => {
                assert_eq!(view.rows.len(), 1);
                assert_eq!(view.rows[0].movie.str_field("title"), Some("Heat"));
                assert_eq!(view.broken.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }

        let outcome = executor
            .execute(
                Collection::Wishlist,
                action(json!({"collection": "wishlist", "query": {"user": "Zed"}}), "show Zed's wishlist"),
            )
            .unwrap();
        assert_eq!(outcome, Outcome::Rejected(Rejection::UserNotFound("Zed".to_owned())));
    }

    #[test]
    fn join_deletes_by_user_and_by_entry() {
        let db = temp_db();
        let alice = add_user(&db, "Alice");
        let bob = add_user(&db, "Bob");
        let heat = add_movie(&db, "Heat", 1995, 8.3, None);
        let dune = add_movie(&db, "Dune", 2021, 8.0, None);
        for (user_id, movie_id) in &[(alice, heat), (alice, dune), (bob, heat)] {
            db.insert_one(
                Collection::Wishlist,
                WishlistEntry {
                    user_id: *user_id,
                    movie_id: *movie_id,
                    added_date: "2025-04-18".to_owned(),
                }
                .into_fields(),
            )
            .unwrap();
        }
        let catalog = FakeCatalog::new(vec![]);
        let executor = Executor::new(&db, &catalog);

        let outcome = executor
            .execute(
                Collection::Wishlist,
                action(json!({"collection": "wishlist", "action": "delete", "query": {"user": "Alice", "movie": "dune"}}), "remove Dune from Alice's wishlist"),
            )
            .unwrap();
        assert!(matches!(outcome, Outcome::Deleted { count: 1, scope: DeleteScope::Entry { .. }, .. }));
        assert_eq!(db.count(Collection::Wishlist, &user_key(alice)).unwrap(), 1);

        let outcome = executor
            .execute(
                Collection::Wishlist,
                action(json!({"collection": "wishlist", "action": "delete", "query": {"user": "Bob"}}), "clear Bob's wishlist"),
            )
            .unwrap();
        assert!(matches!(outcome, Outcome::Deleted { count: 1, scope: DeleteScope::User(_), .. }));
        assert_eq!(db.count(Collection::Wishlist, &Filter::all()).unwrap(), 1);
    }

    #[test]
    fn generic_delete_removes_one_match() {
        let db = temp_db();
        add_movie(&db, "Dune", 1984, 6.3, None);
        add_movie(&db, "Dune", 2021, 8.0, None);
        let catalog = FakeCatalog::new(vec![]);
        let executor = Executor::new(&db, &catalog);
        let outcome = executor
            .execute(
                Collection::Movies,
                action(json!({"action": "delete", "query": {"title": "Dune"}}), "delete Dune"),
            )
            .unwrap();
        assert!(matches!(outcome, Outcome::Deleted { count: 1, .. }));
        assert_eq!(db.count(Collection::Movies, &Filter::all()).unwrap(), 1);
    }

    #[test]
    fn counts_resolve_users_first() {
        let db = temp_db();
        let alice = add_user(&db, "Alice");
        let heat = add_movie(&db, "Heat", 1995, 8.3, None);
        db.insert_one(
            Collection::Watched,
            WatchedEntry {
                user_id: alice,
                movie_id: heat,
                watched_date: "2025-04-18T00:00:00+00:00".to_owned(),
                rating: Value::Float(9.0),
            }
            .into_fields(),
        )
        .unwrap();
        let catalog = FakeCatalog::new(vec![]);
        let executor = Executor::new(&db, &catalog);

        let outcome = executor
            .execute(
                Collection::Watched,
                action(json!({"collection": "watched", "action": "count", "query": {"user": "alice"}}), "how many movies has alice watched"),
            )
            .unwrap();
        assert!(matches!(outcome, Outcome::Counted { count: 1, .. }));

        let outcome = executor
            .execute(
                Collection::Watched,
                action(json!({"collection": "watched", "action": "count", "query": {"user": "Nobody"}}), "how many has Nobody watched"),
            )
            .unwrap();
        assert_eq!(outcome, Outcome::Rejected(Rejection::UserNotFound("Nobody".to_owned())));

        let outcome = executor
            .execute(
                Collection::Movies,
                action(json!({"action": "count", "query": {"release_year": {"$lt": 2000}}}), "count old movies"),
            )
            .unwrap();
        assert!(matches!(outcome, Outcome::Counted { count: 1, .. }));
    }
}
