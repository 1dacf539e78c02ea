use crate::collections::{Collection, UnknownCollection};
use crate::descriptor::{Action, Descriptor};
use crate::error::Result;
use crate::executor::{DeleteScope, JoinedView, Outcome, Rejection};
use crate::filter::Filter;
use crate::model::Document;
use crate::value::fields_to_json;
use serde_json::json;
use tera::{Context, Tera};

const TEMPLATES: [(&str, &str); 6] = [
    ("macros.txt", include_str!("../templates/macros.txt")),
    ("found.txt", include_str!("../templates/found.txt")),
    ("joined.txt", include_str!("../templates/joined.txt")),
    ("report.txt", include_str!("../templates/report.txt")),
    ("interpretation.txt", include_str!("../templates/interpretation.txt")),
    ("collections.txt", include_str!("../templates/collections.txt")),
];

fn documents_json(docs: &[Document]) -> Vec<serde_json::Value> {
    docs.iter().map(Document::to_json).collect()
}

pub struct Renderer {
    tera: Tera,
}

impl Renderer {
    pub fn new() -> Result<Renderer> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.to_vec())?;
        Ok(Renderer { tera })
    }

    pub fn interpretation(&self, collection: Collection, descriptor: &Descriptor) -> Result<String> {
        let query = match &descriptor.action {
            Action::Insert { data } => fields_to_json(data),
            action => action
                .query()
                .map(Filter::to_json)
                .unwrap_or_else(|| json!({})),
        };
        let mut ctx = Context::new();
        ctx.insert("action", descriptor.action.kind().name());
        ctx.insert("collection", collection.name());
        ctx.insert("query", &query);
        Ok(self.tera.render("interpretation.txt", &ctx)?)
    }

    pub fn collections(&self) -> Result<String> {
        self.collection_list(None)
    }

    pub fn unknown_collection(&self, err: &UnknownCollection) -> Result<String> {
        self.collection_list(Some(err))
    }

    fn collection_list(&self, unknown: Option<&UnknownCollection>) -> Result<String> {
        let mut ctx = Context::new();
        ctx.insert("unknown", &unknown.map(|err| err.name.as_str()));
        match unknown {
            Some(err) => ctx.insert("names", &err.available),
            None => ctx.insert("names", &Collection::canonical_names()),
        }
        Ok(self.tera.render("collections.txt", &ctx)?)
    }

    pub fn outcome(&self, outcome: &Outcome) -> Result<String> {
        match outcome {
            Outcome::Found {
                collection,
                documents,
                fetched,
            } => {
                let mut ctx = Context::new();
                ctx.insert("collection", collection.name());
                ctx.insert("documents", &documents_json(documents));
                ctx.insert("fetched", fetched);
                Ok(self.tera.render("found.txt", &ctx)?)
            }
            Outcome::Joined(view) => self.joined(view),
            other => self.report(report_context(other)),
        }
    }

    fn joined(&self, view: &JoinedView) -> Result<String> {
        let rows: Vec<serde_json::Value> = view
            .rows
            .iter()
            .map(|row| json!({ "entry": row.entry.to_json(), "movie": row.movie.to_json() }))
            .collect();
        let mut ctx = Context::new();
        ctx.insert("collection", view.collection.name());
        ctx.insert("username", &view.username);
        ctx.insert("rows", &rows);
        ctx.insert("broken", &documents_json(&view.broken));
        Ok(self.tera.render("joined.txt", &ctx)?)
    }

    fn report(&self, ctx: Context) -> Result<String> {
        Ok(self.tera.render("report.txt", &ctx)?)
    }
}

fn report_context(outcome: &Outcome) -> Context {
    let mut ctx = Context::new();
    let kind = match outcome {
        Outcome::Found { .. } | Outcome::Joined(_) => "",
        Outcome::NotFound { keyword } => {
            ctx.insert("keyword", keyword);
            "not_found"
        }
        Outcome::Inserted {
            collection,
            document,
        } => {
            ctx.insert("collection", collection.name());
            ctx.insert("document", &document.to_json());
            "inserted"
        }
        Outcome::Linked {
            collection,
            user,
            movie,
        } => {
            ctx.insert("collection", collection.name());
            ctx.insert("user", user);
            ctx.insert("movie", movie);
            "linked"
        }
        Outcome::Updated {
            collection,
            query,
            data,
            matched,
        } => {
            ctx.insert("collection", collection.name());
            ctx.insert("query", query);
            ctx.insert("data", data);
            ctx.insert("matched", matched);
            "updated"
        }
        Outcome::EntryUpdated {
            user,
            movie,
            matched,
            ..
        } => {
            ctx.insert("user", user);
            ctx.insert("movie", movie);
            ctx.insert("matched", matched);
            "entry_updated"
        }
        Outcome::Deleted {
            collection,
            count,
            scope,
        } => {
            ctx.insert("collection", collection.name());
            ctx.insert("count", count);
            match scope {
                DeleteScope::Everything => "deleted_all",
                DeleteScope::User(user) => {
                    ctx.insert("user", user);
                    "deleted_for_user"
                }
                DeleteScope::Entry { user, movie } => {
                    ctx.insert("user", user);
                    ctx.insert("movie", movie);
                    "deleted_entry"
                }
                DeleteScope::Matching(query) => {
                    ctx.insert("query", query);
                    "deleted"
                }
            }
        }
        Outcome::Counted {
            collection,
            count,
            query,
        } => {
            ctx.insert("collection", collection.name());
            ctx.insert("count", count);
            ctx.insert("query", query);
            "counted"
        }
        Outcome::Rejected(rejection) => match rejection {
            Rejection::UserNotFound(user) => {
                ctx.insert("user", user);
                "user_not_found"
            }
            Rejection::MovieNotFound(movie) => {
                ctx.insert("movie", movie);
                "movie_not_found"
            }
            Rejection::UserOrMovieNotFound { user, movie } => {
                ctx.insert("user", user);
                ctx.insert("movie", movie);
                "user_or_movie_not_found"
            }
            Rejection::MovieNotCached(movie) => {
                ctx.insert("movie", movie);
                "movie_not_cached"
            }
            Rejection::MissingPayload => "missing_payload",
            Rejection::MissingQueryOrData => "missing_query_or_data",
        },
    };
    ctx.insert("kind", kind);
    ctx
}
