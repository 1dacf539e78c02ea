use crate::collections::Collection;
use crate::error::{Error, Result};
use crate::filter::{Filter, Limit, Op, Sort};
use crate::model::{Document, Movie};
use crate::value::{Fields, Value};

// Big-endian so that tree order is insertion order.
fn serialize_id(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn decode(collection: Collection, bytes: &[u8]) -> Result<Document> {
    let fields: Fields = bincode::deserialize(bytes).map_err(|err| Error::Corrupt {
        tree: collection.name().to_owned(),
        reason: err.to_string(),
    })?;
    Ok(Document::from_stored(fields))
}

fn matching(
    tree: &sled::Tree,
    collection: Collection,
    filter: &Filter,
    max: Option<usize>,
) -> Result<Vec<(sled::IVec, Document)>> {
    let mut found = Vec::new();
    if max == Some(0) {
        return Ok(found);
    }
    for entry in tree.iter() {
        let (key, bytes) = entry?;
        let doc = decode(collection, &bytes)?;
        if filter.matches(&doc) {
            found.push((key, doc));
            if Some(found.len()) == max {
                break;
            }
        }
    }
    Ok(found)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched: bool,
    pub modified: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Joined {
    pub entry: Document,
    pub linked: Option<Document>,
}

pub trait DocumentDb {
    fn insert_one(&self, collection: Collection, fields: Fields) -> Result<u64>;
    fn get_by_id(&self, collection: Collection, id: u64) -> Result<Option<Document>>;
    fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        sort: &Sort,
        limit: Limit,
    ) -> Result<Vec<Document>>;
    fn find_one(&self, collection: Collection, filter: &Filter) -> Result<Option<Document>>;
    fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        changes: &Fields,
    ) -> Result<UpdateResult>;
    fn delete_one(&self, collection: Collection, filter: &Filter) -> Result<usize>;
    fn delete_many(&self, collection: Collection, filter: &Filter) -> Result<usize>;
    fn count(&self, collection: Collection, filter: &Filter) -> Result<usize>;
    fn lookup(
        &self,
        collection: Collection,
        filter: &Filter,
        foreign: Collection,
        local_field: &str,
    ) -> Result<Vec<Joined>>;
}

impl DocumentDb for sled::Db {
    fn insert_one(&self, collection: Collection, fields: Fields) -> Result<u64> {
        let tree = self.open_tree(collection.name())?;
        let id = self.generate_id()?;
        let doc = Document::new(id, fields);
        tree.insert(&serialize_id(id), bincode::serialize(doc.fields())?)?;
        Ok(id)
    }

    fn get_by_id(&self, collection: Collection, id: u64) -> Result<Option<Document>> {
        let tree = self.open_tree(collection.name())?;
        tree.get(serialize_id(id))?
            .map(|bytes| decode(collection, &bytes))
            .transpose()
    }

    fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        sort: &Sort,
        limit: Limit,
    ) -> Result<Vec<Document>> {
        let tree = self.open_tree(collection.name())?;
        // without a sort the first matches in tree order are the answer
        let max = if sort.is_empty() { limit.get() } else { None };
        let mut docs: Vec<Document> = matching(&tree, collection, filter, max)?
            .into_iter()
            .map(|(_, doc)| doc)
            .collect();
        sort.apply(&mut docs);
        if let Some(n) = limit.get() {
            docs.truncate(n);
        }
        Ok(docs)
    }

    fn find_one(&self, collection: Collection, filter: &Filter) -> Result<Option<Document>> {
        let tree = self.open_tree(collection.name())?;
        Ok(matching(&tree, collection, filter, Some(1))?
            .into_iter()
            .next()
            .map(|(_, doc)| doc))
    }

    fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        changes: &Fields,
    ) -> Result<UpdateResult> {
        let tree = self.open_tree(collection.name())?;
        let (key, mut doc) = match matching(&tree, collection, filter, Some(1))?.pop() {
            Some(found) => found,
            None => {
                return Ok(UpdateResult {
                    matched: false,
                    modified: false,
                })
            }
        };
        let modified = doc.merge(changes);
        if modified {
            tree.insert(key, bincode::serialize(doc.fields())?)?;
        }
        Ok(UpdateResult {
            matched: true,
            modified,
        })
    }

    fn delete_one(&self, collection: Collection, filter: &Filter) -> Result<usize> {
        let tree = self.open_tree(collection.name())?;
        match matching(&tree, collection, filter, Some(1))?.pop() {
            Some((key, _)) => Ok(tree.remove(key)?.map_or(0, |_| 1)),
            None => Ok(0),
        }
    }

    fn delete_many(&self, collection: Collection, filter: &Filter) -> Result<usize> {
        let tree = self.open_tree(collection.name())?;
        if filter.is_empty() {
            let count = tree.len();
            tree.clear()?;
            return Ok(count);
        }
        let found = matching(&tree, collection, filter, None)?;
        let mut batch = sled::Batch::default();
        for (key, _) in &found {
            batch.remove(key.clone());
        }
        tree.apply_batch(batch)?;
        Ok(found.len())
    }

    fn count(&self, collection: Collection, filter: &Filter) -> Result<usize> {
        let tree = self.open_tree(collection.name())?;
        if filter.is_empty() {
            return Ok(tree.len());
        }
        Ok(matching(&tree, collection, filter, None)?.len())
    }

    fn lookup(
        &self,
        collection: Collection,
        filter: &Filter,
        foreign: Collection,
        local_field: &str,
    ) -> Result<Vec<Joined>> {
        let tree = self.open_tree(collection.name())?;
        matching(&tree, collection, filter, None)?
            .into_iter()
            .map(|(_, entry)| {
                let linked = match entry.get(local_field).and_then(Value::as_id) {
                    Some(id) => self.get_by_id(foreign, id)?,
                    None => None,
                };
                Ok(Joined { entry, linked })
            })
            .collect()
    }
}

/// Case-insensitive whole-string match on a text field.
fn exactly(field: &str, text: &str) -> Result<Filter> {
    let mut filter = Filter::all();
    let op = Op::regex(&format!("^{}$", regex::escape(text)), true)?;
    filter.set(field, vec![op]);
    Ok(filter)
}

pub trait UserDb {
    fn get_user_by_username(&self, username: &str) -> Result<Option<Document>>;
}

impl UserDb for sled::Db {
    fn get_user_by_username(&self, username: &str) -> Result<Option<Document>> {
        self.find_one(Collection::Users, &exactly("username", username)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cached {
    Inserted(u64),
    Existing(u64),
    Skipped,
}

impl Cached {
    pub fn id(self) -> Option<u64> {
        match self {
            Cached::Inserted(id) | Cached::Existing(id) => Some(id),
            Cached::Skipped => None,
        }
    }

    pub fn is_inserted(self) -> bool {
        matches!(self, Cached::Inserted(_))
    }
}

pub trait MovieDb {
    fn get_movie_by_title(&self, title: &str) -> Result<Option<Document>>;
    fn add_movie_if_absent(&self, movie: Movie) -> Result<Cached>;
}

impl MovieDb for sled::Db {
    fn get_movie_by_title(&self, title: &str) -> Result<Option<Document>> {
        self.find_one(Collection::Movies, &exactly("title", title)?)
    }

    fn add_movie_if_absent(&self, movie: Movie) -> Result<Cached> {
        let year = match movie.release_year {
            Some(year) if !movie.title.is_empty() => year,
            _ => return Ok(Cached::Skipped),
        };
        let same = Filter::by("title", movie.title.as_str()).and("release_year", Value::Int(year));
        if let Some(existing) = self.find_one(Collection::Movies, &same)? {
            if let Some(id) = existing.id() {
                return Ok(Cached::Existing(id));
            }
        }
        Ok(Cached::Inserted(
            self.insert_one(Collection::Movies, movie.into_fields())?,
        ))
    }
}
