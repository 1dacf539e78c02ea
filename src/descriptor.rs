use crate::filter::{Filter, FilterError, Limit, Sort};
use crate::value::{fields_from_json, Fields};
use serde_json::{Map, Value as Json};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Find,
    Insert,
    Update,
    Delete,
    Count,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::Find,
        ActionKind::Insert,
        ActionKind::Update,
        ActionKind::Delete,
        ActionKind::Count,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ActionKind::Find => "find",
            ActionKind::Insert => "insert",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
            ActionKind::Count => "count",
        }
    }

    pub fn parse(name: &str) -> Option<ActionKind> {
        let name = name.trim().to_lowercase();
        ActionKind::ALL.iter().copied().find(|a| a.name() == name)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    Find {
        query: Filter,
        sort: Sort,
        limit: Limit,
    },
    Insert {
        data: Fields,
    },
    Update {
        query: Filter,
        data: Fields,
    },
    Delete {
        query: Filter,
    },
    Count {
        query: Filter,
    },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Find { .. } => ActionKind::Find,
            Action::Insert { .. } => ActionKind::Insert,
            Action::Update { .. } => ActionKind::Update,
            Action::Delete { .. } => ActionKind::Delete,
            Action::Count { .. } => ActionKind::Count,
        }
    }

    pub fn query(&self) -> Option<&Filter> {
        match self {
            Action::Find { query, .. }
            | Action::Update { query, .. }
            | Action::Delete { query }
            | Action::Count { query } => Some(query),
            Action::Insert { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Descriptor {
    /// Collection name as written by the model; resolved later.
    pub collection: String,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DescriptorError {
    #[error("descriptor is not a JSON object")]
    NotAnObject,
    #[error("unrecognized action `{0}`")]
    UnknownAction(String),
    #[error("`{0}` must be {1}")]
    Malformed(&'static str, &'static str),
    #[error("invalid query: {0}")]
    Filter(#[from] FilterError),
}

const DEFAULT_COLLECTION: &str = "movies";

impl Descriptor {
    pub fn from_json(value: Json) -> Result<Descriptor, DescriptorError> {
        let mut map = match value {
            Json::Object(map) => map,
            _ => return Err(DescriptorError::NotAnObject),
        };
        let collection = match map.remove("collection") {
            Some(Json::String(s)) => s,
            None | Some(Json::Null) => DEFAULT_COLLECTION.to_owned(),
            Some(_) => return Err(DescriptorError::Malformed("collection", "a string")),
        };
        let kind = match map.remove("action") {
            Some(Json::String(s)) => {
                ActionKind::parse(&s).ok_or(DescriptorError::UnknownAction(s))?
            }
            None | Some(Json::Null) => ActionKind::Find,
            Some(_) => return Err(DescriptorError::Malformed("action", "a string")),
        };

        let query = Filter::parse(&object(&mut map, "query")?)?;
        let action = match kind {
            ActionKind::Find => Action::Find {
                query,
                sort: Sort::parse(&object(&mut map, "sort")?)?,
                limit: limit(&mut map)?,
            },
            ActionKind::Insert => Action::Insert {
                data: payload(&mut map)?,
            },
            ActionKind::Update => Action::Update {
                query,
                data: payload(&mut map)?,
            },
            ActionKind::Delete => Action::Delete { query },
            ActionKind::Count => Action::Count { query },
        };
        Ok(Descriptor { collection, action })
    }
}

fn object(map: &mut Map<String, Json>, key: &'static str) -> Result<Map<String, Json>, DescriptorError> {
    match map.remove(key) {
        Some(Json::Object(inner)) => Ok(inner),
        None | Some(Json::Null) => Ok(Map::new()),
        Some(_) => Err(DescriptorError::Malformed(key, "an object")),
    }
}

fn limit(map: &mut Map<String, Json>) -> Result<Limit, DescriptorError> {
    match map.remove("limit") {
        None | Some(Json::Null) => Ok(Limit::default()),
        Some(Json::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Limit::from_count)
            .ok_or(DescriptorError::Malformed("limit", "an integer")),
        Some(_) => Err(DescriptorError::Malformed("limit", "an integer")),
    }
}

fn payload(map: &mut Map<String, Json>) -> Result<Fields, DescriptorError> {
    let mut data = object(map, "data")?;
    if data.len() == 1 {
        if let Some(Json::Object(inner)) = data.remove("$set") {
            return Ok(fields_from_json(inner));
        }
    }
    Ok(fields_from_json(data))
}

/// Cuts the JSON object out of a model reply: everything from the first `{`
/// to the last `}`.
pub fn extract_json(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&reply[start..=end])
}
