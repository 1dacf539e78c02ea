use crate::model::Document;
use crate::value::Value;
use regex::{Regex, RegexBuilder};
use serde_json::{json, Map};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    #[error("unknown operator `{0}`")]
    UnknownOperator(String),
    #[error("invalid regular expression `{pattern}`: {reason}")]
    InvalidRegex { pattern: String, reason: String },
    #[error("`{0}` expects {1}")]
    Malformed(String, &'static str),
}

#[derive(Debug, Clone)]
pub enum Op {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Matches {
        pattern: String,
        case_insensitive: bool,
        regex: Regex,
    },
    Contains(String),
}

impl Op {
    pub fn regex(pattern: &str, case_insensitive: bool) -> Result<Op, FilterError> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|err| FilterError::InvalidRegex {
                pattern: pattern.to_owned(),
                reason: err.to_string(),
            })?;
        Ok(Op::Matches {
            pattern: pattern.to_owned(),
            case_insensitive,
            regex,
        })
    }

    fn matches(&self, field: Option<&Value>) -> bool {
        match self {
            Op::Eq(target) => equals(field, target),
            Op::Ne(target) => !equals(field, target),
            Op::Gt(target) => ordered(field, target, |o| o == Ordering::Greater),
            Op::Gte(target) => ordered(field, target, |o| o != Ordering::Less),
            Op::Lt(target) => ordered(field, target, |o| o == Ordering::Less),
            Op::Lte(target) => ordered(field, target, |o| o != Ordering::Greater),
            Op::In(targets) => targets.iter().any(|t| equals(field, t)),
            Op::Nin(targets) => !targets.iter().any(|t| equals(field, t)),
            Op::Exists(expected) => field.is_some() == *expected,
            Op::Matches { regex, .. } => {
                any_element(field, |v| v.as_str().map_or(false, |s| regex.is_match(s)))
            }
            Op::Contains(needle) => {
                let needle = needle.to_lowercase();
                any_element(field, |v| {
                    v.as_str()
                        .map_or(false, |s| s.to_lowercase().contains(&needle))
                })
            }
        }
    }

    fn to_json(&self) -> (String, serde_json::Value) {
        match self {
            Op::Eq(v) => ("$eq".to_owned(), v.to_json()),
            Op::Ne(v) => ("$ne".to_owned(), v.to_json()),
            Op::Gt(v) => ("$gt".to_owned(), v.to_json()),
            Op::Gte(v) => ("$gte".to_owned(), v.to_json()),
            Op::Lt(v) => ("$lt".to_owned(), v.to_json()),
            Op::Lte(v) => ("$lte".to_owned(), v.to_json()),
            Op::In(vs) => ("$in".to_owned(), vs.iter().map(Value::to_json).collect()),
            Op::Nin(vs) => ("$nin".to_owned(), vs.iter().map(Value::to_json).collect()),
            Op::Exists(b) => ("$exists".to_owned(), json!(b)),
            Op::Matches { pattern, .. } | Op::Contains(pattern) => {
                ("$regex".to_owned(), json!(pattern))
            }
        }
    }
}

fn any_element(field: Option<&Value>, pred: impl Fn(&Value) -> bool) -> bool {
    match field {
        Some(Value::Array(items)) => items.iter().any(|v| pred(v)),
        Some(v) => pred(v),
        None => false,
    }
}

fn equals(field: Option<&Value>, target: &Value) -> bool {
    match field {
        None | Some(Value::Null) => target.is_null(),
        Some(Value::Array(items)) if !matches!(target, Value::Array(_)) => {
            items.iter().any(|v| v.loose_eq(target))
        }
        Some(v) => v.loose_eq(target),
    }
}

fn ordered(field: Option<&Value>, target: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    any_element(field, |v| v.compare(target).map_or(false, &accept))
}

#[derive(Debug, Clone)]
pub enum Clause {
    Field { name: String, ops: Vec<Op> },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Clause {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            Clause::Field { name, ops } => {
                let field = doc.get(name);
                ops.iter().all(|op| op.matches(field))
            }
            Clause::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Clause::Or(filters) => filters.iter().any(|f| f.matches(doc)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn all() -> Self {
        Filter::default()
    }

    pub fn by(field: &str, value: impl Into<Value>) -> Self {
        Filter::all().and(field, value)
    }

    pub fn and(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.push(field, vec![Op::Eq(value.into())]);
        self
    }

    pub fn parse(map: &Map<String, serde_json::Value>) -> Result<Filter, FilterError> {
        let mut clauses = Vec::with_capacity(map.len());
        for (key, value) in map {
            match key.as_str() {
                "$and" => clauses.push(Clause::And(parse_list(key, value)?)),
                "$or" => clauses.push(Clause::Or(parse_list(key, value)?)),
                k if k.starts_with('$') => return Err(FilterError::UnknownOperator(k.to_owned())),
                _ => clauses.push(Clause::Field {
                    name: key.clone(),
                    ops: parse_condition(value)?,
                }),
            }
        }
        Ok(Filter { clauses })
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses.iter().all(|c| c.matches(doc))
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn contains_key(&self, field: &str) -> bool {
        self.ops(field).is_some()
    }

    pub fn ops(&self, field: &str) -> Option<&[Op]> {
        self.clauses.iter().find_map(|c| match c {
            Clause::Field { name, ops } if name == field => Some(ops.as_slice()),
            _ => None,
        })
    }

    pub fn plain_string(&self, field: &str) -> Option<&str> {
        match self.ops(field)? {
            [Op::Eq(Value::String(s))] => Some(s),
            _ => None,
        }
    }

    /// Text the filter searches a field for, whether by equality, substring
    /// or regular expression.
    pub fn text_hint(&self, field: &str) -> Option<&str> {
        self.ops(field)?.iter().find_map(|op| match op {
            Op::Eq(Value::String(s)) | Op::Contains(s) => Some(s.as_str()),
            Op::Matches { pattern, .. } => Some(pattern.as_str()),
            _ => None,
        })
    }

    pub fn remove(&mut self, field: &str) -> Option<Vec<Op>> {
        let position = self
            .clauses
            .iter()
            .position(|c| matches!(c, Clause::Field { name, .. } if name == field))?;
        match self.clauses.remove(position) {
            Clause::Field { ops, .. } => Some(ops),
            _ => None,
        }
    }

    pub fn set(&mut self, field: &str, new_ops: Vec<Op>) {
        for clause in self.clauses.iter_mut() {
            if let Clause::Field { name, ops } = clause {
                if name == field {
                    *ops = new_ops;
                    return;
                }
            }
        }
        self.push(field, new_ops);
    }

    fn push(&mut self, field: &str, ops: Vec<Op>) {
        self.clauses.push(Clause::Field {
            name: field.to_owned(),
            ops,
        });
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut map = Map::new();
        for clause in &self.clauses {
            match clause {
                Clause::Field { name, ops } => {
                    map.insert(name.clone(), ops_to_json(ops));
                }
                Clause::And(filters) => {
                    map.insert("$and".to_owned(), filters.iter().map(Filter::to_json).collect());
                }
                Clause::Or(filters) => {
                    map.insert("$or".to_owned(), filters.iter().map(Filter::to_json).collect());
                }
            }
        }
        serde_json::Value::Object(map)
    }
}

fn ops_to_json(ops: &[Op]) -> serde_json::Value {
    if let [Op::Eq(v)] = ops {
        return v.to_json();
    }
    let mut map = Map::new();
    for op in ops {
        let (key, value) = op.to_json();
        map.insert(key, value);
        match op {
            Op::Contains(_)
            | Op::Matches {
                case_insensitive: true,
                ..
            } => {
                map.insert("$options".to_owned(), json!("i"));
            }
            _ => {}
        }
    }
    serde_json::Value::Object(map)
}

fn parse_list(key: &str, value: &serde_json::Value) -> Result<Vec<Filter>, FilterError> {
    let items = value
        .as_array()
        .ok_or_else(|| FilterError::Malformed(key.to_owned(), "an array of filters"))?;
    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| FilterError::Malformed(key.to_owned(), "an array of filters"))
                .and_then(Filter::parse)
        })
        .collect()
}

fn is_operator_document(map: &Map<String, serde_json::Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}

fn parse_condition(value: &serde_json::Value) -> Result<Vec<Op>, FilterError> {
    let map = match value {
        serde_json::Value::Object(map) if is_operator_document(map) => map,
        other => return Ok(vec![Op::Eq(Value::from(other.clone()))]),
    };
    let case_insensitive = map
        .get("$options")
        .and_then(serde_json::Value::as_str)
        .map_or(false, |o| o.contains('i'));
    let mut ops = Vec::with_capacity(map.len());
    for (key, operand) in map {
        let op = match key.as_str() {
            "$eq" => Op::Eq(Value::from(operand.clone())),
            "$ne" => Op::Ne(Value::from(operand.clone())),
            "$gt" => Op::Gt(Value::from(operand.clone())),
            "$gte" => Op::Gte(Value::from(operand.clone())),
            "$lt" => Op::Lt(Value::from(operand.clone())),
            "$lte" => Op::Lte(Value::from(operand.clone())),
            "$in" => Op::In(parse_values(key, operand)?),
            "$nin" => Op::Nin(parse_values(key, operand)?),
            "$exists" => Op::Exists(match operand {
                serde_json::Value::Bool(b) => *b,
                serde_json::Value::Number(n) => n.as_f64() != Some(0.0),
                _ => return Err(FilterError::Malformed(key.clone(), "a boolean")),
            }),
            "$regex" => {
                let pattern = operand
                    .as_str()
                    .ok_or_else(|| FilterError::Malformed(key.clone(), "a string"))?;
                Op::regex(pattern, case_insensitive)?
            }
            "$options" => continue,
            other => return Err(FilterError::UnknownOperator(other.to_owned())),
        };
        ops.push(op);
    }
    Ok(ops)
}

fn parse_values(key: &str, operand: &serde_json::Value) -> Result<Vec<Value>, FilterError> {
    operand
        .as_array()
        .map(|items| items.iter().cloned().map(Value::from).collect())
        .ok_or_else(|| FilterError::Malformed(key.to_owned(), "an array"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sort {
    keys: Vec<(String, Direction)>,
}

impl Sort {
    pub fn parse(map: &Map<String, serde_json::Value>) -> Result<Sort, FilterError> {
        let keys = map
            .iter()
            .map(|(field, direction)| {
                let direction = match direction {
                    serde_json::Value::Number(n) if n.as_f64().map_or(false, |d| d < 0.0) => {
                        Direction::Descending
                    }
                    serde_json::Value::Number(_) => Direction::Ascending,
                    serde_json::Value::String(s) => match s.to_lowercase().as_str() {
                        "asc" | "ascending" => Direction::Ascending,
                        "desc" | "descending" => Direction::Descending,
                        _ => return Err(FilterError::Malformed(field.clone(), "1 or -1")),
                    },
                    _ => return Err(FilterError::Malformed(field.clone(), "1 or -1")),
                };
                Ok((field.clone(), direction))
            })
            .collect::<Result<_, _>>()?;
        Ok(Sort { keys })
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn apply(&self, docs: &mut [Document]) {
        if self.keys.is_empty() {
            return;
        }
        docs.sort_by(|a, b| {
            self.keys
                .iter()
                .map(|(field, direction)| {
                    let ordering = Value::sort_order(a.get(field), b.get(field));
                    match direction {
                        Direction::Ascending => ordering,
                        Direction::Descending => ordering.reverse(),
                    }
                })
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
    }

}

pub const DEFAULT_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Unlimited,
    AtMost(usize),
}

impl Limit {
    /// A requested size, where 0 means no limit.
    pub fn from_count(count: i64) -> Limit {
        match count.unsigned_abs() {
            0 => Limit::Unlimited,
            n => Limit::AtMost(n as usize),
        }
    }

    pub fn get(self) -> Option<usize> {
        match self {
            Limit::Unlimited => None,
            Limit::AtMost(n) => Some(n),
        }
    }
}

impl Default for Limit {
    fn default() -> Self {
        Limit::AtMost(DEFAULT_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{fields_from_json, Fields};

    fn doc(value: serde_json::Value) -> Document {
        match value {
            serde_json::Value::Object(map) => Document::new(1, fields_from_json(map)),
            _ => Document::new(1, Fields::new()),
        }
    }

    fn filter(value: serde_json::Value) -> Filter {
        Filter::parse(value.as_object().unwrap()).unwrap()
    }

    #[test]
    fn equality_and_ranges() {
        let movie = doc(json!({"genre": "Thriller", "release_year": 2021, "rating": 7.9}));
        assert!(filter(json!({"genre": "Thriller"})).matches(&movie));
        assert!(!filter(json!({"genre": "thriller"})).matches(&movie));
        assert!(filter(json!({"release_year": {"$gt": 2020}})).matches(&movie));
        assert!(!filter(json!({"release_year": {"$gt": 2021}})).matches(&movie));
        assert!(filter(json!({"release_year": {"$gte": 2021, "$lt": 2022}})).matches(&movie));
        assert!(filter(json!({"rating": {"$in": [7.9, 8.0]}})).matches(&movie));
        assert!(filter(json!({})).matches(&movie));
    }

    #[test]
    fn comparisons_do_not_cross_kinds() {
        let movie = doc(json!({"release_year": "2021"}));
        assert!(!filter(json!({"release_year": {"$gt": 2020}})).matches(&movie));
    }

    #[test]
    fn null_equality_matches_missing_fields() {
        let movie = doc(json!({"title": "Dune"}));
        assert!(filter(json!({"director": null})).matches(&movie));
        assert!(filter(json!({"director": {"$exists": false}})).matches(&movie));
        assert!(!filter(json!({"title": {"$exists": false}})).matches(&movie));
    }

    #[test]
    fn regex_and_contains() {
        let movie = doc(json!({"director": "Christopher Nolan"}));
        assert!(filter(json!({"director": {"$regex": "nolan", "$options": "i"}})).matches(&movie));
        assert!(!filter(json!({"director": {"$regex": "nolan"}})).matches(&movie));

        let mut f = Filter::all();
        f.set("director", vec![Op::Contains("NOLAN".to_owned())]);
        assert!(f.matches(&movie));
        assert_eq!(f.text_hint("director"), Some("NOLAN"));
        assert_eq!(
            f.to_json(),
            json!({"director": {"$regex": "NOLAN", "$options": "i"}})
        );
    }

    #[test]
    fn logical_clauses() {
        let movie = doc(json!({"genre": "Drama", "rating": 9.0}));
        assert!(filter(json!({"$or": [{"genre": "Comedy"}, {"rating": {"$gte": 9}}]})).matches(&movie));
        assert!(!filter(json!({"$and": [{"genre": "Drama"}, {"rating": {"$lt": 9}}]})).matches(&movie));
    }

    #[test]
    fn rejects_bad_filters() {
        let bad = json!({"title": {"$near": 1}});
        assert_eq!(
            Filter::parse(bad.as_object().unwrap()).unwrap_err(),
            FilterError::UnknownOperator("$near".to_owned())
        );
        let bad = json!({"title": {"$regex": "("}});
        assert!(matches!(
            Filter::parse(bad.as_object().unwrap()),
            Err(FilterError::InvalidRegex { .. })
        ));
        let bad = json!({"$where": "1"});
        assert!(Filter::parse(bad.as_object().unwrap()).is_err());
    }

    #[test]
    fn plain_string_only_for_string_equality() {
        let f = filter(json!({"title": "Dune", "release_year": 2021, "director": {"$regex": "x"}}));
        assert_eq!(f.plain_string("title"), Some("Dune"));
        assert_eq!(f.plain_string("release_year"), None);
        assert_eq!(f.plain_string("director"), None);
        assert_eq!(f.text_hint("director"), Some("x"));
    }

    #[test]
    fn sort_applies_keys_in_order() {
        let mut docs = vec![
            doc(json!({"title": "B", "rating": 7.0})),
            doc(json!({"title": "A", "rating": 7.0})),
            doc(json!({"title": "C", "rating": 9.0})),
            doc(json!({"title": "D"})),
        ];
        let sort = Sort::parse(json!({"rating": -1, "title": 1}).as_object().unwrap()).unwrap();
        sort.apply(&mut docs);
        let titles: Vec<_> = docs.iter().map(|d| d.str_field("title").unwrap()).collect();
        assert_eq!(titles, vec!["C", "A", "B", "D"]);
    }

    #[test]
    fn limits() {
        assert_eq!(Limit::from_count(0), Limit::Unlimited);
        assert_eq!(Limit::from_count(-3), Limit::AtMost(3));
        assert_eq!(Limit::default().get(), Some(5));
    }
}
