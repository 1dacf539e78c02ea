use crate::descriptor::{Action, Descriptor};
use crate::filter::{Filter, Limit, Op};
use crate::tokens::has_token;

const FUZZY_FIELDS: [&str; 2] = ["title", "director"];

/// Rewrites a descriptor before execution: title and director lookups
/// become case-insensitive substring matches, and asking for "all" of
/// something lifts the result limit.
pub fn normalize(mut descriptor: Descriptor, prompt: &str) -> Descriptor {
    if let Action::Find { query, limit, .. } = &mut descriptor.action {
        loosen_text_fields(query);
        if has_token(prompt, "all") {
            *limit = Limit::Unlimited;
        }
    }
    descriptor
}

fn loosen_text_fields(query: &mut Filter) {
    for field in FUZZY_FIELDS.iter() {
        if let Some(text) = query.plain_string(field).map(str::to_owned) {
            query.set(field, vec![Op::Contains(text)]);
        }
    }
}
