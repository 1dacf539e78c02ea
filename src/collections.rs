use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Movies,
    Wishlist,
    Watched,
}

const ALIASES: &[(&str, Collection)] = &[
    ("watchlist", Collection::Wishlist),
    ("watch_list", Collection::Wishlist),
    ("wish_list", Collection::Wishlist),
    ("seen", Collection::Watched),
    ("viewed", Collection::Watched),
    ("user", Collection::Users),
    ("movie", Collection::Movies),
];

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Users,
        Collection::Movies,
        Collection::Wishlist,
        Collection::Watched,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Movies => "movies",
            Collection::Wishlist => "wishlist",
            Collection::Watched => "watched",
        }
    }

    pub fn is_join(self) -> bool {
        matches!(self, Collection::Wishlist | Collection::Watched)
    }

    pub fn canonical_names() -> Vec<&'static str> {
        Collection::ALL.iter().map(|c| c.name()).collect()
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnknownCollection {
    pub name: String,
    pub available: Vec<&'static str>,
}

pub fn resolve(raw: &str) -> Result<Collection, UnknownCollection> {
    if let Some(collection) = Collection::ALL.iter().find(|c| c.name() == raw) {
        return Ok(*collection);
    }
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == raw)
        .map(|(_, collection)| *collection)
        .ok_or_else(|| UnknownCollection {
            name: raw.to_owned(),
            available: Collection::canonical_names(),
        })
}
