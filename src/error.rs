use crate::catalog::CatalogError;
use crate::filter::FilterError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Store(#[from] sled::Error),
    #[error("document encoding error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("template error: {0}")]
    Template(#[from] tera::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("corrupt record in {tree}: {reason}")]
    Corrupt { tree: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
