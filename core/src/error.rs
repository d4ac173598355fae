use crate::DocId;
use thiserror::Error;

/// Failures raised while building, persisting, restoring or reading an index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("document not found: {0}")]
    NotFound(DocId),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] sled::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("corrupt store: {0}")]
    CorruptStore(String),
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("searcher is not initialized")]
    NotReady,

    #[error("searcher is already initialized")]
    AlreadyInitialized,

    #[error(transparent)]
    Index(#[from] IndexError),
}

pub type Result<T> = std::result::Result<T, IndexError>;
