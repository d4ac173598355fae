pub mod error;
pub mod global;
pub mod index;
pub mod persist;
pub mod searcher;
pub mod tokenizer;

pub use error::{IndexError, SearchError};
pub use index::{
    posting_weight, BuildStats, DocId, DocumentRecord, Index, PostingEntry, PostingList, Weight, CORPUS_DELIMITER,
};
pub use persist::{Gateway, StorePaths};
pub use searcher::{ResultItem, Searcher};
pub use tokenizer::{StandardTokenizer, Tokenizer, TokenizerConfig};
