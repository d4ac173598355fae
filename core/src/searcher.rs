//! Query pipeline: tokenize, retrieve postings, aggregate per document,
//! rank, cut snippets.

use crate::error::{IndexError, SearchError};
use crate::index::{DocId, Index, Weight};
use crate::tokenizer::Tokenizer;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;

/// Returned as the snippet when the matched term does not occur in the content.
pub const SNIPPET_NO_MATCH: &str = "None 1";
/// Returned as the snippet when the clamped window is empty.
pub const SNIPPET_EMPTY_WINDOW: &str = "None 2";
pub const SNIPPET_ELLIPSIS: &str = "...";
const SNIPPET_BEFORE: usize = 128;
const SNIPPET_AFTER: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultItem {
    pub title: String,
    pub desc: String,
    pub url: String,
    pub doc_id: DocId,
    pub weight: Weight,
}

#[derive(Default)]
struct Hit {
    weight: Weight,
    terms: Vec<String>,
}

/// Executes queries against one immutable [`Index`].
///
/// Starts uninitialized; `init` / `init_with` make it ready exactly once.
/// After that `query` takes `&self` and needs no locking.
pub struct Searcher {
    index: OnceCell<Arc<Index>>,
    tokenizer: Arc<dyn Tokenizer>,
}

impl Searcher {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { index: OnceCell::new(), tokenizer }
    }

    pub fn with_index(tokenizer: Arc<dyn Tokenizer>, index: Arc<Index>) -> Self {
        Self { index: OnceCell::with_value(index), tokenizer }
    }

    pub fn init_with(&self, index: Arc<Index>) -> Result<(), SearchError> {
        self.index.set(index).map_err(|_| SearchError::AlreadyInitialized)?;
        tracing::info!("searcher ready");
        Ok(())
    }

    /// Run `build` with this searcher's tokenizer and keep the result.
    /// `build` is not called when the searcher is already ready.
    pub fn init<F>(&self, build: F) -> Result<(), SearchError>
    where
        F: FnOnce(&dyn Tokenizer) -> Result<Index, IndexError>,
    {
        let mut built = false;
        self.index.get_or_try_init(|| {
            built = true;
            build(self.tokenizer.as_ref()).map(Arc::new)
        })?;
        if !built {
            return Err(SearchError::AlreadyInitialized);
        }
        tracing::info!("searcher ready");
        Ok(())
    }

    pub fn is_ready(&self) -> bool { self.index.get().is_some() }

    pub fn index(&self) -> Option<&Arc<Index>> { self.index.get() }

    pub fn tokenizer(&self) -> &dyn Tokenizer { self.tokenizer.as_ref() }

    /// Every document containing at least one query term, heaviest first,
    /// ties broken by ascending doc id.
    pub fn query(&self, text: &str) -> Result<Vec<ResultItem>, SearchError> {
        let index = self.index.get().ok_or(SearchError::NotReady)?;

        let mut terms: Vec<String> = Vec::new();
        for term in self.tokenizer.tokenize(text) {
            let term = term.to_lowercase();
            if !terms.contains(&term) {
                terms.push(term);
            }
        }
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: HashMap<DocId, Hit> = HashMap::new();
        for term in &terms {
            let Some(postings) = index.get_postings(term) else { continue };
            for entry in postings {
                let hit = hits.entry(entry.doc_id).or_default();
                hit.weight += entry.weight;
                hit.terms.push(entry.term.clone());
            }
        }

        let mut ranked: Vec<(DocId, Hit)> = hits.into_iter().collect();
        ranked.sort_by(|a, b| b.1.weight.cmp(&a.1.weight).then(a.0.cmp(&b.0)));

        let mut results = Vec::with_capacity(ranked.len());
        for (doc_id, hit) in ranked {
            // NotFound is logged by the index; the document is just left out
            let Ok(doc) = index.get_document(doc_id) else { continue };
            let desc = match hit.terms.first() {
                Some(term) => snippet(&doc.content, term),
                None => SNIPPET_NO_MATCH.to_string(),
            };
            results.push(ResultItem { title: doc.title.clone(), desc, url: doc.url.clone(), doc_id, weight: hit.weight });
        }
        tracing::debug!(query = text, terms = terms.len(), hits = results.len(), "query served");
        Ok(results)
    }
}

/// Excerpt of `content` around the first occurrence of `term`: up to 128
/// characters before it and 256 after, never past the last character.
///
/// Matching ignores case and compatibility forms the same way the tokenizer
/// does, so a full-width "ＡＳＩＯ" in the content is found for the term "asio".
/// Offsets and the excerpt itself refer to the raw content.
pub fn snippet(content: &str, term: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    let Some(pos) = find_folded(&chars, term) else {
        return SNIPPET_NO_MATCH.to_string();
    };
    let start = pos.saturating_sub(SNIPPET_BEFORE);
    let end = (pos + SNIPPET_AFTER).min(chars.len().saturating_sub(1));
    if end <= start {
        return SNIPPET_EMPTY_WINDOW.to_string();
    }
    let mut out: String = chars[start..end].iter().collect();
    out.push_str(SNIPPET_ELLIPSIS);
    out
}

fn fold(c: char) -> impl Iterator<Item = char> {
    std::iter::once(c).nfkd().flat_map(char::to_lowercase)
}

/// Char offset in `haystack` of the first match of `needle`, both sides
/// compared after NFKD decomposition and lowercasing.
fn find_folded(haystack: &[char], needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().flat_map(fold).collect();
    if needle.is_empty() {
        return None;
    }
    // each folded char remembers which raw char it came from
    let folded: Vec<(char, usize)> =
        haystack.iter().enumerate().flat_map(|(i, &c)| fold(c).map(move |f| (f, i))).collect();
    if needle.len() > folded.len() {
        return None;
    }
    folded
        .windows(needle.len())
        .find(|w| w.iter().zip(&needle).all(|((f, _), n)| f == n))
        .map(|w| w[0].1)
}
