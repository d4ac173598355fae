use crate::error::{IndexError, Result};
use crate::persist::Gateway;
use crate::tokenizer::Tokenizer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub type DocId = u64;
pub type Weight = u64;

/// Field separator of the normalized corpus: `title \x03 content \x03 url`.
pub const CORPUS_DELIMITER: char = '\x03';

/// Weight of one title occurrence (`X`) and one content occurrence (`Y`).
/// A posting weighs `(X - Y) * title_count + Y * content_count`.
pub const TITLE_WEIGHT: Weight = 10;
pub const CONTENT_WEIGHT: Weight = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub doc_id: DocId,
    pub title: String,
    pub content: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostingEntry {
    pub doc_id: DocId,
    pub term: String,
    pub weight: Weight,
}

/// Postings sharing one term, in insertion order.
pub type PostingList = Vec<PostingEntry>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub indexed: usize,
    pub skipped: usize,
}

pub fn posting_weight(title_count: Weight, content_count: Weight) -> Weight {
    (TITLE_WEIGHT - CONTENT_WEIGHT) * title_count + CONTENT_WEIGHT * content_count
}

/// Forward store (documents by dense id) plus inverted store (postings by term).
///
/// An `Index` is only ever produced whole by one of the build/load constructors,
/// and exposes no mutating methods afterwards.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Index {
    forward: Vec<DocumentRecord>,
    inverted: HashMap<String, PostingList>,
}

#[derive(Default)]
struct FieldCounts {
    title: Weight,
    content: Weight,
}

impl Index {
    pub fn new() -> Self { Self::default() }

    /// Build from normalized corpus lines. Malformed lines are dropped with a warning.
    pub fn build_from_corpus<I, S>(lines: I, tokenizer: &dyn Tokenizer) -> (Self, BuildStats)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Index::new();
        let mut stats = BuildStats::default();
        for (lineno, line) in lines.into_iter().enumerate() {
            index.ingest_line("corpus", lineno + 1, line.as_ref(), tokenizer, &mut stats);
        }
        index.log_built(&stats);
        (index, stats)
    }

    /// Like [`Index::build_from_corpus`], but a read error aborts the whole build.
    pub fn build_from_reader<R: BufRead>(reader: R, tokenizer: &dyn Tokenizer) -> Result<(Self, BuildStats)> {
        let mut index = Index::new();
        let mut stats = BuildStats::default();
        index.ingest_reader("reader", reader, tokenizer, &mut stats)?;
        index.log_built(&stats);
        Ok((index, stats))
    }

    pub fn build_from_path<P: AsRef<Path>>(path: P, tokenizer: &dyn Tokenizer) -> Result<(Self, BuildStats)> {
        Self::build_from_paths(&[path], tokenizer)
    }

    /// One index over several corpus files, in the given order. Doc ids continue
    /// across files; line numbers in warnings restart at 1 for each file.
    pub fn build_from_paths<P: AsRef<Path>>(paths: &[P], tokenizer: &dyn Tokenizer) -> Result<(Self, BuildStats)> {
        let mut index = Index::new();
        let mut stats = BuildStats::default();
        for path in paths {
            let path = path.as_ref();
            let f = File::open(path).map_err(|e| {
                tracing::error!(path = %path.display(), error = %e, "cannot open corpus");
                e
            })?;
            let source = path.display().to_string();
            tracing::debug!(source = %source, "reading corpus file");
            index.ingest_reader(&source, BufReader::new(f), tokenizer, &mut stats)?;
        }
        index.log_built(&stats);
        Ok((index, stats))
    }

    fn ingest_reader<R: BufRead>(&mut self, source: &str, reader: R, tokenizer: &dyn Tokenizer, stats: &mut BuildStats) -> Result<()> {
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            self.ingest_line(source, lineno + 1, &line, tokenizer, stats);
        }
        Ok(())
    }

    fn ingest_line(&mut self, source: &str, lineno: usize, line: &str, tokenizer: &dyn Tokenizer, stats: &mut BuildStats) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() { return; }
        let fields: Vec<&str> = line.split(CORPUS_DELIMITER).collect();
        let [title, content, url] = fields.as_slice() else {
            tracing::warn!(source, lineno, fields = fields.len(), "dropping malformed corpus record");
            stats.skipped += 1;
            return;
        };
        let doc_id = self.forward.len() as DocId;
        self.forward.push(DocumentRecord { doc_id, title: title.to_string(), content: content.to_string(), url: url.to_string() });
        self.index_document(doc_id, tokenizer);
        stats.indexed += 1;
        if stats.indexed % 1000 == 0 {
            tracing::debug!(indexed = stats.indexed, num_terms = self.inverted.len(), "indexing progress");
        }
    }

    fn index_document(&mut self, doc_id: DocId, tokenizer: &dyn Tokenizer) {
        let doc = &self.forward[doc_id as usize];
        // Vec keeps first-seen order so posting lists are filled deterministically
        let mut order: Vec<String> = Vec::new();
        let mut counts: HashMap<String, FieldCounts> = HashMap::new();
        for term in tokenizer.tokenize(&doc.title) {
            let term = term.to_lowercase();
            counts.entry(term.clone()).or_insert_with(|| { order.push(term); FieldCounts::default() }).title += 1;
        }
        for term in tokenizer.tokenize(&doc.content) {
            let term = term.to_lowercase();
            counts.entry(term.clone()).or_insert_with(|| { order.push(term); FieldCounts::default() }).content += 1;
        }
        for term in order {
            let c = &counts[&term];
            let weight = posting_weight(c.title, c.content);
            self.inverted.entry(term.clone()).or_default().push(PostingEntry { doc_id, term, weight });
        }
    }

    fn log_built(&self, stats: &BuildStats) {
        tracing::info!(num_docs = self.forward.len(), num_terms = self.inverted.len(), skipped = stats.skipped, "index build complete");
    }

    /// Rebuild from the gateway without re-tokenizing.
    pub fn load_from_store(gateway: &Gateway) -> Result<Self> {
        let mut forward = gateway.documents.select_all()?;
        forward.sort_by_key(|d| d.doc_id);
        for (pos, doc) in forward.iter().enumerate() {
            if doc.doc_id != pos as DocId {
                return Err(IndexError::CorruptStore(format!("document ids not dense: expected {pos}, found {}", doc.doc_id)));
            }
        }
        let mut inverted: HashMap<String, PostingList> = HashMap::new();
        for entry in gateway.postings.select_all()? {
            if entry.doc_id as usize >= forward.len() {
                return Err(IndexError::CorruptStore(format!("posting for {:?} references missing document {}", entry.term, entry.doc_id)));
            }
            inverted.entry(entry.term.clone()).or_default().push(entry);
        }
        let index = Index { forward, inverted };
        tracing::info!(num_docs = index.forward.len(), num_terms = index.inverted.len(), "index loaded from store");
        Ok(index)
    }

    /// Full overwrite of both tables. Not atomic: rows written before a failure stay written.
    pub fn save_to_store(&self, gateway: &Gateway) -> Result<()> {
        gateway.documents.clear()?;
        gateway.postings.clear()?;
        for doc in &self.forward {
            gateway.documents.insert(doc)?;
        }
        let mut rows = 0usize;
        for list in self.inverted.values() {
            for entry in list {
                gateway.postings.insert(entry)?;
                rows += 1;
            }
        }
        gateway.documents.flush()?;
        gateway.postings.flush()?;
        tracing::info!(num_docs = self.forward.len(), postings = rows, "index saved to store");
        Ok(())
    }

    pub fn get_document(&self, doc_id: DocId) -> Result<&DocumentRecord> {
        self.forward.get(doc_id as usize).ok_or_else(|| {
            tracing::warn!(doc_id, num_docs = self.forward.len(), "doc_id out of range");
            IndexError::NotFound(doc_id)
        })
    }

    /// `None` when the term was never indexed.
    pub fn get_postings(&self, term: &str) -> Option<&PostingList> {
        let list = self.inverted.get(term);
        if list.is_none() {
            tracing::trace!(term, "no postings");
        }
        list
    }

    pub fn documents(&self) -> &[DocumentRecord] { &self.forward }

    pub fn terms(&self) -> impl Iterator<Item = (&str, &PostingList)> {
        self.inverted.iter().map(|(t, l)| (t.as_str(), l))
    }

    pub fn num_docs(&self) -> usize { self.forward.len() }

    pub fn num_terms(&self) -> usize { self.inverted.len() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::StandardTokenizer;

    fn line(title: &str, content: &str, url: &str) -> String {
        format!("{title}{CORPUS_DELIMITER}{content}{CORPUS_DELIMITER}{url}")
    }

    #[test]
    fn title_hits_weigh_nine_content_hits() {
        let corpus = [line("Boost Asio", "Asio is a boost library asio example", "https://boost.org/asio")];
        let (index, stats) = Index::build_from_corpus(corpus, &StandardTokenizer::default());
        assert_eq!(stats, BuildStats { indexed: 1, skipped: 0 });
        let asio = index.get_postings("asio").unwrap();
        assert_eq!(asio, &vec![PostingEntry { doc_id: 0, term: "asio".into(), weight: 11 }]);
        assert_eq!(index.get_postings("boost").unwrap()[0].weight, 10);
        assert_eq!(index.get_postings("library").unwrap()[0].weight, 1);
    }

    #[test]
    fn malformed_lines_are_dropped() {
        let corpus = vec![
            line("a", "alpha", "u0"),
            format!("only{CORPUS_DELIMITER}two"),
            String::new(),
            line("b", "beta", "u1"),
        ];
        let (index, stats) = Index::build_from_corpus(corpus, &StandardTokenizer::default());
        assert_eq!(stats, BuildStats { indexed: 2, skipped: 1 });
        assert_eq!(index.num_docs(), 2);
        assert_eq!(index.get_document(1).unwrap().title, "b");
    }

    #[test]
    fn out_of_range_doc_is_not_found() {
        let (index, _) = Index::build_from_corpus([line("a", "b", "c")], &StandardTokenizer::default());
        assert!(matches!(index.get_document(1), Err(IndexError::NotFound(1))));
        assert!(index.get_postings("missing").is_none());
    }

    #[test]
    fn files_are_indexed_in_order_with_continuing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.txt");
        let second = dir.path().join("b.txt");
        // no trailing newline on the first file
        std::fs::write(&first, line("a", "alpha", "u0")).unwrap();
        std::fs::write(&second, format!("{}\nbroken{CORPUS_DELIMITER}line\n", line("b", "beta", "u1"))).unwrap();
        let (index, stats) = Index::build_from_paths(&[&first, &second], &StandardTokenizer::default()).unwrap();
        assert_eq!(stats, BuildStats { indexed: 2, skipped: 1 });
        assert_eq!(index.get_document(0).unwrap().url, "u0");
        assert_eq!(index.get_document(1).unwrap().url, "u1");
        assert_eq!(index.get_postings("beta").unwrap()[0].doc_id, 1);
    }

    #[test]
    fn missing_corpus_file_aborts_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let err = Index::build_from_path(dir.path().join("absent.txt"), &StandardTokenizer::default()).unwrap_err();
        assert!(matches!(err, IndexError::Io(_)));
    }

    #[test]
    fn crlf_line_endings_are_tolerated() {
        let raw = format!("{}\r\n{}\r\n", line("a", "x", "u0"), line("b", "y", "u1"));
        let (index, stats) = Index::build_from_reader(raw.as_bytes(), &StandardTokenizer::default()).unwrap();
        assert_eq!(stats.indexed, 2);
        assert_eq!(index.get_document(0).unwrap().url, "u0");
    }
}
