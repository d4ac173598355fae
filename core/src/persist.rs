//! Persistence gateway: a documents table and a postings table behind a narrow
//! row-level contract. The index only ever clears, inserts and scans whole tables.

use crate::error::{IndexError, Result};
use crate::{DocumentRecord, PostingEntry};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::create_dir_all;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A row type that can be stored in a [`Table`]. Rows with equal keys replace each other.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn key(&self) -> Vec<u8>;
}

impl Record for DocumentRecord {
    fn key(&self) -> Vec<u8> { self.doc_id.to_be_bytes().to_vec() }
}

impl Record for PostingEntry {
    // term, separator, doc id: rows for one term are adjacent and ordered by doc id
    fn key(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.term.len() + 9);
        key.extend_from_slice(self.term.as_bytes());
        key.push(0);
        key.extend_from_slice(&self.doc_id.to_be_bytes());
        key
    }
}

/// CRUD capability for one entity type.
pub trait Table<R: Record>: Send + Sync {
    fn insert(&self, row: &R) -> Result<()>;
    /// All rows in key order.
    fn select_all(&self) -> Result<Vec<R>>;
    fn clear(&self) -> Result<()>;
    fn flush(&self) -> Result<()> { Ok(()) }
}

impl<R: Record, T: Table<R> + ?Sized> Table<R> for Arc<T> {
    fn insert(&self, row: &R) -> Result<()> { (**self).insert(row) }
    fn select_all(&self) -> Result<Vec<R>> { (**self).select_all() }
    fn clear(&self) -> Result<()> { (**self).clear() }
    fn flush(&self) -> Result<()> { (**self).flush() }
}

pub struct StorePaths {
    pub root: PathBuf,
}

impl StorePaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn db(&self) -> PathBuf { self.root.join("store.sled") }
}

pub struct SledTable<R> {
    tree: sled::Tree,
    _row: PhantomData<fn() -> R>,
}

impl<R> SledTable<R> {
    pub fn new(tree: sled::Tree) -> Self { Self { tree, _row: PhantomData } }
}

impl<R: Record> Table<R> for SledTable<R> {
    fn insert(&self, row: &R) -> Result<()> {
        let bytes = bincode::serialize(row)?;
        self.tree.insert(row.key(), bytes)?;
        Ok(())
    }

    fn select_all(&self) -> Result<Vec<R>> {
        let mut rows = Vec::with_capacity(self.tree.len());
        for kv in self.tree.iter() {
            let (_, value) = kv?;
            rows.push(bincode::deserialize(&value)?);
        }
        Ok(rows)
    }

    fn clear(&self) -> Result<()> {
        self.tree.clear()?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.tree.flush()?;
        Ok(())
    }
}

/// Keyed in-memory table. `fail_after(n)` makes every insert past the n-th fail,
/// which is how callers observe a gateway that dies mid-save.
pub struct MemoryTable<R> {
    rows: Mutex<BTreeMap<Vec<u8>, R>>,
    insert_budget: Mutex<Option<usize>>,
}

impl<R> Default for MemoryTable<R> {
    fn default() -> Self {
        Self { rows: Mutex::new(BTreeMap::new()), insert_budget: Mutex::new(None) }
    }
}

impl<R: Record> MemoryTable<R> {
    pub fn new() -> Self { Self::default() }

    pub fn fail_after(&self, inserts: usize) {
        *self.insert_budget.lock() = Some(inserts);
    }

    pub fn len(&self) -> usize { self.rows.lock().len() }

    pub fn is_empty(&self) -> bool { self.rows.lock().is_empty() }
}

impl<R: Record> Table<R> for MemoryTable<R> {
    fn insert(&self, row: &R) -> Result<()> {
        let mut budget = self.insert_budget.lock();
        if let Some(left) = budget.as_mut() {
            if *left == 0 {
                return Err(IndexError::Io(std::io::Error::new(std::io::ErrorKind::Other, "memory table write refused")));
            }
            *left -= 1;
        }
        self.rows.lock().insert(row.key(), row.clone());
        Ok(())
    }

    fn select_all(&self) -> Result<Vec<R>> {
        Ok(self.rows.lock().values().cloned().collect())
    }

    fn clear(&self) -> Result<()> {
        self.rows.lock().clear();
        Ok(())
    }
}

/// Owned pair of tables the index saves to and loads from.
pub struct Gateway {
    pub documents: Box<dyn Table<DocumentRecord>>,
    pub postings: Box<dyn Table<PostingEntry>>,
}

impl Gateway {
    pub fn new(documents: Box<dyn Table<DocumentRecord>>, postings: Box<dyn Table<PostingEntry>>) -> Self {
        Self { documents, postings }
    }

    /// Open (or create) the sled database under `paths.root`.
    pub fn open_sled(paths: &StorePaths) -> Result<Self> {
        create_dir_all(&paths.root)?;
        let db = sled::open(paths.db())?;
        let documents = SledTable::new(db.open_tree("documents")?);
        let postings = SledTable::new(db.open_tree("postings")?);
        tracing::debug!(path = %paths.db().display(), "opened sled store");
        Ok(Self::new(Box::new(documents), Box::new(postings)))
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryTable::<DocumentRecord>::new()), Box::new(MemoryTable::<PostingEntry>::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(doc_id: u64, term: &str, weight: u64) -> PostingEntry {
        PostingEntry { doc_id, term: term.into(), weight }
    }

    #[test]
    fn posting_keys_group_by_term_then_doc() {
        let table = MemoryTable::<PostingEntry>::new();
        table.insert(&posting(2, "rust", 1)).unwrap();
        table.insert(&posting(0, "rust", 3)).unwrap();
        table.insert(&posting(1, "asio", 9)).unwrap();
        let rows = table.select_all().unwrap();
        let keys: Vec<(String, u64)> = rows.into_iter().map(|p| (p.term, p.doc_id)).collect();
        assert_eq!(keys, vec![("asio".into(), 1), ("rust".into(), 0), ("rust".into(), 2)]);
    }

    #[test]
    fn memory_table_refuses_writes_past_budget() {
        let table = MemoryTable::<PostingEntry>::new();
        table.fail_after(1);
        assert!(table.insert(&posting(0, "a", 1)).is_ok());
        assert!(table.insert(&posting(1, "a", 1)).is_err());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn sled_table_clear_and_scan() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Gateway::open_sled(&StorePaths::new(dir.path())).unwrap();
        let doc = DocumentRecord { doc_id: 0, title: "t".into(), content: "c".into(), url: "u".into() };
        gateway.documents.insert(&doc).unwrap();
        assert_eq!(gateway.documents.select_all().unwrap(), vec![doc]);
        gateway.documents.clear().unwrap();
        assert!(gateway.documents.select_all().unwrap().is_empty());
    }
}
