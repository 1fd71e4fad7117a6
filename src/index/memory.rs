//! Purely in-memory index.

use ahash::AHashMap;

use crate::error::Result;
use crate::index::Index;
use crate::postings::codec::validate_term;
use crate::postings::{DocId, PostingsList};
use crate::segment::doc_info::{DocInfo, DocInfoTable, validate_name};

/// Index held entirely in a hash map. Nothing is persisted.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    postings: AHashMap<String, PostingsList>,
    doc_infos: DocInfoTable,
}

impl MemoryIndex {
    pub fn new() -> Self {
        MemoryIndex::default()
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }
}

impl Index for MemoryIndex {
    fn insert(&mut self, term: &str, doc_id: DocId, offset: u32) -> Result<()> {
        validate_term(term)?;
        self.postings
            .entry(term.to_string())
            .or_default()
            .add_occurrence(doc_id, offset);
        Ok(())
    }

    fn get_postings(&self, term: &str) -> Result<Option<PostingsList>> {
        Ok(self.postings.get(term).cloned())
    }

    fn record_document(&mut self, doc_id: DocId, name: &str, token_count: u32) -> Result<()> {
        validate_name(name)?;
        self.doc_infos.insert(doc_id, name, token_count);
        Ok(())
    }

    fn doc_info(&self, doc_id: DocId) -> Option<DocInfo> {
        self.doc_infos.get(doc_id).cloned()
    }

    fn doc_count(&self) -> usize {
        self.doc_infos.len()
    }

    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }
}
