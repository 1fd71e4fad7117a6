//! Index implementations.
//!
//! [`Index`] is the surface a tokenizer feeds and a searcher reads:
//! - [`MemoryIndex`] keeps everything in a hash map
//! - [`PersistentIndex`] spills to on-disk segments and compacts them

pub mod memory;
pub mod persistent;

pub use memory::MemoryIndex;
pub use persistent::{IndexStats, PersistentIndex};

use crate::error::Result;
use crate::postings::{DocId, PostingsList};
use crate::segment::doc_info::DocInfo;

/// An inverted index built from a stream of `(term, docID, offset)` triples.
pub trait Index: Send + Sync {
    /// Record that `term` occurs at token `offset` of document `doc_id`.
    ///
    /// Tokens are expected in document order, with non-decreasing offsets
    /// inside each document.
    fn insert(&mut self, term: &str, doc_id: DocId, offset: u32) -> Result<()>;

    /// Postings of `term`, or `None` if the term was never inserted.
    fn get_postings(&self, term: &str) -> Result<Option<PostingsList>>;

    /// Record the name and token count of a document.
    fn record_document(&mut self, doc_id: DocId, name: &str, token_count: u32) -> Result<()>;

    fn doc_info(&self, doc_id: DocId) -> Option<DocInfo>;

    fn doc_count(&self) -> usize;

    /// Finish indexing. Called once, after the last insert.
    fn cleanup(&mut self) -> Result<()>;
}
