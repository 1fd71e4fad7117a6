//! In-memory segment builder.

use ahash::AHashMap;
use log::{debug, info};

use crate::dictionary::HashTable;
use crate::error::Result;
use crate::postings::{DocId, PostingsList};
use crate::segment::doc_info::DocInfoTable;
use crate::segment::{SegmentId, SegmentInfo, SegmentPaths};

/// Outcome of flushing one segment.
#[derive(Debug, Clone)]
pub struct FlushStats {
    pub info: SegmentInfo,
    /// Occupied slots skipped while placing terms.
    pub collisions: u64,
    /// Tokens the segment absorbed.
    pub tokens: u64,
}

/// Accumulates postings for the segment currently being built.
///
/// Tokens must arrive grouped by document, with non-decreasing offsets
/// within a document.
#[derive(Debug)]
pub struct SegmentWriter {
    postings: AHashMap<String, PostingsList>,
    doc_infos: DocInfoTable,
    token_budget: u64,
    tokens: u64,
    last_doc_id: Option<DocId>,
}

impl SegmentWriter {
    pub fn new(token_budget: u64) -> Self {
        SegmentWriter {
            postings: AHashMap::new(),
            doc_infos: DocInfoTable::new(),
            token_budget,
            tokens: 0,
            last_doc_id: None,
        }
    }

    /// Whether the buffer must be flushed before accepting a token of `doc_id`.
    ///
    /// A segment rolls over only once its budget is exceeded and the stream has
    /// moved on to a new document, so no document is split across segments.
    pub fn should_flush_before(&self, doc_id: DocId) -> bool {
        self.tokens > self.token_budget && self.last_doc_id != Some(doc_id)
    }

    /// Record one occurrence of `term` at `offset` in `doc_id`.
    pub fn insert(&mut self, term: &str, doc_id: DocId, offset: u32) {
        match self.postings.get_mut(term) {
            Some(list) => list.add_occurrence(doc_id, offset),
            None => {
                let mut list = PostingsList::new();
                list.add_occurrence(doc_id, offset);
                self.postings.insert(term.to_string(), list);
            }
        }
        self.tokens += 1;
        self.last_doc_id = Some(doc_id);
    }

    pub fn record_document(&mut self, doc_id: DocId, name: &str, token_count: u32) {
        self.doc_infos.insert(doc_id, name, token_count);
    }

    pub fn postings(&self, term: &str) -> Option<&PostingsList> {
        self.postings.get(term)
    }

    pub fn doc_infos(&self) -> &DocInfoTable {
        &self.doc_infos
    }

    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty() && self.doc_infos.is_empty()
    }

    /// Persist the buffered postings as segment `segment_id` and reset.
    ///
    /// Terms are written in lexicographic order, so the data file doubles as
    /// a sorted stream for merging. Returns the stats and the doc-info
    /// records that were written.
    pub fn flush(
        &mut self,
        segment_id: SegmentId,
        paths: &SegmentPaths,
        table_size: u64,
    ) -> Result<(FlushStats, DocInfoTable)> {
        self.doc_infos.write_to(&paths.doc_info)?;

        let mut terms: Vec<&String> = self.postings.keys().collect();
        terms.sort_unstable();

        let mut table = HashTable::create(&paths.dictionary, &paths.data, table_size)?;
        let mut collisions = 0;
        for term in &terms {
            collisions += table.put(term, &self.postings[*term])?;
        }
        table.sync()?;

        let stats = FlushStats {
            info: SegmentInfo::new(segment_id, terms.len() as u64, self.doc_infos.len() as u64),
            collisions,
            tokens: self.tokens,
        };
        info!(
            "flushed segment {segment_id}: {} terms, {} documents, {} tokens",
            stats.info.term_count, stats.info.doc_count, stats.tokens
        );
        debug!("segment {segment_id}: {collisions} collisions");

        let doc_infos = std::mem::take(&mut self.doc_infos);
        self.postings.clear();
        self.tokens = 0;
        Ok((stats, doc_infos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_should_flush_waits_for_document_boundary() {
        let mut writer = SegmentWriter::new(3);
        writer.insert("a", 1, 0);
        writer.insert("b", 1, 1);
        assert!(!writer.should_flush_before(1));
        writer.insert("c", 1, 2);
        // Exactly at the budget: no rollover yet.
        assert!(!writer.should_flush_before(2));
        writer.insert("d", 1, 3);
        // Over budget, but doc 1 is still streaming.
        assert!(!writer.should_flush_before(1));
        assert!(writer.should_flush_before(2));
    }

    #[test]
    fn test_flush_writes_sorted_units_and_resets() {
        let dir = TempDir::new().unwrap();
        let paths = SegmentPaths::new(dir.path(), 0);

        let mut writer = SegmentWriter::new(100);
        writer.insert("zebra", 1, 0);
        writer.insert("apple", 1, 1);
        writer.insert("zebra", 1, 2);
        writer.insert("apple", 2, 0);
        writer.record_document(1, "one.txt", 3);
        writer.record_document(2, "two.txt", 1);

        let (stats, docs) = writer.flush(0, &paths, 31).unwrap();
        assert_eq!(stats.info.term_count, 2);
        assert_eq!(stats.info.doc_count, 2);
        assert_eq!(stats.tokens, 4);
        assert_eq!(docs.len(), 2);
        assert!(writer.is_empty());
        assert_eq!(writer.tokens(), 0);

        let data = std::fs::read_to_string(&paths.data).unwrap();
        assert_eq!(data, "apple 1:1;2:0\nzebra 1:0,2\n");

        let mut table = HashTable::open(&paths.dictionary, &paths.data, 31).unwrap();
        let zebra = table.get_postings("zebra").unwrap().unwrap();
        assert_eq!(zebra.find(1).unwrap().positions(), &[0, 2]);
    }
}
