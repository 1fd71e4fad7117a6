//! Disk-backed index built from memory-bounded segments.
//!
//! Tokens accumulate in a [`SegmentWriter`] until its budget is spent at a
//! document boundary. The buffer is then flushed as a new segment and a
//! compaction pass is queued, so segments are merged in the background while
//! indexing continues. [`PersistentIndex::cleanup`] flushes the last segment
//! and waits for every merge, after which the index is a single segment.

use std::sync::Arc;

use log::{debug, info};

use crate::compaction::Compactor;
use crate::config::IndexConfig;
use crate::error::{HashdexError, Result};
use crate::index::Index;
use crate::postings::codec::validate_term;
use crate::postings::{DocId, PostingsList};
use crate::segment::doc_info::{DocInfo, DocInfoTable, validate_name};
use crate::segment::manager::SegmentManager;
use crate::segment::writer::SegmentWriter;
use crate::segment::{SegmentInfo, SegmentPaths};
use crate::util::fs::RetryPolicy;

/// Name of the file recording the configuration the index was built with.
pub const CONFIG_FNAME: &str = "index.json";

/// Statistics about the indexing process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Tokens inserted since the index was opened.
    pub total_tokens: u64,
    /// Segments flushed since the index was opened.
    pub segments_created: u64,
    /// Merges finished by the compactor.
    pub merges_completed: u64,
    /// Segments currently on disk.
    pub live_segments: usize,
    /// Collisions met while placing terms during flushes.
    pub flush_collisions: u64,
}

/// Index persisted as a sequence of on-disk hash table segments.
#[derive(Debug)]
pub struct PersistentIndex {
    config: IndexConfig,
    manager: Arc<SegmentManager>,
    writer: SegmentWriter,
    compactor: Compactor,
    /// Doc-info of every flushed document.
    doc_infos: DocInfoTable,
    stats: IndexStats,
    closed: bool,
}

impl PersistentIndex {
    /// Open the index in `config.index_dir`, creating it if absent.
    ///
    /// Existing segments are validated; a damaged segment fails the open.
    pub fn open(config: IndexConfig) -> Result<Self> {
        config.validate()?;
        let retry = RetryPolicy::new(config.fs_retry_limit, config.fs_retry_delay());
        let manager = Arc::new(SegmentManager::open(
            &config.index_dir,
            config.table_size,
            retry,
        )?);
        config.save(config.index_dir.join(CONFIG_FNAME))?;

        let doc_infos = manager.load_doc_infos()?;
        let compactor = Compactor::start(manager.clone(), config.merge_workers)?;
        // Segments left unmerged by an earlier run are compacted right away.
        let infos = manager.segment_infos();
        if let Some(last) = infos.last()
            && infos.len() > 1
        {
            compactor.request(last.segment_id)?;
        }
        info!(
            "opened index at {:?}: {} segments, {} documents",
            config.index_dir,
            manager.segment_count(),
            doc_infos.len()
        );

        Ok(PersistentIndex {
            writer: SegmentWriter::new(config.token_budget),
            config,
            manager,
            compactor,
            doc_infos,
            stats: IndexStats::default(),
            closed: false,
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn segment_infos(&self) -> Vec<SegmentInfo> {
        self.manager.segment_infos()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            merges_completed: self.compactor.merges_completed(),
            live_segments: self.manager.segment_count(),
            ..self.stats.clone()
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_closed(&self) -> Result<()> {
        if self.closed {
            return Err(HashdexError::Closed);
        }
        Ok(())
    }

    /// Persist the in-memory buffer as a new segment and queue compaction.
    pub fn flush(&mut self) -> Result<()> {
        self.check_closed()?;
        self.flush_segment()
    }

    fn flush_segment(&mut self) -> Result<()> {
        if self.writer.is_empty() {
            return Ok(());
        }

        let segment_id = self.manager.generate_segment_id();
        let paths = SegmentPaths::new(self.manager.dir(), segment_id);
        let (flush_stats, doc_infos) =
            self.writer
                .flush(segment_id, &paths, self.config.table_size)?;
        self.manager.add_segment(flush_stats.info)?;
        self.doc_infos.extend(doc_infos);

        self.stats.segments_created += 1;
        self.stats.flush_collisions += flush_stats.collisions;
        self.compactor.request(segment_id)
    }
}

impl Index for PersistentIndex {
    fn insert(&mut self, term: &str, doc_id: DocId, offset: u32) -> Result<()> {
        self.check_closed()?;
        validate_term(term)?;
        if self.writer.should_flush_before(doc_id) {
            debug!(
                "token budget of {} spent, rolling over before document {doc_id}",
                self.config.token_budget
            );
            self.flush_segment()?;
        }
        self.writer.insert(term, doc_id, offset);
        self.stats.total_tokens += 1;
        Ok(())
    }

    /// Postings from every segment followed by the unflushed buffer.
    fn get_postings(&self, term: &str) -> Result<Option<PostingsList>> {
        let mut result = self.manager.get_postings(term)?;
        if let Some(pending) = self.writer.postings(term) {
            match result.as_mut() {
                Some(list) => list.absorb(pending.clone()),
                None => result = Some(pending.clone()),
            }
        }
        Ok(result)
    }

    fn record_document(&mut self, doc_id: DocId, name: &str, token_count: u32) -> Result<()> {
        self.check_closed()?;
        validate_name(name)?;
        self.writer.record_document(doc_id, name, token_count);
        Ok(())
    }

    fn doc_info(&self, doc_id: DocId) -> Option<DocInfo> {
        self.writer
            .doc_infos()
            .get(doc_id)
            .or_else(|| self.doc_infos.get(doc_id))
            .cloned()
    }

    fn doc_count(&self) -> usize {
        self.doc_infos.len() + self.writer.doc_infos().len()
    }

    /// Flush the final segment and wait for all merges to finish.
    fn cleanup(&mut self) -> Result<()> {
        self.check_closed()?;
        info!(
            "{} unique terms in the last segment, {} tokens in total",
            self.writer.term_count(),
            self.stats.total_tokens
        );
        let flushed = self.flush_segment();
        self.closed = true;
        let compacted = self.compactor.shutdown();
        flushed?;
        compacted?;

        self.doc_infos = self.manager.load_doc_infos()?;
        info!(
            "index complete: {} segments, {} documents",
            self.manager.segment_count(),
            self.doc_infos.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir, token_budget: u64) -> IndexConfig {
        IndexConfig::builder(dir.path())
            .table_size(101)
            .token_budget(token_budget)
            .fs_retry_limit(3)
            .fs_retry_delay_ms(1)
            .build()
    }

    #[test]
    fn test_visible_before_flush() {
        let dir = TempDir::new().unwrap();
        let mut index = PersistentIndex::open(config(&dir, 1000)).unwrap();
        index.insert("hello", 1, 0).unwrap();
        assert_eq!(
            index.get_postings("hello").unwrap().unwrap().doc_ids(),
            vec![1]
        );
        assert_eq!(index.stats().live_segments, 0);
        index.cleanup().unwrap();
        assert_eq!(index.stats().live_segments, 1);
    }

    #[test]
    fn test_rollover_respects_document_boundary() {
        let dir = TempDir::new().unwrap();
        let mut index = PersistentIndex::open(config(&dir, 2)).unwrap();
        for offset in 0..5 {
            index.insert("long", 1, offset).unwrap();
        }
        assert_eq!(index.stats().segments_created, 0);
        index.insert("short", 2, 0).unwrap();
        assert_eq!(index.stats().segments_created, 1);

        let long = index.get_postings("long").unwrap().unwrap();
        assert_eq!(long[0].positions(), &[0, 1, 2, 3, 4]);
        index.cleanup().unwrap();
    }

    #[test]
    fn test_budget_exactly_met_does_not_roll_over() {
        let dir = TempDir::new().unwrap();
        let mut index = PersistentIndex::open(config(&dir, 2)).unwrap();
        index.insert("a", 1, 0).unwrap();
        index.insert("b", 1, 1).unwrap();
        index.insert("c", 2, 0).unwrap();
        assert_eq!(index.stats().segments_created, 0);
        index.insert("d", 2, 1).unwrap();
        index.insert("e", 3, 0).unwrap();
        assert_eq!(index.stats().segments_created, 1);
        index.cleanup().unwrap();
    }

    #[test]
    fn test_reopen_compacts_leftover_segments() {
        let dir = TempDir::new().unwrap();
        {
            let manager = SegmentManager::open(dir.path(), 101, RetryPolicy::default()).unwrap();
            for doc in 0..3 {
                let mut writer = SegmentWriter::new(1000);
                writer.insert("left", doc, 0);
                let id = manager.generate_segment_id();
                let paths = SegmentPaths::new(manager.dir(), id);
                let (stats, _) = writer.flush(id, &paths, 101).unwrap();
                manager.add_segment(stats.info).unwrap();
            }
            assert_eq!(manager.segment_count(), 3);
        }

        let mut index = PersistentIndex::open(config(&dir, 1000)).unwrap();
        index.cleanup().unwrap();
        assert_eq!(index.stats().live_segments, 1);
        assert_eq!(index.stats().merges_completed, 2);
        assert_eq!(
            index.get_postings("left").unwrap().unwrap().doc_ids(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_closed_after_cleanup() {
        let dir = TempDir::new().unwrap();
        let mut index = PersistentIndex::open(config(&dir, 10)).unwrap();
        index.insert("a", 1, 0).unwrap();
        index.cleanup().unwrap();
        assert!(index.is_closed());
        assert!(matches!(index.insert("b", 2, 0), Err(HashdexError::Closed)));
        assert!(matches!(index.cleanup(), Err(HashdexError::Closed)));
        assert!(index.get_postings("a").unwrap().is_some());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = IndexConfig::builder(dir.path()).token_budget(0).build();
        assert!(matches!(
            PersistentIndex::open(config),
            Err(HashdexError::InvalidConfig(_))
        ));
    }
}
