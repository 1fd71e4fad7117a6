//! Bounded pool of compaction workers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info};
use parking_lot::Mutex;

use crate::compaction::merge_engine::MergeEngine;
use crate::error::{HashdexError, Result};
use crate::segment::manager::SegmentManager;

/// A request to compact whatever adjacent pairs are ready.
#[derive(Debug, Clone, Copy)]
pub struct CompactionRequest {
    /// Segment whose flush queued this request.
    pub flushed_segment: u64,
}

#[derive(Debug, Default)]
struct Shared {
    merges_completed: AtomicU64,
    /// First fatal error seen by any worker.
    failure: Mutex<Option<HashdexError>>,
}

impl Shared {
    fn has_failed(&self) -> bool {
        self.failure.lock().is_some()
    }

    fn record_failure(&self, err: HashdexError) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some(err);
        }
    }
}

/// Runs merges on a fixed number of background threads.
#[derive(Debug)]
pub struct Compactor {
    sender: Option<Sender<CompactionRequest>>,
    workers: Vec<JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl Compactor {
    /// Start `worker_count` workers merging segments of `manager`.
    pub fn start(manager: Arc<SegmentManager>, worker_count: usize) -> Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared::default());
        let engine = MergeEngine::new(manager.table_size());

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let receiver: Receiver<CompactionRequest> = receiver.clone();
            let manager = manager.clone();
            let shared = shared.clone();
            let engine = engine.clone();
            let handle = thread::Builder::new()
                .name(format!("hashdex-compaction-{worker_id}"))
                .spawn(move || {
                    while let Ok(request) = receiver.recv() {
                        debug!(
                            "worker {worker_id} picked up request from segment {}",
                            request.flushed_segment
                        );
                        compact(&manager, &engine, &shared);
                    }
                })?;
            workers.push(handle);
        }

        Ok(Compactor {
            sender: Some(sender),
            workers,
            shared,
        })
    }

    /// Queue a compaction pass.
    pub fn request(&self, flushed_segment: u64) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(HashdexError::Closed)?;
        sender
            .send(CompactionRequest { flushed_segment })
            .map_err(|_| HashdexError::compaction("all compaction workers have exited"))
    }

    pub fn merges_completed(&self) -> u64 {
        self.shared.merges_completed.load(Ordering::SeqCst)
    }

    /// Let the workers drain the queue, wait for them, and report the first
    /// failure if any merge failed.
    pub fn shutdown(&mut self) -> Result<()> {
        drop(self.sender.take());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                self.shared
                    .record_failure(HashdexError::compaction("a compaction worker panicked"));
            }
        }
        match self.shared.failure.lock().take() {
            Some(err) => Err(err),
            None => {
                info!(
                    "compaction finished after {} merges",
                    self.merges_completed()
                );
                Ok(())
            }
        }
    }
}

impl Drop for Compactor {
    fn drop(&mut self) {
        if !self.workers.is_empty()
            && let Err(e) = self.shutdown()
        {
            error!("compaction failed during drop: {e}");
        }
    }
}

/// Merge claimed pairs until no adjacent ready pair remains.
fn compact(manager: &SegmentManager, engine: &MergeEngine, shared: &Shared) {
    while !shared.has_failed() {
        let Some(candidate) = manager.claim_merge() else {
            return;
        };
        match engine.merge_candidate(manager, &candidate) {
            Ok(stats) => {
                shared.merges_completed.fetch_add(1, Ordering::SeqCst);
                debug!("merge stats: {stats:?}");
            }
            Err(e) => {
                error!(
                    "merging segments {} and {} failed: {e}",
                    candidate.first.segment_id, candidate.second.segment_id
                );
                manager.release(&candidate);
                shared.record_failure(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentPaths;
    use crate::segment::writer::SegmentWriter;
    use crate::util::fs::RetryPolicy;
    use std::time::Duration;
    use tempfile::TempDir;

    const TABLE_SIZE: u64 = 29;

    fn flush(manager: &SegmentManager, doc: u32) {
        let mut writer = SegmentWriter::new(1000);
        writer.insert("shared", doc, 0);
        writer.insert(&format!("only{doc}"), doc, 1);
        writer.record_document(doc, &format!("doc{doc}"), 2);
        let id = manager.generate_segment_id();
        let paths = SegmentPaths::new(manager.dir(), id);
        let (stats, _) = writer.flush(id, &paths, TABLE_SIZE).unwrap();
        manager.add_segment(stats.info).unwrap();
    }

    #[test]
    fn test_cascade_collapses_to_one_segment() {
        let dir = TempDir::new().unwrap();
        let retry = RetryPolicy::new(3, Duration::from_millis(1));
        let manager = Arc::new(SegmentManager::open(dir.path(), TABLE_SIZE, retry).unwrap());
        let mut compactor = Compactor::start(manager.clone(), 3).unwrap();

        for doc in 0..6 {
            flush(&manager, doc);
            compactor.request(doc as u64).unwrap();
        }
        compactor.shutdown().unwrap();

        assert_eq!(manager.segment_count(), 1);
        assert_eq!(compactor.merges_completed(), 5);
        let shared = manager.get_postings("shared").unwrap().unwrap();
        assert_eq!(shared.doc_ids(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(manager.load_doc_infos().unwrap().len(), 6);
        assert_eq!(manager.segment_infos()[0].generation, 6);
    }

    #[test]
    fn test_request_after_shutdown_fails() {
        let dir = TempDir::new().unwrap();
        let retry = RetryPolicy::new(3, Duration::from_millis(1));
        let manager = Arc::new(SegmentManager::open(dir.path(), TABLE_SIZE, retry).unwrap());
        let mut compactor = Compactor::start(manager, 1).unwrap();
        compactor.shutdown().unwrap();
        assert!(matches!(compactor.request(0), Err(HashdexError::Closed)));
    }

    #[test]
    fn test_failed_merge_is_reported() {
        let dir = TempDir::new().unwrap();
        let retry = RetryPolicy::new(2, Duration::from_millis(1));
        let manager = Arc::new(SegmentManager::open(dir.path(), TABLE_SIZE, retry).unwrap());
        flush(&manager, 0);
        flush(&manager, 1);
        std::fs::write(SegmentPaths::new(dir.path(), 1).data, "shared 1:x\n").unwrap();

        let mut compactor = Compactor::start(manager.clone(), 1).unwrap();
        compactor.request(1).unwrap();
        assert!(compactor.shutdown().is_err());
        // Both inputs stay registered and the partial output is gone.
        assert_eq!(manager.segment_count(), 2);
        let target = SegmentPaths::merge_target(dir.path(), 0, 1);
        assert!(target.iter().all(|p| !p.exists()));
    }
}
