//! Registry of live segments and their merge state.
//!
//! Every segment moves through `Ready -> Merging -> (absorbed | Ready)`.
//! Claiming a merge pair and swapping merged files into place both happen
//! under the registry lock, so two merges can never claim the same segment
//! and a reader never sees a half-renamed segment.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::dictionary::HashTable;
use crate::error::{HashdexError, Result};
use crate::postings::PostingsList;
use crate::segment::doc_info::DocInfoTable;
use crate::segment::{MERGE_PREFIX, SegmentId, SegmentInfo, SegmentPaths};
use crate::util::fs::{self, RetryPolicy};

/// File listing the live segments, in order.
pub const MANIFEST_FNAME: &str = "segments.json";

/// Merge state of a live segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Queryable and free to join a merge.
    Ready,
    /// Claimed by a running merge.
    Merging,
}

#[derive(Debug)]
struct ManagedSegment {
    info: SegmentInfo,
    paths: SegmentPaths,
    state: SegmentState,
    table: Arc<Mutex<HashTable>>,
}

/// A merge whose file swap has started but not finished.
///
/// Recorded in the manifest before any segment file is touched, so an
/// interrupted swap is completed on the next open instead of losing data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PendingMerge {
    /// The merged segment. It keeps the first segment's ID.
    merged: SegmentInfo,
    /// The second segment, absorbed by the merge.
    absorbed: SegmentId,
}

impl PendingMerge {
    fn involves(&self, candidate: &MergeCandidate) -> bool {
        self.merged.segment_id == candidate.first.segment_id
            && self.absorbed == candidate.second.segment_id
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    table_size: u64,
    next_segment_id: SegmentId,
    segments: Vec<SegmentInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pending_merge: Option<PendingMerge>,
}

#[derive(Debug)]
struct ManagerState {
    segments: Vec<ManagedSegment>,
    next_segment_id: SegmentId,
    pending_merge: Option<PendingMerge>,
}

/// Two adjacent segments claimed for merging.
#[derive(Debug, Clone)]
pub struct MergeCandidate {
    pub first: SegmentInfo,
    pub first_paths: SegmentPaths,
    pub second: SegmentInfo,
    pub second_paths: SegmentPaths,
}

/// Tracks the ordered list of live segments of one index directory.
#[derive(Debug)]
pub struct SegmentManager {
    dir: PathBuf,
    table_size: u64,
    retry: RetryPolicy,
    state: Mutex<ManagerState>,
}

impl SegmentManager {
    /// Open the segments recorded in `dir`, or start an empty index there.
    ///
    /// A merge swap that was interrupted is finished first. Every recorded
    /// segment is then validated; a damaged one fails the open with
    /// [`HashdexError::CorruptSegment`].
    pub fn open(dir: &Path, table_size: u64, retry: RetryPolicy) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let manifest_path = dir.join(MANIFEST_FNAME);
        let mut manifest = None;
        if manifest_path.exists() {
            let mut loaded: Manifest =
                serde_json::from_reader(BufReader::new(File::open(&manifest_path)?)).map_err(
                    |e| HashdexError::corrupt_segment(&manifest_path, e.to_string()),
                )?;
            if loaded.table_size != table_size {
                return Err(HashdexError::invalid_config(format!(
                    "index at {dir:?} was built with table_size {}, not {table_size}",
                    loaded.table_size
                )));
            }
            finish_pending_merge(dir, &mut loaded, &retry)?;
            manifest = Some(loaded);
        }
        // Only after a pending swap consumed its merge output.
        remove_stale_merge_files(dir, &retry)?;

        let mut segments = Vec::new();
        let mut pending_merge = None;
        let next_segment_id = if let Some(manifest) = manifest {
            pending_merge = manifest.pending_merge;
            for info in manifest.segments {
                let paths = SegmentPaths::new(dir, info.segment_id);
                let table = open_segment(&paths, table_size)?;
                DocInfoTable::read_from(&paths.doc_info)?;
                segments.push(ManagedSegment {
                    info,
                    paths,
                    state: SegmentState::Ready,
                    table: Arc::new(Mutex::new(table)),
                });
            }
            info!("opened {} segments from {dir:?}", segments.len());
            manifest.next_segment_id
        } else {
            0
        };

        let manager = SegmentManager {
            dir: dir.to_path_buf(),
            table_size,
            retry,
            state: Mutex::new(ManagerState {
                segments,
                next_segment_id,
                pending_merge,
            }),
        };
        manager.save_manifest(&manager.state.lock())?;
        Ok(manager)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn table_size(&self) -> u64 {
        self.table_size
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Reserve the ordinal for the next flushed segment.
    pub fn generate_segment_id(&self) -> SegmentId {
        let mut state = self.state.lock();
        let id = state.next_segment_id;
        state.next_segment_id += 1;
        id
    }

    /// Register a freshly flushed segment at the end of the list.
    pub fn add_segment(&self, info: SegmentInfo) -> Result<()> {
        let paths = SegmentPaths::new(&self.dir, info.segment_id);
        let table = HashTable::open(&paths.dictionary, &paths.data, self.table_size)?;

        let mut state = self.state.lock();
        debug!("registering segment {}", info.segment_id);
        state.segments.push(ManagedSegment {
            info,
            paths,
            state: SegmentState::Ready,
            table: Arc::new(Mutex::new(table)),
        });
        self.save_manifest(&state)
    }

    pub fn segment_count(&self) -> usize {
        self.state.lock().segments.len()
    }

    pub fn segment_infos(&self) -> Vec<SegmentInfo> {
        self.state
            .lock()
            .segments
            .iter()
            .map(|s| s.info.clone())
            .collect()
    }

    pub fn segment_state(&self, segment_id: SegmentId) -> Option<SegmentState> {
        self.state
            .lock()
            .segments
            .iter()
            .find(|s| s.info.segment_id == segment_id)
            .map(|s| s.state)
    }

    /// Collect the postings of `term` across all live segments, in order.
    pub fn get_postings(&self, term: &str) -> Result<Option<PostingsList>> {
        let tables: Vec<_> = self
            .state
            .lock()
            .segments
            .iter()
            .map(|s| s.table.clone())
            .collect();

        let mut result: Option<PostingsList> = None;
        for table in tables {
            if let Some(list) = table.lock().get_postings(term)? {
                match result.as_mut() {
                    Some(acc) => acc.absorb(list),
                    None => result = Some(list),
                }
            }
        }
        Ok(result)
    }

    /// Read the doc-info records of every live segment.
    pub fn load_doc_infos(&self) -> Result<DocInfoTable> {
        let paths: Vec<_> = self
            .state
            .lock()
            .segments
            .iter()
            .map(|s| s.paths.doc_info.clone())
            .collect();

        let mut table = DocInfoTable::new();
        for path in paths {
            table.extend(DocInfoTable::read_from(&path)?);
        }
        Ok(table)
    }

    /// Claim the first adjacent pair of segments that are both ready.
    pub fn claim_merge(&self) -> Option<MergeCandidate> {
        let mut state = self.state.lock();
        let i = state.segments.windows(2).position(|pair| {
            pair[0].state == SegmentState::Ready && pair[1].state == SegmentState::Ready
        })?;

        state.segments[i].state = SegmentState::Merging;
        state.segments[i + 1].state = SegmentState::Merging;
        let (first, second) = (&state.segments[i], &state.segments[i + 1]);
        debug!(
            "claimed segments {} and {} for merging",
            first.info.segment_id, second.info.segment_id
        );
        Some(MergeCandidate {
            first: first.info.clone(),
            first_paths: first.paths.clone(),
            second: second.info.clone(),
            second_paths: second.paths.clone(),
        })
    }

    /// Return a claimed pair to the ready state without merging it.
    ///
    /// A pair whose swap already started stays claimed, since its files may
    /// be half replaced; the next open finishes that swap.
    pub fn release(&self, candidate: &MergeCandidate) {
        let mut state = self.state.lock();
        if state
            .pending_merge
            .as_ref()
            .is_some_and(|pending| pending.involves(candidate))
        {
            warn!(
                "segments {} and {} keep their claim until the interrupted swap is finished",
                candidate.first.segment_id, candidate.second.segment_id
            );
            return;
        }
        for segment in state.segments.iter_mut() {
            let id = segment.info.segment_id;
            if id == candidate.first.segment_id || id == candidate.second.segment_id {
                segment.state = SegmentState::Ready;
            }
        }
    }

    /// Replace a claimed pair by the merged files at `merged`.
    ///
    /// The merged segment takes over the first segment's ID and position;
    /// the second segment's files and entry are dropped. The swap is recorded
    /// in the manifest before any file moves. The merged files are renamed
    /// over the first segment's, the registry and manifest are updated, and
    /// only then are the second segment's files deleted. If a step fails, the
    /// registry keeps serving the old segments through their open handles and
    /// the next [`SegmentManager::open`] completes the swap.
    pub fn apply_merge(
        &self,
        candidate: &MergeCandidate,
        merged: &SegmentPaths,
        info: SegmentInfo,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let first_id = candidate.first.segment_id;
        let second_id = candidate.second.segment_id;
        if let Some(pending) = &state.pending_merge {
            return Err(HashdexError::compaction(format!(
                "merge of segments {} and {} is still unfinished",
                pending.merged.segment_id, pending.absorbed
            )));
        }
        let index = state
            .segments
            .iter()
            .position(|s| s.info.segment_id == first_id)
            .ok_or_else(|| {
                HashdexError::compaction(format!("segment {first_id} vanished during merge"))
            })?;
        let claimed = state
            .segments
            .get(index + 1)
            .is_some_and(|s| s.info.segment_id == second_id)
            && state.segments[index].state == SegmentState::Merging
            && state.segments[index + 1].state == SegmentState::Merging;
        if !claimed {
            return Err(HashdexError::compaction(format!(
                "segments {first_id} and {second_id} are not a claimed adjacent pair"
            )));
        }
        if let Some(missing) = merged.iter().find(|path| !path.exists()) {
            return Err(HashdexError::compaction(format!(
                "merge output {missing:?} is missing"
            )));
        }

        state.pending_merge = Some(PendingMerge {
            merged: info.clone(),
            absorbed: second_id,
        });
        if let Err(e) = self.save_manifest(&state) {
            state.pending_merge = None;
            return Err(e);
        }

        for (from, to) in merged.iter().zip(candidate.first_paths.iter()) {
            fs::rename(from, to, &self.retry)?;
        }
        let table = HashTable::open(
            &candidate.first_paths.dictionary,
            &candidate.first_paths.data,
            self.table_size,
        )?;
        state.segments[index] = ManagedSegment {
            info,
            paths: candidate.first_paths.clone(),
            state: SegmentState::Ready,
            table: Arc::new(Mutex::new(table)),
        };
        state.segments.remove(index + 1);
        self.save_manifest(&state)?;

        for path in candidate.second_paths.iter() {
            fs::remove_file(path, &self.retry)?;
        }
        state.pending_merge = None;
        self.save_manifest(&state)
    }

    fn save_manifest(&self, state: &ManagerState) -> Result<()> {
        let manifest = Manifest {
            table_size: self.table_size,
            next_segment_id: state.next_segment_id,
            segments: state.segments.iter().map(|s| s.info.clone()).collect(),
            pending_merge: state.pending_merge.clone(),
        };
        let path = self.dir.join(MANIFEST_FNAME);
        let tmp = self.dir.join(format!("{MANIFEST_FNAME}.tmp"));
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, &manifest)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &path, &self.retry)
    }
}

fn open_segment(paths: &SegmentPaths, table_size: u64) -> Result<HashTable> {
    for path in paths.iter() {
        if !path.exists() {
            return Err(HashdexError::corrupt_segment(path, "file is missing"));
        }
    }
    let mut table = HashTable::open(&paths.dictionary, &paths.data, table_size)?;
    let terms = table.validate()?;
    debug!("validated {:?}: {terms} terms", paths.dictionary);
    Ok(table)
}

/// Complete a swap recorded in `manifest` but interrupted before it finished.
///
/// Merge outputs still on disk are renamed over the first segment, and the
/// absorbed segment leaves the list. Its files are then deleted where
/// possible.
fn finish_pending_merge(dir: &Path, manifest: &mut Manifest, retry: &RetryPolicy) -> Result<()> {
    let Some(pending) = manifest.pending_merge.clone() else {
        return Ok(());
    };
    let first_id = pending.merged.segment_id;
    if let Some(pos) = manifest
        .segments
        .iter()
        .position(|s| s.segment_id == pending.absorbed)
    {
        warn!(
            "finishing interrupted merge of segments {first_id} and {}",
            pending.absorbed
        );
        let outputs = SegmentPaths::merge_target(dir, first_id, pending.absorbed);
        let first = SegmentPaths::new(dir, first_id);
        for (from, to) in outputs.iter().zip(first.iter()) {
            if from.exists() {
                fs::rename(from, to, retry)?;
            }
        }
        manifest.segments.remove(pos);
        match manifest
            .segments
            .iter_mut()
            .find(|s| s.segment_id == first_id)
        {
            Some(info) => *info = pending.merged.clone(),
            None => {
                return Err(HashdexError::corrupt_segment(
                    dir.join(MANIFEST_FNAME),
                    format!("pending merge names unknown segment {first_id}"),
                ));
            }
        }
    }

    // Leftover files of the absorbed segment are unreachable; its ID is never reused.
    for path in SegmentPaths::new(dir, pending.absorbed).iter() {
        if let Err(e) = fs::remove_file(path, retry) {
            warn!("leaving absorbed segment file {path:?} behind: {e}");
        }
    }
    manifest.pending_merge = None;
    Ok(())
}

/// Delete leftovers of merges that were interrupted before their swap.
fn remove_stale_merge_files(dir: &Path, retry: &RetryPolicy) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let stale = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(MERGE_PREFIX));
        if stale {
            warn!("removing unfinished merge output {path:?}");
            fs::remove_file(&path, retry)?;
        }
    }
    Ok(())
}
