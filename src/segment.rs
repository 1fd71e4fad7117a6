//! Segment management.
//!
//! A segment is one generation of the index: a dictionary file, a data file
//! and a doc-info file produced by a single flush. This module handles:
//! - Segment writer accumulating postings in memory and flushing them
//! - Segment manager tracking live segments and their merge state
//! - Doc-info records stored alongside each segment

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub mod doc_info;
pub mod manager;
pub mod writer;

/// Creation ordinal of a segment.
pub type SegmentId = u64;

pub const DICTIONARY_FNAME: &str = "dictionary";
pub const DATA_FNAME: &str = "data";
pub const DOCINFO_FNAME: &str = "docInfo";

/// Prefix of the temporary files a merge writes before they replace a segment.
pub const MERGE_PREFIX: &str = "merge_";

/// Information about a segment in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    /// Segment identifier.
    pub segment_id: SegmentId,

    /// Number of distinct terms stored.
    pub term_count: u64,

    /// Number of documents with a doc-info record.
    pub doc_count: u64,

    /// Number of flushed segments absorbed into this one, itself included.
    pub generation: u64,
}

impl SegmentInfo {
    pub fn new(segment_id: SegmentId, term_count: u64, doc_count: u64) -> Self {
        SegmentInfo {
            segment_id,
            term_count,
            doc_count,
            generation: 1,
        }
    }
}

/// The three files making up a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPaths {
    pub dictionary: PathBuf,
    pub data: PathBuf,
    pub doc_info: PathBuf,
}

impl SegmentPaths {
    /// Paths of segment `segment_id` inside `dir`.
    pub fn new(dir: &Path, segment_id: SegmentId) -> Self {
        SegmentPaths {
            dictionary: dir.join(format!("{DICTIONARY_FNAME}_{segment_id:06}")),
            data: dir.join(format!("{DATA_FNAME}_{segment_id:06}")),
            doc_info: dir.join(format!("{DOCINFO_FNAME}_{segment_id:06}")),
        }
    }

    /// Temporary paths for the result of merging `first` and `second`.
    pub fn merge_target(dir: &Path, first: SegmentId, second: SegmentId) -> Self {
        let suffix = format!("{first:06}_{second:06}");
        SegmentPaths {
            dictionary: dir.join(format!("{MERGE_PREFIX}{DICTIONARY_FNAME}_{suffix}")),
            data: dir.join(format!("{MERGE_PREFIX}{DATA_FNAME}_{suffix}")),
            doc_info: dir.join(format!("{MERGE_PREFIX}{DOCINFO_FNAME}_{suffix}")),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        [
            self.dictionary.as_path(),
            self.data.as_path(),
            self.doc_info.as_path(),
        ]
        .into_iter()
    }
}
