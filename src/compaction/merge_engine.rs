//! Two-way external merge of segments.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use log::{debug, info, warn};

use crate::dictionary::HashTable;
use crate::error::{HashdexError, Result};
use crate::postings::PostingsList;
use crate::postings::codec::{self, split_unit};
use crate::segment::doc_info;
use crate::segment::manager::{MergeCandidate, SegmentManager};
use crate::segment::{SegmentInfo, SegmentPaths};
use crate::util::fs;

/// Statistics about one merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Units written to the merged data file.
    pub terms_written: u64,
    /// Terms present in both inputs.
    pub terms_combined: u64,
    /// Occupied slots skipped while placing terms.
    pub collisions: u64,
}

/// Sorted stream of `(term, unit)` pairs read from a data file.
struct UnitStream {
    lines: Lines<BufReader<File>>,
    path: String,
    current: Option<(String, String)>,
    last_term: Option<String>,
}

impl UnitStream {
    fn open(path: &Path) -> Result<Self> {
        let mut stream = UnitStream {
            lines: BufReader::new(File::open(path)?).lines(),
            path: path.display().to_string(),
            current: None,
            last_term: None,
        };
        stream.advance()?;
        Ok(stream)
    }

    fn advance(&mut self) -> Result<()> {
        let Some(line) = self.lines.next() else {
            self.current = None;
            return Ok(());
        };
        let line = line?;
        let term = split_unit(&line)
            .map_err(|e| HashdexError::malformed(format!("{}: {e}", self.path)))?
            .0
            .to_string();
        if let Some(last) = &self.last_term
            && *last >= term
        {
            return Err(HashdexError::malformed(format!(
                "{}: term '{term}' follows '{last}', data file is not sorted",
                self.path
            )));
        }
        self.last_term = Some(term.clone());
        self.current = Some((term, line));
        Ok(())
    }

    fn peek_term(&self) -> Option<&str> {
        self.current.as_ref().map(|(t, _)| t.as_str())
    }

    fn take(&mut self) -> Result<Option<(String, String)>> {
        let current = self.current.take();
        if current.is_some() {
            self.advance()?;
        }
        Ok(current)
    }
}

/// Merges the files of two segments into a new segment.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    table_size: u64,
}

impl MergeEngine {
    pub fn new(table_size: u64) -> Self {
        MergeEngine { table_size }
    }

    /// Merge `first` and `second` into fresh files at `target`.
    ///
    /// Both data files are read as term-sorted unit streams. Terms found in
    /// only one input are copied through; terms found in both get their
    /// postings combined. The doc-info of `second` is appended after that
    /// of `first`.
    pub fn merge(
        &self,
        first: &SegmentPaths,
        second: &SegmentPaths,
        target: &SegmentPaths,
    ) -> Result<MergeStats> {
        let mut left = UnitStream::open(&first.data)?;
        let mut right = UnitStream::open(&second.data)?;
        let mut table = HashTable::create(&target.dictionary, &target.data, self.table_size)?;
        let mut stats = MergeStats::default();

        loop {
            let order = match (left.peek_term(), right.peek_term()) {
                (None, None) => break,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(l), Some(r)) => l.cmp(r),
            };
            let (term, unit) = match order {
                Ordering::Less => take_unit(&mut left)?,
                Ordering::Greater => take_unit(&mut right)?,
                Ordering::Equal => {
                    let (term, l_unit) = take_unit(&mut left)?;
                    let (_, r_unit) = take_unit(&mut right)?;
                    let merged = combine(&l_unit, &r_unit)?;
                    stats.terms_combined += 1;
                    (term.clone(), codec::encode_unit(&term, &merged))
                }
            };
            stats.collisions += table.put_unit(&term, &unit)?;
            stats.terms_written += 1;
        }
        table.sync()?;

        std::fs::copy(&first.doc_info, &target.doc_info)?;
        doc_info::append_file(&second.doc_info, &target.doc_info)?;

        debug!(
            "merged {:?} and {:?}: {} terms, {} collisions",
            first.data, second.data, stats.terms_written, stats.collisions
        );
        Ok(stats)
    }

    /// Merge a claimed pair and swap the result into the manager.
    pub fn merge_candidate(
        &self,
        manager: &SegmentManager,
        candidate: &MergeCandidate,
    ) -> Result<MergeStats> {
        let first_id = candidate.first.segment_id;
        let second_id = candidate.second.segment_id;
        info!("merging segments {first_id} and {second_id}");

        let target = SegmentPaths::merge_target(manager.dir(), first_id, second_id);
        let stats = match self.merge(&candidate.first_paths, &candidate.second_paths, &target) {
            Ok(stats) => stats,
            Err(e) => {
                for path in target.iter() {
                    if let Err(cleanup) = fs::remove_file(path, manager.retry_policy()) {
                        warn!("could not remove partial merge output {path:?}: {cleanup}");
                    }
                }
                return Err(e);
            }
        };

        let info = SegmentInfo {
            segment_id: first_id,
            term_count: stats.terms_written,
            doc_count: candidate.first.doc_count + candidate.second.doc_count,
            generation: candidate.first.generation + candidate.second.generation,
        };
        manager.apply_merge(candidate, &target, info)?;
        info!("merge of segments {first_id} and {second_id} complete");
        Ok(stats)
    }
}

fn take_unit(stream: &mut UnitStream) -> Result<(String, String)> {
    let (term, line) = stream
        .take()?
        .ok_or_else(|| HashdexError::compaction("unit stream ended unexpectedly"))?;
    Ok((term, format!("{line}\n")))
}

fn combine(first: &str, second: &str) -> Result<PostingsList> {
    let (_, left) = split_unit(first)?;
    let (_, right) = split_unit(second)?;
    let mut merged: PostingsList = left.parse()?;
    merged.absorb(right.parse()?);
    Ok(merged)
}
