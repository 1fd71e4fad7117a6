//! Per-document name and length records.
//!
//! Each segment stores its documents as lines of `"<docID>;<name>;<tokens>\n"`.
//! Names may contain `;`; the first and last separators delimit the fields.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use ahash::AHashMap;

use crate::error::{HashdexError, Result};
use crate::postings::DocId;

/// Name and token count of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocInfo {
    pub name: String,
    pub token_count: u32,
}

/// Doc-info records keyed by document ID.
#[derive(Debug, Clone, Default)]
pub struct DocInfoTable {
    docs: AHashMap<DocId, DocInfo>,
}

impl DocInfoTable {
    pub fn new() -> Self {
        DocInfoTable::default()
    }

    pub fn insert(&mut self, doc_id: DocId, name: impl Into<String>, token_count: u32) {
        self.docs.insert(
            doc_id,
            DocInfo {
                name: name.into(),
                token_count,
            },
        );
    }

    pub fn get(&self, doc_id: DocId) -> Option<&DocInfo> {
        self.docs.get(&doc_id)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn clear(&mut self) {
        self.docs.clear();
    }

    /// Move every record of `other` into this table.
    pub fn extend(&mut self, other: DocInfoTable) {
        self.docs.extend(other.docs);
    }

    /// Write all records, ordered by document ID, truncating `path`.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut ids: Vec<_> = self.docs.keys().copied().collect();
        ids.sort_unstable();

        let mut writer = BufWriter::new(File::create(path)?);
        for id in ids {
            let info = &self.docs[&id];
            writeln!(writer, "{id};{};{}", info.name, info.token_count)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read every record in `path`.
    pub fn read_from(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut table = DocInfoTable::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let (doc_id, info) = parse_line(&line).map_err(|e| {
                HashdexError::corrupt_segment(path, format!("line {}: {e}", line_no + 1))
            })?;
            table.docs.insert(doc_id, info);
        }
        Ok(table)
    }
}

fn parse_line(line: &str) -> Result<(DocId, DocInfo)> {
    let malformed = || HashdexError::malformed(format!("doc-info line '{line}'"));
    let (doc_id, rest) = line.split_once(';').ok_or_else(malformed)?;
    let (name, token_count) = rest.rsplit_once(';').ok_or_else(malformed)?;
    let doc_id = doc_id.parse().map_err(|_| malformed())?;
    let token_count = token_count.parse().map_err(|_| malformed())?;
    Ok((
        doc_id,
        DocInfo {
            name: name.to_string(),
            token_count,
        },
    ))
}

/// Check that a document name fits on a single doc-info line.
pub fn validate_name(name: &str) -> Result<()> {
    if name.contains(['\n', '\r']) {
        return Err(HashdexError::invalid_argument(format!(
            "document name '{}' contains a line break",
            name.escape_debug()
        )));
    }
    Ok(())
}

/// Append the records of `from` to the end of `to`.
pub fn append_file(from: &Path, to: &Path) -> Result<()> {
    let mut reader = BufReader::new(File::open(from)?);
    let mut writer = BufWriter::new(OpenOptions::new().append(true).create(true).open(to)?);
    std::io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    Ok(())
}
