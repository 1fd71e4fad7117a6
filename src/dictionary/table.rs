//! Dictionary and data files of one segment.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::dictionary::hash::{hash_term, probe_sequence};
use crate::error::{HashdexError, Result};
use crate::postings::PostingsList;
use crate::postings::codec::{self, split_unit};

/// Size in bytes of one dictionary record: an 8-byte offset and a 4-byte length.
pub const ENTRY_SIZE: u64 = 12;

/// Largest table whose dictionary length fits in a file offset.
pub const MAX_TABLE_SIZE: u64 = u64::MAX / ENTRY_SIZE;

/// A dictionary record locating one unit in the data file.
///
/// A slot is occupied iff `size` is nonzero. Every stored unit is at least
/// three bytes long, so zero never describes real data, while an offset of
/// zero is the legitimate location of the first unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DictionaryEntry {
    pub ptr: u64,
    pub size: u32,
}

impl DictionaryEntry {
    pub fn new(ptr: u64, size: u32) -> Self {
        DictionaryEntry { ptr, size }
    }

    pub fn is_occupied(&self) -> bool {
        self.size != 0
    }

    fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let ptr = reader.read_u64::<BigEndian>()?;
        let size = reader.read_u32::<BigEndian>()?;
        Ok(DictionaryEntry { ptr, size })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u64::<BigEndian>(self.ptr)?;
        writer.write_u32::<BigEndian>(self.size)?;
        Ok(())
    }
}

/// Open addressing hash table over a dictionary file and a data file.
#[derive(Debug)]
pub struct HashTable {
    dictionary: File,
    data: File,
    dictionary_path: PathBuf,
    data_path: PathBuf,
    table_size: u64,
    /// Next unused byte of the data file.
    free: u64,
}

impl HashTable {
    /// Create an empty table, truncating any files already at these paths.
    pub fn create(dictionary_path: &Path, data_path: &Path, table_size: u64) -> Result<Self> {
        check_table_size(table_size)?;
        let dictionary = open_rw(dictionary_path, true)?;
        // Sized up front so every slot is readable; unwritten slots read as zeros.
        dictionary.set_len(table_size * ENTRY_SIZE)?;
        let data = open_rw(data_path, true)?;

        Ok(HashTable {
            dictionary,
            data,
            dictionary_path: dictionary_path.to_path_buf(),
            data_path: data_path.to_path_buf(),
            table_size,
            free: 0,
        })
    }

    /// Open an existing table. New data is appended after the current end.
    pub fn open(dictionary_path: &Path, data_path: &Path, table_size: u64) -> Result<Self> {
        check_table_size(table_size)?;
        let dictionary = open_rw(dictionary_path, false)?;
        let data = open_rw(data_path, false)?;
        let free = data.metadata()?.len();

        Ok(HashTable {
            dictionary,
            data,
            dictionary_path: dictionary_path.to_path_buf(),
            data_path: data_path.to_path_buf(),
            table_size,
            free,
        })
    }

    pub fn table_size(&self) -> u64 {
        self.table_size
    }

    pub fn free(&self) -> u64 {
        self.free
    }

    pub fn dictionary_path(&self) -> &Path {
        &self.dictionary_path
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Read the record stored at `slot`.
    pub fn read_entry(&mut self, slot: u64) -> Result<DictionaryEntry> {
        self.check_slot(slot)?;
        self.dictionary.seek(SeekFrom::Start(slot * ENTRY_SIZE))?;
        Ok(DictionaryEntry::read_from(&mut self.dictionary)?)
    }

    /// Overwrite the record at `slot`.
    pub fn write_entry(&mut self, slot: u64, entry: &DictionaryEntry) -> Result<()> {
        self.check_slot(slot)?;
        self.dictionary.seek(SeekFrom::Start(slot * ENTRY_SIZE))?;
        entry.write_to(&mut self.dictionary)?;
        Ok(())
    }

    pub fn entry_exists(&mut self, slot: u64) -> Result<bool> {
        Ok(self.read_entry(slot)?.is_occupied())
    }

    /// Write raw bytes at `ptr` in the data file. Returns the byte count.
    pub fn write_data(&mut self, ptr: u64, bytes: &[u8]) -> Result<u32> {
        let size = u32::try_from(bytes.len()).map_err(|_| {
            HashdexError::invalid_argument(format!(
                "unit of {} bytes exceeds the 4-byte length field",
                bytes.len()
            ))
        })?;
        self.data.seek(SeekFrom::Start(ptr))?;
        self.data.write_all(bytes)?;
        Ok(size)
    }

    /// Read `size` bytes at `ptr` from the data file.
    pub fn read_data(&mut self, ptr: u64, size: u32) -> Result<Vec<u8>> {
        self.data.seek(SeekFrom::Start(ptr))?;
        let mut buf = vec![0u8; size as usize];
        self.data.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Append a serialized unit for `term` and record it in the first free
    /// slot of its probe sequence.
    ///
    /// Returns the number of occupied slots skipped.
    pub fn put_unit(&mut self, term: &str, unit: &str) -> Result<u64> {
        let (slot, collisions) = self.find_free_slot(term)?;
        let size = self.write_data(self.free, unit.as_bytes())?;
        self.write_entry(slot, &DictionaryEntry::new(self.free, size))?;
        self.free += u64::from(size);
        Ok(collisions)
    }

    /// Store `list` under `term`. Returns the number of collisions.
    pub fn put(&mut self, term: &str, list: &PostingsList) -> Result<u64> {
        self.put_unit(term, &codec::encode_unit(term, list))
    }

    fn find_free_slot(&mut self, term: &str) -> Result<(u64, u64)> {
        let start = hash_term(term, self.table_size);
        for (collisions, slot) in probe_sequence(start, self.table_size).enumerate() {
            if !self.entry_exists(slot)? {
                return Ok((slot, collisions as u64));
            }
        }
        Err(HashdexError::SlotExhaustion {
            term: term.to_string(),
            table_size: self.table_size,
        })
    }

    /// Look up the postings stored for `term`.
    ///
    /// Probing passes over occupied slots holding other terms and stops at the
    /// first empty slot, or after one full lap of the table.
    pub fn get_postings(&mut self, term: &str) -> Result<Option<PostingsList>> {
        let start = hash_term(term, self.table_size);
        for (probes, slot) in probe_sequence(start, self.table_size).enumerate() {
            let entry = self.read_entry(slot)?;
            if !entry.is_occupied() {
                debug!("term '{term}' absent after {probes} probes");
                return Ok(None);
            }
            let unit = self.read_unit(&entry)?;
            let (stored_term, postings) = split_unit(&unit)?;
            if stored_term == term {
                debug!("term '{term}' found after {probes} collisions");
                return Ok(Some(postings.parse()?));
            }
        }
        debug!(
            "term '{term}' absent after probing all {} slots",
            self.table_size
        );
        Ok(None)
    }

    fn read_unit(&mut self, entry: &DictionaryEntry) -> Result<String> {
        if entry.ptr + u64::from(entry.size) > self.free {
            return Err(HashdexError::corrupt_segment(
                &self.dictionary_path,
                format!(
                    "record {entry:?} points past the end of the data file ({} bytes)",
                    self.free
                ),
            ));
        }
        let bytes = self.read_data(entry.ptr, entry.size)?;
        String::from_utf8(bytes).map_err(|e| {
            HashdexError::malformed(format!("unit at offset {} is not UTF-8: {e}", entry.ptr))
        })
    }

    /// Check the structure of both files and return the number of occupied slots.
    ///
    /// Every occupied record must point inside the data file at a unit that
    /// parses and hashes back to a slot on its own probe path.
    pub fn validate(&mut self) -> Result<u64> {
        let dict_len = self.dictionary.metadata()?.len();
        if dict_len != self.table_size * ENTRY_SIZE {
            return Err(HashdexError::corrupt_segment(
                &self.dictionary_path,
                format!(
                    "length {dict_len} does not match {} slots of {ENTRY_SIZE} bytes",
                    self.table_size
                ),
            ));
        }

        self.dictionary.seek(SeekFrom::Start(0))?;
        let mut records = Vec::new();
        {
            let mut reader = BufReader::new(&self.dictionary);
            for slot in 0..self.table_size {
                let entry = DictionaryEntry::read_from(&mut reader)?;
                if entry.is_occupied() {
                    records.push((slot, entry));
                }
            }
        }

        for (slot, entry) in &records {
            let unit = self.read_unit(entry)?;
            let (term, postings) = split_unit(&unit).map_err(|e| {
                HashdexError::corrupt_segment(&self.data_path, format!("slot {slot}: {e}"))
            })?;
            postings.parse::<PostingsList>().map_err(|e| {
                HashdexError::corrupt_segment(&self.data_path, format!("term '{term}': {e}"))
            })?;
            let home = hash_term(term, self.table_size);
            let distance = (slot + self.table_size - home) % self.table_size;
            for step in 0..distance {
                let between = (home + step) % self.table_size;
                if !self.entry_exists(between)? {
                    return Err(HashdexError::corrupt_segment(
                        &self.dictionary_path,
                        format!("term '{term}' in slot {slot} is unreachable from slot {home}"),
                    ));
                }
            }
        }

        Ok(records.len() as u64)
    }

    /// Flush both files to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.dictionary.flush()?;
        self.data.flush()?;
        self.dictionary.sync_all()?;
        self.data.sync_all()?;
        Ok(())
    }

    fn check_slot(&self, slot: u64) -> Result<()> {
        if slot >= self.table_size {
            return Err(HashdexError::invalid_argument(format!(
                "slot {slot} outside table of {} slots",
                self.table_size
            )));
        }
        Ok(())
    }
}

fn check_table_size(table_size: u64) -> Result<()> {
    if table_size == 0 || table_size > MAX_TABLE_SIZE {
        return Err(HashdexError::invalid_argument(format!(
            "table size {table_size} outside 1..={MAX_TABLE_SIZE}"
        )));
    }
    Ok(())
}

fn open_rw(path: &Path, truncate: bool) -> Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(truncate)
        .truncate(truncate)
        .open(path)?;
    Ok(file)
}
