//! On-disk hash table mapping terms to postings.
//!
//! A segment's dictionary file is an array of fixed 12-byte records, one per
//! slot. A term lives in slot `hash(term) mod table_size`, or in the next free
//! slot found by linear probing. Each record points into an append-only data
//! file holding the serialized `"<term> <postings>\n"` unit.

pub mod hash;
pub mod table;

pub use hash::{hash_term, probe_sequence};
pub use table::{DictionaryEntry, ENTRY_SIZE, HashTable, MAX_TABLE_SIZE};
