//! Postings: per-term lists of documents and token positions.
//!
//! A [`PostingsList`] is kept sorted by document ID at all times. Its text
//! form, produced by [`codec`], is what the data file of every segment stores.

pub mod codec;
pub mod entry;
pub mod list;

pub use entry::{DocId, PostingsEntry};
pub use list::PostingsList;
