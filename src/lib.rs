//! # Hashdex
//!
//! A persistent inverted index for Rust, stored as segments of on-disk hash
//! tables.
//!
//! ## Features
//!
//! - Positional postings lists with a plain-text on-disk codec
//! - Fixed-size hash table dictionaries with linear probing
//! - Memory-bounded indexing that spills to numbered segments
//! - Background compaction merging adjacent segments into one
//! - Boolean intersection and phrase queries
//!
//! ## Example
//!
//! ```no_run
//! use hashdex::{Index, IndexConfig, PersistentIndex, QueryType, SearchRequestBuilder, Searcher};
//!
//! # fn main() -> hashdex::Result<()> {
//! let mut index = PersistentIndex::open(IndexConfig::new("./index"))?;
//! for (offset, term) in "the quick brown fox".split_whitespace().enumerate() {
//!     index.insert(term, 1, offset as u32)?;
//! }
//! index.record_document(1, "fox.txt", 4)?;
//! index.cleanup()?;
//!
//! let request = SearchRequestBuilder::new()
//!     .terms(["quick", "brown"])
//!     .query_type(QueryType::Phrase)
//!     .build();
//! let hits = Searcher::new(&index).search(&request)?;
//! assert_eq!(hits.doc_ids(), vec![1]);
//! # Ok(())
//! # }
//! ```

pub mod compaction;
pub mod config;
pub mod dictionary;
mod error;
pub mod index;
pub mod postings;
pub mod query;
pub mod segment;
pub mod util;

// Re-exports for the public API
pub use config::{IndexConfig, IndexConfigBuilder};
pub use dictionary::HashTable;
pub use error::{HashdexError, Result};
pub use index::{Index, IndexStats, MemoryIndex, PersistentIndex};
pub use postings::{DocId, PostingsEntry, PostingsList};
pub use query::{
    QueryType, RankingType, SearchRequest, SearchRequestBuilder, Searcher, intersect,
    positional_intersect,
};
pub use segment::doc_info::DocInfo;
pub use segment::{SegmentId, SegmentInfo};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
