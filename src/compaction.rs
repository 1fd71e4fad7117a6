//! Background compaction.
//!
//! Each flush queues a compaction request. A fixed pool of workers serves
//! the queue; a worker repeatedly claims the first adjacent pair of ready
//! segments, merges it, and swaps the result in, until no pair is left.

pub mod merge_engine;
pub mod scheduler;

pub use merge_engine::{MergeEngine, MergeStats};
pub use scheduler::Compactor;
