//! Query evaluation over postings lists.
//!
//! Terms are looked up one by one and their lists reduced left to right,
//! either by plain intersection or by phrase (positional) intersection.

pub mod intersect;
pub mod searcher;

pub use intersect::{intersect, positional_intersect};
pub use searcher::{QueryType, RankingType, SearchRequest, SearchRequestBuilder, Searcher};
