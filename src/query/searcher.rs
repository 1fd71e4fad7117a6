//! Searcher resolving term lists against an index.

use log::debug;

use crate::error::Result;
use crate::index::Index;
use crate::postings::PostingsList;
use crate::query::intersect::{intersect, positional_intersect};

/// How the postings lists of the query terms are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryType {
    /// Documents containing every term.
    #[default]
    Intersection,
    /// Documents containing the terms at consecutive positions.
    Phrase,
}

/// Ranking requested by the caller.
///
/// Ranking happens outside this crate; the value is carried through so a
/// ranker downstream knows what was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankingType {
    #[default]
    TfIdf,
    PageRank,
    Combination,
}

/// A query: an ordered list of terms and how to combine them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    pub terms: Vec<String>,
    pub query_type: QueryType,
    pub ranking: RankingType,
}

#[derive(Debug, Default)]
pub struct SearchRequestBuilder {
    request: SearchRequest,
}

impl SearchRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.request.terms.push(term.into());
        self
    }

    pub fn terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request.terms.extend(terms.into_iter().map(Into::into));
        self
    }

    pub fn query_type(mut self, query_type: QueryType) -> Self {
        self.request.query_type = query_type;
        self
    }

    pub fn ranking(mut self, ranking: RankingType) -> Self {
        self.request.ranking = ranking;
        self
    }

    pub fn build(self) -> SearchRequest {
        self.request
    }
}

/// Evaluates [`SearchRequest`]s against an [`Index`].
pub struct Searcher<'a, I: Index + ?Sized> {
    index: &'a I,
}

impl<'a, I: Index + ?Sized> Searcher<'a, I> {
    pub fn new(index: &'a I) -> Self {
        Searcher { index }
    }

    /// Run `request`, returning the matching documents sorted by doc ID.
    ///
    /// A term missing from the index contributes an empty list, so the
    /// result is empty rather than an error.
    pub fn search(&self, request: &SearchRequest) -> Result<PostingsList> {
        let lists = self.postings_lists(&request.terms)?;
        let result = combine(lists, request.query_type);
        debug!(
            "{:?} query over {} terms matched {} documents",
            request.query_type,
            request.terms.len(),
            result.len()
        );
        Ok(result)
    }

    /// Postings of each term, with an empty list for absent terms.
    pub fn postings_lists(&self, terms: &[String]) -> Result<Vec<PostingsList>> {
        terms
            .iter()
            .map(|term| Ok(self.index.get_postings(term)?.unwrap_or_default()))
            .collect()
    }
}

/// Reduce `lists` left to right with the combinator for `query_type`.
pub fn combine(lists: Vec<PostingsList>, query_type: QueryType) -> PostingsList {
    let mut iter = lists.into_iter();
    let Some(mut result) = iter.next() else {
        return PostingsList::new();
    };
    for next in iter {
        if result.is_empty() {
            break;
        }
        result = match query_type {
            QueryType::Intersection => intersect(&result, &next),
            QueryType::Phrase => positional_intersect(&result, &next),
        };
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;

    fn index(text: &[&str]) -> MemoryIndex {
        let mut index = MemoryIndex::new();
        for (doc, body) in text.iter().enumerate() {
            for (offset, term) in body.split_whitespace().enumerate() {
                index.insert(term, doc as u32, offset as u32).unwrap();
            }
        }
        index
    }

    #[test]
    fn test_intersection_query() {
        let index = index(&["a b c", "b c", "a c"]);
        let request = SearchRequestBuilder::new().terms(["a", "c"]).build();
        let result = Searcher::new(&index).search(&request).unwrap();
        assert_eq!(result.doc_ids(), vec![0, 2]);
    }

    #[test]
    fn test_phrase_query() {
        let index = index(&["the quick brown fox", "the brown quick fox", "quick brown"]);
        let request = SearchRequestBuilder::new()
            .terms(["quick", "brown"])
            .query_type(QueryType::Phrase)
            .build();
        let result = Searcher::new(&index).search(&request).unwrap();
        assert_eq!(result.doc_ids(), vec![0, 2]);
        assert_eq!(result[0].positions(), &[2]);
    }

    #[test]
    fn test_missing_term_yields_empty() {
        let index = index(&["a b"]);
        let request = SearchRequestBuilder::new().terms(["a", "zzz"]).build();
        assert!(Searcher::new(&index).search(&request).unwrap().is_empty());

        let single = SearchRequestBuilder::new().term("zzz").build();
        assert!(Searcher::new(&index).search(&single).unwrap().is_empty());
    }

    #[test]
    fn test_empty_query() {
        let index = index(&["a b"]);
        let request = SearchRequest::default();
        assert!(Searcher::new(&index).search(&request).unwrap().is_empty());
    }

    #[test]
    fn test_single_term_returns_its_list() {
        let index = index(&["a b", "b"]);
        let request = SearchRequestBuilder::new()
            .term("b")
            .ranking(RankingType::PageRank)
            .build();
        let result = Searcher::new(&index).search(&request).unwrap();
        assert_eq!(result.doc_ids(), vec![0, 1]);
    }
}
