//! Sorted postings list.

use std::ops::Index;

use crate::postings::entry::{DocId, PostingsEntry};

/// Entries for one term, sorted ascending by document ID with no duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingsList {
    entries: Vec<PostingsEntry>,
}

impl PostingsList {
    pub fn new() -> Self {
        PostingsList {
            entries: Vec::new(),
        }
    }

    /// Build a list from entries that are already strictly ascending by doc ID.
    ///
    /// Returns `None` if the order does not hold.
    pub fn from_sorted(entries: Vec<PostingsEntry>) -> Option<Self> {
        if entries.windows(2).all(|w| w[0].doc_id() < w[1].doc_id()) {
            Some(PostingsList { entries })
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PostingsEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[PostingsEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PostingsEntry> {
        self.entries.iter()
    }

    pub fn doc_ids(&self) -> Vec<DocId> {
        self.entries.iter().map(|e| e.doc_id()).collect()
    }

    /// Find the entry for `doc_id`.
    pub fn find(&self, doc_id: DocId) -> Option<&PostingsEntry> {
        self.entries
            .binary_search_by_key(&doc_id, |e| e.doc_id())
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Insert an entry, keeping the list sorted.
    ///
    /// If an entry for the same document exists, the new positions are
    /// appended to it; otherwise the entry is spliced in at its rank.
    pub fn insert(&mut self, entry: PostingsEntry) {
        match self
            .entries
            .binary_search_by_key(&entry.doc_id(), |e| e.doc_id())
        {
            Ok(i) => self.entries[i].add_positions(entry.positions()),
            Err(i) => self.entries.insert(i, entry),
        }
    }

    /// Record one occurrence of the term.
    ///
    /// Occurrences usually arrive in document order, so the last entry is
    /// checked first and a full search only happens for out-of-order input.
    pub fn add_occurrence(&mut self, doc_id: DocId, position: u32) {
        match self.entries.last_mut() {
            Some(last) if last.doc_id() == doc_id => last.add_position(position),
            Some(last) if last.doc_id() > doc_id => {
                self.insert(PostingsEntry::with_position(doc_id, position))
            }
            _ => self
                .entries
                .push(PostingsEntry::with_position(doc_id, position)),
        }
    }

    /// Merge every entry of `other` into this list.
    pub fn absorb(&mut self, other: PostingsList) {
        let disjoint_tail = match (self.entries.last(), other.entries.first()) {
            (Some(last), Some(first)) => last.doc_id() < first.doc_id(),
            _ => true,
        };
        if disjoint_tail {
            self.entries.extend(other.entries);
        } else {
            for entry in other.entries {
                self.insert(entry);
            }
        }
    }
}

impl Index<usize> for PostingsList {
    type Output = PostingsEntry;

    fn index(&self, index: usize) -> &PostingsEntry {
        &self.entries[index]
    }
}

impl IntoIterator for PostingsList {
    type Item = PostingsEntry;
    type IntoIter = std::vec::IntoIter<PostingsEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a PostingsList {
    type Item = &'a PostingsEntry;
    type IntoIter = std::slice::Iter<'a, PostingsEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<PostingsEntry> for PostingsList {
    fn from_iter<I: IntoIterator<Item = PostingsEntry>>(iter: I) -> Self {
        let mut list = PostingsList::new();
        for entry in iter {
            list.insert(entry);
        }
        list
    }
}
