//! Merge-join combinators for sorted postings lists.

use std::cmp::Ordering;

use crate::postings::{PostingsEntry, PostingsList};

/// Entries of `a` whose document also appears in `b`.
///
/// Runs in `O(|a| + |b|)`. Positions are taken from `a`.
pub fn intersect(a: &PostingsList, b: &PostingsList) -> PostingsList {
    let mut result = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].doc_id().cmp(&b[j].doc_id()) {
            Ordering::Equal => {
                result.push(PostingsEntry::with_positions(
                    a[i].doc_id(),
                    a[i].positions().to_vec(),
                ));
                i += 1;
                j += 1;
            }
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
        }
    }
    collect_sorted(result)
}

/// Documents where a position of `b` directly follows a position of `a`.
///
/// Each resulting entry carries the matching positions of `b`, so the
/// output can be intersected with the next term of a longer phrase.
pub fn positional_intersect(a: &PostingsList, b: &PostingsList) -> PostingsList {
    let mut result = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].doc_id().cmp(&b[j].doc_id()) {
            Ordering::Equal => {
                let matches = adjacent_positions(a[i].positions(), b[j].positions());
                if !matches.is_empty() {
                    result.push(PostingsEntry::with_positions(a[i].doc_id(), matches));
                }
                i += 1;
                j += 1;
            }
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
        }
    }
    collect_sorted(result)
}

/// Positions `q` of `right` such that `q - 1` is a position of `left`.
fn adjacent_positions(left: &[u32], right: &[u32]) -> Vec<u32> {
    let mut matches = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        let (p, q) = (u64::from(left[i]), u64::from(right[j]));
        match (p + 1).cmp(&q) {
            Ordering::Equal => {
                matches.push(right[j]);
                i += 1;
                j += 1;
            }
            // q is too far ahead of p
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
        }
    }
    matches
}

fn collect_sorted(entries: Vec<PostingsEntry>) -> PostingsList {
    // Both inputs are sorted, so the merge-join output is too.
    PostingsList::from_sorted(entries).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(ids: &[u32]) -> PostingsList {
        ids.iter().map(|&d| PostingsEntry::with_position(d, 0)).collect()
    }

    fn positions(entries: &[(u32, &[u32])]) -> PostingsList {
        entries
            .iter()
            .map(|(d, p)| PostingsEntry::with_positions(*d, p.to_vec()))
            .collect()
    }

    #[test]
    fn test_intersect() {
        let result = intersect(&docs(&[1, 3, 5]), &docs(&[3, 5, 7]));
        assert_eq!(result.doc_ids(), vec![3, 5]);
    }

    #[test]
    fn test_intersect_edges() {
        assert!(intersect(&docs(&[]), &docs(&[1])).is_empty());
        assert!(intersect(&docs(&[1, 2]), &docs(&[3, 4])).is_empty());
        // The last elements must be compared too.
        assert_eq!(intersect(&docs(&[9]), &docs(&[9])).doc_ids(), vec![9]);
        assert_eq!(
            intersect(&docs(&[1, 2, 9]), &docs(&[4, 9])).doc_ids(),
            vec![9]
        );
    }

    #[test]
    fn test_phrase_match() {
        let quick = positions(&[(1, &[4])]);
        let fox = positions(&[(1, &[5])]);
        let result = positional_intersect(&quick, &fox);
        assert_eq!(result, positions(&[(1, &[5])]));

        let far_fox = positions(&[(1, &[9])]);
        assert!(positional_intersect(&quick, &far_fox).is_empty());
    }

    #[test]
    fn test_phrase_order_matters() {
        let quick = positions(&[(1, &[4])]);
        let fox = positions(&[(1, &[5])]);
        assert!(positional_intersect(&fox, &quick).is_empty());
    }

    #[test]
    fn test_phrase_chaining_keeps_alignment() {
        // "the quick fox": doc 1 has it at 2..4, doc 2 only has "quick fox".
        let the = positions(&[(1, &[2, 10]), (2, &[0])]);
        let quick = positions(&[(1, &[3, 7]), (2, &[5])]);
        let fox = positions(&[(1, &[4, 8]), (2, &[6])]);

        let step = positional_intersect(&the, &quick);
        assert_eq!(step, positions(&[(1, &[3])]));
        let result = positional_intersect(&step, &fox);
        assert_eq!(result, positions(&[(1, &[4])]));
    }

    #[test]
    fn test_multiple_matches_in_one_document() {
        let a = positions(&[(3, &[0, 5, 9])]);
        let b = positions(&[(3, &[1, 6, 20])]);
        assert_eq!(positional_intersect(&a, &b), positions(&[(3, &[1, 6])]));
    }
}
