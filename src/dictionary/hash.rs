//! Term hashing and probe order.

const SEED: u64 = 7;
const MULTIPLIER: u64 = 103;

/// Polynomial rolling hash of `term`, reduced modulo `table_size`.
///
/// Changing this function invalidates every dictionary written with it.
pub fn hash_term(term: &str, table_size: u64) -> u64 {
    debug_assert!(table_size > 0);
    let size = u128::from(table_size);
    let mut hash = u128::from(SEED) % size;
    for c in term.chars() {
        // Widened so no table size can overflow the step.
        hash = (hash * u128::from(MULTIPLIER) + u128::from(c)) % size;
    }
    hash as u64
}

/// Slots visited when probing from `start`: linear, step one, wrapping
/// around, and visiting each slot exactly once.
pub fn probe_sequence(start: u64, table_size: u64) -> impl Iterator<Item = u64> {
    (0..table_size).map(move |step| (start + step) % table_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable() {
        // 7 * 103 + 'a'(97) = 818
        assert_eq!(hash_term("a", 611_953), 818);
        assert_eq!(hash_term("a", 100), 18);
        assert_eq!(hash_term("fox", 611_953), hash_term("fox", 611_953));
    }

    #[test]
    fn test_hash_in_range() {
        for term in ["", "x", "quick", "brown", "ünïcödé", "日本語"] {
            for size in [1, 2, 7, 611_953] {
                assert!(hash_term(term, size) < size);
            }
        }
    }

    #[test]
    fn test_hash_with_huge_table_does_not_overflow() {
        let size = u64::MAX / 12;
        assert!(hash_term("ünïcödé overflow", size) < size);
        assert_eq!(hash_term("a", size), 818);
    }

    #[test]
    fn test_probe_wraps_and_visits_each_slot_once() {
        let slots: Vec<u64> = probe_sequence(5, 7).collect();
        assert_eq!(slots, vec![5, 6, 0, 1, 2, 3, 4]);
    }
}
