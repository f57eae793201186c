//! Local persistence for learner state
//!
//! Provides:
//! - Quota-enforcing key/value store with eviction and versioned envelopes
//! - Explicit debouncer used to coalesce bursts of writes
//! - The fixed set of logical keys learner state lives under

pub mod debounce;
pub mod quota;

pub use debounce::Debouncer;
pub use quota::{FileBackend, MemoryBackend, QuotaSafeStore, StorageBackend, StorageError};

/// Logical keys, each read and written independently
pub mod keys {
    pub const HISTORY: &str = "lingo.history";
    pub const VOCABULARY: &str = "lingo.vocabulary";
    pub const PROFILE: &str = "lingo.profile";
    pub const STREAK_COUNT: &str = "lingo.streak_count";
    pub const LAST_PRACTICE: &str = "lingo.last_practice";
    pub const TOPICS: &str = "lingo.topics";

    pub const ALL: &[&str] = &[HISTORY, VOCABULARY, PROFILE, STREAK_COUNT, LAST_PRACTICE, TOPICS];
}

/// Keep the last `max` elements of a sequence, preserving order
pub fn truncate<T: Clone>(items: &[T], max: usize) -> Vec<T> {
    let start = items.len().saturating_sub(max);
    items[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_last_elements_in_order() {
        let items: Vec<u32> = (0..150).collect();
        let kept = truncate(&items, 100);
        assert_eq!(kept.len(), 100);
        assert_eq!(kept.first(), Some(&50));
        assert_eq!(kept.last(), Some(&149));
        assert!(kept.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_truncate_short_sequence_unchanged() {
        let items = vec!["a", "b"];
        assert_eq!(truncate(&items, 5), items);
        assert!(truncate::<u8>(&[], 3).is_empty());
        assert!(truncate(&items, 0).is_empty());
    }
}
