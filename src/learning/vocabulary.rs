//! Learned vocabulary and practice streak
//!
//! Both survive a history reset.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use super::signals::TargetScript;
use crate::storage::{keys, QuotaSafeStore};

/// Append-only set of target-script words the learner has used
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vocabulary {
    words: BTreeSet<String>,
}

impl Vocabulary {
    pub fn load(store: &QuotaSafeStore) -> Self {
        store.get_safe(keys::VOCABULARY, Self::default())
    }

    /// Add every target-script word of `text`, returning how many were new
    pub fn learn_from(&mut self, text: &str, script: &TargetScript) -> usize {
        let before = self.words.len();
        self.words.extend(script.words(text));
        let added = self.words.len() - before;
        if added > 0 {
            debug!(added, total = self.words.len(), "Vocabulary grew");
        }
        added
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }
}

/// Consecutive-day practice counter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Streak {
    pub count: u32,
    pub last_practice: Option<NaiveDate>,
}

impl Streak {
    pub fn load(store: &QuotaSafeStore) -> Self {
        Self {
            count: store.get_safe(keys::STREAK_COUNT, 0),
            last_practice: store.get_safe(keys::LAST_PRACTICE, None),
        }
    }

    /// Register practice on `today`; returns true when the streak changed
    pub fn touch(&mut self, today: NaiveDate) -> bool {
        let next = match self.last_practice {
            Some(last) if last == today => return false,
            Some(last) if last.succ_opt() == Some(today) => self.count + 1,
            _ => 1,
        };
        self.count = next;
        self.last_practice = Some(today);
        true
    }

    pub fn persist(&self, store: &Arc<QuotaSafeStore>) {
        store.set_debounced(keys::STREAK_COUNT, &self.count);
        store.set_debounced(keys::LAST_PRACTICE, &self.last_practice);
    }
}
