//! Conversation topic tracking
//!
//! Keeps a short, most-recent-first list of subjects detected in the exchange
//! through a fixed bilingual keyword table.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use crate::storage::{keys, QuotaSafeStore};

/// Topics remembered at once
pub const MAX_TOPICS: usize = 5;

/// Topic label, English whole-word triggers (plurals listed), Nepali and Chinese substring triggers
const TOPIC_KEYWORDS: &[(&str, &[&str], &[&str])] = &[
    ("greetings", &["hello", "hi", "namaste", "greeting", "greetings"], &["नमस्ते", "नमस्कार", "你好", "您好"]),
    ("family", &["family", "mother", "father", "sister", "sisters", "brother", "brothers"], &["परिवार", "आमा", "बुबा", "दिदी", "भाइ", "家人", "家庭", "妈妈", "爸爸"]),
    ("food", &["food", "eat", "eating", "rice", "meal", "meals", "tea"], &["खाना", "भात", "चिया", "吃饭", "米饭", "喝茶"]),
    ("travel", &["travel", "trip", "trips", "bus", "trek", "trekking"], &["यात्रा", "घुम्न", "旅行", "旅游"]),
    ("numbers", &["number", "numbers", "count"], &["संख्या", "गन्ती", "数字"]),
    ("weather", &["weather", "rain", "cold", "hot"], &["मौसम", "पानी पर्‍यो", "जाडो", "गर्मी", "天气", "下雨"]),
    ("shopping", &["shop", "shops", "shopping", "price", "prices", "market", "buy"], &["किनमेल", "बजार", "पसल", "मूल्य", "购物", "商店", "多少钱"]),
    ("work", &["work", "job", "jobs", "office"], &["काम", "अफिस", "जागिर", "工作", "办公室"]),
    ("time", &["time", "today", "tomorrow", "yesterday"], &["समय", "आज", "भोलि", "हिजो", "时间", "今天", "明天", "昨天"]),
    ("health", &["health", "doctor", "doctors", "sick"], &["स्वास्थ्य", "डाक्टर", "बिरामी", "健康", "医生", "生病"]),
];

static TOPIC_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    TOPIC_KEYWORDS
        .iter()
        .filter_map(|(topic, english, nepali)| {
            let words = english.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join("|");
            let mut pattern = format!(r"(?i)\b(?:{})\b", words);
            for phrase in nepali.iter() {
                pattern.push('|');
                pattern.push_str(&regex::escape(phrase));
            }
            Regex::new(&pattern).ok().map(|re| (*topic, re))
        })
        .collect()
});

/// Topic labels present in `text`, in keyword-table order
pub fn detect_topics(text: &str) -> Vec<&'static str> {
    TOPIC_PATTERNS
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(topic, _)| *topic)
        .collect()
}

/// Most-recent-first set of at most five topics
pub struct TopicTracker {
    topics: Vec<String>,
    store: Option<Arc<QuotaSafeStore>>,
}

impl Default for TopicTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicTracker {
    pub fn new() -> Self {
        Self { topics: Vec::new(), store: None }
    }

    pub fn with_store(store: Arc<QuotaSafeStore>) -> Self {
        let mut topics: Vec<String> = store.get_safe(keys::TOPICS, Vec::new());
        topics.truncate(MAX_TOPICS);
        Self { topics, store: Some(store) }
    }

    /// Prepend topics found in `text`; unchanged when nothing matches
    pub fn observe(&mut self, text: &str) -> &[String] {
        let matched = detect_topics(text);
        if matched.is_empty() {
            return &self.topics;
        }

        let mut next: Vec<String> = Vec::with_capacity(MAX_TOPICS);
        for topic in matched.into_iter().map(str::to_string).chain(self.topics.drain(..)) {
            if !next.contains(&topic) {
                next.push(topic);
            }
        }
        next.truncate(MAX_TOPICS);
        self.topics = next;
        debug!(topics = ?self.topics, "Updated recent topics");

        if let Some(store) = &self.store {
            store.set_debounced(keys::TOPICS, &self.topics);
        }
        &self.topics
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn clear(&mut self) {
        self.topics.clear();
        if let Some(store) = &self.store {
            store.remove(keys::TOPICS);
        }
    }
}
