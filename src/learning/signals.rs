//! Surface-feature signals over exchange text
//!
//! Script presence, a syntactic complexity score and correction-marker counts.
//! These are deterministic heuristics, not language modeling.

/// Characters that end a sentence in English, Devanagari or CJK text
pub const SENTENCE_PUNCTUATION: &[char] = &['.', '!', '?', '।', '॥', '。', '！', '？'];

/// Phrases a tutor reply uses when correcting the learner
pub const CORRECTION_MARKERS: &[&str] = &[
    "correct way",
    "should be",
    "instead of",
    "more natural",
    "the right form",
    "small mistake",
    "सही तरिका",
    "हुनुपर्छ",
    "यसरी भन्नुहोस्",
    "सानो गल्ती",
    "应该是",
    "正确的说法",
    "更自然",
    "小错误",
];

/// Upper bound of the complexity score
pub const MAX_COMPLEXITY: f64 = 10.0;

/// Code point ranges of the language being learned
#[derive(Debug, Clone, PartialEq)]
pub struct TargetScript {
    ranges: Vec<(u32, u32)>,
}

impl Default for TargetScript {
    fn default() -> Self {
        Self::devanagari()
    }
}

impl TargetScript {
    pub fn devanagari() -> Self {
        Self { ranges: vec![(0x0900, 0x097F)] }
    }

    /// CJK Unified Ideographs
    pub fn cjk() -> Self {
        Self { ranges: vec![(0x4E00, 0x9FFF)] }
    }

    pub fn from_ranges(ranges: &[[u32; 2]]) -> Self {
        Self {
            ranges: ranges.iter().map(|[lo, hi]| (*lo, *hi)).collect(),
        }
    }

    pub fn is_script_char(&self, c: char) -> bool {
        let cp = c as u32;
        self.ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(&cp))
    }

    pub fn contains(&self, text: &str) -> bool {
        text.chars().any(|c| self.is_script_char(c))
    }

    pub fn count(&self, text: &str) -> usize {
        text.chars().filter(|c| self.is_script_char(*c)).count()
    }

    /// `min(scriptChars / 5, 3) + (words > 10 ? 1 : 0) + (sentence punctuation ? 2 : 0)`,
    /// clamped to `[0, 10]`.
    pub fn complexity(&self, text: &str) -> f64 {
        let script = (self.count(text) as f64 / 5.0).min(3.0);
        let length = if text.split_whitespace().count() > 10 { 1.0 } else { 0.0 };
        let punctuation = if text.contains(SENTENCE_PUNCTUATION) { 2.0 } else { 0.0 };
        (script + length + punctuation).clamp(0.0, MAX_COMPLEXITY)
    }

    /// Whitespace tokens written in the target script, punctuation stripped
    pub fn words(&self, text: &str) -> Vec<String> {
        text.split_whitespace()
            .map(|token| {
                token.trim_matches(|c: char| {
                    SENTENCE_PUNCTUATION.contains(&c) || (c.is_ascii_punctuation())
                })
            })
            .filter(|token| !token.is_empty() && self.contains(token))
            .map(str::to_string)
            .collect()
    }
}

/// Number of distinct correction markers present in a reply
pub fn error_signals(ai_text: &str) -> usize {
    let lower = ai_text.to_lowercase();
    CORRECTION_MARKERS
        .iter()
        .filter(|marker| lower.contains(*marker))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_target_script() {
        let script = TargetScript::devanagari();
        assert!(script.contains("hello नमस्ते"));
        assert!(!script.contains("hello there"));
        assert!(!script.contains(""));
    }

    #[test]
    fn test_complexity_components() {
        let script = TargetScript::devanagari();
        assert_eq!(script.complexity(""), 0.0);
        assert_eq!(script.complexity("hello"), 0.0);
        // six script chars
        assert_eq!(script.complexity("नमस्ते"), 6.0 / 5.0);
        assert_eq!(script.complexity("Hi there."), 2.0);
        let long = "one two three four five six seven eight nine ten eleven";
        assert_eq!(script.complexity(long), 1.0);
    }

    #[test]
    fn test_complexity_caps_script_component() {
        let script = TargetScript::devanagari();
        let text = "मेरो नाम राम हो र म काठमाडौंमा बस्छु। म नेपाली भाषा सिक्दै छु र मलाई धेरै रमाइलो लाग्छ।";
        assert_eq!(script.complexity(text), 6.0);
    }

    #[test]
    fn test_complexity_always_in_range() {
        let script = TargetScript::devanagari();
        let samples: Vec<String> = vec![
            String::new(),
            "   ".to_string(),
            "?!.।॥".to_string(),
            "क".repeat(10_000),
            "word ".repeat(500),
            "\u{0}\u{7f}\u{200b}".to_string(),
        ];
        for text in &samples {
            let score = script.complexity(text);
            assert!((0.0..=MAX_COMPLEXITY).contains(&score), "{} out of range", score);
        }
    }

    #[test]
    fn test_error_signals_bilingual_and_case_insensitive() {
        assert_eq!(error_signals("Great job!"), 0);
        assert_eq!(error_signals("The Correct Way is: म जान्छु"), 1);
        assert_eq!(error_signals("It should be 'गर्नुहोस्', सानो गल्ती मात्र"), 2);
        assert_eq!(error_signals("should be... should be"), 1);
    }

    #[test]
    fn test_words_strip_punctuation() {
        let script = TargetScript::devanagari();
        let words = script.words("नमस्ते, I am राम। ok");
        assert_eq!(words, vec!["नमस्ते", "राम"]);
    }

    #[test]
    fn test_cjk_preset() {
        let script = TargetScript::cjk();
        assert!(script.contains("我想喝茶"));
        assert!(!script.contains("नमस्ते"));
        // five ideographs plus a full-width full stop
        assert_eq!(script.complexity("我在学中文。"), 1.0 + 2.0);
        assert_eq!(script.words("你好 I am 小明。"), vec!["你好", "小明"]);
        assert_eq!(error_signals("应该是“我是学生”，正确的说法是这样"), 2);
    }

    #[test]
    fn test_custom_ranges() {
        // Hiragana
        let script = TargetScript::from_ranges(&[[0x3040, 0x309F]]);
        assert!(script.contains("こんにちは"));
        assert!(!script.contains("नमस्ते"));
    }
}
