//! Proficiency assessment
//!
//! Accumulates exchange outcomes into success/error counters and derives a
//! proficiency profile from them. The tier is always re-derivable from the counters
//! plus the current message; there is no other hidden state. Counters never decay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::signals::{error_signals, TargetScript};
use super::vocabulary::Vocabulary;
use crate::config::{AssessmentConfig, TierRule, TierTable};
use crate::storage::{keys, QuotaSafeStore};

pub const GOOD_COMPREHENSION: &str = "good comprehension";
pub const SENTENCE_CONSTRUCTION: &str = "sentence construction";
pub const VOCABULARY_RANGE: &str = "vocabulary range";
pub const GRAMMAR_ACCURACY: &str = "grammar accuracy";
pub const COMPREHENSION: &str = "comprehension";
pub const VOCABULARY_BREADTH: &str = "vocabulary breadth";

/// Ordered proficiency buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Beginner,
    Elementary,
    Intermediate,
    Advanced,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Beginner => write!(f, "beginner"),
            Tier::Elementary => write!(f, "elementary"),
            Tier::Intermediate => write!(f, "intermediate"),
            Tier::Advanced => write!(f, "advanced"),
        }
    }
}

impl Tier {
    /// Highest tier whose rate and complexity thresholds are both exceeded
    pub fn select(table: &TierTable, success_rate: f64, complexity: f64) -> (Tier, TierRule) {
        let ordered = [
            (Tier::Advanced, table.advanced),
            (Tier::Intermediate, table.intermediate),
            (Tier::Elementary, table.elementary),
            (Tier::Beginner, table.beginner),
        ];
        ordered
            .into_iter()
            .find(|(_, rule)| success_rate > rule.min_rate && complexity > rule.min_complexity)
            .unwrap_or((Tier::Beginner, table.beginner))
    }
}

/// Inferred proficiency of the learner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProficiencyProfile {
    pub tier: Tier,
    /// Looked up from the tier, not computed
    pub standardized_level: u8,
    /// Looked up from the tier, not computed
    pub confidence: f64,
    pub strengths: BTreeSet<String>,
    pub weaknesses: BTreeSet<String>,
    pub last_assessed: DateTime<Utc>,
}

/// Exchange outcomes seen so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeCounters {
    pub success_count: u64,
    pub error_count: u64,
}

impl OutcomeCounters {
    pub fn total(&self) -> u64 {
        self.success_count + self.error_count
    }

    pub fn success_rate(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.success_count as f64 / total as f64),
        }
    }
}

/// Persisted assessment state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAssessment {
    #[serde(default)]
    pub counters: OutcomeCounters,
    #[serde(default)]
    pub profile: Option<ProficiencyProfile>,
}

/// Strength and weakness labels from independent threshold checks
pub fn assess_traits(
    success_rate: f64,
    complexity: f64,
    error_count: u64,
    vocabulary_size: usize,
) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut strengths = BTreeSet::new();
    let mut weaknesses = BTreeSet::new();

    if success_rate > 0.7 {
        strengths.insert(GOOD_COMPREHENSION.to_string());
    }
    if complexity >= 5.0 {
        strengths.insert(SENTENCE_CONSTRUCTION.to_string());
    }
    if vocabulary_size >= 50 {
        strengths.insert(VOCABULARY_RANGE.to_string());
    }

    if error_count > 3 {
        weaknesses.insert(GRAMMAR_ACCURACY.to_string());
    }
    if success_rate < 0.5 {
        weaknesses.insert(COMPREHENSION.to_string());
    }
    if vocabulary_size < 10 {
        weaknesses.insert(VOCABULARY_BREADTH.to_string());
    }

    (strengths, weaknesses)
}

/// Accumulates exchange outcomes into a proficiency profile
pub struct ProficiencyAssessor {
    config: AssessmentConfig,
    script: TargetScript,
    counters: OutcomeCounters,
    vocabulary: Vocabulary,
    profile: Option<ProficiencyProfile>,
    store: Option<Arc<QuotaSafeStore>>,
}

impl ProficiencyAssessor {
    /// Assessor without persistence
    pub fn new(config: AssessmentConfig) -> Self {
        let script = TargetScript::from_ranges(&config.script_ranges);
        Self {
            config,
            script,
            counters: OutcomeCounters::default(),
            vocabulary: Vocabulary::default(),
            profile: None,
            store: None,
        }
    }

    /// Assessor restored from, and persisting to, `store`
    pub fn with_store(config: AssessmentConfig, store: Arc<QuotaSafeStore>) -> Self {
        let stored: StoredAssessment = store.get_safe(keys::PROFILE, StoredAssessment::default());
        let vocabulary = Vocabulary::load(&store);
        debug!(
            successes = stored.counters.success_count,
            errors = stored.counters.error_count,
            words = vocabulary.len(),
            "Restored assessment state"
        );

        let mut assessor = Self::new(config);
        assessor.counters = stored.counters;
        assessor.profile = stored.profile;
        assessor.vocabulary = vocabulary;
        assessor.store = Some(store);
        assessor
    }

    /// Fold one exchange into the counters.
    ///
    /// Returns a fresh profile once enough interactions have been counted, `None`
    /// before that.
    pub fn record(&mut self, user_text: &str, ai_text: &str) -> Option<ProficiencyProfile> {
        let signals = error_signals(ai_text);
        let counted = if signals > 0 {
            self.counters.error_count += 1;
            true
        } else if self.script.contains(user_text) {
            self.counters.success_count += 1;
            true
        } else {
            false
        };

        if self.vocabulary.learn_from(user_text, &self.script) > 0 {
            if let Some(store) = &self.store {
                store.set_debounced(keys::VOCABULARY, &self.vocabulary);
            }
        }

        if counted {
            debug!(
                signals,
                successes = self.counters.success_count,
                errors = self.counters.error_count,
                "Recorded exchange outcome"
            );
        }

        if self.counters.total() < u64::from(self.config.min_interactions) {
            if counted {
                self.persist();
            }
            return None;
        }

        let success_rate = self.counters.success_rate()?;
        let complexity = self.script.complexity(user_text);
        let profile = self.derive_profile(success_rate, complexity);

        if self.profile.as_ref().map(|p| p.tier) != Some(profile.tier) {
            info!(
                tier = %profile.tier,
                level = profile.standardized_level,
                success_rate,
                complexity,
                "Proficiency tier changed"
            );
        }

        self.profile = Some(profile.clone());
        self.persist();
        Some(profile)
    }

    fn derive_profile(&self, success_rate: f64, complexity: f64) -> ProficiencyProfile {
        let (tier, rule) = Tier::select(&self.config.tiers, success_rate, complexity);
        let (strengths, weaknesses) = assess_traits(
            success_rate,
            complexity,
            self.counters.error_count,
            self.vocabulary.len(),
        );
        ProficiencyProfile {
            tier,
            standardized_level: rule.level,
            confidence: rule.confidence,
            strengths,
            weaknesses,
            last_assessed: Utc::now(),
        }
    }

    fn persist(&self) {
        if let Some(store) = &self.store {
            let stored = StoredAssessment {
                counters: self.counters,
                profile: self.profile.clone(),
            };
            store.set_debounced(keys::PROFILE, &stored);
        }
    }

    pub fn profile(&self) -> Option<&ProficiencyProfile> {
        self.profile.as_ref()
    }

    pub fn counters(&self) -> OutcomeCounters {
        self.counters
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn script(&self) -> &TargetScript {
        &self.script
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RICH: &str = "मेरो नाम राम हो र म काठमाडौंमा बस्छु। म नेपाली भाषा सिक्दै छु र मलाई धेरै रमाइलो लाग्छ।";
    const PRAISE: &str = "धेरै राम्रो! Great sentence.";
    const CORRECTION: &str = "Almost! The correct way is: म भात खान्छु।";

    fn assessor() -> ProficiencyAssessor {
        ProficiencyAssessor::new(AssessmentConfig::default())
    }

    #[test]
    fn test_no_profile_below_minimum_interactions() {
        let mut a = assessor();
        assert!(a.record(RICH, PRAISE).is_none());
        assert!(a.record(RICH, PRAISE).is_none());
        assert!(a.profile().is_none());
        assert_eq!(a.counters().total(), 2);
    }

    #[test]
    fn test_exchanges_without_signal_are_not_counted() {
        let mut a = assessor();
        for _ in 0..5 {
            assert!(a.record("hello, how are you?", "I'm fine, thanks.").is_none());
        }
        assert_eq!(a.counters().total(), 0);
    }

    #[test]
    fn test_three_clean_rich_exchanges_reach_advanced() {
        let mut a = assessor();
        a.record(RICH, PRAISE);
        a.record(RICH, PRAISE);
        let profile = a.record(RICH, PRAISE).expect("profile after three exchanges");

        assert_eq!(a.counters().success_rate(), Some(1.0));
        assert_eq!(profile.tier, Tier::Advanced);
        assert_eq!(profile.standardized_level, 5);
        assert_eq!(profile.confidence, 0.9);
        assert!(profile.strengths.contains(GOOD_COMPREHENSION));
        assert!(profile.strengths.contains(SENTENCE_CONSTRUCTION));
    }

    #[test]
    fn test_tier_follows_current_message_complexity() {
        let mut a = assessor();
        a.record(RICH, PRAISE);
        a.record(RICH, PRAISE);
        // Perfect rate, but a short message: 6 script chars -> 1.2
        let profile = a.record("नमस्ते", PRAISE).unwrap();
        assert_eq!(profile.tier, Tier::Elementary);
        assert_eq!(profile.standardized_level, 2);
        assert_eq!(profile.confidence, 0.6);
    }

    #[test]
    fn test_corrections_lower_tier_and_flag_grammar() {
        let mut a = assessor();
        for _ in 0..4 {
            a.record("म भात खाने", CORRECTION);
        }
        let profile = a.record(RICH, CORRECTION).unwrap();
        assert_eq!(a.counters().error_count, 5);
        assert_eq!(profile.tier, Tier::Beginner);
        assert_eq!(profile.standardized_level, 1);
        assert!(profile.weaknesses.contains(GRAMMAR_ACCURACY));
        assert!(profile.weaknesses.contains(COMPREHENSION));
    }

    #[test]
    fn test_tier_is_rederivable_from_counters() {
        let mut a = assessor();
        a.record(RICH, PRAISE);
        a.record(RICH, CORRECTION);
        a.record(RICH, PRAISE);
        let profile = a.record(RICH, PRAISE).unwrap();

        let rate = a.counters().success_rate().unwrap();
        let complexity = a.script().complexity(RICH);
        let (tier, _) = Tier::select(&AssessmentConfig::default().tiers, rate, complexity);
        assert_eq!(profile.tier, tier);
        // 3/4 = 0.75 with complexity 6 -> intermediate
        assert_eq!(tier, Tier::Intermediate);
    }

    #[test]
    fn test_select_defaults_to_beginner() {
        let table = TierTable::default();
        assert_eq!(Tier::select(&table, 0.0, 0.0).0, Tier::Beginner);
        assert_eq!(Tier::select(&table, 1.0, 0.0).0, Tier::Beginner);
        assert_eq!(Tier::select(&table, 0.86, 5.5).0, Tier::Advanced);
        // Thresholds are strict
        assert_eq!(Tier::select(&table, 0.85, 6.0).0, Tier::Intermediate);
    }

    #[test]
    fn test_traits_thresholds() {
        let (strengths, weaknesses) = assess_traits(0.8, 2.0, 0, 60);
        assert!(strengths.contains(GOOD_COMPREHENSION));
        assert!(strengths.contains(VOCABULARY_RANGE));
        assert!(weaknesses.is_empty());

        let (strengths, weaknesses) = assess_traits(0.4, 1.0, 4, 3);
        assert!(strengths.is_empty());
        assert!(weaknesses.contains(GRAMMAR_ACCURACY));
        assert!(weaknesses.contains(COMPREHENSION));
        assert!(weaknesses.contains(VOCABULARY_BREADTH));
    }

    #[test]
    fn test_state_restored_from_store() {
        let store = Arc::new(QuotaSafeStore::in_memory(1024 * 1024));
        {
            let mut a = ProficiencyAssessor::with_store(AssessmentConfig::default(), store.clone());
            a.record(RICH, PRAISE);
            a.record(RICH, PRAISE);
            a.record(RICH, PRAISE);
        }

        let restored = ProficiencyAssessor::with_store(AssessmentConfig::default(), store);
        assert_eq!(restored.counters().success_count, 3);
        assert_eq!(restored.profile().map(|p| p.tier), Some(Tier::Advanced));
        assert!(restored.vocabulary().contains("काठमाडौंमा"));
    }

    #[test]
    fn test_empty_text_is_harmless() {
        let mut a = assessor();
        assert!(a.record("", "").is_none());
        assert_eq!(a.script().complexity(""), 0.0);
    }
}
