//! Lesson recommendations
//!
//! A pure mapping from a proficiency profile to an ordered list of lessons drawn
//! from a fixed catalog. Recommendations are derived state and never persisted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::assessor::{ProficiencyProfile, Tier, GRAMMAR_ACCURACY};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRecommendation {
    pub id: String,
    pub title: String,
    pub description: String,
    pub difficulty: u8,
    pub topics: BTreeSet<String>,
    pub estimated_minutes: u32,
}

struct CatalogEntry {
    id: &'static str,
    title: &'static str,
    description: &'static str,
    difficulty: u8,
    topics: &'static [&'static str],
    minutes: u32,
}

impl CatalogEntry {
    fn to_recommendation(&self) -> LessonRecommendation {
        LessonRecommendation {
            id: self.id.to_string(),
            title: self.title.to_string(),
            description: self.description.to_string(),
            difficulty: self.difficulty,
            topics: self.topics.iter().map(|t| t.to_string()).collect(),
            estimated_minutes: self.minutes,
        }
    }
}

const BEGINNER: &[CatalogEntry] = &[
    CatalogEntry {
        id: "basics-greetings",
        title: "Greetings & Introductions",
        description: "Say hello, introduce yourself and ask someone's name.",
        difficulty: 1,
        topics: &["greetings"],
        minutes: 10,
    },
    CatalogEntry {
        id: "basics-numbers",
        title: "Numbers & Counting",
        description: "Count from one to twenty and use numbers for prices and ages.",
        difficulty: 1,
        topics: &["numbers"],
        minutes: 15,
    },
];

const ELEMENTARY: &[CatalogEntry] = &[CatalogEntry {
    id: "everyday-conversation",
    title: "Everyday Conversations",
    description: "Order food, ask prices at the market and talk about your day.",
    difficulty: 2,
    topics: &["food", "shopping", "time"],
    minutes: 20,
}];

const INTERMEDIATE: &[CatalogEntry] = &[CatalogEntry {
    id: "tenses-past-future",
    title: "Past & Future Tenses",
    description: "Describe what you did yesterday and plan a trip for next week.",
    difficulty: 3,
    topics: &["time", "travel"],
    minutes: 25,
}];

const ADVANCED: &[CatalogEntry] = &[];

fn catalog(tier: Tier) -> &'static [CatalogEntry] {
    match tier {
        Tier::Beginner => BEGINNER,
        Tier::Elementary => ELEMENTARY,
        Tier::Intermediate => INTERMEDIATE,
        Tier::Advanced => ADVANCED,
    }
}

/// Lessons for `profile`, in presentation order
pub fn recommend(profile: &ProficiencyProfile) -> Vec<LessonRecommendation> {
    let mut lessons: Vec<LessonRecommendation> = catalog(profile.tier)
        .iter()
        .map(CatalogEntry::to_recommendation)
        .collect();

    if profile.weaknesses.contains(GRAMMAR_ACCURACY) {
        lessons.push(LessonRecommendation {
            id: "grammar-review".to_string(),
            title: "Grammar Accuracy Review".to_string(),
            description: "Revisit verb endings and postpositions from your recent corrections."
                .to_string(),
            difficulty: profile.standardized_level,
            topics: BTreeSet::from(["grammar".to_string()]),
            estimated_minutes: 15,
        });
    }

    lessons
}
