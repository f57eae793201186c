//! Adaptive assessment
//!
//! Infers the learner's proficiency from the ongoing exchange, tracks the topics
//! being practiced and maps the resulting profile to lesson recommendations.

pub mod signals;
pub mod vocabulary;
pub mod assessor;
pub mod recommend;
pub mod topics;

pub use signals::{error_signals, TargetScript};
pub use vocabulary::{Streak, Vocabulary};
pub use assessor::{OutcomeCounters, ProficiencyAssessor, ProficiencyProfile, StoredAssessment, Tier};
pub use recommend::{recommend, LessonRecommendation};
pub use topics::{detect_topics, TopicTracker};
