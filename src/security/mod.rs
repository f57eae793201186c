//! Security module
//!
//! Input sanitation and injection screening for learner messages.

pub mod input;

pub use input::{InputValidator, ValidationError};
