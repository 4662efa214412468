//! Types shared between the DB and API representations.

/// Our question IDs are integers.
pub type QuestionId = u32;
/// Our choice IDs are integers, unique across all questions.
pub type ChoiceId = u32;
