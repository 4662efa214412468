use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::common::{ChoiceId, QuestionId};

/// Core choice data, linked to a specific question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceCore {
    /// Foreign Key question ID.
    pub question_id: QuestionId,
    /// Choice text.
    pub choice_text: String,
    /// Number of votes cast for this choice. Only ever incremented.
    pub votes: u32,
}

impl ChoiceCore {
    /// Create a new choice with zero votes.
    pub fn new(question_id: QuestionId, choice_text: impl Into<String>) -> Self {
        Self {
            question_id,
            choice_text: choice_text.into(),
            votes: 0,
        }
    }
}

/// A choice without an ID.
pub type NewChoice = ChoiceCore;

/// A choice from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(rename = "_id")]
    pub id: ChoiceId,
    #[serde(flatten)]
    pub choice: ChoiceCore,
}

impl Choice {
    pub fn new(id: ChoiceId, choice: ChoiceCore) -> Self {
        Self { id, choice }
    }
}

impl Deref for Choice {
    type Target = ChoiceCore;

    fn deref(&self) -> &Self::Target {
        &self.choice
    }
}

impl DerefMut for Choice {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.choice
    }
}
