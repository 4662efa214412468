use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{ChoiceId, QuestionId},
    db::{Choice, Question},
};
use crate::policy::was_published_recently;

/// A question as listed on the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSummary {
    pub id: QuestionId,
    pub question_text: String,
    pub pub_date: DateTime<Utc>,
    /// Was this published within the last day?
    pub was_published_recently: bool,
}

impl QuestionSummary {
    pub fn new(question: Question, now: DateTime<Utc>) -> Self {
        Self {
            was_published_recently: was_published_recently(&question, now),
            id: question.id,
            question_text: question.question.question_text,
            pub_date: question.question.pub_date,
        }
    }
}

/// A choice as offered to voters. Vote counts are not revealed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceDescription {
    pub id: ChoiceId,
    pub choice_text: String,
}

impl From<Choice> for ChoiceDescription {
    fn from(choice: Choice) -> Self {
        Self {
            id: choice.id,
            choice_text: choice.choice.choice_text,
        }
    }
}

/// A question with its choices, ready to be voted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDetail {
    pub id: QuestionId,
    pub question_text: String,
    pub pub_date: DateTime<Utc>,
    pub choices: Vec<ChoiceDescription>,
    /// Why the last vote on this question was not counted, if it wasn't.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl QuestionDetail {
    pub fn new(question: Question, choices: Vec<Choice>) -> Self {
        Self {
            id: question.id,
            question_text: question.question.question_text,
            pub_date: question.question.pub_date,
            choices: choices.into_iter().map(Into::into).collect(),
            error_message: None,
        }
    }

    pub fn with_error(mut self, error_message: impl Into<String>) -> Self {
        self.error_message = Some(error_message.into());
        self
    }
}

/// A choice with its vote count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceResult {
    pub id: ChoiceId,
    pub choice_text: String,
    pub votes: u32,
}

impl From<Choice> for ChoiceResult {
    fn from(choice: Choice) -> Self {
        Self {
            id: choice.id,
            choice_text: choice.choice.choice_text,
            votes: choice.choice.votes,
        }
    }
}

/// A question with the current tally for each choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionResults {
    pub id: QuestionId,
    pub question_text: String,
    pub pub_date: DateTime<Utc>,
    pub choices: Vec<ChoiceResult>,
}

impl QuestionResults {
    pub fn new(question: Question, choices: Vec<Choice>) -> Self {
        Self {
            id: question.id,
            question_text: question.question.question_text,
            pub_date: question.question.pub_date,
            choices: choices.into_iter().map(Into::into).collect(),
        }
    }
}
