use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::common::QuestionId;

/// Core question data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionCore {
    /// Question text.
    pub question_text: String,
    /// Publication time. The question is hidden from the public until then.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub pub_date: DateTime<Utc>,
}

impl QuestionCore {
    pub fn new(question_text: impl Into<String>, pub_date: DateTime<Utc>) -> Self {
        Self {
            question_text: question_text.into(),
            pub_date,
        }
    }
}

/// A question without an ID.
pub type NewQuestion = QuestionCore;

/// A question from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: QuestionId,
    #[serde(flatten)]
    pub question: QuestionCore,
}

impl Question {
    pub fn new(id: QuestionId, question: QuestionCore) -> Self {
        Self { id, question }
    }
}

impl Deref for Question {
    type Target = QuestionCore;

    fn deref(&self) -> &Self::Target {
        &self.question
    }
}

impl DerefMut for Question {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.question
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use chrono::{Duration, TimeZone};

    use super::*;

    impl QuestionCore {
        /// A question published `days` days from now (negative for the past).
        pub fn example(question_text: &str, days: i64) -> Self {
            let pub_date = Utc::now() + Duration::days(days);
            // The database only keeps millisecond precision.
            let pub_date = Utc
                .timestamp_millis_opt(pub_date.timestamp_millis())
                .unwrap();
            Self::new(question_text, pub_date)
        }
    }
}
