use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::QuestionId,
    db::{Choice, NewChoice, NewQuestion, Question},
};
use crate::policy::{is_published, was_published_recently};

use super::question::ChoiceResult;

/// A question specification, as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSpec {
    /// Question text.
    pub question_text: String,
    /// Publication time; defaults to the time of creation.
    #[serde(default)]
    pub pub_date: Option<DateTime<Utc>>,
    /// Texts of the initial choices.
    #[serde(default)]
    pub choices: Vec<String>,
}

impl QuestionSpec {
    /// Validate this spec and split it into the question and its choice texts.
    /// The question text and every choice text must be non-blank.
    pub fn into_question(self, now: DateTime<Utc>) -> Result<(NewQuestion, Vec<String>)> {
        let question_text = non_blank(self.question_text, "Question text")?;
        let choices = self
            .choices
            .into_iter()
            .map(|text| non_blank(text, "Choice text"))
            .collect::<Result<Vec<_>>>()?;
        let question = NewQuestion::new(question_text, self.pub_date.unwrap_or(now));
        Ok((question, choices))
    }
}

/// A choice specification, as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceSpec {
    /// Choice text.
    pub choice_text: String,
}

impl ChoiceSpec {
    /// Validate this spec into a new choice for the given question.
    pub fn into_choice(self, question_id: QuestionId) -> Result<NewChoice> {
        let choice_text = non_blank(self.choice_text, "Choice text")?;
        Ok(NewChoice::new(question_id, choice_text))
    }
}

/// Trim `text`, rejecting it if nothing is left.
fn non_blank(text: String, what: &str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::bad_request(format!("{what} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Everything an admin can see about a question, including unpublished ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminQuestion {
    pub id: QuestionId,
    pub question_text: String,
    pub pub_date: DateTime<Utc>,
    pub published: bool,
    pub was_published_recently: bool,
    pub choices: Vec<ChoiceResult>,
}

impl AdminQuestion {
    pub fn new(question: Question, choices: Vec<Choice>, now: DateTime<Utc>) -> Self {
        Self {
            published: is_published(&question, now),
            was_published_recently: was_published_recently(&question, now),
            id: question.id,
            question_text: question.question.question_text,
            pub_date: question.question.pub_date,
            choices: choices.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn spec_defaults_to_now() {
        let now = Utc::now();
        let spec = QuestionSpec {
            question_text: "  What's up?  ".to_string(),
            pub_date: None,
            choices: vec!["Not much".to_string(), " The sky ".to_string()],
        };
        let (question, choices) = spec.into_question(now).unwrap();
        assert_eq!(question.question_text, "What's up?");
        assert_eq!(question.pub_date, now);
        assert_eq!(choices, vec!["Not much", "The sky"]);
    }

    #[test]
    fn spec_keeps_pub_date() {
        let now = Utc::now();
        let later = now + Duration::days(30);
        let spec = QuestionSpec {
            question_text: "Later?".to_string(),
            pub_date: Some(later),
            choices: vec![],
        };
        let (question, choices) = spec.into_question(now).unwrap();
        assert_eq!(question.pub_date, later);
        assert!(choices.is_empty());
    }

    #[test]
    fn blank_texts_are_rejected() {
        let blank_question = QuestionSpec {
            question_text: "   ".to_string(),
            pub_date: None,
            choices: vec![],
        };
        assert!(matches!(
            blank_question.into_question(Utc::now()),
            Err(Error::BadRequest(_))
        ));

        let blank_choice = QuestionSpec {
            question_text: "Fine question".to_string(),
            pub_date: None,
            choices: vec!["ok".to_string(), "".to_string()],
        };
        assert!(matches!(
            blank_choice.into_question(Utc::now()),
            Err(Error::BadRequest(_))
        ));

        let spec = ChoiceSpec {
            choice_text: "\t".to_string(),
        };
        assert!(matches!(spec.into_choice(1), Err(Error::BadRequest(_))));
    }

    #[test]
    fn choice_spec_starts_at_zero_votes() {
        let spec = ChoiceSpec {
            choice_text: "Yes".to_string(),
        };
        let choice = spec.into_choice(3).unwrap();
        assert_eq!(choice, NewChoice::new(3, "Yes"));
        assert_eq!(choice.votes, 0);
    }
}
