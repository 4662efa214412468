//! Casting a vote: find the question, resolve the selected choice, count the vote.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::{
    common::{ChoiceId, QuestionId},
    db::{Choice, Question},
};
use crate::store::QuestionStore;

/// Shown alongside the question when a vote names no usable choice.
pub const NO_CHOICE_SELECTED: &str = "No choice was selected";

/// How a vote submission ended, short of a hard failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The vote was counted; the voter should be sent to the results.
    Recorded {
        question_id: QuestionId,
        choice: Choice,
    },
    /// No choice could be resolved; the question should be shown again
    /// with an error message. Nothing was counted.
    Rejected {
        question: Question,
        choices: Vec<Choice>,
        error_message: &'static str,
    },
}

/// Run a vote submission against the store.
///
/// Fails with `NotFound` if the question does not exist or is not yet
/// published at `now`. A missing choice, or one that does not belong to the
/// question, is a [`VoteOutcome::Rejected`] rather than an error.
pub async fn cast_vote(
    store: &dyn QuestionStore,
    question_id: QuestionId,
    choice_id: Option<ChoiceId>,
    now: DateTime<Utc>,
) -> Result<VoteOutcome> {
    let question = store.get_published(question_id, now).await?;

    let choice = match choice_id {
        Some(choice_id) => match store.get_choice(&question, choice_id).await {
            Ok(choice) => Some(choice),
            Err(Error::NotFound(_)) => None,
            Err(e) => return Err(e),
        },
        None => None,
    };

    let choice = match choice {
        Some(choice) => choice,
        None => {
            debug!("Rejected vote on question {question_id}: no choice resolved from {choice_id:?}");
            let choices = store.choices(&question).await?;
            return Ok(VoteOutcome::Rejected {
                question,
                choices,
                error_message: NO_CHOICE_SELECTED,
            });
        }
    };

    let choice = store.increment_vote(&choice).await?;
    debug!(
        "Recorded vote for choice {} on question {question_id}, now at {}",
        choice.id, choice.votes
    );
    Ok(VoteOutcome::Recorded {
        question_id,
        choice,
    })
}
