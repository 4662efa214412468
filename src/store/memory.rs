//! In-memory storage, for development and tests. Nothing survives a restart.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rocket::tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::model::{
    common::{ChoiceId, QuestionId},
    db::{Choice, NewChoice, NewQuestion, Question},
};
use crate::policy::is_published;

use super::QuestionStore;

#[derive(Default)]
struct Tables {
    questions: BTreeMap<QuestionId, Question>,
    choices: BTreeMap<ChoiceId, Choice>,
    next_question_id: QuestionId,
    next_choice_id: ChoiceId,
}

/// A [`QuestionStore`] holding everything in process memory.
///
/// All mutation happens under a single write lock, so vote increments
/// cannot be lost to interleaving.
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create a new empty memory store. IDs start at 1.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables {
                next_question_id: 1,
                next_choice_id: 1,
                ..Default::default()
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Newest `pub_date` first, ties broken by newest ID.
fn sort_newest_first(questions: &mut [Question]) {
    questions.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
}

#[rocket::async_trait]
impl QuestionStore for MemoryStore {
    async fn insert_question(&self, question: NewQuestion) -> Result<Question> {
        let mut tables = self.tables.write().await;
        let id = tables.next_question_id;
        tables.next_question_id += 1;
        let question = Question::new(id, question);
        tables.questions.insert(id, question.clone());
        Ok(question)
    }

    async fn insert_choice(&self, choice: NewChoice) -> Result<Choice> {
        let mut tables = self.tables.write().await;
        if !tables.questions.contains_key(&choice.question_id) {
            return Err(Error::not_found(format!(
                "Question with ID '{}'",
                choice.question_id
            )));
        }
        let id = tables.next_choice_id;
        tables.next_choice_id += 1;
        let choice = Choice::new(id, choice);
        tables.choices.insert(id, choice.clone());
        Ok(choice)
    }

    async fn all_questions(&self) -> Result<Vec<Question>> {
        let mut questions: Vec<_> = self.tables.read().await.questions.values().cloned().collect();
        sort_newest_first(&mut questions);
        Ok(questions)
    }

    async fn latest_published(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Question>> {
        let mut questions: Vec<_> = self
            .tables
            .read()
            .await
            .questions
            .values()
            .filter(|q| is_published(q, now))
            .cloned()
            .collect();
        sort_newest_first(&mut questions);
        questions.truncate(limit);
        Ok(questions)
    }

    async fn get_published(&self, id: QuestionId, now: DateTime<Utc>) -> Result<Question> {
        self.tables
            .read()
            .await
            .questions
            .get(&id)
            .filter(|q| is_published(q, now))
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Question with ID '{id}'")))
    }

    async fn choices(&self, question: &Question) -> Result<Vec<Choice>> {
        Ok(self
            .tables
            .read()
            .await
            .choices
            .values()
            .filter(|c| c.question_id == question.id)
            .cloned()
            .collect())
    }

    async fn get_choice(&self, question: &Question, choice_id: ChoiceId) -> Result<Choice> {
        self.tables
            .read()
            .await
            .choices
            .get(&choice_id)
            .filter(|c| c.question_id == question.id)
            .cloned()
            .ok_or_else(|| {
                Error::not_found(format!(
                    "Choice with ID '{choice_id}' for question '{}'",
                    question.id
                ))
            })
    }

    async fn increment_vote(&self, choice: &Choice) -> Result<Choice> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .choices
            .get_mut(&choice.id)
            .ok_or_else(|| Error::not_found(format!("Choice with ID '{}'", choice.id)))?;
        stored.votes += 1;
        Ok(stored.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance::conformance_tests;

    conformance_tests!({ MemoryStore::new() });

    #[rocket::async_test]
    async fn ids_are_sequential() {
        let store = MemoryStore::new();
        let first = store
            .insert_question(NewQuestion::example("First", -1))
            .await
            .unwrap();
        let second = store
            .insert_question(NewQuestion::example("Second", -1))
            .await
            .unwrap();
        assert_eq!((first.id, second.id), (1, 2));

        let choice = store
            .insert_choice(NewChoice::new(second.id, "Only"))
            .await
            .unwrap();
        assert_eq!(choice.id, 1);
        assert_eq!(choice.question_id, second.id);
    }

    #[rocket::async_test]
    async fn increment_unknown_choice() {
        let store = MemoryStore::new();
        let phantom = Choice::new(42, NewChoice::new(1, "Nowhere"));
        assert!(matches!(
            store.increment_vote(&phantom).await,
            Err(Error::NotFound(_))
        ));
    }
}
