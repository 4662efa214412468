use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, DateTime as BsonDateTime},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
    Database,
};
use rocket::futures::TryStreamExt;

use crate::error::{Error, Result};
use crate::model::{
    common::{ChoiceId, QuestionId},
    db::{Choice, NewChoice, NewQuestion, Question},
    mongodb::{id_filter, Coll, Counter, CHOICE_ID_COUNTER, QUESTION_ID_COUNTER},
};

use super::QuestionStore;

/// A [`QuestionStore`] backed by MongoDB.
///
/// The database must already have its counters and indexes set up, see
/// [`crate::model::mongodb::ensure_counters_exist`] and
/// [`crate::model::mongodb::ensure_indexes_exist`].
#[derive(Clone)]
pub struct MongoStore {
    questions: Coll<Question>,
    choices: Coll<Choice>,
    counters: Coll<Counter>,
}

impl MongoStore {
    pub fn new(db: &Database) -> Self {
        Self {
            questions: Coll::from_db(db),
            choices: Coll::from_db(db),
            counters: Coll::from_db(db),
        }
    }

    fn newest_first() -> FindOptions {
        FindOptions::builder()
            .sort(doc! {"pub_date": -1, "_id": -1})
            .build()
    }
}

/// A filter matching questions published as of `now`.
fn published_filter(now: DateTime<Utc>) -> mongodb::bson::Document {
    doc! {
        "pub_date": { "$lte": BsonDateTime::from_chrono(now) },
    }
}

#[rocket::async_trait]
impl QuestionStore for MongoStore {
    async fn insert_question(&self, question: NewQuestion) -> Result<Question> {
        let id = Counter::next(&self.counters, QUESTION_ID_COUNTER).await?;
        let question = Question::new(id, question);
        self.questions.insert_one(&question, None).await?;
        Ok(question)
    }

    async fn insert_choice(&self, choice: NewChoice) -> Result<Choice> {
        let owner = self
            .questions
            .find_one(id_filter(choice.question_id), None)
            .await?;
        if owner.is_none() {
            return Err(Error::not_found(format!(
                "Question with ID '{}'",
                choice.question_id
            )));
        }

        let id = Counter::next(&self.counters, CHOICE_ID_COUNTER).await?;
        let choice = Choice::new(id, choice);
        self.choices.insert_one(&choice, None).await?;
        Ok(choice)
    }

    async fn all_questions(&self) -> Result<Vec<Question>> {
        let questions = self
            .questions
            .find(None, Self::newest_first())
            .await?
            .try_collect()
            .await?;
        Ok(questions)
    }

    async fn latest_published(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Question>> {
        // MongoDB reads a limit of 0 as "no limit".
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut options = Self::newest_first();
        options.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX));
        let questions = self
            .questions
            .find(published_filter(now), options)
            .await?
            .try_collect()
            .await?;
        Ok(questions)
    }

    async fn get_published(&self, id: QuestionId, now: DateTime<Utc>) -> Result<Question> {
        let mut filter = published_filter(now);
        filter.insert("_id", id);
        self.questions
            .find_one(filter, None)
            .await?
            .ok_or_else(|| Error::not_found(format!("Question with ID '{id}'")))
    }

    async fn choices(&self, question: &Question) -> Result<Vec<Choice>> {
        let options = FindOptions::builder().sort(doc! {"_id": 1}).build();
        let choices = self
            .choices
            .find(doc! {"question_id": question.id}, options)
            .await?
            .try_collect()
            .await?;
        Ok(choices)
    }

    async fn get_choice(&self, question: &Question, choice_id: ChoiceId) -> Result<Choice> {
        let filter = doc! {
            "_id": choice_id,
            "question_id": question.id,
        };
        self.choices.find_one(filter, None).await?.ok_or_else(|| {
            Error::not_found(format!(
                "Choice with ID '{choice_id}' for question '{}'",
                question.id
            ))
        })
    }

    async fn increment_vote(&self, choice: &Choice) -> Result<Choice> {
        let update = doc! {
            "$inc": { "votes": 1 }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        self.choices
            .find_one_and_update(id_filter(choice.id), update, options)
            .await?
            .ok_or_else(|| Error::not_found(format!("Choice with ID '{}'", choice.id)))
    }
}
