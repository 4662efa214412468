//! Persistence for questions and choices.
//!
//! Everything above this module talks to a [`QuestionStore`]; the concrete
//! backend is chosen at launch (see [`crate::config::StoreFairing`]).

use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rocket::{
    http::Status,
    request::{self, FromRequest, Request},
    State,
};

use crate::error::Result;
use crate::model::{
    common::{ChoiceId, QuestionId},
    db::{Choice, NewChoice, NewQuestion, Question},
};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// How many questions the public index lists.
pub const LATEST_LIMIT: usize = 5;

/// Storage for questions and their choices.
///
/// Reads that take a `now` apply the publication rules from
/// [`crate::policy`] relative to that instant.
#[rocket::async_trait]
pub trait QuestionStore: Send + Sync {
    /// Store a new question, allocating its ID.
    async fn insert_question(&self, question: NewQuestion) -> Result<Question>;

    /// Store a new choice, allocating its ID.
    /// Fails with `NotFound` if the owning question does not exist.
    async fn insert_choice(&self, choice: NewChoice) -> Result<Choice>;

    /// Every question, published or not, newest `pub_date` first.
    async fn all_questions(&self) -> Result<Vec<Question>>;

    /// Up to `limit` questions published as of `now`, newest `pub_date` first.
    async fn latest_published(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Question>>;

    /// The question with the given ID, if it is published as of `now`.
    /// Unpublished and nonexistent questions both fail with `NotFound`.
    async fn get_published(&self, id: QuestionId, now: DateTime<Utc>) -> Result<Question>;

    /// All choices belonging to the question, ordered by ID.
    async fn choices(&self, question: &Question) -> Result<Vec<Choice>>;

    /// The choice with the given ID, if it belongs to the question.
    async fn get_choice(&self, question: &Question, choice_id: ChoiceId) -> Result<Choice>;

    /// Atomically add one vote to the choice and return its updated state.
    async fn increment_vote(&self, choice: &Choice) -> Result<Choice>;
}

/// Shared handle on the configured [`QuestionStore`], kept in managed state.
#[derive(Clone)]
pub struct Store(Arc<dyn QuestionStore>);

impl Store {
    pub fn new(store: impl QuestionStore + 'static) -> Self {
        Self(Arc::new(store))
    }

    /// A store backed by a fresh, empty [`MemoryStore`].
    pub fn memory() -> Self {
        Self::new(MemoryStore::new())
    }
}

impl Deref for Store {
    type Target = dyn QuestionStore;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Store {
    type Error = ();

    /// Get the store from managed state.
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match req.guard::<&State<Store>>().await {
            request::Outcome::Success(store) => request::Outcome::Success(store.inner().clone()),
            _ => {
                error!("No store in managed state");
                request::Outcome::Failure((Status::InternalServerError, ()))
            }
        }
    }
}
