use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, ReturnDocument},
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::mongodb::Coll;

/// ID of the counter that allocates question IDs.
pub const QUESTION_ID_COUNTER: &str = "question_id";
/// ID of the counter that allocates choice IDs.
pub const CHOICE_ID_COUNTER: &str = "choice_id";

/// A counter object used to implement auto-increment fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    pub next: u32,
}

impl Counter {
    /// Create a new `Counter` with the given ID, starting at the given value.
    pub fn new(id: impl Into<String>, start: u32) -> Self {
        Self {
            id: id.into(),
            next: start,
        }
    }

    /// Atomically retrieve the next value of the counter with the given ID.
    pub async fn next(counters: &Coll<Counter>, id: &str) -> Result<u32> {
        let update = doc! {
            "$inc": { "next": 1 }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();
        let counter = counters
            .find_one_and_update(doc! { "_id": id }, update, options)
            .await?
            .ok_or_else(|| Error::not_found(format!("Counter with ID '{id}'")))?;
        Ok(counter.next)
    }
}

/// Ensure the question and choice ID counters exist, starting them at 1 if not.
///
/// This operation is idempotent.
pub async fn ensure_counters_exist(counters: &Coll<Counter>) -> Result<()> {
    for id in [QUESTION_ID_COUNTER, CHOICE_ID_COUNTER] {
        let existing = counters.find_one(doc! { "_id": id }, None).await?;
        if existing.is_none() {
            debug!("Creating counter '{id}'");
            counters.insert_one(Counter::new(id, 1), None).await?;
        }
    }
    Ok(())
}
