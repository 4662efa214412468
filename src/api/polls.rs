use chrono::Utc;
use rocket::{form::Form, response::Redirect, serde::json::Json, Route};

use crate::error::Result;
use crate::model::{
    api::{
        question::{QuestionDetail, QuestionResults, QuestionSummary},
        vote::VoteForm,
    },
    common::QuestionId,
};
use crate::store::{Store, LATEST_LIMIT};
use crate::workflow::{cast_vote, VoteOutcome};

pub fn routes() -> Vec<Route> {
    routes![index, detail, results, vote]
}

#[get("/polls")]
pub async fn index(store: Store) -> Result<Json<Vec<QuestionSummary>>> {
    let now = Utc::now();
    let questions = store
        .latest_published(LATEST_LIMIT, now)
        .await?
        .into_iter()
        .map(|question| QuestionSummary::new(question, now))
        .collect();
    Ok(Json(questions))
}

#[get("/polls/<question_id>")]
pub async fn detail(question_id: QuestionId, store: Store) -> Result<Json<QuestionDetail>> {
    let question = store.get_published(question_id, Utc::now()).await?;
    let choices = store.choices(&question).await?;
    Ok(Json(QuestionDetail::new(question, choices)))
}

#[get("/polls/<question_id>/results")]
pub async fn results(question_id: QuestionId, store: Store) -> Result<Json<QuestionResults>> {
    let question = store.get_published(question_id, Utc::now()).await?;
    let choices = store.choices(&question).await?;
    Ok(Json(QuestionResults::new(question, choices)))
}

/// Either where to go after a counted vote, or the question to show again.
#[derive(Debug, Responder)]
pub enum VoteResponse {
    Recorded(Redirect),
    Rejected(Json<QuestionDetail>),
}

#[post("/polls/<question_id>/vote", data = "<vote>")]
pub async fn vote(
    question_id: QuestionId,
    vote: Form<VoteForm>,
    store: Store,
) -> Result<VoteResponse> {
    let outcome = cast_vote(&*store, question_id, vote.choice, Utc::now()).await?;
    Ok(match outcome {
        VoteOutcome::Recorded { question_id, .. } => {
            VoteResponse::Recorded(Redirect::to(uri!(results(question_id))))
        }
        VoteOutcome::Rejected {
            question,
            choices,
            error_message,
        } => VoteResponse::Rejected(Json(
            QuestionDetail::new(question, choices).with_error(error_message),
        )),
    })
}
