use chrono::Utc;
use rocket::{response::status::Created, serde::json::Json, Route};

use crate::error::Result;
use crate::model::{
    api::{
        admin::{AdminQuestion, ChoiceSpec, QuestionSpec},
        auth::AdminToken,
        question::ChoiceResult,
    },
    common::QuestionId,
    db::{NewChoice, Question},
};
use crate::store::Store;

pub fn routes() -> Vec<Route> {
    routes![get_questions, create_question, create_choice]
}

#[get("/admin/questions")]
async fn get_questions(_token: AdminToken, store: Store) -> Result<Json<Vec<AdminQuestion>>> {
    let now = Utc::now();
    let mut described = Vec::new();
    for question in store.all_questions().await? {
        let choices = store.choices(&question).await?;
        described.push(AdminQuestion::new(question, choices, now));
    }
    Ok(Json(described))
}

/// Create a question and its initial choices.
///
/// Nothing here is transactional: the question is stored first, then each
/// choice. If storing a choice fails, the question is left in place with the
/// choices stored so far, and those are logged.
#[post("/admin/questions", data = "<spec>", format = "json")]
async fn create_question(
    _token: AdminToken,
    spec: Json<QuestionSpec>,
    store: Store,
) -> Result<Created<Json<AdminQuestion>>> {
    let now = Utc::now();
    let (new_question, choice_texts) = spec.0.into_question(now)?;

    let question = store.insert_question(new_question).await?;
    let total = choice_texts.len();
    let mut choices = Vec::with_capacity(total);
    for text in choice_texts {
        match store.insert_choice(NewChoice::new(question.id, text)).await {
            Ok(choice) => choices.push(choice),
            Err(e) => {
                let stored: Vec<_> = choices.iter().map(|c| c.id).collect();
                error!(
                    "Question {} left with {} of {total} choices {stored:?} after a failed insert",
                    question.id,
                    choices.len()
                );
                return Err(e);
            }
        }
    }
    info!(
        "Created question {} with {} choices, published {}",
        question.id,
        choices.len(),
        question.pub_date
    );

    Ok(created(&question).body(Json(AdminQuestion::new(question, choices, now))))
}

#[post("/admin/questions/<question_id>/choices", data = "<spec>", format = "json")]
async fn create_choice(
    _token: AdminToken,
    question_id: QuestionId,
    spec: Json<ChoiceSpec>,
    store: Store,
) -> Result<Created<Json<ChoiceResult>>> {
    let choice = store.insert_choice(spec.0.into_choice(question_id)?).await?;
    info!("Created choice {} for question {question_id}", choice.id);

    let location = uri!(crate::api::polls::results(question_id)).to_string();
    Ok(Created::new(location).body(Json(choice.into())))
}

/// A `201 Created` pointing at the public view of the question.
fn created(question: &Question) -> Created<Json<AdminQuestion>> {
    Created::new(uri!(crate::api::polls::detail(question.id)).to_string())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rocket::{
        http::{ContentType, Header, Status},
        local::asynchronous::Client,
        serde::json::{json, serde_json},
    };

    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::DateTime;
    use mongodb::error::Error as DbError;

    use super::*;
    use crate::config::TEST_ADMIN_TOKEN;
    use crate::model::{
        common::ChoiceId,
        db::{Choice, NewQuestion},
    };
    use crate::store::QuestionStore;

    fn auth() -> Header<'static> {
        Header::new("Authorization", format!("Bearer {TEST_ADMIN_TOKEN}"))
    }

    #[backend_test]
    async fn create_question_with_choices(client: Client, store: Store) {
        let spec = json!({
            "question_text": "Who is the best course director?",
            "choices": ["Freddy", "Nicolas"],
        });
        let response = client
            .post(uri!(create_question))
            .header(ContentType::JSON)
            .header(auth())
            .body(spec.to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());

        let raw_response = response.into_string().await.unwrap();
        let created: AdminQuestion = serde_json::from_str(&raw_response).unwrap();
        assert_eq!(created.question_text, "Who is the best course director?");
        assert!(created.published);
        assert!(created.was_published_recently);
        let texts: Vec<_> = created.choices.iter().map(|c| c.choice_text.as_str()).collect();
        assert_eq!(texts, vec!["Freddy", "Nicolas"]);
        assert!(created.choices.iter().all(|c| c.votes == 0));

        // It is immediately visible to the public.
        let question = store.get_published(created.id, Utc::now()).await.unwrap();
        assert_eq!(store.choices(&question).await.unwrap().len(), 2);
    }

    #[backend_test]
    async fn create_future_question(client: Client, store: Store) {
        let pub_date = Utc::now() + Duration::days(30);
        let spec = json!({
            "question_text": "Not yet",
            "pub_date": pub_date,
        });
        let response = client
            .post(uri!(create_question))
            .header(ContentType::JSON)
            .header(auth())
            .body(spec.to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());

        let raw_response = response.into_string().await.unwrap();
        let created: AdminQuestion = serde_json::from_str(&raw_response).unwrap();
        assert!(!created.published);
        assert!(!created.was_published_recently);
        assert!(store.get_published(created.id, Utc::now()).await.is_err());
    }

    #[backend_test]
    async fn create_blank_question(client: Client, store: Store) {
        let spec = json!({ "question_text": "   " });
        let response = client
            .post(uri!(create_question))
            .header(ContentType::JSON)
            .header(auth())
            .body(spec.to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        assert!(store.all_questions().await.unwrap().is_empty());
    }

    #[backend_test]
    async fn admin_requires_token(client: Client, store: Store) {
        let spec = json!({ "question_text": "Sneaky" });
        let response = client
            .post(uri!(create_question))
            .header(ContentType::JSON)
            .body(spec.to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());

        let response = client
            .get(uri!(get_questions))
            .header(Header::new("Authorization", "Bearer wrong"))
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());

        assert!(store.all_questions().await.unwrap().is_empty());
    }

    #[backend_test]
    async fn list_includes_unpublished(client: Client, store: Store) {
        let past = store
            .insert_question(NewQuestion::example("Past", -2))
            .await
            .unwrap();
        let future = store
            .insert_question(NewQuestion::example("Future", 2))
            .await
            .unwrap();

        let response = client
            .get(uri!(get_questions))
            .header(auth())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let raw_response = response.into_string().await.unwrap();
        let listed: Vec<AdminQuestion> = serde_json::from_str(&raw_response).unwrap();
        let summary: Vec<_> = listed.iter().map(|q| (q.id, q.published)).collect();
        assert_eq!(summary, vec![(future.id, false), (past.id, true)]);
    }

    #[backend_test]
    async fn add_choice(client: Client, store: Store) {
        let question = store
            .insert_question(NewQuestion::example("Question", -1))
            .await
            .unwrap();

        let response = client
            .post(uri!(create_choice(question.id)))
            .header(ContentType::JSON)
            .header(auth())
            .body(json!({ "choice_text": "Maybe" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());

        let raw_response = response.into_string().await.unwrap();
        let created: ChoiceResult = serde_json::from_str(&raw_response).unwrap();
        assert_eq!(created.choice_text, "Maybe");
        assert_eq!(created.votes, 0);
        assert_eq!(
            store.get_choice(&question, created.id).await.unwrap().choice_text,
            "Maybe"
        );
    }

    #[backend_test]
    async fn add_choice_to_missing_question(client: Client) {
        let response = client
            .post(uri!(create_choice(404)))
            .header(ContentType::JSON)
            .header(auth())
            .body(json!({ "choice_text": "Orphan" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }

    /// A memory store whose database connection drops after `allowed` choice inserts.
    struct ChoiceOutage {
        inner: Store,
        allowed: AtomicUsize,
    }

    #[rocket::async_trait]
    impl QuestionStore for ChoiceOutage {
        async fn insert_question(&self, question: NewQuestion) -> crate::error::Result<Question> {
            self.inner.insert_question(question).await
        }

        async fn insert_choice(&self, choice: NewChoice) -> crate::error::Result<Choice> {
            let remaining = self
                .allowed
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if remaining.is_err() {
                let e = io::Error::new(io::ErrorKind::ConnectionReset, "connection reset");
                return Err(DbError::from(e).into());
            }
            self.inner.insert_choice(choice).await
        }

        async fn all_questions(&self) -> crate::error::Result<Vec<Question>> {
            self.inner.all_questions().await
        }

        async fn latest_published(
            &self,
            limit: usize,
            now: DateTime<Utc>,
        ) -> crate::error::Result<Vec<Question>> {
            self.inner.latest_published(limit, now).await
        }

        async fn get_published(
            &self,
            id: QuestionId,
            now: DateTime<Utc>,
        ) -> crate::error::Result<Question> {
            self.inner.get_published(id, now).await
        }

        async fn choices(&self, question: &Question) -> crate::error::Result<Vec<Choice>> {
            self.inner.choices(question).await
        }

        async fn get_choice(
            &self,
            question: &Question,
            choice_id: ChoiceId,
        ) -> crate::error::Result<Choice> {
            self.inner.get_choice(question, choice_id).await
        }

        async fn increment_vote(&self, choice: &Choice) -> crate::error::Result<Choice> {
            self.inner.increment_vote(choice).await
        }
    }

    #[rocket::async_test]
    async fn failed_choice_leaves_partial_question() {
        let memory = Store::memory();
        let outage = ChoiceOutage {
            inner: memory.clone(),
            allowed: AtomicUsize::new(1),
        };
        let figment = rocket::Config::figment().merge(("admin_token", TEST_ADMIN_TOKEN));
        let client = Client::tracked(crate::rocket_for_store(figment, Store::new(outage)))
            .await
            .unwrap();

        let spec = json!({
            "question_text": "Half built?",
            "choices": ["Yes", "No", "Maybe"],
        });
        let response = client
            .post(uri!(create_question))
            .header(ContentType::JSON)
            .header(auth())
            .body(spec.to_string())
            .dispatch()
            .await;
        assert_eq!(Status::InternalServerError, response.status());

        let questions = memory.all_questions().await.unwrap();
        assert_eq!(questions.len(), 1);
        let choices = memory.choices(&questions[0]).await.unwrap();
        let texts: Vec<_> = choices.iter().map(|c| c.choice_text.as_str()).collect();
        assert_eq!(texts, vec!["Yes"]);
    }
}
