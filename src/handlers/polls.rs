// src/handlers/polls.rs
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;

use crate::errors::ApiError;
use crate::links::{LinkBuilder, PollResultsView, PollView};
use crate::metrics::{HealthCounters, HealthReport};
use crate::models::{Meta, Poll, PollRequest};
use crate::store::{self, key_for, RecordStore, StoreError, POLLS_PREFIX};

use super::{body, counted, parse_id};

pub struct PollsState {
    pub store: Arc<dyn RecordStore>,
    pub links: LinkBuilder,
    pub health: Arc<HealthCounters>,
}

impl PollsState {
    async fn load(&self, id: u64) -> Result<Poll, ApiError> {
        store::get_json(self.store.as_ref(), &key_for(POLLS_PREFIX, id))
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => ApiError::NotFound(format!("poll {id}")),
                e => e.into(),
            })
    }

    async fn save(&self, poll: &mut Poll) -> Result<(), ApiError> {
        poll.refresh_total();
        store::set_json(self.store.as_ref(), &key_for(POLLS_PREFIX, poll.id), poll).await?;
        Ok(())
    }
}

fn poll_id(raw: &str) -> Result<u64, ApiError> {
    parse_id(raw, "poll").map_err(ApiError::BadRequest)
}

fn check_body_id(path_id: u64, body_id: Option<u64>) -> Result<(), ApiError> {
    match body_id {
        Some(body_id) if body_id != path_id => Err(ApiError::BadRequest(format!(
            "poll id {body_id} in body does not match {path_id} in path"
        ))),
        _ => Ok(()),
    }
}

pub async fn health(State(state): State<Arc<PollsState>>) -> Json<HealthReport> {
    Json(state.health.report())
}

pub async fn list_polls(
    State(state): State<Arc<PollsState>>,
) -> Result<Json<Vec<PollView>>, ApiError> {
    let result = async {
        let mut polls: Vec<Poll> = store::load_all(state.store.as_ref(), POLLS_PREFIX).await?;
        polls.sort_by_key(|poll| poll.id);
        Ok::<_, ApiError>(polls.into_iter().map(|poll| state.links.poll(poll)).collect())
    }
    .await;
    counted(&state.health, result).map(Json)
}

pub async fn get_poll(
    State(state): State<Arc<PollsState>>,
    Path(id): Path<String>,
) -> Result<Json<PollView>, ApiError> {
    let result = async {
        let poll = state.load(poll_id(&id)?).await?;
        Ok::<_, ApiError>(state.links.poll(poll))
    }
    .await;
    counted(&state.health, result).map(Json)
}

/// Tally of a poll without its question and options
pub async fn get_results(
    State(state): State<Arc<PollsState>>,
    Path(id): Path<String>,
) -> Result<Json<PollResultsView>, ApiError> {
    let result = async {
        let poll = state.load(poll_id(&id)?).await?;
        Ok::<_, ApiError>(state.links.poll_results(poll))
    }
    .await;
    counted(&state.health, result).map(Json)
}

/// Create a poll; its results start at zero for every option
pub async fn create_poll(
    State(state): State<Arc<PollsState>>,
    Path(id): Path<String>,
    payload: Result<Json<PollRequest>, JsonRejection>,
) -> Result<Json<PollView>, ApiError> {
    let result = async {
        let id = poll_id(&id)?;
        let request = body(payload).map_err(ApiError::BadRequest)?;
        check_body_id(id, request.id)?;

        let mut poll = Poll {
            id,
            title: request.title,
            question: request.question,
            options: request.options,
            results: Vec::new(),
            meta: Meta {
                created_at: Some(Utc::now()),
                ..Meta::default()
            },
        };
        poll.reset_results();
        poll.refresh_total();
        store::create_json(state.store.as_ref(), &key_for(POLLS_PREFIX, id), &poll)
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists { .. } => ApiError::Conflict(format!("poll {id}")),
                e => e.into(),
            })?;
        tracing::info!(poll_id = id, options = poll.options.len(), "Poll created");
        Ok::<_, ApiError>(state.links.poll(poll))
    }
    .await;
    counted(&state.health, result).map(Json)
}

/// Replace a poll's title, question and options. This resets the tally.
pub async fn update_poll(
    State(state): State<Arc<PollsState>>,
    Path(id): Path<String>,
    payload: Result<Json<PollRequest>, JsonRejection>,
) -> Result<Json<PollView>, ApiError> {
    let result = async {
        let id = poll_id(&id)?;
        let request = body(payload).map_err(ApiError::BadRequest)?;
        check_body_id(id, request.id)?;
        let existing = state.load(id).await?;

        let mut poll = Poll {
            id,
            title: request.title,
            question: request.question,
            options: request.options,
            results: Vec::new(),
            meta: Meta {
                created_at: existing.meta.created_at,
                updated_at: Some(Utc::now()),
                ..Meta::default()
            },
        };
        poll.reset_results();
        state.save(&mut poll).await?;
        tracing::info!(poll_id = id, "Poll replaced; tally reset");
        Ok::<_, ApiError>(state.links.poll(poll))
    }
    .await;
    counted(&state.health, result).map(Json)
}

/// Overwrite only the vote counts of a poll. The submitted results must line
/// up with the stored options.
pub async fn update_counts(
    State(state): State<Arc<PollsState>>,
    Path(id): Path<String>,
    payload: Result<Json<Poll>, JsonRejection>,
) -> Result<Json<PollView>, ApiError> {
    let result = async {
        let id = poll_id(&id)?;
        let submitted = body(payload).map_err(ApiError::BadRequest)?;
        check_body_id(id, Some(submitted.id))?;
        let mut poll = state.load(id).await?;

        let aligned = submitted.results.len() == poll.options.len()
            && submitted
                .results
                .iter()
                .zip(&poll.options)
                .all(|(result, option)| result.option_id == option.id);
        if !aligned {
            return Err(ApiError::BadRequest(format!(
                "results do not match the options of poll {id}"
            )));
        }

        poll.results = submitted.results;
        poll.meta.updated_at = Some(Utc::now());
        state.save(&mut poll).await?;
        tracing::debug!(poll_id = id, total = poll.total_votes(), "Poll counts updated");
        Ok::<_, ApiError>(state.links.poll(poll))
    }
    .await;
    counted(&state.health, result).map(Json)
}

pub async fn delete_poll(
    State(state): State<Arc<PollsState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = async {
        let id = poll_id(&id)?;
        state
            .store
            .delete(&key_for(POLLS_PREFIX, id))
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => ApiError::NotFound(format!("poll {id}")),
                e => e.into(),
            })?;
        tracing::info!(poll_id = id, "Poll deleted");
        Ok::<_, ApiError>(serde_json::json!({ "message": "Poll deleted" }))
    }
    .await;
    counted(&state.health, result).map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::routes::polls_routes;
    use crate::store::MemoryStore;

    fn app() -> Router {
        polls_routes(Arc::new(PollsState {
            store: Arc::new(MemoryStore::new()),
            links: LinkBuilder::new(
                "http://localhost:1082/polls",
                "http://localhost:1081/voters",
                "http://localhost:1080/votes",
            ),
            health: Arc::new(HealthCounters::new("Polls API")),
        }))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn lunch() -> Value {
        json!({
            "title": "Lunch",
            "question": "Pizza or tacos?",
            "options": [{"id": 0, "text": "Pizza"}, {"id": 1, "text": "Tacos"}],
        })
    }

    fn votes(poll: &Value) -> Vec<u64> {
        poll["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["votes"].as_u64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn create_starts_at_zero_and_refuses_duplicates() {
        let app = app();
        let (status, poll) = send(&app, "POST", "/polls/1", Some(lunch())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(votes(&poll), vec![0, 0]);
        assert_eq!(poll["_meta"]["totalVotes"], 0);
        assert!(poll["_meta"]["createdAt"].is_string());
        assert_eq!(poll["_links"]["self"]["href"], "http://localhost:1082/polls/1");

        let (status, body) = send(&app, "POST", "/polls/1", Some(lunch())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn counts_update_must_line_up_with_options() {
        let app = app();
        send(&app, "POST", "/polls/1", Some(lunch())).await;

        let counts = json!({
            "id": 1,
            "results": [{"optionId": 0, "votes": 2}, {"optionId": 1, "votes": 3}],
        });
        let (status, poll) = send(&app, "PUT", "/polls/counts/1", Some(counts)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(votes(&poll), vec![2, 3]);
        assert_eq!(poll["_meta"]["totalVotes"], 5);
        assert_eq!(poll["question"], "Pizza or tacos?");
        assert!(poll["_meta"]["updatedAt"].is_string());

        for results in [
            json!([{"optionId": 0, "votes": 9}]),
            json!([{"optionId": 1, "votes": 9}, {"optionId": 0, "votes": 9}]),
        ] {
            let body = json!({"id": 1, "results": results});
            let (status, _) = send(&app, "PUT", "/polls/counts/1", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }

        let (_, poll) = send(&app, "GET", "/polls/1", None).await;
        assert_eq!(votes(&poll), vec![2, 3]);

        let (status, _) = send(
            &app,
            "PUT",
            "/polls/counts/9",
            Some(json!({"id": 9, "results": []})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn full_update_resets_tally_and_keeps_creation_time() {
        let app = app();
        let (_, created) = send(&app, "POST", "/polls/1", Some(lunch())).await;
        let counts = json!({
            "id": 1,
            "results": [{"optionId": 0, "votes": 4}, {"optionId": 1, "votes": 1}],
        });
        send(&app, "PUT", "/polls/counts/1", Some(counts)).await;

        let replacement = json!({
            "title": "Lunch",
            "question": "Which one?",
            "options": [
                {"id": 0, "text": "Pizza"},
                {"id": 1, "text": "Tacos"},
                {"id": 2, "text": "Soup"},
            ],
        });
        let (status, poll) = send(&app, "PUT", "/polls/1", Some(replacement)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(votes(&poll), vec![0, 0, 0]);
        assert_eq!(poll["results"][2]["optionId"], 2);
        assert_eq!(poll["_meta"]["totalVotes"], 0);
        assert_eq!(poll["_meta"]["createdAt"], created["_meta"]["createdAt"]);
        assert!(poll["_meta"]["updatedAt"].is_string());

        let (status, _) = send(&app, "PUT", "/polls/7", Some(lunch())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ids_in_path_and_body_are_checked() {
        let app = app();
        let mut body = lunch();
        body["id"] = json!(3);
        let (status, _) = send(&app, "POST", "/polls/2", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "GET", "/polls/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "POST", "/polls/2", Some(json!({"options": "none"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn results_view_delete_and_health() {
        let app = app();
        send(&app, "POST", "/polls/1", Some(lunch())).await;

        let (status, results) = send(&app, "GET", "/polls/1/results", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(votes(&results), vec![0, 0]);
        assert!(results.get("question").is_none());
        assert_eq!(
            results["_links"]["results"]["href"],
            "http://localhost:1082/polls/1/results"
        );

        let (status, _) = send(&app, "DELETE", "/polls/1", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "GET", "/polls/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "DELETE", "/polls/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, health) = send(&app, "GET", "/polls/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["api"], "Polls API");
        assert_eq!(health["totalValidCalls"], 3);
        assert_eq!(health["totalCallsWithErrors"], 2);
    }
}
