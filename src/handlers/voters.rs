// src/handlers/voters.rs
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;

use crate::errors::ApiError;
use crate::links::{LinkBuilder, VoterView};
use crate::metrics::{HealthCounters, HealthReport};
use crate::models::{Meta, Voter, VoterRequest};
use crate::store::{self, key_for, RecordStore, StoreError, VOTERS_PREFIX};

use super::{body, counted, parse_id};

pub struct VotersState {
    pub store: Arc<dyn RecordStore>,
    pub links: LinkBuilder,
    pub health: Arc<HealthCounters>,
}

impl VotersState {
    async fn load(&self, id: u64) -> Result<Voter, ApiError> {
        store::get_json(self.store.as_ref(), &key_for(VOTERS_PREFIX, id))
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => ApiError::NotFound(format!("voter {id}")),
                e => e.into(),
            })
    }

    async fn save(&self, voter: &mut Voter) -> Result<(), ApiError> {
        voter.normalize_total();
        store::set_json(self.store.as_ref(), &key_for(VOTERS_PREFIX, voter.id), voter).await?;
        Ok(())
    }
}

fn voter_id(raw: &str) -> Result<u64, ApiError> {
    parse_id(raw, "voter").map_err(ApiError::BadRequest)
}

fn voter_from(id: u64, request: VoterRequest, meta: Meta) -> Result<Voter, ApiError> {
    if let Some(body_id) = request.id {
        if body_id != id {
            return Err(ApiError::BadRequest(format!(
                "voter id {body_id} in body does not match {id} in path"
            )));
        }
    }
    Ok(Voter {
        id,
        name: request.name,
        email: request.email,
        total_votes: request.voter_polls.len() as u64,
        voter_polls: request.voter_polls,
        meta,
    })
}

pub async fn health(State(state): State<Arc<VotersState>>) -> Json<HealthReport> {
    Json(state.health.report())
}

pub async fn list_voters(
    State(state): State<Arc<VotersState>>,
) -> Result<Json<Vec<VoterView>>, ApiError> {
    let result = async {
        let mut voters: Vec<Voter> = store::load_all(state.store.as_ref(), VOTERS_PREFIX).await?;
        voters.sort_by_key(|voter| voter.id);
        Ok::<_, ApiError>(voters.into_iter().map(|voter| state.links.voter(voter)).collect())
    }
    .await;
    counted(&state.health, result).map(Json)
}

pub async fn get_voter(
    State(state): State<Arc<VotersState>>,
    Path(id): Path<String>,
) -> Result<Json<VoterView>, ApiError> {
    let result = async {
        let voter = state.load(voter_id(&id)?).await?;
        Ok::<_, ApiError>(state.links.voter(voter))
    }
    .await;
    counted(&state.health, result).map(Json)
}

pub async fn create_voter(
    State(state): State<Arc<VotersState>>,
    Path(id): Path<String>,
    payload: Result<Json<VoterRequest>, JsonRejection>,
) -> Result<Json<VoterView>, ApiError> {
    let result = async {
        let id = voter_id(&id)?;
        let request = body(payload).map_err(ApiError::BadRequest)?;
        let mut voter = voter_from(
            id,
            request,
            Meta {
                created_at: Some(Utc::now()),
                ..Meta::default()
            },
        )?;

        voter.normalize_total();
        store::create_json(state.store.as_ref(), &key_for(VOTERS_PREFIX, id), &voter)
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists { .. } => ApiError::Conflict(format!("voter {id}")),
                e => e.into(),
            })?;
        tracing::info!(voter_id = id, "Voter created");
        Ok::<_, ApiError>(state.links.voter(voter))
    }
    .await;
    counted(&state.health, result).map(Json)
}

/// Replace a voter, history included
pub async fn update_voter(
    State(state): State<Arc<VotersState>>,
    Path(id): Path<String>,
    payload: Result<Json<VoterRequest>, JsonRejection>,
) -> Result<Json<VoterView>, ApiError> {
    let result = async {
        let id = voter_id(&id)?;
        let request = body(payload).map_err(ApiError::BadRequest)?;
        let existing = state.load(id).await?;
        let mut voter = voter_from(
            id,
            request,
            Meta {
                created_at: existing.meta.created_at,
                updated_at: Some(Utc::now()),
                ..Meta::default()
            },
        )?;

        state.save(&mut voter).await?;
        tracing::debug!(voter_id = id, total_votes = voter.total_votes, "Voter updated");
        Ok::<_, ApiError>(state.links.voter(voter))
    }
    .await;
    counted(&state.health, result).map(Json)
}

pub async fn delete_voter(
    State(state): State<Arc<VotersState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = async {
        let id = voter_id(&id)?;
        state
            .store
            .delete(&key_for(VOTERS_PREFIX, id))
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => ApiError::NotFound(format!("voter {id}")),
                e => e.into(),
            })?;
        tracing::info!(voter_id = id, "Voter deleted");
        Ok::<_, ApiError>(serde_json::json!({ "message": "Voter deleted" }))
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

    use crate::routes::voters_routes;
    use crate::store::MemoryStore;

    fn app() -> Router {
        voters_routes(Arc::new(VotersState {
            store: Arc::new(MemoryStore::new()),
            links: LinkBuilder::new(
                "http://localhost:1082/polls",
                "http://localhost:1081/voters",
                "http://localhost:1080/votes",
            ),
            health: Arc::new(HealthCounters::new("Voters API")),
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

    fn history(entries: &[(u64, u64)]) -> Value {
        entries
            .iter()
            .map(|(poll_id, vote_id)| {
                json!({"pollId": poll_id, "voteId": vote_id, "votedAt": "2024-05-01T12:00:00Z"})
            })
            .collect()
    }

    #[tokio::test]
    async fn total_follows_history_on_every_write() {
        let app = app();
        let body = json!({
            "name": "Ada",
            "email": "ada@example.com",
            "voterPolls": history(&[(1, 100), (2, 101)]),
            "totalVotes": 42,
        });
        let (status, created) = send(&app, "POST", "/voters/5", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["totalVotes"], 2);
        assert_eq!(created["_links"]["votes"]["href"], "http://localhost:1080/votes/voters/5");

        let body = json!({
            "name": "Ada",
            "email": "ada@example.com",
            "voterPolls": history(&[(1, 100)]),
            "totalVotes": 0,
        });
        let (status, updated) = send(&app, "PUT", "/voters/5", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["totalVotes"], 1);
        assert_eq!(updated["_meta"]["createdAt"], created["_meta"]["createdAt"]);
        assert!(updated["_meta"]["updatedAt"].is_string());

        let (_, stored) = send(&app, "GET", "/voters/5", None).await;
        assert_eq!(stored["totalVotes"], 1);
        assert_eq!(stored["voterPolls"][0]["voteId"], 100);
    }

    #[tokio::test]
    async fn duplicates_missing_voters_and_mismatched_ids() {
        let app = app();
        let ada = json!({"name": "Ada", "email": "ada@example.com"});
        let (status, _) = send(&app, "POST", "/voters/5", Some(ada.clone())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, "POST", "/voters/5", Some(ada.clone())).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(&app, "PUT", "/voters/6", Some(ada.clone())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let mut mismatched = ada;
        mismatched["id"] = json!(7);
        let (status, _) = send(&app, "POST", "/voters/8", Some(mismatched)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "GET", "/voters/-1", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn listing_is_sorted_and_delete_removes() {
        let app = app();
        for id in [9, 3] {
            let body = json!({"name": format!("voter {id}"), "email": "v@example.com"});
            send(&app, "POST", &format!("/voters/{id}"), Some(body)).await;
        }

        let (status, voters) = send(&app, "GET", "/voters", None).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<u64> = voters
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![3, 9]);

        let (status, _) = send(&app, "DELETE", "/voters/3", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "GET", "/voters/3", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
