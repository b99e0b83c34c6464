// src/handlers/votes.rs
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;

use crate::coordinator::VoteCoordinator;
use crate::errors::VoteError;
use crate::links::VoteView;
use crate::metrics::{HealthCounters, HealthReport, Outcome};
use crate::models::VoteRequest;

use super::{body, parse_id};

pub struct VotesState {
    pub coordinator: VoteCoordinator,
    pub health: Arc<HealthCounters>,
}

impl VotesState {
    /// Requests rejected before they reach the coordinator are counted here.
    fn reject(&self, message: String) -> VoteError {
        self.health.record(Outcome::Error);
        VoteError::BadRequest(message)
    }

    fn id(&self, raw: &str, what: &str) -> Result<u64, VoteError> {
        parse_id(raw, what).map_err(|message| self.reject(message))
    }
}

pub async fn health(State(state): State<Arc<VotesState>>) -> Json<HealthReport> {
    Json(state.health.report())
}

/// List every vote with its current voter and poll
pub async fn list_votes(
    State(state): State<Arc<VotesState>>,
) -> Result<Json<Vec<VoteView>>, VoteError> {
    Ok(Json(state.coordinator.list().await?))
}

pub async fn get_vote(
    State(state): State<Arc<VotesState>>,
    Path(id): Path<String>,
) -> Result<Json<VoteView>, VoteError> {
    let id = state.id(&id, "vote")?;
    Ok(Json(state.coordinator.get(id).await?))
}

pub async fn votes_by_poll(
    State(state): State<Arc<VotesState>>,
    Path(poll_id): Path<String>,
) -> Result<Json<Vec<VoteView>>, VoteError> {
    let poll_id = state.id(&poll_id, "poll")?;
    Ok(Json(state.coordinator.list_by_poll(poll_id).await?))
}

pub async fn votes_by_voter(
    State(state): State<Arc<VotesState>>,
    Path(voter_id): Path<String>,
) -> Result<Json<Vec<VoteView>>, VoteError> {
    let voter_id = state.id(&voter_id, "voter")?;
    Ok(Json(state.coordinator.list_by_voter(voter_id).await?))
}

/// Cast a vote
pub async fn cast_vote(
    State(state): State<Arc<VotesState>>,
    Path(id): Path<String>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<VoteView>, VoteError> {
    let id = state.id(&id, "vote")?;
    let request = body(payload).map_err(|message| state.reject(message))?;
    Ok(Json(state.coordinator.cast(id, request).await?))
}

/// Retract a vote, undoing its tally and history entry
pub async fn retract_vote(
    State(state): State<Arc<VotesState>>,
    Path(id): Path<String>,
) -> Result<Json<VoteView>, VoteError> {
    let id = state.id(&id, "vote")?;
    Ok(Json(state.coordinator.retract(id).await?))
}
