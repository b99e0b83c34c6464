// src/routes.rs
use std::sync::Arc;

use axum::routing::{get, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::polls::{self, PollsState};
use crate::handlers::voters::{self, VotersState};
use crate::handlers::votes::{self, VotesState};

pub fn votes_routes(state: Arc<VotesState>) -> Router {
    let router = Router::new()
        .route("/", get(votes::list_votes))
        .route("/votes", get(votes::list_votes))
        .route("/votes/health", get(votes::health))
        .route("/votes/polls/{poll_id}", get(votes::votes_by_poll))
        .route("/votes/voters/{voter_id}", get(votes::votes_by_voter))
        .route(
            "/votes/{id}",
            get(votes::get_vote)
                .post(votes::cast_vote)
                .delete(votes::retract_vote),
        )
        .with_state(state);
    with_layers(router)
}

pub fn polls_routes(state: Arc<PollsState>) -> Router {
    let router = Router::new()
        .route("/", get(polls::list_polls))
        .route("/polls", get(polls::list_polls))
        .route("/polls/health", get(polls::health))
        .route("/polls/counts/{id}", put(polls::update_counts))
        .route("/polls/{id}/results", get(polls::get_results))
        .route(
            "/polls/{id}",
            get(polls::get_poll)
                .post(polls::create_poll)
                .put(polls::update_poll)
                .delete(polls::delete_poll),
        )
        .with_state(state);
    with_layers(router)
}

pub fn voters_routes(state: Arc<VotersState>) -> Router {
    let router = Router::new()
        .route("/", get(voters::list_voters))
        .route("/voters", get(voters::list_voters))
        .route("/voters/health", get(voters::health))
        .route(
            "/voters/{id}",
            get(voters::get_voter)
                .post(voters::create_voter)
                .put(voters::update_voter)
                .delete(voters::delete_voter),
        )
        .with_state(state);
    with_layers(router)
}

fn with_layers(router: Router) -> Router {
    router
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
}

