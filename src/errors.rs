// src/errors.rs
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::poll::InvalidVote;
use crate::services::RemoteError;
use crate::store::StoreError;

/// Which sibling aggregate a remote failure concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    Poll,
    Voter,
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dependency::Poll => write!(f, "poll"),
            Dependency::Voter => write!(f, "voter"),
        }
    }
}

#[derive(Debug, Error)]
pub enum VoteError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("vote {0} already exists")]
    DuplicateId(u64),

    #[error("vote {0} not found")]
    NotFound(u64),

    #[error(transparent)]
    InvalidVoteValue(#[from] InvalidVote),

    #[error("{dependency} service unavailable: {source}")]
    DependencyUnavailable {
        dependency: Dependency,
        #[source]
        source: RemoteError,
    },

    #[error("{dependency} {id} not found")]
    DependencyNotFound { dependency: Dependency, id: u64 },

    #[error("could not update {dependency}: {source}")]
    DependencyUpdateFailed {
        dependency: Dependency,
        #[source]
        source: RemoteError,
    },

    #[error("could not write vote record: {0}")]
    StoreWriteFailed(#[source] StoreError),

    #[error("could not read vote records: {0}")]
    StoreReadFailed(#[source] StoreError),
}

impl VoteError {
    /// Map a failed GET on a sibling aggregate.
    pub fn from_fetch(dependency: Dependency, id: u64, err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound { .. } => VoteError::DependencyNotFound { dependency, id },
            source => VoteError::DependencyUnavailable { dependency, source },
        }
    }

    pub fn from_update(dependency: Dependency, err: RemoteError) -> Self {
        VoteError::DependencyUpdateFailed {
            dependency,
            source: err,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            VoteError::BadRequest(_) => StatusCode::BAD_REQUEST,
            VoteError::DuplicateId(_) => StatusCode::CONFLICT,
            VoteError::NotFound(_) => StatusCode::NOT_FOUND,
            VoteError::InvalidVoteValue(_) => StatusCode::BAD_REQUEST,
            VoteError::DependencyUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            VoteError::DependencyNotFound { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            VoteError::DependencyUpdateFailed { .. } => StatusCode::BAD_GATEWAY,
            VoteError::StoreWriteFailed(_) | VoteError::StoreReadFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short stable name used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            VoteError::BadRequest(_) => "bad_request",
            VoteError::DuplicateId(_) => "duplicate_id",
            VoteError::NotFound(_) => "not_found",
            VoteError::InvalidVoteValue(_) => "invalid_vote_value",
            VoteError::DependencyUnavailable { .. } => "dependency_unavailable",
            VoteError::DependencyNotFound { .. } => "dependency_not_found",
            VoteError::DependencyUpdateFailed { .. } => "dependency_update_failed",
            VoteError::StoreWriteFailed(_) => "store_write_failed",
            VoteError::StoreReadFailed(_) => "store_read_failed",
        }
    }
}

impl IntoResponse for VoteError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Errors of the plain CRUD surfaces (polls and voters).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::AlreadyExists { .. }) => StatusCode::CONFLICT,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
