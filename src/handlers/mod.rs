// src/handlers/mod.rs
use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::metrics::{HealthCounters, Outcome};

pub mod polls;
pub mod voters;
pub mod votes;

/// Parse a numeric path id, e.g. the `{id}` of `/votes/{id}`.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<u64, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("invalid {what} id {raw:?}"))
}

pub(crate) fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, String> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| rejection.body_text())
}

/// Count `result` on the health counters and pass it through.
pub(crate) fn counted<T, E>(health: &HealthCounters, result: Result<T, E>) -> Result<T, E> {
    health.record(match &result {
        Ok(_) => Outcome::Valid,
        Err(_) => Outcome::Error,
    });
    result
}
