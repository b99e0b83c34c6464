// src/services.rs
//! HTTP access to the sibling poll and voter services.

use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::models::{Poll, PollId, Voter, VoterId};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{url} not found")]
    NotFound { url: String },

    #[error("transport error calling {url}: {message}")]
    Transport { url: String, message: String },

    #[error("{url} answered {status}: {body}")]
    UnexpectedStatus {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

#[async_trait]
pub trait AggregateClient: Send + Sync {
    async fn get_poll(&self, id: PollId) -> Result<Poll, RemoteError>;
    /// Writes back only the tally of `poll` (`PUT /polls/counts/{id}`).
    async fn put_poll_counts(&self, poll: &Poll) -> Result<Poll, RemoteError>;
    async fn get_voter(&self, id: VoterId) -> Result<Voter, RemoteError>;
    async fn put_voter(&self, voter: &Voter) -> Result<Voter, RemoteError>;
}

pub struct HttpAggregateClient {
    client: reqwest::Client,
    polls_url: String,
    voters_url: String,
}

impl HttpAggregateClient {
    pub fn new(
        polls_url: impl Into<String>,
        voters_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            polls_url: trim_base(polls_url.into()),
            voters_url: trim_base(voters_url.into()),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, RemoteError> {
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport(&url, e))?;
        decode(url, resp).await
    }

    async fn put_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        url: String,
        body: &B,
    ) -> Result<T, RemoteError> {
        let resp = self
            .client
            .put(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport(&url, e))?;
        decode(url, resp).await
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn transport(url: &str, err: reqwest::Error) -> RemoteError {
    RemoteError::Transport {
        url: url.to_string(),
        message: err.to_string(),
    }
}

async fn decode<T: DeserializeOwned>(url: String, resp: reqwest::Response) -> Result<T, RemoteError> {
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Err(RemoteError::NotFound { url });
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(RemoteError::UnexpectedStatus { url, status, body });
    }

    let bytes = resp.bytes().await.map_err(|e| transport(&url, e))?;
    serde_json::from_slice(&bytes).map_err(|e| RemoteError::Decode {
        url,
        message: e.to_string(),
    })
}

#[async_trait]
impl AggregateClient for HttpAggregateClient {
    async fn get_poll(&self, id: PollId) -> Result<Poll, RemoteError> {
        let url = format!("{}/{}", self.polls_url, id);
        tracing::debug!(%url, "Fetching poll");
        self.get_json(url).await
    }

    async fn put_poll_counts(&self, poll: &Poll) -> Result<Poll, RemoteError> {
        let url = format!("{}/counts/{}", self.polls_url, poll.id);
        tracing::debug!(%url, "Updating poll counts");
        self.put_json(url, poll).await
    }

    async fn get_voter(&self, id: VoterId) -> Result<Voter, RemoteError> {
        let url = format!("{}/{}", self.voters_url, id);
        tracing::debug!(%url, "Fetching voter");
        self.get_json(url).await
    }

    async fn put_voter(&self, voter: &Voter) -> Result<Voter, RemoteError> {
        let url = format!("{}/{}", self.voters_url, voter.id);
        tracing::debug!(%url, "Updating voter");
        self.put_json(url, voter).await
    }
}
