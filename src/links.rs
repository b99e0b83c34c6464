// src/links.rs
//! HAL-style response projections.
//!
//! Stored records never carry links. Handlers wrap them in one of the view
//! types below right before serializing a response.

use serde::{Deserialize, Serialize};

use crate::models::{Poll, PollId, Vote, Voter, VoterId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
}

impl Link {
    fn new(href: String) -> Self {
        Self { href }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteLinks {
    #[serde(rename = "self")]
    pub this: Link,
    pub poll: Link,
    pub voter: Link,
    pub results: Link,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedded {
    pub voter: Voter,
    pub poll: Poll,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteView {
    #[serde(flatten)]
    pub vote: Vote,
    #[serde(rename = "_links")]
    pub links: VoteLinks,
    #[serde(rename = "_embedded")]
    pub embedded: Embedded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollLinks {
    #[serde(rename = "self")]
    pub this: Link,
    pub results: Link,
    pub votes: Link,
    pub voters: Link,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollView {
    #[serde(flatten)]
    pub poll: Poll,
    #[serde(rename = "_links")]
    pub links: PollLinks,
}

/// Body of `GET /polls/{id}/results`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResultsView {
    pub results: Vec<crate::models::PollResult>,
    #[serde(rename = "_meta")]
    pub meta: crate::models::Meta,
    #[serde(rename = "_links")]
    pub links: PollLinks,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoterLinks {
    #[serde(rename = "self")]
    pub this: Link,
    pub polls: Link,
    pub votes: Link,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoterView {
    #[serde(flatten)]
    pub voter: Voter,
    #[serde(rename = "_links")]
    pub links: VoterLinks,
}

/// Base URLs of the three services.
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    polls: String,
    voters: String,
    votes: String,
}

impl LinkBuilder {
    /// `polls` and `voters` are collection URLs (`http://host:1082/polls`),
    /// `votes` likewise (`http://host:1080/votes`).
    pub fn new(polls: &str, voters: &str, votes: &str) -> Self {
        Self {
            polls: polls.trim_end_matches('/').to_string(),
            voters: voters.trim_end_matches('/').to_string(),
            votes: votes.trim_end_matches('/').to_string(),
        }
    }

    pub fn poll_url(&self, id: PollId) -> String {
        format!("{}/{}", self.polls, id)
    }

    pub fn voter_url(&self, id: VoterId) -> String {
        format!("{}/{}", self.voters, id)
    }

    pub fn vote(&self, vote: Vote, voter: Voter, poll: Poll) -> VoteView {
        let links = VoteLinks {
            this: Link::new(format!("{}/{}", self.votes, vote.id)),
            poll: Link::new(self.poll_url(vote.poll_id)),
            voter: Link::new(self.voter_url(vote.voter_id)),
            results: Link::new(format!("{}/results", self.poll_url(vote.poll_id))),
        };
        VoteView {
            vote,
            links,
            embedded: Embedded { voter, poll },
        }
    }

    fn poll_links(&self, id: PollId) -> PollLinks {
        PollLinks {
            this: Link::new(self.poll_url(id)),
            results: Link::new(format!("{}/results", self.poll_url(id))),
            votes: Link::new(format!("{}/polls/{}", self.votes, id)),
            voters: Link::new(self.voters.clone()),
        }
    }

    pub fn poll(&self, poll: Poll) -> PollView {
        PollView {
            links: self.poll_links(poll.id),
            poll,
        }
    }

    pub fn poll_results(&self, poll: Poll) -> PollResultsView {
        PollResultsView {
            links: self.poll_links(poll.id),
            results: poll.results,
            meta: poll.meta,
        }
    }

    pub fn voter(&self, voter: Voter) -> VoterView {
        VoterView {
            links: VoterLinks {
                this: Link::new(self.voter_url(voter.id)),
                polls: Link::new(self.polls.clone()),
                votes: Link::new(format!("{}/voters/{}", self.votes, voter.id)),
            },
            voter,
        }
    }
}
