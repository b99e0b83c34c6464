// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type PollId = u64;
pub type VoterId = u64;
pub type VoteId = u64;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Sum of a poll's tallies; only polls carry it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_votes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: u64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResult {
    pub option_id: u64,
    pub votes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: PollId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub options: Vec<PollOption>,
    #[serde(default)]
    pub results: Vec<PollResult>,
    #[serde(rename = "_meta", default)]
    pub meta: Meta,
}

impl Poll {
    /// Rebuild `results` as zero tallies, one per option and in option order.
    pub fn reset_results(&mut self) {
        self.results = self
            .options
            .iter()
            .map(|option| PollResult {
                option_id: option.id,
                votes: 0,
            })
            .collect();
    }

    /// True when `results` mirrors `options` position by position.
    pub fn results_mirror_options(&self) -> bool {
        self.results.len() == self.options.len()
            && self
                .results
                .iter()
                .zip(&self.options)
                .all(|(result, option)| result.option_id == option.id)
    }

    pub fn total_votes(&self) -> u64 {
        self.results.iter().map(|r| r.votes).sum()
    }

    /// Bring `_meta.totalVotes` in line with `results`.
    pub fn refresh_total(&mut self) {
        self.meta.total_votes = Some(self.total_votes());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterPoll {
    pub poll_id: PollId,
    pub vote_id: VoteId,
    pub voted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voter {
    pub id: VoterId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub voter_polls: Vec<VoterPoll>,
    #[serde(default)]
    pub total_votes: u64,
    #[serde(rename = "_meta", default)]
    pub meta: Meta,
}

impl Voter {
    pub fn normalize_total(&mut self) {
        self.total_votes = self.voter_polls.len() as u64;
    }
}

/// A vote as it is persisted under `votes:<id>`. Links and embedded snapshots
/// are attached by [`crate::links::LinkBuilder`] and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: VoteId,
    pub poll_id: PollId,
    pub voter_id: VoterId,
    pub vote_value: i64,
    #[serde(rename = "_meta", default)]
    pub meta: Meta,
}

/// Body of `POST /votes/{id}`. The path carries the authoritative id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    #[serde(default)]
    pub id: Option<VoteId>,
    pub poll_id: PollId,
    pub voter_id: VoterId,
    pub vote_value: i64,
}

/// Body of `POST /polls/{id}` and `PUT /polls/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRequest {
    #[serde(default)]
    pub id: Option<PollId>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub options: Vec<PollOption>,
}

/// Body of `POST /voters/{id}` and `PUT /voters/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterRequest {
    #[serde(default)]
    pub id: Option<VoterId>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub voter_polls: Vec<VoterPoll>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_option_poll() -> Poll {
        Poll {
            id: 1,
            title: "t".into(),
            question: "q".into(),
            options: vec![
                PollOption {
                    id: 0,
                    text: "A".into(),
                },
                PollOption {
                    id: 1,
                    text: "B".into(),
                },
            ],
            results: vec![],
            meta: Meta::default(),
        }
    }

    #[test]
    fn reset_results_mirrors_options() {
        let mut poll = two_option_poll();
        assert!(!poll.results_mirror_options());
        poll.reset_results();
        assert!(poll.results_mirror_options());
        assert_eq!(poll.results[1].option_id, 1);
        assert_eq!(poll.total_votes(), 0);
    }

    #[test]
    fn vote_uses_camel_case_fields() {
        let vote: Vote = serde_json::from_value(serde_json::json!({
            "id": 100,
            "pollId": 1,
            "voterId": 5,
            "voteValue": 1
        }))
        .unwrap();
        assert_eq!(vote.poll_id, 1);
        assert_eq!(vote.meta, Meta::default());

        let json = serde_json::to_value(&vote).unwrap();
        assert_eq!(json["voterId"], 5);
        assert!(json["_meta"].get("createdAt").is_none());
    }

    #[test]
    fn poll_ignores_link_fields_from_siblings() {
        let poll: Poll = serde_json::from_value(serde_json::json!({
            "id": 1,
            "title": "t",
            "question": "q",
            "options": [{"id": 0, "text": "A"}],
            "results": [{"optionId": 0, "votes": 3}],
            "_links": {"self": {"href": "http://localhost:1082/polls/1"}}
        }))
        .unwrap();
        assert_eq!(poll.results[0].votes, 3);
    }

    #[test]
    fn poll_meta_carries_its_total() {
        let mut poll = two_option_poll();
        poll.reset_results();
        poll.results[1].votes = 4;
        poll.refresh_total();

        let json = serde_json::to_value(&poll).unwrap();
        assert_eq!(json["_meta"]["totalVotes"], 4);
    }
}
