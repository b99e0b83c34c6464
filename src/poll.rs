// src/poll.rs
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Poll, PollId, Vote, VoteId, Voter, VoterPoll};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidVote {
    #[error("vote value {value} is outside 0..{options} for poll {poll_id}")]
    OutOfRange {
        poll_id: PollId,
        value: i64,
        options: usize,
    },

    #[error("results of poll {poll_id} do not mirror its options")]
    MalformedPoll { poll_id: PollId },
}

/// Check that `value` names one of `poll`'s options; returns it as a result index.
pub fn validate_vote_value(poll: &Poll, value: i64) -> Result<usize, InvalidVote> {
    if !poll.results_mirror_options() {
        return Err(InvalidVote::MalformedPoll { poll_id: poll.id });
    }
    match usize::try_from(value) {
        Ok(index) if index < poll.options.len() => Ok(index),
        _ => Err(InvalidVote::OutOfRange {
            poll_id: poll.id,
            value,
            options: poll.options.len(),
        }),
    }
}

/// The poll with one more vote counted for `index`. `index` must come from
/// [`validate_vote_value`].
pub fn tally(poll: &Poll, index: usize) -> Poll {
    let mut updated = poll.clone();
    updated.results[index].votes += 1;
    updated
}

/// The poll with one vote removed from `index`; a zero tally stays at zero.
pub fn untally(poll: &Poll, index: usize) -> Poll {
    let mut updated = poll.clone();
    let result = &mut updated.results[index];
    if result.votes == 0 {
        tracing::warn!(poll_id = poll.id, index, "Retracting from an empty tally");
    }
    result.votes = result.votes.saturating_sub(1);
    updated
}

pub fn record_vote(voter: &Voter, vote: &Vote, at: DateTime<Utc>) -> Voter {
    restore_entry(
        voter,
        VoterPoll {
            poll_id: vote.poll_id,
            vote_id: vote.id,
            voted_at: at,
        },
    )
}

/// Put a history entry back, e.g. one removed by [`forget_vote`]. A voter that
/// already holds an entry for the same vote is returned unchanged.
pub fn restore_entry(voter: &Voter, entry: VoterPoll) -> Voter {
    let mut updated = voter.clone();
    if voter.voter_polls.iter().any(|e| e.vote_id == entry.vote_id) {
        return updated;
    }
    updated.total_votes += 1;
    updated.voter_polls.push(entry);
    updated
}

/// The voter without the history entry for `vote_id`, or `None` when the
/// voter has no such entry.
pub fn forget_vote(voter: &Voter, vote_id: VoteId) -> Option<Voter> {
    let position = voter
        .voter_polls
        .iter()
        .position(|entry| entry.vote_id == vote_id)?;

    let mut updated = voter.clone();
    updated.voter_polls.remove(position);
    updated.total_votes = updated.total_votes.saturating_sub(1);
    Some(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Meta, PollOption};

    fn poll() -> Poll {
        let mut poll = Poll {
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
        };
        poll.reset_results();
        poll
    }

    fn voter() -> Voter {
        Voter {
            id: 5,
            name: "Ada".into(),
            email: "ada@example.com".into(),
            voter_polls: vec![],
            total_votes: 0,
            meta: Meta::default(),
        }
    }

    fn vote(value: i64) -> Vote {
        Vote {
            id: 100,
            poll_id: 1,
            voter_id: 5,
            vote_value: value,
            meta: Meta::default(),
        }
    }

    #[test]
    fn accepts_only_option_indexes() {
        let poll = poll();
        assert_eq!(validate_vote_value(&poll, 0), Ok(0));
        assert_eq!(validate_vote_value(&poll, 1), Ok(1));
        assert!(matches!(
            validate_vote_value(&poll, 2),
            Err(InvalidVote::OutOfRange { options: 2, .. })
        ));
        assert!(validate_vote_value(&poll, -1).is_err());
        assert!(validate_vote_value(&poll, 5).is_err());
    }

    #[test]
    fn rejects_poll_whose_results_drifted() {
        let mut poll = poll();
        poll.results.pop();
        assert_eq!(
            validate_vote_value(&poll, 0),
            Err(InvalidVote::MalformedPoll { poll_id: 1 })
        );
    }

    #[test]
    fn tally_then_untally_restores_counts() {
        let original = poll();
        let counted = tally(&original, 1);
        assert_eq!(counted.results[1].votes, 1);
        assert_eq!(counted.results[0].votes, 0);
        assert_eq!(counted.results.len(), counted.options.len());
        assert_eq!(untally(&counted, 1), original);
    }

    #[test]
    fn untally_saturates_at_zero() {
        let poll = poll();
        assert_eq!(untally(&poll, 0).results[0].votes, 0);
    }

    #[test]
    fn voter_history_keeps_total_in_step() {
        let voter = voter();
        let at = Utc::now();
        let updated = record_vote(&voter, &vote(1), at);
        assert_eq!(updated.total_votes, 1);
        assert_eq!(updated.voter_polls.len(), 1);
        assert_eq!(updated.voter_polls[0].vote_id, 100);
        assert_eq!(updated.voter_polls[0].poll_id, 1);

        let restored = forget_vote(&updated, 100).unwrap();
        assert_eq!(restored, voter);
        assert!(forget_vote(&voter, 100).is_none());
    }

    #[test]
    fn restoring_an_entry_is_idempotent() {
        let voter = voter();
        let recorded = record_vote(&voter, &vote(1), Utc::now());
        let entry = recorded.voter_polls[0].clone();

        let restored = restore_entry(&voter, entry.clone());
        assert_eq!(restored, recorded);
        assert_eq!(restore_entry(&restored, entry), recorded);
    }
}
