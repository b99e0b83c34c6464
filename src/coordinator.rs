// src/coordinator.rs
//! Casting and retracting votes across the poll, voter and vote stores.
//!
//! A cast reads the poll and the voter from their services, validates the
//! chosen option, then runs a saga: write the poll tally, write the voter
//! history, persist the vote record. Nothing is mutated before validation
//! passes. There is no lock across the three stores, so concurrent casts on
//! one poll race on its tally and the last PUT wins.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::errors::{Dependency, VoteError};
use crate::links::{LinkBuilder, VoteView};
use crate::metrics::{MetricsSink, Outcome, RequestMetrics};
use crate::models::{Meta, Poll, PollId, Vote, VoteId, VoteRequest, Voter, VoterId, VoterPoll};
use crate::poll::{self, validate_vote_value};
use crate::saga::{Saga, SagaStep};
use crate::services::AggregateClient;
use crate::store::{self, key_for, RecordStore, StoreError, VOTES_PREFIX};

pub struct VoteCoordinator {
    store: Arc<dyn RecordStore>,
    remote: Arc<dyn AggregateClient>,
    links: LinkBuilder,
    metrics: Arc<dyn MetricsSink>,
    compensate: bool,
}

impl VoteCoordinator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        remote: Arc<dyn AggregateClient>,
        links: LinkBuilder,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            store,
            remote,
            links,
            metrics,
            compensate: true,
        }
    }

    /// Whether completed saga steps are undone when a later step fails.
    pub fn with_compensation(mut self, enabled: bool) -> Self {
        self.compensate = enabled;
        self
    }

    pub async fn cast(&self, id: VoteId, request: VoteRequest) -> Result<VoteView, VoteError> {
        let mut metrics = RequestMetrics::start("cast");
        let result = self.cast_inner(id, request, &mut metrics).await;
        self.finish(&metrics, &result);
        result
    }

    pub async fn retract(&self, id: VoteId) -> Result<VoteView, VoteError> {
        let mut metrics = RequestMetrics::start("retract");
        let result = self.retract_inner(id, &mut metrics).await;
        self.finish(&metrics, &result);
        result
    }

    pub async fn get(&self, id: VoteId) -> Result<VoteView, VoteError> {
        let mut metrics = RequestMetrics::start("get");
        let result = async {
            let vote = self.load_vote(id, &mut metrics).await?;
            self.resolve(vote, &mut metrics).await
        }
        .await;
        self.finish(&metrics, &result);
        result
    }

    pub async fn list(&self) -> Result<Vec<VoteView>, VoteError> {
        self.list_matching("list", |_| true).await
    }

    pub async fn list_by_poll(&self, poll_id: PollId) -> Result<Vec<VoteView>, VoteError> {
        self.list_matching("list_by_poll", |vote| vote.poll_id == poll_id)
            .await
    }

    pub async fn list_by_voter(&self, voter_id: VoterId) -> Result<Vec<VoteView>, VoteError> {
        self.list_matching("list_by_voter", |vote| vote.voter_id == voter_id)
            .await
    }

    async fn cast_inner(
        &self,
        id: VoteId,
        request: VoteRequest,
        metrics: &mut RequestMetrics,
    ) -> Result<VoteView, VoteError> {
        if let Some(body_id) = request.id {
            if body_id != id {
                return Err(VoteError::BadRequest(format!(
                    "vote id {body_id} in body does not match {id} in path"
                )));
            }
        }

        metrics.store_calls += 1;
        match store::exists(self.store.as_ref(), &key_for(VOTES_PREFIX, id)).await {
            Ok(true) => return Err(VoteError::DuplicateId(id)),
            Ok(false) => {}
            Err(e) => return Err(VoteError::StoreReadFailed(e)),
        }

        let poll = self.fetch_poll(request.poll_id, metrics).await?;
        let voter = self.fetch_voter(request.voter_id, metrics).await?;
        let index = validate_vote_value(&poll, request.vote_value)?;

        let now = Utc::now();
        let vote = Vote {
            id,
            poll_id: request.poll_id,
            voter_id: request.voter_id,
            vote_value: request.vote_value,
            meta: Meta {
                created_at: Some(now),
                ..Meta::default()
            },
        };
        let counted = poll::tally(&poll, index);
        let recorded = poll::record_vote(&voter, &vote, now);

        let poll_written = Mutex::new(None);
        let voter_written = Mutex::new(None);
        let saga = Saga::new("cast", self.compensate)
            .step(PutPollCounts {
                remote: self.remote.as_ref(),
                next: counted.clone(),
                index,
                change: Change::Add,
                written: &poll_written,
            })
            .step(PutVoter {
                remote: self.remote.as_ref(),
                next: recorded.clone(),
                undo: VoterUndo::Forget(id),
                written: &voter_written,
            })
            .step(WriteVote {
                store: self.store.as_ref(),
                vote: vote.clone(),
            });
        self.run_saga(saga, metrics).await?;

        tracing::info!(
            vote_id = id,
            poll_id = vote.poll_id,
            voter_id = vote.voter_id,
            option = index,
            "Vote cast"
        );
        Ok(self.links.vote(
            vote,
            voter_written.into_inner().unwrap_or(recorded),
            poll_written.into_inner().unwrap_or(counted),
        ))
    }

    async fn retract_inner(
        &self,
        id: VoteId,
        metrics: &mut RequestMetrics,
    ) -> Result<VoteView, VoteError> {
        let vote = self.load_vote(id, metrics).await?;
        let poll = self.fetch_poll(vote.poll_id, metrics).await?;
        let voter = self.fetch_voter(vote.voter_id, metrics).await?;
        let index = validate_vote_value(&poll, vote.vote_value)?;

        let uncounted = poll::untally(&poll, index);
        let poll_written = Mutex::new(None);
        let voter_written = Mutex::new(None);
        let mut saga = Saga::new("retract", self.compensate).step(PutPollCounts {
            remote: self.remote.as_ref(),
            next: uncounted.clone(),
            index,
            change: Change::Remove,
            written: &poll_written,
        });

        let entry = voter.voter_polls.iter().find(|e| e.vote_id == id).cloned();
        let voter_after = match (poll::forget_vote(&voter, id), entry) {
            (Some(updated), Some(entry)) => {
                saga = saga.step(PutVoter {
                    remote: self.remote.as_ref(),
                    next: updated.clone(),
                    undo: VoterUndo::Restore(entry),
                    written: &voter_written,
                });
                updated
            }
            _ => {
                tracing::warn!(vote_id = id, voter_id = voter.id, "Voter has no history entry for vote");
                voter
            }
        };

        saga = saga.step(DeleteVote {
            store: self.store.as_ref(),
            vote: vote.clone(),
        });
        self.run_saga(saga, metrics).await?;

        tracing::info!(vote_id = id, poll_id = vote.poll_id, voter_id = vote.voter_id, "Vote retracted");
        Ok(self.links.vote(
            vote,
            voter_written.into_inner().unwrap_or(voter_after),
            poll_written.into_inner().unwrap_or(uncounted),
        ))
    }

    async fn list_matching(
        &self,
        operation: &'static str,
        keep: impl Fn(&Vote) -> bool,
    ) -> Result<Vec<VoteView>, VoteError> {
        let mut metrics = RequestMetrics::start(operation);
        let result = async {
            metrics.store_calls += 1;
            let mut votes: Vec<Vote> = store::load_all(self.store.as_ref(), VOTES_PREFIX)
                .await
                .map_err(VoteError::StoreReadFailed)?;
            votes.retain(|vote| keep(vote));
            votes.sort_by_key(|vote| vote.id);

            let mut views = Vec::with_capacity(votes.len());
            for vote in votes {
                views.push(self.resolve(vote, &mut metrics).await?);
            }
            Ok::<_, VoteError>(views)
        }
        .await;
        self.finish(&metrics, &result);
        result
    }

    async fn load_vote(&self, id: VoteId, metrics: &mut RequestMetrics) -> Result<Vote, VoteError> {
        metrics.store_calls += 1;
        store::get_json(self.store.as_ref(), &key_for(VOTES_PREFIX, id))
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => VoteError::NotFound(id),
                e => VoteError::StoreReadFailed(e),
            })
    }

    /// Attach links and a freshly fetched voter/poll snapshot.
    async fn resolve(&self, vote: Vote, metrics: &mut RequestMetrics) -> Result<VoteView, VoteError> {
        let poll = self.fetch_poll(vote.poll_id, metrics).await?;
        let voter = self.fetch_voter(vote.voter_id, metrics).await?;
        Ok(self.links.vote(vote, voter, poll))
    }

    async fn fetch_poll(&self, id: PollId, metrics: &mut RequestMetrics) -> Result<Poll, VoteError> {
        metrics.remote_calls += 1;
        self.remote
            .get_poll(id)
            .await
            .map_err(|e| VoteError::from_fetch(Dependency::Poll, id, e))
    }

    async fn fetch_voter(&self, id: VoterId, metrics: &mut RequestMetrics) -> Result<Voter, VoteError> {
        metrics.remote_calls += 1;
        self.remote
            .get_voter(id)
            .await
            .map_err(|e| VoteError::from_fetch(Dependency::Voter, id, e))
    }

    async fn run_saga(&self, saga: Saga<'_>, metrics: &mut RequestMetrics) -> Result<(), VoteError> {
        match saga.run().await {
            Ok(done) => {
                metrics.saga_steps += done.len() as u32;
                Ok(())
            }
            Err(failure) => {
                let applied = failure.compensated.len() + failure.uncompensated.len();
                metrics.saga_steps += applied as u32 + 1;
                metrics.compensations += failure.compensated.len() as u32;
                metrics.steps_left_applied += failure.uncompensated.len() as u32;
                if !failure.uncompensated.is_empty() {
                    tracing::error!(
                        request_id = %metrics.request_id,
                        failed_step = failure.step,
                        left_applied = ?failure.uncompensated,
                        "Vote update partially applied"
                    );
                }
                Err(failure.error)
            }
        }
    }

    fn finish<T>(&self, metrics: &RequestMetrics, result: &Result<T, VoteError>) {
        match result {
            Ok(_) => self.metrics.observe(metrics, Outcome::Valid),
            Err(e) => {
                tracing::warn!(
                    request_id = %metrics.request_id,
                    operation = metrics.operation,
                    kind = e.kind(),
                    error = %e,
                    "Vote operation failed"
                );
                self.metrics.observe(metrics, Outcome::Error);
            }
        }
    }
}

// --- Saga steps ---
//
// Compensations re-read the aggregate and apply the inverse of their own
// change, so updates committed by other requests in the meantime survive.

#[derive(Debug, Clone, Copy)]
enum Change {
    Add,
    Remove,
}

struct PutPollCounts<'a> {
    remote: &'a dyn AggregateClient,
    next: Poll,
    index: usize,
    change: Change,
    /// The poll as the poll service stored it.
    written: &'a Mutex<Option<Poll>>,
}

#[async_trait]
impl SagaStep for PutPollCounts<'_> {
    fn name(&self) -> &'static str {
        "put-poll-counts"
    }

    async fn execute(&self) -> Result<(), VoteError> {
        let stored = self
            .remote
            .put_poll_counts(&self.next)
            .await
            .map_err(|e| VoteError::from_update(Dependency::Poll, e))?;
        *self.written.lock() = Some(stored);
        Ok(())
    }

    async fn compensate(&self) -> Result<(), VoteError> {
        let id = self.next.id;
        let current = self
            .remote
            .get_poll(id)
            .await
            .map_err(|e| VoteError::from_fetch(Dependency::Poll, id, e))?;
        // the poll may have been reshaped since the step ran
        let index = validate_vote_value(&current, self.index as i64)?;
        let reverted = match self.change {
            Change::Add => poll::untally(&current, index),
            Change::Remove => poll::tally(&current, index),
        };
        self.remote
            .put_poll_counts(&reverted)
            .await
            .map(|_| ())
            .map_err(|e| VoteError::from_update(Dependency::Poll, e))
    }
}

/// How to take a [`PutVoter`] step back.
enum VoterUndo {
    Forget(VoteId),
    Restore(VoterPoll),
}

struct PutVoter<'a> {
    remote: &'a dyn AggregateClient,
    next: Voter,
    undo: VoterUndo,
    written: &'a Mutex<Option<Voter>>,
}

#[async_trait]
impl SagaStep for PutVoter<'_> {
    fn name(&self) -> &'static str {
        "put-voter"
    }

    async fn execute(&self) -> Result<(), VoteError> {
        let stored = self
            .remote
            .put_voter(&self.next)
            .await
            .map_err(|e| VoteError::from_update(Dependency::Voter, e))?;
        *self.written.lock() = Some(stored);
        Ok(())
    }

    async fn compensate(&self) -> Result<(), VoteError> {
        let id = self.next.id;
        let current = self
            .remote
            .get_voter(id)
            .await
            .map_err(|e| VoteError::from_fetch(Dependency::Voter, id, e))?;
        let reverted = match &self.undo {
            VoterUndo::Forget(vote_id) => match poll::forget_vote(&current, *vote_id) {
                Some(reverted) => reverted,
                None => return Ok(()),
            },
            VoterUndo::Restore(entry) => poll::restore_entry(&current, entry.clone()),
        };
        self.remote
            .put_voter(&reverted)
            .await
            .map(|_| ())
            .map_err(|e| VoteError::from_update(Dependency::Voter, e))
    }
}

struct WriteVote<'a> {
    store: &'a dyn RecordStore,
    vote: Vote,
}

#[async_trait]
impl SagaStep for WriteVote<'_> {
    fn name(&self) -> &'static str {
        "write-vote"
    }

    async fn execute(&self) -> Result<(), VoteError> {
        store::create_json(self.store, &key_for(VOTES_PREFIX, self.vote.id), &self.vote)
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists { .. } => VoteError::DuplicateId(self.vote.id),
                e => VoteError::StoreWriteFailed(e),
            })
    }

    async fn compensate(&self) -> Result<(), VoteError> {
        match self.store.delete(&key_for(VOTES_PREFIX, self.vote.id)).await {
            Ok(()) | Err(StoreError::NotFound { .. }) => Ok(()),
            Err(e) => Err(VoteError::StoreWriteFailed(e)),
        }
    }
}

struct DeleteVote<'a> {
    store: &'a dyn RecordStore,
    vote: Vote,
}

#[async_trait]
impl SagaStep for DeleteVote<'_> {
    fn name(&self) -> &'static str {
        "delete-vote"
    }

    async fn execute(&self) -> Result<(), VoteError> {
        self.store
            .delete(&key_for(VOTES_PREFIX, self.vote.id))
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => VoteError::NotFound(self.vote.id),
                e => VoteError::StoreWriteFailed(e),
            })
    }

    async fn compensate(&self) -> Result<(), VoteError> {
        store::set_json(self.store, &key_for(VOTES_PREFIX, self.vote.id), &self.vote)
            .await
            .map_err(VoteError::StoreWriteFailed)
    }
}
