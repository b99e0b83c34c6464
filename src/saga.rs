// src/saga.rs
//! Ordered remote mutations with compensating actions.
//!
//! A [`Saga`] runs its steps in order. When a step fails, every step that
//! already completed is compensated in reverse order and the failing step's
//! error is returned. Compensations are best effort: a failed compensation is
//! logged and reported in [`SagaFailure::uncompensated`], it never replaces the
//! original error.

use async_trait::async_trait;

use crate::errors::VoteError;

#[async_trait]
pub trait SagaStep: Send + Sync {
    fn name(&self) -> &'static str;
    async fn execute(&self) -> Result<(), VoteError>;
    async fn compensate(&self) -> Result<(), VoteError>;
}

#[derive(Debug)]
pub struct SagaFailure {
    pub step: &'static str,
    pub error: VoteError,
    /// Completed steps whose compensation succeeded, in the order they were undone.
    pub compensated: Vec<&'static str>,
    /// Completed steps left applied, because compensation failed or was disabled.
    pub uncompensated: Vec<&'static str>,
}

pub struct Saga<'a> {
    name: &'static str,
    steps: Vec<Box<dyn SagaStep + 'a>>,
    compensate: bool,
}

impl<'a> Saga<'a> {
    pub fn new(name: &'static str, compensate: bool) -> Self {
        Self {
            name,
            steps: Vec::new(),
            compensate,
        }
    }

    pub fn step(mut self, step: impl SagaStep + 'a) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Run all steps. On success returns the names of the executed steps.
    pub async fn run(self) -> Result<Vec<&'static str>, SagaFailure> {
        let mut done: Vec<&(dyn SagaStep + 'a)> = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            tracing::debug!(saga = self.name, step = step.name(), "Executing step");
            if let Err(error) = step.execute().await {
                tracing::warn!(saga = self.name, step = step.name(), error = %error, "Step failed");
                let (compensated, uncompensated) = self.unwind(done).await;
                return Err(SagaFailure {
                    step: step.name(),
                    error,
                    compensated,
                    uncompensated,
                });
            }
            done.push(step.as_ref());
        }

        Ok(done.iter().map(|step| step.name()).collect())
    }

    async fn unwind(
        &self,
        done: Vec<&(dyn SagaStep + 'a)>,
    ) -> (Vec<&'static str>, Vec<&'static str>) {
        let mut compensated = Vec::new();
        let mut uncompensated = Vec::new();

        if !self.compensate {
            if !done.is_empty() {
                tracing::error!(
                    saga = self.name,
                    applied = ?done.iter().map(|s| s.name()).collect::<Vec<_>>(),
                    "Compensation disabled; completed steps stay applied"
                );
            }
            uncompensated.extend(done.iter().rev().map(|step| step.name()));
            return (compensated, uncompensated);
        }

        for step in done.into_iter().rev() {
            match step.compensate().await {
                Ok(()) => {
                    tracing::info!(saga = self.name, step = step.name(), "Compensated step");
                    compensated.push(step.name());
                }
                Err(error) => {
                    tracing::error!(
                        saga = self.name,
                        step = step.name(),
                        error = %error,
                        "Compensation failed; aggregates left inconsistent"
                    );
                    uncompensated.push(step.name());
                }
            }
        }
        (compensated, uncompensated)
    }
}
