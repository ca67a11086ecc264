//! Fan one request out to several executors.

use crate::error::AiError;
use crate::runtime::RuntimeExecutor;
use crate::types::{GenerationRequest, GenerationResult};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome of one ensemble member
#[derive(Debug)]
pub struct EnsembleOutcome {
    /// Position of the member in the ensemble
    pub index: usize,
    pub provider: String,
    pub result: Result<GenerationResult, AiError>,
}

/// Runs the same request against several executors concurrently.
///
/// At most `worker_limit` calls are in flight at once, one per member unless
/// capped. Every member's outcome is collected, failures included, and
/// returned in member order.
#[derive(Debug, Clone)]
pub struct Ensemble {
    members: Vec<Arc<RuntimeExecutor>>,
    worker_limit: Option<usize>,
}

impl Ensemble {
    pub fn new(members: Vec<Arc<RuntimeExecutor>>) -> Self {
        Self {
            members,
            worker_limit: None,
        }
    }

    /// Cap concurrent calls; zero is treated as one
    pub fn with_worker_limit(mut self, worker_limit: usize) -> Self {
        self.worker_limit = Some(worker_limit.max(1));
        self
    }

    pub fn add(&mut self, member: Arc<RuntimeExecutor>) {
        self.members.push(member);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn worker_limit(&self) -> usize {
        self.worker_limit.unwrap_or(self.members.len()).max(1)
    }

    /// Send `request` to every member and wait for all of them
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Vec<EnsembleOutcome> {
        let worker_limit = self.worker_limit();
        tracing::debug!(
            members = self.members.len(),
            worker_limit,
            "ensemble fan-out"
        );

        let mut outcomes: Vec<EnsembleOutcome> = stream::iter(self.members.iter().enumerate())
            .map(|(index, member)| async move {
                let result = member.generate(request.clone(), cancel).await;
                EnsembleOutcome {
                    index,
                    provider: member.info().id.clone(),
                    result,
                }
            })
            .buffer_unordered(worker_limit)
            .collect()
            .await;

        outcomes.sort_by_key(|outcome| outcome.index);
        outcomes
    }

    /// First successful result in member order
    pub async fn first_success(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, AiError> {
        let mut last_error = None;
        for outcome in self.generate(request, cancel).await {
            match outcome.result {
                Ok(result) => return Ok(result),
                Err(err) => last_error = Some(err),
            }
        }
        Err(last_error.unwrap_or_else(|| AiError::configuration("ensemble has no members")))
    }
}
