use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use assess_core::model::{AnswerSnapshot, SessionId, SessionMode, SessionResult};
use gateway::{GatewayError, ResultCache, SessionGateway};

use crate::error::SubmissionError;
use crate::settings::RetryPolicy;

/// Everything the pipeline needs to submit one finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionTicket {
    pub session_id: SessionId,
    pub mode: SessionMode,
    pub snapshot: AnswerSnapshot,
}

/// Outcome of a successful submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionReceipt {
    /// `None` only when the server reported a prior submission and the
    /// follow-up fetch of its result failed.
    pub result: Option<SessionResult>,
    /// The server already held a submission for this session.
    pub already_submitted: bool,
    pub attempts: u32,
}

type InFlight = Arc<Mutex<HashSet<SessionId>>>;

/// Releases the in-flight claim on every exit path.
struct InFlightGuard {
    in_flight: InFlight,
    session_id: SessionId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.session_id);
    }
}

/// Turns a finished session's snapshot into exactly one durable submission.
#[derive(Clone)]
pub struct SubmissionPipeline {
    gateway: Arc<dyn SessionGateway>,
    cache: Arc<dyn ResultCache>,
    policy: RetryPolicy,
    in_flight: InFlight,
}

impl SubmissionPipeline {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn SessionGateway>,
        cache: Arc<dyn ResultCache>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            gateway,
            cache,
            policy,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// True while a submit for `session_id` is outstanding.
    #[must_use]
    pub fn is_in_flight(&self, session_id: &SessionId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(session_id)
    }

    fn claim(&self, session_id: &SessionId) -> Result<InFlightGuard, SubmissionError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(session_id.clone()) {
            tracing::warn!(%session_id, "duplicate submission rejected");
            return Err(SubmissionError::Duplicate {
                session_id: session_id.clone(),
            });
        }
        Ok(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            session_id: session_id.clone(),
        })
    }

    /// Submit the ticket, retrying transport failures under the retry policy.
    ///
    /// On success the result cache is invalidated under the mode's tags.
    /// A server-side "already submitted" answer counts as success.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError::Duplicate` if a submit for the same session is
    /// still outstanding, `SubmissionError::Terminal` for non-retryable gateway
    /// errors, and `SubmissionError::Exhausted` once the retry budget is spent.
    pub async fn submit(
        &self,
        ticket: &SubmissionTicket,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let _guard = self.claim(&ticket.session_id)?;
        let session_id = &ticket.session_id;
        let max_attempts = self.policy.attempts();
        let mut attempt = 0_u32;

        loop {
            attempt += 1;
            match self
                .gateway
                .submit_session(session_id, &ticket.snapshot)
                .await
            {
                Ok(result) => {
                    self.invalidate(ticket.mode);
                    return Ok(SubmissionReceipt {
                        result: Some(result),
                        already_submitted: false,
                        attempts: attempt,
                    });
                }
                Err(GatewayError::Conflict) => {
                    tracing::info!(%session_id, "server already holds this submission");
                    let result = match self.gateway.fetch_results(session_id).await {
                        Ok(result) => Some(result),
                        Err(err) => {
                            tracing::warn!(%session_id, error = %err, "could not fetch prior result");
                            None
                        }
                    };
                    self.invalidate(ticket.mode);
                    return Ok(SubmissionReceipt {
                        result,
                        already_submitted: true,
                        attempts: attempt,
                    });
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.policy.backoff_for(attempt);
                    tracing::warn!(
                        %session_id,
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "submission failed, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(err) if err.is_retryable() => {
                    return Err(SubmissionError::Exhausted {
                        attempts: attempt,
                        source: err,
                    });
                }
                Err(err) => return Err(SubmissionError::Terminal { source: err }),
            }
        }
    }

    fn invalidate(&self, mode: SessionMode) {
        let tags = mode.cache_tags();
        tracing::debug!(?tags, "invalidating result cache");
        self.cache.invalidate(&tags);
    }
}
