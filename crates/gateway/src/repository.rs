use async_trait::async_trait;
use assess_core::model::{
    AnswerSnapshot, Question, SessionConfig, SessionId, SessionMode, SessionResult, TopicScore,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::Semaphore;

/// Errors surfaced by the server gateway.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("session already submitted")]
    Conflict,

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("malformed response: {0}")]
    Decode(String),
}

/// Whether retrying the same request can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    Terminal,
}

impl GatewayError {
    #[must_use]
    pub fn class(&self) -> FailureClass {
        match self {
            GatewayError::Transport(_) => FailureClass::Retryable,
            GatewayError::Validation(_)
            | GatewayError::Conflict
            | GatewayError::Unauthorized
            | GatewayError::NotFound
            | GatewayError::Decode(_) => FailureClass::Terminal,
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.class() == FailureClass::Retryable
    }
}

/// What the server hands back when a session starts.
#[derive(Debug, Clone, PartialEq)]
pub struct StartedSession {
    pub session_id: SessionId,
    pub questions: Vec<Question>,
}

/// Remote system of record for assessment sessions.
#[async_trait]
pub trait SessionGateway: Send + Sync {
    /// Ask the server to open a session and issue its questions.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Transport` or `GatewayError::Validation` (and
    /// `Unauthorized` when credentials are rejected).
    async fn start_session(
        &self,
        mode: SessionMode,
        config: &SessionConfig,
    ) -> Result<StartedSession, GatewayError>;

    /// Submit the final answers of a session.
    ///
    /// # Errors
    ///
    /// As `start_session`, plus `GatewayError::Conflict` when the server already
    /// holds a submission for this session.
    async fn submit_session(
        &self,
        session_id: &SessionId,
        answers: &AnswerSnapshot,
    ) -> Result<SessionResult, GatewayError>;

    /// Fetch the scored result of a submitted session.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NotFound` if nothing was submitted, or other gateway errors.
    async fn fetch_results(&self, session_id: &SessionId) -> Result<SessionResult, GatewayError>;
}

//
// ─── IN-MEMORY GATEWAY ─────────────────────────────────────────────────────────
//

/// Holds submit calls open until the test releases them.
#[derive(Clone)]
pub struct SubmitGate {
    permits: Arc<Semaphore>,
}

impl SubmitGate {
    #[must_use]
    pub fn closed() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(0)),
        }
    }

    /// Let `n` held submit calls proceed.
    pub fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }

    async fn pass(&self) -> Result<(), GatewayError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        permit.forget();
        Ok(())
    }
}

impl Default for SubmitGate {
    fn default() -> Self {
        Self::closed()
    }
}

#[derive(Default)]
struct InMemoryState {
    bank: HashMap<SessionMode, Vec<Question>>,
    start_failures: VecDeque<GatewayError>,
    submit_script: VecDeque<Result<SessionResult, GatewayError>>,
    submissions: Vec<(SessionId, AnswerSnapshot)>,
    results: HashMap<SessionId, SessionResult>,
    start_calls: usize,
    submit_calls: usize,
    fetch_calls: usize,
}

/// Scripted in-memory gateway for tests and offline prototyping.
///
/// Submit calls consume the scripted outcomes in order; once the script is
/// empty every submit succeeds with a result derived from the snapshot.
#[derive(Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<Mutex<InMemoryState>>,
    gate: Option<SubmitGate>,
}

impl InMemoryGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_questions(self, mode: SessionMode, questions: Vec<Question>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.bank.insert(mode, questions);
        }
        self
    }

    /// Hold every submit call until `gate` releases it.
    #[must_use]
    pub fn with_submit_gate(mut self, gate: SubmitGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Queue the outcome of the next unscripted submit call.
    pub fn script_submit(&self, outcome: Result<SessionResult, GatewayError>) {
        if let Ok(mut state) = self.state.lock() {
            state.submit_script.push_back(outcome);
        }
    }

    pub fn fail_next_start(&self, err: GatewayError) {
        if let Ok(mut state) = self.state.lock() {
            state.start_failures.push_back(err);
        }
    }

    /// Record a result as if it had been submitted out of band.
    pub fn seed_result(&self, session_id: SessionId, result: SessionResult) {
        if let Ok(mut state) = self.state.lock() {
            state.results.insert(session_id, result);
        }
    }

    #[must_use]
    pub fn start_calls(&self) -> usize {
        self.state.lock().map_or(0, |s| s.start_calls)
    }

    /// Number of submit attempts, including failed ones.
    #[must_use]
    pub fn submit_calls(&self) -> usize {
        self.state.lock().map_or(0, |s| s.submit_calls)
    }

    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.state.lock().map_or(0, |s| s.fetch_calls)
    }

    /// Snapshots received by submit, in call order.
    #[must_use]
    pub fn submissions(&self) -> Vec<(SessionId, AnswerSnapshot)> {
        self.state
            .lock()
            .map(|s| s.submissions.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, InMemoryState>, GatewayError> {
        self.state
            .lock()
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }
}

fn default_result(answers: &AnswerSnapshot) -> SessionResult {
    let total = u32::try_from(answers.len()).unwrap_or(u32::MAX);
    SessionResult::new(
        1.0,
        vec![TopicScore {
            topic: "general".into(),
            correct: total,
            total,
        }],
    )
}

#[async_trait]
impl SessionGateway for InMemoryGateway {
    async fn start_session(
        &self,
        mode: SessionMode,
        config: &SessionConfig,
    ) -> Result<StartedSession, GatewayError> {
        let mut state = self.lock()?;
        state.start_calls += 1;
        if let Some(err) = state.start_failures.pop_front() {
            return Err(err);
        }
        let mut questions = state
            .bank
            .get(&mode)
            .cloned()
            .ok_or_else(|| GatewayError::Validation(format!("no questions for mode {mode}")))?;
        if let Some(count) = config.question_count {
            questions.truncate(usize::try_from(count).unwrap_or(usize::MAX));
        }
        let session_id = SessionId::new(format!("{mode}-{}", uuid::Uuid::new_v4()));
        tracing::debug!(%session_id, questions = questions.len(), "in-memory session started");
        Ok(StartedSession {
            session_id,
            questions,
        })
    }

    async fn submit_session(
        &self,
        session_id: &SessionId,
        answers: &AnswerSnapshot,
    ) -> Result<SessionResult, GatewayError> {
        {
            let mut state = self.lock()?;
            state.submit_calls += 1;
            state.submissions.push((session_id.clone(), answers.clone()));
        }

        if let Some(gate) = &self.gate {
            gate.pass().await?;
        }

        let mut state = self.lock()?;
        let outcome = match state.submit_script.pop_front() {
            Some(outcome) => outcome,
            None if state.results.contains_key(session_id) => Err(GatewayError::Conflict),
            None => Ok(default_result(answers)),
        };
        if let Ok(result) = &outcome {
            state.results.insert(session_id.clone(), result.clone());
        }
        outcome
    }

    async fn fetch_results(&self, session_id: &SessionId) -> Result<SessionResult, GatewayError> {
        let mut state = self.lock()?;
        state.fetch_calls += 1;
        state
            .results
            .get(session_id)
            .cloned()
            .ok_or(GatewayError::NotFound)
    }
}
