use chrono::{DateTime, Utc};
use std::fmt;

use assess_core::Clock;
use assess_core::model::{
    AnswerLedger, AnswerValue, Direction, FinishTrigger, Question, QuestionId, QuestionSet,
    SessionConfig, SessionId, SessionMode, SessionResult, SessionStatus,
};

use super::progress::SessionProgress;
use super::submission::{SubmissionReceipt, SubmissionTicket};
use super::timer::{TickOutcome, TimerCoordinator, TimerGeneration};
use crate::error::{SessionError, SubmissionError};

/// What a countdown tick did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionTick {
    Running { remaining: u32 },
    /// Time ran out and the session moved to `Submitting`.
    Expired(SubmissionTicket),
    Ignored,
}

//
// ─── SESSION DATA ──────────────────────────────────────────────────────────────
//

struct SessionData {
    session_id: SessionId,
    config: SessionConfig,
    questions: QuestionSet,
    ledger: AnswerLedger,
    current: usize,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    trigger: Option<FinishTrigger>,
    receipt: Option<SubmissionReceipt>,
    failure: Option<SubmissionError>,
}

//
// ─── STATE MACHINE ─────────────────────────────────────────────────────────────
//

/// Lifecycle of the one assessment session a client runs at a time.
///
/// `Idle → Active → Submitting → {Completed, Failed}` and `Active → Aborted`.
/// Every transition takes `&mut self`, so whoever owns the machine decides how
/// callers are serialized; `SessionRuntime` keeps it behind a mutex.
pub struct SessionMachine {
    clock: Clock,
    status: SessionStatus,
    session: Option<SessionData>,
    timer: TimerCoordinator,
}

impl SessionMachine {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            status: SessionStatus::Idle,
            session: None,
            timer: TimerCoordinator::new(),
        }
    }

    fn invalid(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            operation,
            status: self.status,
        }
    }

    fn require(&self, operation: &'static str, status: SessionStatus) -> Result<(), SessionError> {
        if self.status == status {
            Ok(())
        } else {
            Err(self.invalid(operation))
        }
    }

    fn data_mut(&mut self, operation: &'static str) -> Result<&mut SessionData, SessionError> {
        let status = self.status;
        self.session.as_mut().ok_or(SessionError::InvalidState { operation, status })
    }

    /// Begin a session with the questions the server issued.
    ///
    /// A completed, failed or aborted session is superseded and cleared first.
    /// Returns the timer generation when the session is timed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` while another session is active or
    /// submitting, and `SessionError::Questions` if the question set is invalid.
    pub fn start(
        &mut self,
        config: SessionConfig,
        questions: Vec<Question>,
        session_id: SessionId,
    ) -> Result<Option<TimerGeneration>, SessionError> {
        match self.status {
            SessionStatus::Active | SessionStatus::Submitting => return Err(self.invalid("start")),
            status if status.is_terminal() => {
                tracing::debug!(%status, "superseding finished session");
                self.clear();
            }
            _ => {}
        }

        let questions = QuestionSet::new(questions)?;
        let generation = self.timer.arm(config.duration_secs());
        tracing::info!(
            %session_id,
            mode = %config.mode,
            questions = questions.len(),
            time_limit_secs = ?config.duration_secs(),
            "session started"
        );

        self.session = Some(SessionData {
            session_id,
            config,
            questions,
            ledger: AnswerLedger::new(),
            current: 0,
            started_at: self.clock.now(),
            finished_at: None,
            trigger: None,
            receipt: None,
            failure: None,
        });
        self.status = SessionStatus::Active;
        Ok(generation)
    }

    /// Record or overwrite the answer to a question. Does not move the cursor.
    ///
    /// Returns the value previously recorded for the question, if any.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` outside `Active`,
    /// `SessionError::UnknownQuestion` for an id outside the question set, and
    /// `SessionError::InvalidAnswer` when the value does not fit the question.
    /// The ledger is unchanged on every error.
    pub fn answer(
        &mut self,
        question_id: QuestionId,
        value: AnswerValue,
    ) -> Result<Option<AnswerValue>, SessionError> {
        self.require("answer", SessionStatus::Active)?;
        let data = self.data_mut("answer")?;

        let Some(question) = data.questions.find(&question_id) else {
            tracing::error!(%question_id, session_id = %data.session_id, "answer for unknown question");
            return Err(SessionError::UnknownQuestion(question_id));
        };
        value.validate_for(question)?;

        Ok(data.ledger.upsert(question_id, value))
    }

    /// Step one question forward or back, clamped to the question set.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` outside `Active`.
    pub fn advance(&mut self, direction: Direction) -> Result<usize, SessionError> {
        self.require("advance", SessionStatus::Active)?;
        let data = self.data_mut("advance")?;
        data.current = match direction {
            Direction::Next => (data.current + 1).min(data.questions.last_index()),
            Direction::Previous => data.current.saturating_sub(1),
        };
        Ok(data.current)
    }

    /// Move straight to `index`, clamped to the question set.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` outside `Active`.
    pub fn jump_to(&mut self, index: usize) -> Result<usize, SessionError> {
        self.require("jump", SessionStatus::Active)?;
        let data = self.data_mut("jump")?;
        data.current = index.min(data.questions.last_index());
        Ok(data.current)
    }

    /// Claim the `Active → Submitting` edge.
    ///
    /// Exactly one caller per session receives a ticket; any later trigger
    /// sees the session already submitting (or past it) and gets `None`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` when there is no session to finish
    /// (`Idle`) or it was aborted.
    pub fn finish(
        &mut self,
        trigger: FinishTrigger,
    ) -> Result<Option<SubmissionTicket>, SessionError> {
        match self.status {
            SessionStatus::Active => {}
            SessionStatus::Submitting | SessionStatus::Completed | SessionStatus::Failed => {
                tracing::debug!(?trigger, status = %self.status, "finish already claimed");
                return Ok(None);
            }
            SessionStatus::Idle | SessionStatus::Aborted => return Err(self.invalid("finish")),
        }

        self.timer.disarm();
        let now = self.clock.now();
        let data = self.data_mut("finish")?;
        data.finished_at = Some(now);
        data.trigger = Some(trigger);
        let ticket = SubmissionTicket {
            session_id: data.session_id.clone(),
            mode: data.config.mode,
            snapshot: data.ledger.snapshot(&data.questions),
        };
        tracing::info!(
            session_id = %ticket.session_id,
            ?trigger,
            answers = ticket.snapshot.len(),
            "session finished"
        );
        self.status = SessionStatus::Submitting;
        Ok(Some(ticket))
    }

    /// `Submitting → Completed`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` outside `Submitting`.
    pub fn complete(&mut self, receipt: SubmissionReceipt) -> Result<(), SessionError> {
        self.require("complete", SessionStatus::Submitting)?;
        let data = self.data_mut("complete")?;
        tracing::info!(
            session_id = %data.session_id,
            attempts = receipt.attempts,
            already_submitted = receipt.already_submitted,
            "session completed"
        );
        data.failure = None;
        data.receipt = Some(receipt);
        self.status = SessionStatus::Completed;
        Ok(())
    }

    /// `Submitting → Failed`. Answers stay in place for a later retry.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` outside `Submitting`.
    pub fn fail(&mut self, error: SubmissionError) -> Result<(), SessionError> {
        self.require("fail", SessionStatus::Submitting)?;
        let data = self.data_mut("fail")?;
        tracing::warn!(session_id = %data.session_id, error = %error, "session submission failed");
        data.failure = Some(error);
        self.status = SessionStatus::Failed;
        Ok(())
    }

    /// `Failed → Submitting` with a fresh ticket over the preserved answers.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` outside `Failed`.
    pub fn retry_submission(&mut self) -> Result<SubmissionTicket, SessionError> {
        self.require("retry submission", SessionStatus::Failed)?;
        let data = self.data_mut("retry submission")?;
        data.failure = None;
        let ticket = SubmissionTicket {
            session_id: data.session_id.clone(),
            mode: data.config.mode,
            snapshot: data.ledger.snapshot(&data.questions),
        };
        tracing::info!(session_id = %ticket.session_id, "retrying submission");
        self.status = SessionStatus::Submitting;
        Ok(ticket)
    }

    /// `Active → Aborted`. Nothing is submitted.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` outside `Active`.
    pub fn quit(&mut self) -> Result<(), SessionError> {
        self.require("quit", SessionStatus::Active)?;
        self.timer.disarm();
        let now = self.clock.now();
        let data = self.data_mut("quit")?;
        data.finished_at = Some(now);
        tracing::info!(session_id = %data.session_id, "session aborted");
        self.status = SessionStatus::Aborted;
        Ok(())
    }

    /// Drop all session state and return to `Idle`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` while `Submitting` or `Active`;
    /// an active session has to be quit or finished first.
    pub fn discard(&mut self) -> Result<(), SessionError> {
        match self.status {
            SessionStatus::Active | SessionStatus::Submitting => Err(self.invalid("discard")),
            _ => {
                self.clear();
                Ok(())
            }
        }
    }

    fn clear(&mut self) {
        self.timer.reset();
        self.session = None;
        self.status = SessionStatus::Idle;
    }

    /// Deliver a countdown tick. Only an active session counts down.
    ///
    /// The tick that exhausts the time limit also claims the finish edge, in
    /// the same call, and hands back the submission ticket.
    pub fn tick(&mut self, generation: TimerGeneration) -> SessionTick {
        if self.status != SessionStatus::Active {
            return SessionTick::Ignored;
        }
        match self.timer.tick(generation) {
            TickOutcome::Running { remaining } => SessionTick::Running { remaining },
            TickOutcome::Ignored => SessionTick::Ignored,
            TickOutcome::Expired => {
                tracing::info!(session_id = ?self.session_id(), "time limit reached");
                match self.finish(FinishTrigger::TimerExpired) {
                    Ok(Some(ticket)) => SessionTick::Expired(ticket),
                    Ok(None) => SessionTick::Ignored,
                    Err(err) => {
                        tracing::error!(error = %err, "expiry could not finish the session");
                        SessionTick::Ignored
                    }
                }
            }
        }
    }

    //
    // ─── READ ACCESS ───────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.as_ref().map(|d| &d.session_id)
    }

    #[must_use]
    pub fn mode(&self) -> Option<SessionMode> {
        self.session.as_ref().map(|d| d.config.mode)
    }

    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.session.as_ref().map(|d| d.current)
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.session
            .as_ref()
            .and_then(|d| d.questions.get(d.current))
    }

    #[must_use]
    pub fn ledger(&self) -> Option<&AnswerLedger> {
        self.session.as_ref().map(|d| &d.ledger)
    }

    #[must_use]
    pub fn answer_for(&self, question_id: &QuestionId) -> Option<&AnswerValue> {
        self.session.as_ref().and_then(|d| d.ledger.get(question_id))
    }

    #[must_use]
    pub fn remaining_secs(&self) -> Option<u32> {
        self.timer.remaining_secs()
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.session.as_ref().map(|d| d.started_at)
    }

    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.session.as_ref().and_then(|d| d.finished_at)
    }

    #[must_use]
    pub fn finish_trigger(&self) -> Option<FinishTrigger> {
        self.session.as_ref().and_then(|d| d.trigger)
    }

    #[must_use]
    pub fn receipt(&self) -> Option<&SubmissionReceipt> {
        self.session.as_ref().and_then(|d| d.receipt.as_ref())
    }

    #[must_use]
    pub fn result(&self) -> Option<&SessionResult> {
        self.receipt().and_then(|r| r.result.as_ref())
    }

    /// Error that moved the session to `Failed`, kept for display.
    #[must_use]
    pub fn failure(&self) -> Option<&SubmissionError> {
        self.session.as_ref().and_then(|d| d.failure.as_ref())
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        match &self.session {
            Some(data) => SessionProgress {
                status: self.status,
                total: data.questions.len(),
                answered: data.ledger.len(),
                current_index: data.current,
                remaining_secs: self.timer.remaining_secs(),
            },
            None => SessionProgress::idle(),
        }
    }
}

impl fmt::Debug for SessionMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("SessionMachine");
        s.field("status", &self.status);
        if let Some(data) = &self.session {
            s.field("session_id", &data.session_id)
                .field("questions_len", &data.questions.len())
                .field("answered", &data.ledger.len())
                .field("current", &data.current);
        }
        s.field("remaining_secs", &self.timer.remaining_secs())
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
