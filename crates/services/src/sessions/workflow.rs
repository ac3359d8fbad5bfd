use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use assess_core::model::{
    AnswerValue, Direction, FinishTrigger, Question, QuestionId, SessionConfig, SessionId,
    SessionResult, SessionStatus,
};
use gateway::{ResultCache, SessionGateway};
use tokio::sync::watch;

use super::countdown::Countdown;
use super::machine::{SessionMachine, SessionTick};
use super::progress::SessionProgress;
use super::submission::{SubmissionPipeline, SubmissionTicket};
use super::timer::TimerGeneration;
use crate::Clock;
use crate::error::{SessionError, SubmissionError};
use crate::settings::RuntimeSettings;

struct RuntimeInner {
    machine: Mutex<SessionMachine>,
    countdown: Mutex<Option<Countdown>>,
    starting: AtomicBool,
    gateway: Arc<dyn SessionGateway>,
    pipeline: SubmissionPipeline,
    settings: RuntimeSettings,
    status_tx: watch::Sender<SessionStatus>,
}

/// Clears the start-in-progress flag however `start` exits.
struct StartingGuard<'a>(&'a AtomicBool);

impl Drop for StartingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives one assessment session against the server.
///
/// The runtime is an explicit handle: clone it to share it between the UI
/// and background tasks. Separate runtimes never share state.
///
/// Machine transitions run inside a short critical section that is never
/// held across an await, so the answer/advance calls stay synchronous and
/// the `Active → Submitting` edge is claimed by exactly one trigger.
#[derive(Clone)]
pub struct SessionRuntime {
    inner: Arc<RuntimeInner>,
}

impl SessionRuntime {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn SessionGateway>,
        cache: Arc<dyn ResultCache>,
        settings: RuntimeSettings,
        clock: Clock,
    ) -> Self {
        let pipeline = SubmissionPipeline::new(
            Arc::clone(&gateway),
            cache,
            settings.retry.clone(),
        );
        let (status_tx, _) = watch::channel(SessionStatus::Idle);
        Self {
            inner: Arc::new(RuntimeInner {
                machine: Mutex::new(SessionMachine::new(clock)),
                countdown: Mutex::new(None),
                starting: AtomicBool::new(false),
                gateway,
                pipeline,
                settings,
                status_tx,
            }),
        }
    }

    fn machine(&self) -> MutexGuard<'_, SessionMachine> {
        self.inner
            .machine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, status: SessionStatus) {
        self.inner.status_tx.send_replace(status);
    }

    fn replace_countdown(&self, next: Option<Countdown>) {
        let previous = {
            let mut slot = self
                .inner
                .countdown
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *slot, next)
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    /// Open a new session on the server and make it active.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` while a session is active or
    /// submitting, `SessionError::StartInProgress` if another start is
    /// outstanding, and `SessionError::Gateway` when the server call fails.
    pub async fn start(&self, config: SessionConfig) -> Result<SessionId, SessionError> {
        // Claim the flag first: a start that sees it clear also sees the
        // status left by any start that already finished.
        if self.inner.starting.swap(true, Ordering::AcqRel) {
            return Err(SessionError::StartInProgress);
        }
        let _starting = StartingGuard(&self.inner.starting);
        {
            let machine = self.machine();
            if matches!(
                machine.status(),
                SessionStatus::Active | SessionStatus::Submitting
            ) {
                return Err(SessionError::InvalidState {
                    operation: "start",
                    status: machine.status(),
                });
            }
        }

        let started = self
            .inner
            .gateway
            .start_session(config.mode, &config)
            .await?;
        let session_id = started.session_id.clone();

        let (generation, status) = {
            let mut machine = self.machine();
            let generation = machine.start(config, started.questions, started.session_id)?;
            (generation, machine.status())
        };
        self.publish(status);

        let countdown = generation.map(|generation| {
            Countdown::spawn(self.clone(), generation, self.inner.settings.tick_period)
        });
        self.replace_countdown(countdown);
        Ok(session_id)
    }

    /// Record an answer for the given question.
    ///
    /// # Errors
    ///
    /// See [`SessionMachine::answer`].
    pub fn answer(
        &self,
        question_id: QuestionId,
        value: AnswerValue,
    ) -> Result<Option<AnswerValue>, SessionError> {
        self.machine().answer(question_id, value)
    }

    /// Record an answer for the question under the cursor.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` when no session is active, or the
    /// errors of [`SessionMachine::answer`].
    pub fn answer_current(&self, value: AnswerValue) -> Result<Option<AnswerValue>, SessionError> {
        let mut machine = self.machine();
        let question_id = machine
            .current_question()
            .map(|q| q.id.clone())
            .ok_or(SessionError::InvalidState {
                operation: "answer",
                status: machine.status(),
            })?;
        machine.answer(question_id, value)
    }

    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` outside `Active`.
    pub fn advance(&self, direction: Direction) -> Result<usize, SessionError> {
        self.machine().advance(direction)
    }

    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` outside `Active`.
    pub fn jump_to(&self, index: usize) -> Result<usize, SessionError> {
        self.machine().jump_to(index)
    }

    /// User-initiated finish.
    ///
    /// # Errors
    ///
    /// See [`SessionRuntime::finish_with`].
    pub async fn finish(&self) -> Result<SessionStatus, SessionError> {
        self.finish_with(FinishTrigger::User).await
    }

    /// Finish because the user is leaving the session screen.
    ///
    /// # Errors
    ///
    /// See [`SessionRuntime::finish_with`].
    pub async fn navigate_away(&self) -> Result<SessionStatus, SessionError> {
        self.finish_with(FinishTrigger::NavigatedAway).await
    }

    /// Finish the session and submit it, unless another trigger already did.
    ///
    /// Returns the status after this call: `Completed` or `Failed` for the
    /// winning trigger, the current status for a losing one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` when there is no session to finish.
    pub async fn finish_with(&self, trigger: FinishTrigger) -> Result<SessionStatus, SessionError> {
        let claimed = {
            let mut machine = self.machine();
            let ticket = machine.finish(trigger)?;
            (ticket, machine.status())
        };
        let (ticket, status) = claimed;
        let Some(ticket) = ticket else {
            return Ok(status);
        };
        self.publish(status);
        self.replace_countdown(None);
        self.submit(ticket).await
    }

    /// Submit again after a failed submission, reusing the recorded answers.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` unless the session is `Failed`.
    pub async fn retry_submission(&self) -> Result<SessionStatus, SessionError> {
        let ticket = self.machine().retry_submission()?;
        self.publish(SessionStatus::Submitting);
        self.submit(ticket).await
    }

    pub(crate) async fn submit(&self, ticket: SubmissionTicket) -> Result<SessionStatus, SessionError> {
        let outcome = self.inner.pipeline.submit(&ticket).await;
        let status = {
            let mut machine = self.machine();
            match outcome {
                Ok(receipt) => machine.complete(receipt)?,
                Err(SubmissionError::Duplicate { session_id }) => {
                    tracing::warn!(%session_id, "submission already outstanding; leaving state to it");
                }
                Err(err) => machine.fail(err)?,
            }
            machine.status()
        };
        self.publish(status);
        Ok(status)
    }

    /// Abandon the active session without submitting it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` outside `Active`.
    pub fn quit(&self) -> Result<(), SessionError> {
        self.machine().quit()?;
        self.replace_countdown(None);
        self.publish(SessionStatus::Aborted);
        Ok(())
    }

    /// Clear a finished session and return to `Idle`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` while active or submitting.
    pub fn discard(&self) -> Result<(), SessionError> {
        self.machine().discard()?;
        self.replace_countdown(None);
        self.publish(SessionStatus::Idle);
        Ok(())
    }

    pub(crate) fn tick(&self, generation: TimerGeneration) -> SessionTick {
        let outcome = self.machine().tick(generation);
        if matches!(outcome, SessionTick::Expired(_)) {
            self.publish(SessionStatus::Submitting);
        }
        outcome
    }

    //
    // ─── OBSERVATION ───────────────────────────────────────────────────────────
    //

    /// Status updates for every transition, starting with the current one.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status_tx.subscribe()
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.machine().status()
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        self.machine().progress()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.machine().session_id().cloned()
    }

    #[must_use]
    pub fn current_question(&self) -> Option<Question> {
        self.machine().current_question().cloned()
    }

    #[must_use]
    pub fn answer_for(&self, question_id: &QuestionId) -> Option<AnswerValue> {
        self.machine().answer_for(question_id).cloned()
    }

    #[must_use]
    pub fn result(&self) -> Option<SessionResult> {
        self.machine().result().cloned()
    }

    /// Why the last submission failed, for display.
    #[must_use]
    pub fn failure(&self) -> Option<SubmissionError> {
        self.machine().failure().cloned()
    }

    /// Read access to the machine for views that need more than the getters.
    pub fn inspect<R>(&self, f: impl FnOnce(&SessionMachine) -> R) -> R {
        f(&self.machine())
    }
}
