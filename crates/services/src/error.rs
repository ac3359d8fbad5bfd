//! Shared error types for the services crate.

use thiserror::Error;

use assess_core::model::{AnswerError, QuestionId, QuestionSetError, SessionId, SessionStatus};
use gateway::GatewayError;

/// Errors emitted by the submission pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SubmissionError {
    #[error("a submission for session {session_id} is already in flight")]
    Duplicate { session_id: SessionId },
    #[error("submission rejected: {source}")]
    Terminal {
        #[source]
        source: GatewayError,
    },
    #[error("submission failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: GatewayError,
    },
}

impl SubmissionError {
    /// The gateway error behind a terminal outcome, kept verbatim for display.
    #[must_use]
    pub fn gateway_error(&self) -> Option<&GatewayError> {
        match self {
            SubmissionError::Duplicate { .. } => None,
            SubmissionError::Terminal { source } | SubmissionError::Exhausted { source, .. } => {
                Some(source)
            }
        }
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.gateway_error(), Some(GatewayError::Unauthorized))
    }
}

/// Errors emitted by the session state machine and runtime.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("cannot {operation} while the session is {status}")]
    InvalidState {
        operation: &'static str,
        status: SessionStatus,
    },
    #[error("question {0} is not part of this session")]
    UnknownQuestion(QuestionId),
    #[error("a session start is already in progress")]
    StartInProgress,
    #[error(transparent)]
    InvalidAnswer(#[from] AnswerError),
    #[error(transparent)]
    Questions(#[from] QuestionSetError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl SessionError {
    /// Caller broke the state machine contract. Never shown to the user.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            SessionError::InvalidState { .. }
                | SessionError::UnknownQuestion(_)
                | SessionError::StartInProgress
        )
    }
}
