mod answer;
mod ids;
mod question;
mod result;
mod session;

pub use ids::{ParseIdError, QuestionId, SessionId};

pub use answer::{AnswerError, AnswerLedger, AnswerSnapshot, AnswerValue, SnapshotEntry};
pub use question::{Question, QuestionKind, QuestionSet, QuestionSetError};
pub use result::{SessionResult, TopicScore};
pub use session::{Direction, FinishTrigger, SessionConfig, SessionMode, SessionStatus};
