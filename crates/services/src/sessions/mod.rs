mod countdown;
mod machine;
mod progress;
mod submission;
mod timer;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::{SessionError, SubmissionError};
pub use machine::{SessionMachine, SessionTick};
pub use progress::SessionProgress;
pub use submission::{SubmissionPipeline, SubmissionReceipt, SubmissionTicket};
pub use timer::{TickOutcome, TimerCoordinator, TimerGeneration};
pub use workflow::SessionRuntime;
