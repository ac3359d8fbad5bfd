#![forbid(unsafe_code)]

pub mod error;
pub mod results;
pub mod sessions;
pub mod settings;

pub use assess_core::Clock;
pub use sessions as session;

pub use error::{SessionError, SubmissionError};
pub use results::ResultsService;
pub use settings::{RetryPolicy, RuntimeSettings};

pub use sessions::{
    SessionMachine, SessionProgress, SessionRuntime, SessionTick, SubmissionPipeline,
    SubmissionReceipt, SubmissionTicket, TickOutcome, TimerCoordinator, TimerGeneration,
};
