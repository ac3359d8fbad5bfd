use serde::{Deserialize, Serialize};
use std::fmt;

//
// ─── MODE ──────────────────────────────────────────────────────────────────────
//

/// Kind of session the server runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Quiz,
    Text,
    Voice,
    Bot,
}

impl SessionMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionMode::Quiz => "quiz",
            SessionMode::Text => "text",
            SessionMode::Voice => "voice",
            SessionMode::Bot => "bot",
        }
    }

    /// Result cache tags made stale by a submission in this mode.
    #[must_use]
    pub fn cache_tags(self) -> [&'static str; 2] {
        match self {
            SessionMode::Quiz => ["assessments", "analytics"],
            SessionMode::Text => ["text-assessments", "analytics"],
            SessionMode::Voice => ["voice-interviews", "analytics"],
            SessionMode::Bot => ["bot-interviews", "analytics"],
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "quiz" => Some(Self::Quiz),
            "text" => Some(Self::Text),
            "voice" => Some(Self::Voice),
            "bot" => Some(Self::Bot),
            _ => None,
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

/// Parameters a session is started with.
///
/// `time_limit_minutes` of `None` or `Some(0)` means the session is untimed.
/// The remaining fields are hints forwarded to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub mode: SessionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_count: Option<u32>,
}

impl SessionConfig {
    #[must_use]
    pub fn untimed(mode: SessionMode) -> Self {
        Self {
            mode,
            time_limit_minutes: None,
            dataset: None,
            topic: None,
            question_count: None,
        }
    }

    #[must_use]
    pub fn timed(mode: SessionMode, minutes: u32) -> Self {
        Self {
            time_limit_minutes: Some(minutes),
            ..Self::untimed(mode)
        }
    }

    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    #[must_use]
    pub fn with_question_count(mut self, count: u32) -> Self {
        self.question_count = Some(count);
        self
    }

    /// Countdown length in seconds, or `None` for an untimed session.
    #[must_use]
    pub fn duration_secs(&self) -> Option<u32> {
        self.time_limit_minutes
            .filter(|m| *m > 0)
            .map(|m| m.saturating_mul(60))
    }
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle of the single session a runtime owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Active,
    Submitting,
    Completed,
    Failed,
    Aborted,
}

impl SessionStatus {
    /// Completed, failed and aborted sessions may be superseded by a new start.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Aborted
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Active => "active",
            SessionStatus::Submitting => "submitting",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What caused a session to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishTrigger {
    User,
    TimerExpired,
    NavigatedAway,
}

/// Step direction for question navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}
