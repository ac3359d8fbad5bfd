use assess_core::model::SessionStatus;

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub status: SessionStatus,
    pub total: usize,
    pub answered: usize,
    pub current_index: usize,
    /// `None` for untimed sessions.
    pub remaining_secs: Option<u32>,
}

impl SessionProgress {
    #[must_use]
    pub fn idle() -> Self {
        Self {
            status: SessionStatus::Idle,
            total: 0,
            answered: 0,
            current_index: 0,
            remaining_secs: None,
        }
    }

    #[must_use]
    pub fn unanswered(&self) -> usize {
        self.total.saturating_sub(self.answered)
    }

    #[must_use]
    pub fn is_last_question(&self) -> bool {
        self.total > 0 && self.current_index + 1 == self.total
    }
}
