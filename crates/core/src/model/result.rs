use serde::{Deserialize, Serialize};

/// Per-topic tally inside a scored result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicScore {
    pub topic: String,
    pub correct: u32,
    pub total: u32,
}

/// Server-computed outcome of a submitted session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub score: f64,
    #[serde(default)]
    pub breakdown: Vec<TopicScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl SessionResult {
    #[must_use]
    pub fn new(score: f64, breakdown: Vec<TopicScore>) -> Self {
        Self {
            score,
            breakdown,
            feedback: None,
        }
    }

    /// Sum of correct answers across topics.
    #[must_use]
    pub fn correct(&self) -> u32 {
        self.breakdown
            .iter()
            .fold(0_u32, |acc, t| acc.saturating_add(t.correct))
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.breakdown
            .iter()
            .fold(0_u32, |acc, t| acc.saturating_add(t.total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_sum_topics() {
        let result = SessionResult::new(
            0.5,
            vec![
                TopicScore { topic: "rust".into(), correct: 2, total: 3 },
                TopicScore { topic: "sql".into(), correct: 1, total: 3 },
            ],
        );
        assert_eq!(result.correct(), 3);
        assert_eq!(result.total(), 6);
    }

    #[test]
    fn breakdown_defaults_when_missing() {
        let result: SessionResult = serde_json::from_str(r#"{"score": 1.0}"#).unwrap();
        assert!(result.breakdown.is_empty());
        assert_eq!(result.feedback, None);
    }
}
