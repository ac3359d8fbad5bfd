use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionSetError {
    #[error("question set is empty")]
    Empty,

    #[error("duplicate question id: {0}")]
    DuplicateId(QuestionId),

    #[error("single-choice question {0} has no options")]
    MissingOptions(QuestionId),
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// Shape of answer a question expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    FreeText,
    Audio,
    Conversational,
}

impl QuestionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::SingleChoice => "single_choice",
            QuestionKind::FreeText => "free_text",
            QuestionKind::Audio => "audio",
            QuestionKind::Conversational => "conversational",
        }
    }
}

/// One question descriptor as issued by the server at session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub position: u32,
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub topic: String,
    pub kind: QuestionKind,
}

impl Question {
    #[must_use]
    pub fn single_choice(
        id: impl Into<String>,
        position: u32,
        prompt: impl Into<String>,
        options: Vec<String>,
    ) -> Self {
        Self {
            id: QuestionId::new(id),
            position,
            prompt: prompt.into(),
            options,
            topic: String::new(),
            kind: QuestionKind::SingleChoice,
        }
    }

    #[must_use]
    pub fn free_text(id: impl Into<String>, position: u32, prompt: impl Into<String>) -> Self {
        Self {
            id: QuestionId::new(id),
            position,
            prompt: prompt.into(),
            options: Vec::new(),
            topic: String::new(),
            kind: QuestionKind::FreeText,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: QuestionKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }
}

//
// ─── QUESTION SET ──────────────────────────────────────────────────────────────
//

/// Immutable, ordered questions for one session.
///
/// Questions are ordered by their server-assigned `position`; ids are unique.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionSet {
    questions: Vec<Question>,
}

impl QuestionSet {
    /// Build a question set, sorting by position.
    ///
    /// # Errors
    ///
    /// Returns `QuestionSetError::Empty` for no questions,
    /// `QuestionSetError::DuplicateId` when an id repeats, and
    /// `QuestionSetError::MissingOptions` for a choice question without options.
    pub fn new(mut questions: Vec<Question>) -> Result<Self, QuestionSetError> {
        if questions.is_empty() {
            return Err(QuestionSetError::Empty);
        }

        let mut seen = HashSet::with_capacity(questions.len());
        for question in &questions {
            if !seen.insert(&question.id) {
                return Err(QuestionSetError::DuplicateId(question.id.clone()));
            }
            if question.kind == QuestionKind::SingleChoice && question.options.is_empty() {
                return Err(QuestionSetError::MissingOptions(question.id.clone()));
            }
        }

        questions.sort_by_key(|q| q.position);
        Ok(Self { questions })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    #[must_use]
    pub fn find(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| &q.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &QuestionId) -> bool {
        self.find(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter()
    }

    /// Highest valid index.
    #[must_use]
    pub fn last_index(&self) -> usize {
        self.questions.len().saturating_sub(1)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(id: &str, position: u32) -> Question {
        Question::single_choice(id, position, "Pick one", vec!["a".into(), "b".into()])
    }

    #[test]
    fn empty_set_is_rejected() {
        assert_eq!(QuestionSet::new(Vec::new()).unwrap_err(), QuestionSetError::Empty);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = QuestionSet::new(vec![choice("q1", 1), choice("q1", 2)]).unwrap_err();
        assert_eq!(err, QuestionSetError::DuplicateId(QuestionId::new("q1")));
    }

    #[test]
    fn choice_without_options_is_rejected() {
        let bare = Question::single_choice("q1", 1, "?", Vec::new());
        let err = QuestionSet::new(vec![bare]).unwrap_err();
        assert!(matches!(err, QuestionSetError::MissingOptions(_)));
    }

    #[test]
    fn questions_are_ordered_by_position() {
        let set = QuestionSet::new(vec![choice("q3", 3), choice("q1", 1), choice("q2", 2)]).unwrap();
        let ids: Vec<_> = set.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, ["q1", "q2", "q3"]);
        assert_eq!(set.get(2).map(|q| q.id.as_str()), Some("q3"));
        assert_eq!(set.last_index(), 2);
    }

    #[test]
    fn kind_deserializes_from_snake_case() {
        let json = r#"{"id":"q1","position":0,"prompt":"Say hi","kind":"conversational"}"#;
        let question: Question = serde_json::from_str(json).unwrap();
        assert_eq!(question.kind, QuestionKind::Conversational);
        assert!(question.options.is_empty());
    }
}
