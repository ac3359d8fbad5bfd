use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::model::ids::QuestionId;
use crate::model::question::{Question, QuestionKind, QuestionSet};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("question {question_id} expects a {expected} answer, got {actual}")]
    KindMismatch {
        question_id: QuestionId,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("option {index} is out of range for question {question_id} ({options} options)")]
    OptionOutOfRange {
        question_id: QuestionId,
        index: usize,
        options: usize,
    },
}

//
// ─── ANSWER VALUE ──────────────────────────────────────────────────────────────
//

/// A user's answer, shaped by the question kind it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerValue {
    /// Index into the question's option list.
    Choice { index: usize },
    Text { body: String },
    /// Reference to an uploaded recording.
    Audio {
        reference: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_secs: Option<u32>,
    },
    /// One transcript turn of a conversational exchange.
    Turn { transcript: String },
}

impl AnswerValue {
    #[must_use]
    pub fn choice(index: usize) -> Self {
        Self::Choice { index }
    }

    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        match self {
            AnswerValue::Choice { .. } => QuestionKind::SingleChoice,
            AnswerValue::Text { .. } => QuestionKind::FreeText,
            AnswerValue::Audio { .. } => QuestionKind::Audio,
            AnswerValue::Turn { .. } => QuestionKind::Conversational,
        }
    }

    /// Check this value against the question it answers.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::KindMismatch` when the variant does not match the
    /// question kind and `AnswerError::OptionOutOfRange` for a bad choice index.
    pub fn validate_for(&self, question: &Question) -> Result<(), AnswerError> {
        if self.kind() != question.kind {
            return Err(AnswerError::KindMismatch {
                question_id: question.id.clone(),
                expected: question.kind.as_str(),
                actual: self.kind().as_str(),
            });
        }
        match self {
            AnswerValue::Choice { index } if *index >= question.options.len() => {
                Err(AnswerError::OptionOutOfRange {
                    question_id: question.id.clone(),
                    index: *index,
                    options: question.options.len(),
                })
            }
            _ => Ok(()),
        }
    }
}

//
// ─── LEDGER ────────────────────────────────────────────────────────────────────
//

/// Mutable record of the answers given so far in the active session.
///
/// Entries are only ever inserted or overwritten. The session layer guarantees
/// every key belongs to the session's question set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerLedger {
    entries: HashMap<QuestionId, AnswerValue>,
}

impl AnswerLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite, returning the previous value.
    pub fn upsert(&mut self, question_id: QuestionId, value: AnswerValue) -> Option<AnswerValue> {
        self.entries.insert(question_id, value)
    }

    #[must_use]
    pub fn get(&self, question_id: &QuestionId) -> Option<&AnswerValue> {
        self.entries.get(question_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy the ledger into an immutable snapshot ordered like `questions`.
    #[must_use]
    pub fn snapshot(&self, questions: &QuestionSet) -> AnswerSnapshot {
        let entries = questions
            .iter()
            .filter_map(|q| {
                self.entries.get(&q.id).map(|value| SnapshotEntry {
                    question_id: q.id.clone(),
                    value: value.clone(),
                })
            })
            .collect();
        AnswerSnapshot { entries }
    }
}

//
// ─── SNAPSHOT ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub question_id: QuestionId,
    #[serde(flatten)]
    pub value: AnswerValue,
}

/// Owned copy of the ledger taken when a session finishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerSnapshot {
    entries: Vec<SnapshotEntry>,
}

impl AnswerSnapshot {
    #[must_use]
    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, question_id: &QuestionId) -> Option<&AnswerValue> {
        self.entries
            .iter()
            .find(|e| &e.question_id == question_id)
            .map(|e| &e.value)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> QuestionSet {
        QuestionSet::new(vec![
            Question::single_choice("q1", 1, "Pick", vec!["a".into(), "b".into()]),
            Question::free_text("q2", 2, "Explain"),
            Question::free_text("q3", 3, "Speak").with_kind(QuestionKind::Audio),
        ])
        .unwrap()
    }

    #[test]
    fn upsert_overwrites_previous_value() {
        let mut ledger = AnswerLedger::new();
        assert!(ledger.upsert(QuestionId::new("q1"), AnswerValue::choice(0)).is_none());
        let prev = ledger.upsert(QuestionId::new("q1"), AnswerValue::choice(1));
        assert_eq!(prev, Some(AnswerValue::choice(0)));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get(&QuestionId::new("q1")), Some(&AnswerValue::choice(1)));
    }

    #[test]
    fn snapshot_follows_question_order_and_is_detached() {
        let questions = set();
        let mut ledger = AnswerLedger::new();
        ledger.upsert(QuestionId::new("q2"), AnswerValue::text("because"));
        ledger.upsert(QuestionId::new("q1"), AnswerValue::choice(1));

        let snapshot = ledger.snapshot(&questions);
        ledger.upsert(QuestionId::new("q1"), AnswerValue::choice(0));

        let ids: Vec<_> = snapshot.entries().iter().map(|e| e.question_id.as_str()).collect();
        assert_eq!(ids, ["q1", "q2"]);
        assert_eq!(snapshot.get(&QuestionId::new("q1")), Some(&AnswerValue::choice(1)));
    }

    #[test]
    fn validate_rejects_kind_mismatch() {
        let questions = set();
        let q2 = questions.find(&QuestionId::new("q2")).unwrap();
        let err = AnswerValue::choice(0).validate_for(q2).unwrap_err();
        assert!(matches!(
            err,
            AnswerError::KindMismatch { expected: "free_text", actual: "single_choice", .. }
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_choice() {
        let questions = set();
        let q1 = questions.find(&QuestionId::new("q1")).unwrap();
        assert!(AnswerValue::choice(1).validate_for(q1).is_ok());
        let err = AnswerValue::choice(2).validate_for(q1).unwrap_err();
        assert!(matches!(err, AnswerError::OptionOutOfRange { index: 2, options: 2, .. }));
    }

    #[test]
    fn snapshot_entries_serialize_with_type_tag() {
        let questions = set();
        let mut ledger = AnswerLedger::new();
        ledger.upsert(
            QuestionId::new("q3"),
            AnswerValue::Audio { reference: "blob://r1".into(), duration_secs: None },
        );
        let json = serde_json::to_value(ledger.snapshot(&questions)).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{ "question_id": "q3", "type": "audio", "reference": "blob://r1" }])
        );
    }
}
