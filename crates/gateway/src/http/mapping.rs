use assess_core::model::{AnswerSnapshot, Question, SessionConfig, SessionId};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::repository::GatewayError;

#[derive(Debug, Serialize)]
pub(crate) struct StartRequest<'a> {
    #[serde(flatten)]
    pub config: &'a SessionConfig,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StartResponse {
    pub session_id: SessionId,
    pub questions: Vec<Question>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitRequest<'a> {
    pub answers: &'a AnswerSnapshot,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "detail", alias = "error")]
    message: String,
}

/// Pull a human-readable message out of an error body, falling back to the raw text.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().to_owned())
}

/// Map a non-success status to the gateway taxonomy.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> GatewayError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized,
        StatusCode::CONFLICT => GatewayError::Conflict,
        StatusCode::NOT_FOUND => GatewayError::NotFound,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            GatewayError::Transport(format!("status {status}"))
        }
        s if s.is_client_error() => GatewayError::Validation(error_message(body)),
        s => GatewayError::Transport(format!("status {s}")),
    }
}

pub(crate) fn map_reqwest_error(err: &reqwest::Error) -> GatewayError {
    if err.is_decode() {
        GatewayError::Decode(err.to_string())
    } else {
        GatewayError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assess_core::model::{AnswerLedger, AnswerValue, QuestionSet, SessionMode};

    #[test]
    fn auth_statuses_are_unauthorized() {
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED, ""), GatewayError::Unauthorized);
        assert_eq!(classify_status(StatusCode::FORBIDDEN, ""), GatewayError::Unauthorized);
    }

    #[test]
    fn conflict_and_missing_are_distinct() {
        assert_eq!(classify_status(StatusCode::CONFLICT, ""), GatewayError::Conflict);
        assert_eq!(classify_status(StatusCode::NOT_FOUND, ""), GatewayError::NotFound);
    }

    #[test]
    fn client_errors_carry_server_message() {
        let err = classify_status(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"detail": "answers missing"}"#,
        );
        assert_eq!(err, GatewayError::Validation("answers missing".into()));

        let err = classify_status(StatusCode::BAD_REQUEST, "plain text\n");
        assert_eq!(err, GatewayError::Validation("plain text".into()));
    }

    #[test]
    fn server_errors_and_throttling_are_retryable() {
        assert!(classify_status(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(classify_status(StatusCode::REQUEST_TIMEOUT, "").is_retryable());
    }

    #[test]
    fn start_request_flattens_config() {
        let config = SessionConfig::timed(SessionMode::Voice, 10).with_topic("ownership");
        let json = serde_json::to_value(StartRequest { config: &config }).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "mode": "voice", "time_limit_minutes": 10, "topic": "ownership" })
        );
    }

    #[test]
    fn submit_request_wraps_tagged_answers() {
        let questions = QuestionSet::new(vec![
            Question::single_choice("q1", 1, "?", vec!["a".into(), "b".into()]),
            Question::free_text("q2", 2, "?"),
        ])
        .unwrap();
        let mut ledger = AnswerLedger::new();
        ledger.upsert("q1".into(), AnswerValue::choice(0));
        ledger.upsert("q2".into(), AnswerValue::text("borrowck"));
        let snapshot = ledger.snapshot(&questions);

        let json = serde_json::to_value(SubmitRequest { answers: &snapshot }).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "answers": [
                { "question_id": "q1", "type": "choice", "index": 0 },
                { "question_id": "q2", "type": "text", "body": "borrowck" },
            ]})
        );
    }

    #[test]
    fn start_response_parses_questions() {
        let body = r#"{
            "session_id": "abc",
            "questions": [
                {"id": "q1", "position": 1, "prompt": "?", "options": ["a"], "topic": "t", "kind": "single_choice"}
            ]
        }"#;
        let parsed: StartResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.session_id, SessionId::new("abc"));
        assert_eq!(parsed.questions[0].options, vec!["a".to_string()]);
    }
}
