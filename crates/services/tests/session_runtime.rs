use std::sync::Arc;
use std::time::Duration;

use assess_core::model::{
    AnswerValue, Direction, FinishTrigger, Question, SessionConfig, SessionMode, SessionResult,
    SessionStatus,
};
use gateway::{GatewayError, InMemoryGateway, InMemoryResultCache, SubmitGate};
use services::{Clock, RetryPolicy, RuntimeSettings, SessionError, SessionRuntime};

fn three_questions() -> Vec<Question> {
    (1..=3)
        .map(|i| {
            Question::single_choice(
                format!("q{i}"),
                i,
                format!("Question {i}"),
                vec!["a".into(), "b".into(), "c".into()],
            )
            .with_topic("rust")
        })
        .collect()
}

struct Harness {
    gateway: InMemoryGateway,
    cache: InMemoryResultCache,
    runtime: SessionRuntime,
}

fn harness_with(gateway: InMemoryGateway) -> Harness {
    let gateway = gateway.with_questions(SessionMode::Quiz, three_questions());
    let cache = InMemoryResultCache::new();
    let runtime = SessionRuntime::new(
        Arc::new(gateway.clone()),
        Arc::new(cache.clone()),
        RuntimeSettings::default().with_retry(RetryPolicy::immediate(3)),
        Clock::default(),
    );
    Harness {
        gateway,
        cache,
        runtime,
    }
}

fn harness() -> Harness {
    harness_with(InMemoryGateway::new())
}

async fn wait_for(runtime: &SessionRuntime, target: SessionStatus) {
    let mut status = runtime.subscribe();
    status.wait_for(|s| *s == target).await.unwrap();
}

#[tokio::test]
async fn untimed_session_submits_only_answered_questions() {
    let h = harness();
    h.runtime
        .start(SessionConfig::untimed(SessionMode::Quiz))
        .await
        .unwrap();

    h.runtime.answer("q1".into(), AnswerValue::choice(0)).unwrap();
    h.runtime.advance(Direction::Next).unwrap();
    h.runtime.answer("q2".into(), AnswerValue::choice(2)).unwrap();
    h.runtime.advance(Direction::Next).unwrap();

    let status = h.runtime.finish().await.unwrap();

    assert_eq!(status, SessionStatus::Completed);
    let submissions = h.gateway.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].1.len(), 2);
    assert_eq!(h.cache.invalidation_count(), 1);
    assert!(h.runtime.result().is_some());
}

#[tokio::test(start_paused = true)]
async fn expiry_submits_empty_snapshot() {
    let h = harness();
    h.runtime
        .start(SessionConfig::timed(SessionMode::Quiz, 1))
        .await
        .unwrap();
    assert_eq!(h.runtime.progress().remaining_secs, Some(60));

    wait_for(&h.runtime, SessionStatus::Completed).await;

    let submissions = h.gateway.submissions();
    assert_eq!(submissions.len(), 1);
    assert!(submissions[0].1.is_empty());
    assert_eq!(
        h.runtime.inspect(|m| m.finish_trigger()),
        Some(FinishTrigger::TimerExpired)
    );
    assert_eq!(h.runtime.progress().remaining_secs, Some(0));
}

#[tokio::test(start_paused = true)]
async fn countdown_reports_remaining_time() {
    let h = harness();
    h.runtime
        .start(SessionConfig::timed(SessionMode::Quiz, 1))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(10_500)).await;

    assert_eq!(h.runtime.progress().remaining_secs, Some(50));
    assert_eq!(h.runtime.status(), SessionStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn untimed_session_never_expires() {
    let h = harness();
    h.runtime
        .start(SessionConfig::timed(SessionMode::Quiz, 0))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(3 * 3600)).await;

    assert_eq!(h.runtime.status(), SessionStatus::Active);
    assert_eq!(h.gateway.submit_calls(), 0);

    h.runtime.finish().await.unwrap();
    assert_eq!(h.gateway.submit_calls(), 1);
}

#[tokio::test]
async fn concurrent_finish_and_expiry_submit_once() {
    let h = harness();
    h.runtime
        .start(SessionConfig::timed(SessionMode::Quiz, 5))
        .await
        .unwrap();
    h.runtime.answer("q3".into(), AnswerValue::choice(1)).unwrap();

    let (user, timer, away) = tokio::join!(
        h.runtime.finish(),
        h.runtime.finish_with(FinishTrigger::TimerExpired),
        h.runtime.navigate_away(),
    );

    for status in [user.unwrap(), timer.unwrap(), away.unwrap()] {
        assert!(matches!(
            status,
            SessionStatus::Submitting | SessionStatus::Completed
        ));
    }
    assert_eq!(h.gateway.submit_calls(), 1);
    assert_eq!(h.gateway.submissions()[0].1.len(), 1);
    assert_eq!(h.cache.invalidation_count(), 1);
    assert_eq!(h.runtime.status(), SessionStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn user_finish_racing_real_expiry_submits_once() {
    let gate = SubmitGate::closed();
    let h = harness_with(InMemoryGateway::new().with_submit_gate(gate.clone()));
    h.runtime
        .start(SessionConfig::timed(SessionMode::Quiz, 1))
        .await
        .unwrap();

    wait_for(&h.runtime, SessionStatus::Submitting).await;
    let late = h.runtime.finish().await.unwrap();
    assert_eq!(late, SessionStatus::Submitting);

    gate.release(1);
    wait_for(&h.runtime, SessionStatus::Completed).await;
    assert_eq!(h.gateway.submit_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn expiry_closes_the_session_before_submitting() {
    let gate = SubmitGate::closed();
    let h = harness_with(InMemoryGateway::new().with_submit_gate(gate.clone()));
    h.runtime
        .start(SessionConfig::timed(SessionMode::Quiz, 1))
        .await
        .unwrap();
    h.runtime.answer("q1".into(), AnswerValue::choice(0)).unwrap();

    wait_for(&h.runtime, SessionStatus::Submitting).await;

    let late = h.runtime.answer("q2".into(), AnswerValue::choice(1)).unwrap_err();
    assert!(late.is_contract_violation());
    assert!(h.runtime.advance(Direction::Next).is_err());
    assert!(h.runtime.quit().unwrap_err().is_contract_violation());
    assert_eq!(h.runtime.status(), SessionStatus::Submitting);

    gate.release(1);
    wait_for(&h.runtime, SessionStatus::Completed).await;
    let submissions = h.gateway.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].1.len(), 1);
    assert_eq!(
        h.runtime.inspect(|m| m.finish_trigger()),
        Some(FinishTrigger::TimerExpired)
    );
}

#[tokio::test]
async fn transient_failures_then_success_completes() {
    let h = harness();
    h.gateway
        .script_submit(Err(GatewayError::Transport("connection reset".into())));
    h.gateway
        .script_submit(Err(GatewayError::Transport("timeout".into())));
    h.runtime
        .start(SessionConfig::untimed(SessionMode::Quiz))
        .await
        .unwrap();

    let status = h.runtime.finish().await.unwrap();

    assert_eq!(status, SessionStatus::Completed);
    assert_eq!(h.gateway.submit_calls(), 3);
    assert_eq!(h.runtime.inspect(|m| m.receipt().map(|r| r.attempts)), Some(3));
}

#[tokio::test]
async fn terminal_failure_keeps_answers_for_retry() {
    let h = harness();
    h.gateway
        .script_submit(Err(GatewayError::Validation("dataset closed".into())));
    h.runtime
        .start(SessionConfig::untimed(SessionMode::Quiz))
        .await
        .unwrap();
    h.runtime.answer("q1".into(), AnswerValue::choice(2)).unwrap();

    let status = h.runtime.finish().await.unwrap();

    assert_eq!(status, SessionStatus::Failed);
    let failure = h.runtime.failure().unwrap();
    assert_eq!(
        failure.gateway_error(),
        Some(&GatewayError::Validation("dataset closed".into()))
    );
    assert_eq!(h.runtime.progress().answered, 1);
    assert_eq!(h.cache.invalidation_count(), 0);

    let status = h.runtime.retry_submission().await.unwrap();
    assert_eq!(status, SessionStatus::Completed);
    let submissions = h.gateway.submissions();
    assert_eq!(submissions.len(), 2);
    assert_eq!(submissions[0].1, submissions[1].1);
}

#[tokio::test]
async fn exhausted_retries_fail_the_session() {
    let h = harness();
    for _ in 0..3 {
        h.gateway
            .script_submit(Err(GatewayError::Transport("unreachable".into())));
    }
    h.runtime
        .start(SessionConfig::untimed(SessionMode::Quiz))
        .await
        .unwrap();

    assert_eq!(h.runtime.finish().await.unwrap(), SessionStatus::Failed);
    assert!(h.runtime.failure().unwrap().gateway_error().unwrap().is_retryable());
}

#[tokio::test]
async fn already_submitted_is_treated_as_completed() {
    let h = harness();
    h.runtime
        .start(SessionConfig::untimed(SessionMode::Quiz))
        .await
        .unwrap();
    let session_id = h.runtime.session_id().unwrap();
    h.gateway
        .seed_result(session_id, SessionResult::new(0.9, Vec::new()));

    let status = h.runtime.finish().await.unwrap();

    assert_eq!(status, SessionStatus::Completed);
    assert_eq!(h.runtime.result().map(|r| r.score), Some(0.9));
    assert_eq!(
        h.runtime.inspect(|m| m.receipt().map(|r| r.already_submitted)),
        Some(true)
    );
}

#[tokio::test(start_paused = true)]
async fn quit_never_submits_and_timer_stays_silent() {
    let h = harness();
    h.runtime
        .start(SessionConfig::timed(SessionMode::Quiz, 1))
        .await
        .unwrap();
    h.runtime.answer("q1".into(), AnswerValue::choice(0)).unwrap();

    h.runtime.quit().unwrap();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(h.runtime.status(), SessionStatus::Aborted);
    assert_eq!(h.gateway.submit_calls(), 0);
    let err = h.runtime.answer("q2".into(), AnswerValue::choice(0)).unwrap_err();
    assert!(err.is_contract_violation());
}

#[tokio::test]
async fn start_during_submission_is_rejected() {
    let gate = SubmitGate::closed();
    let h = harness_with(InMemoryGateway::new().with_submit_gate(gate.clone()));
    h.runtime
        .start(SessionConfig::untimed(SessionMode::Quiz))
        .await
        .unwrap();

    let finishing = {
        let runtime = h.runtime.clone();
        tokio::spawn(async move { runtime.finish().await })
    };
    wait_for(&h.runtime, SessionStatus::Submitting).await;

    let err = h
        .runtime
        .start(SessionConfig::untimed(SessionMode::Quiz))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::InvalidState { status: SessionStatus::Submitting, .. }
    ));
    assert!(h.runtime.retry_submission().await.is_err());

    gate.release(1);
    assert_eq!(finishing.await.unwrap().unwrap(), SessionStatus::Completed);

    h.runtime
        .start(SessionConfig::untimed(SessionMode::Quiz))
        .await
        .unwrap();
    assert_eq!(h.runtime.status(), SessionStatus::Active);
    assert_eq!(h.gateway.start_calls(), 2);
}

#[tokio::test]
async fn navigate_away_submits_current_answers() {
    let h = harness();
    h.runtime
        .start(SessionConfig::untimed(SessionMode::Quiz))
        .await
        .unwrap();
    h.runtime.jump_to(2).unwrap();
    h.runtime.answer_current(AnswerValue::choice(1)).unwrap();

    let status = h.runtime.navigate_away().await.unwrap();

    assert_eq!(status, SessionStatus::Completed);
    assert_eq!(
        h.runtime.inspect(|m| m.finish_trigger()),
        Some(FinishTrigger::NavigatedAway)
    );
    let submissions = h.gateway.submissions();
    assert_eq!(submissions[0].1.entries()[0].question_id.as_str(), "q3");
}
