use std::error::Error;

use assess_core::model::{
    AnswerValue, Direction, Question, QuestionKind, SessionConfig, SessionResult, SessionStatus,
};
use services::SessionRuntime;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Next,
    Previous,
    Jump(usize),
    Answer(String),
    Finish,
    Retry,
    Quit,
    Status,
    Help,
    Unknown(String),
}

fn parse_input(line: &str) -> Option<Input> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (head, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(h, r)| (h, r.trim()));
    let input = match head {
        "n" | "next" => Input::Next,
        "p" | "prev" => Input::Previous,
        "g" | "goto" => match rest.parse::<usize>() {
            Ok(number) if number > 0 => Input::Jump(number - 1),
            _ => Input::Unknown(line.to_string()),
        },
        "a" | "answer" if !rest.is_empty() => Input::Answer(rest.to_string()),
        "f" | "finish" => Input::Finish,
        "r" | "retry" => Input::Retry,
        "q" | "quit" => Input::Quit,
        "s" | "status" => Input::Status,
        "h" | "help" | "?" => Input::Help,
        _ => Input::Unknown(line.to_string()),
    };
    Some(input)
}

/// Build the answer value for `question` from what the user typed.
///
/// Choices are numbered from 1 on screen.
fn answer_value(question: &Question, raw: &str) -> Option<AnswerValue> {
    match question.kind {
        QuestionKind::SingleChoice => raw
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .map(AnswerValue::choice),
        QuestionKind::FreeText => Some(AnswerValue::text(raw)),
        QuestionKind::Audio => Some(AnswerValue::Audio {
            reference: raw.to_string(),
            duration_secs: None,
        }),
        QuestionKind::Conversational => Some(AnswerValue::Turn {
            transcript: raw.to_string(),
        }),
    }
}

fn print_help() {
    println!("commands:");
    println!("  a <answer>   answer the current question (option number for choices)");
    println!("  n / p        next / previous question");
    println!("  g <number>   go to question");
    println!("  s            show progress");
    println!("  f            finish and submit");
    println!("  r            retry a failed submission");
    println!("  q            quit without submitting");
}

fn render(runtime: &SessionRuntime) {
    let progress = runtime.progress();
    let Some(question) = runtime.current_question() else {
        return;
    };
    println!();
    println!(
        "[{}/{}] {}",
        progress.current_index + 1,
        progress.total,
        question.prompt
    );
    for (i, option) in question.options.iter().enumerate() {
        println!("  {}. {option}", i + 1);
    }
    if let Some(answer) = runtime.answer_for(&question.id) {
        println!("  (answered: {})", describe(&question, &answer));
    }
}

fn describe(question: &Question, answer: &AnswerValue) -> String {
    match answer {
        AnswerValue::Choice { index } => question
            .options
            .get(*index)
            .cloned()
            .unwrap_or_else(|| format!("option {}", index + 1)),
        AnswerValue::Text { body } => body.clone(),
        AnswerValue::Audio { reference, .. } => reference.clone(),
        AnswerValue::Turn { transcript } => transcript.clone(),
    }
}

fn print_status(runtime: &SessionRuntime) {
    let progress = runtime.progress();
    let remaining = progress.remaining_secs.map_or_else(
        || "untimed".to_string(),
        |secs| format!("{} left", format_duration(i64::from(secs))),
    );
    println!(
        "{}: {}/{} answered ({} open), {remaining}",
        progress.status,
        progress.answered,
        progress.total,
        progress.unanswered()
    );
}

fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    format!("{}:{:02}", secs / 60, secs % 60)
}

pub fn print_result(result: &SessionResult) {
    println!("score: {:.1}%", result.score * 100.0);
    for topic in &result.breakdown {
        println!("  {}: {}/{}", topic.topic, topic.correct, topic.total);
    }
    if let Some(feedback) = &result.feedback {
        println!();
        println!("{feedback}");
    }
}

/// Report a terminal status. Returns true when the loop should stop.
fn report(runtime: &SessionRuntime, status: SessionStatus) -> bool {
    match status {
        SessionStatus::Completed => {
            match runtime.result() {
                Some(result) => print_result(&result),
                None => println!("submitted; the result is not available yet"),
            }
            let (mode, taken) = runtime.inspect(|m| {
                let taken = m
                    .started_at()
                    .zip(m.finished_at())
                    .map(|(start, end)| (end - start).num_seconds());
                (m.mode(), taken)
            });
            if let Some(taken) = taken {
                println!("time taken: {}", format_duration(taken));
            }
            if let (Some(session_id), Some(mode)) = (runtime.session_id(), mode) {
                println!("session: {session_id} (fetch again with: results {session_id} --mode {mode})");
            }
            true
        }
        SessionStatus::Failed => {
            if let Some(failure) = runtime.failure() {
                println!("submission failed: {failure}");
            }
            println!("your answers are kept; type r to retry or q to leave");
            false
        }
        SessionStatus::Aborted => {
            println!("session abandoned, nothing was submitted");
            true
        }
        _ => false,
    }
}

/// Start a session and drive it from stdin until it ends.
///
/// Timer expiry submits in the background; the status channel tells the
/// loop when that happened.
pub async fn run_session(
    runtime: &SessionRuntime,
    config: SessionConfig,
) -> Result<(), Box<dyn Error>> {
    let session_id = runtime.start(config).await?;
    tracing::info!(%session_id, "session started");
    print_status(runtime);
    render(runtime);

    let mut status = runtime.subscribe();
    let _ = status.borrow_and_update();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = *status.borrow_and_update();
                if current == SessionStatus::Submitting {
                    println!("submitting...");
                } else if report(runtime, current) {
                    return Ok(());
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    // stdin closed: leaving counts as navigating away
                    if runtime.status() == SessionStatus::Active {
                        let status = runtime.navigate_away().await?;
                        report(runtime, status);
                    }
                    return Ok(());
                };
                let Some(input) = parse_input(&line) else {
                    continue;
                };
                if handle(runtime, input).await {
                    return Ok(());
                }
            }
        }
    }
}

/// Apply one command. Returns true when the user asked to leave.
async fn handle(runtime: &SessionRuntime, input: Input) -> bool {
    let outcome = match input {
        Input::Next => runtime.advance(Direction::Next).map(|_| render(runtime)),
        Input::Previous => runtime.advance(Direction::Previous).map(|_| render(runtime)),
        Input::Jump(index) => runtime.jump_to(index).map(|_| render(runtime)),
        Input::Answer(raw) => {
            let Some(question) = runtime.current_question() else {
                println!("no question to answer");
                return false;
            };
            match answer_value(&question, &raw) {
                Some(value) => runtime.answer_current(value).map(|_| print_status(runtime)),
                None => {
                    println!("pick an option between 1 and {}", question.options.len());
                    Ok(())
                }
            }
        }
        Input::Finish => runtime.finish().await.map(|_| ()),
        Input::Retry => runtime.retry_submission().await.map(|_| ()),
        Input::Quit => {
            if runtime.status() == SessionStatus::Failed {
                return true;
            }
            runtime.quit()
        }
        Input::Status => {
            print_status(runtime);
            Ok(())
        }
        Input::Help => {
            print_help();
            Ok(())
        }
        Input::Unknown(raw) => {
            println!("unknown command: {raw} (h for help)");
            Ok(())
        }
    };

    if let Err(err) = outcome {
        if err.is_contract_violation() {
            tracing::debug!(error = %err, "command rejected in current state");
        }
        println!("{err}");
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_with_arguments() {
        assert_eq!(parse_input("  "), None);
        assert_eq!(parse_input("n"), Some(Input::Next));
        assert_eq!(parse_input("goto 3"), Some(Input::Jump(2)));
        assert_eq!(
            parse_input("a  borrowed references"),
            Some(Input::Answer("borrowed references".into()))
        );
        assert_eq!(parse_input("g 0"), Some(Input::Unknown("g 0".into())));
        assert_eq!(parse_input("a"), Some(Input::Unknown("a".into())));
    }

    #[test]
    fn durations_render_as_minutes_and_seconds() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(754), "12:34");
        assert_eq!(format_duration(-3), "0:00");
    }

    #[test]
    fn answers_follow_question_kind() {
        let choice = Question::single_choice("q1", 1, "Pick", vec!["x".into(), "y".into()]);
        assert_eq!(answer_value(&choice, "2"), Some(AnswerValue::choice(1)));
        assert_eq!(answer_value(&choice, "0"), None);
        assert_eq!(answer_value(&choice, "y"), None);

        let text = Question::free_text("q2", 2, "Explain");
        assert_eq!(answer_value(&text, "moves"), Some(AnswerValue::text("moves")));

        let turn = Question::free_text("q3", 3, "Say hi").with_kind(QuestionKind::Conversational);
        assert_eq!(
            answer_value(&turn, "hello"),
            Some(AnswerValue::Turn {
                transcript: "hello".into()
            })
        );
    }
}
