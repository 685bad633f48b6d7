//! The `proctor replay` command.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use serde::Deserialize;
use tracing::{info, warn};

use proctor_client::config::{create_services, load_config_from};
use proctor_core::mock::InMemorySubmissionService;
use proctor_core::model::{ExamId, QuestionId};
use proctor_core::session::{ExamSession, SessionEvent, SessionObserver, SessionState};
use proctor_core::traits::SubmissionService;

use super::load_exam;

/// A replay script: steps run in order against one session.
#[derive(Debug, Deserialize)]
struct Script {
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Step {
    Answer { question: String, choice: String },
    Review { question: String },
    Next,
    Previous,
    Goto { index: usize },
    /// Let the clock run, applying ticks and save completions.
    Wait { seconds: u64 },
    FinishSection,
    BeginNext,
    Submit,
    /// Wait for outstanding saves.
    Settle,
}

/// Console session observer.
struct ConsoleObserver;

impl SessionObserver for ConsoleObserver {
    fn on_state_change(&self, from: SessionState, to: SessionState) {
        eprintln!("  State: {from} -> {to}");
    }

    fn on_slow_start(&self, exam_id: &ExamId) {
        eprintln!("  Still starting {exam_id}, the server is slow...");
    }

    fn on_tick(&self, _remaining_seconds: u64) {}

    fn on_time_expired(&self, section_index: usize) {
        eprintln!("  Time expired in section {}", section_index + 1);
    }
}

pub async fn execute(
    exam_path: PathBuf,
    script_path: PathBuf,
    offline: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let exam = load_exam(&exam_path)?;
    let script = load_script(&script_path)?;
    let config = load_config_from(config_path.as_deref())?;

    let service: Arc<dyn SubmissionService> = if offline {
        Arc::new(InMemorySubmissionService::new(exam.clone()))
    } else {
        let (submission, _content) = create_services(&config)?;
        submission
    };
    info!(exam = %exam.id, steps = script.steps.len(), offline, "replaying session");

    let mut session = ExamSession::new(service, config.to_session_config())
        .with_observer(Arc::new(ConsoleObserver));
    session
        .start(exam.id.clone())
        .await
        .with_context(|| format!("failed to start exam {}", exam.id))?;

    for (n, step) in script.steps.iter().enumerate() {
        run_step(&mut session, step)
            .await
            .with_context(|| format!("step {} ({step:?}) failed", n + 1))?;
    }
    session.settle_saves().await;

    print_answers(&session);
    println!("Final state: {}", session.state());
    Ok(())
}

fn load_script(path: &Path) -> Result<Script> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("failed to parse script: {}", path.display()))
}

async fn run_step(session: &mut ExamSession, step: &Step) -> Result<()> {
    match step {
        Step::Answer { question, choice } => {
            session.select_answer(&QuestionId::new(question.as_str()), choice)?;
            println!("Answered {question}: {choice}");
        }
        Step::Review { question } => {
            let marked = session.toggle_review(&QuestionId::new(question.as_str()));
            println!("Review {question}: {}", if marked { "marked" } else { "cleared" });
        }
        Step::Next => {
            session.next();
        }
        Step::Previous => {
            session.previous();
        }
        Step::Goto { index } => {
            if !session.go_to(*index) {
                warn!(index, "go to ignored, index out of range");
            }
        }
        Step::Wait { seconds } => wait(session, *seconds).await,
        Step::FinishSection => session.finish_section().await?,
        Step::BeginNext => session.begin_next_section()?,
        Step::Submit => session.submit().await?,
        Step::Settle => session.settle_saves().await,
    }
    Ok(())
}

/// Pump session events for `seconds` of clock time.
async fn wait(session: &mut ExamSession, seconds: u64) {
    let mut elapsed = 0;
    while elapsed < seconds {
        match session.next_event().await {
            SessionEvent::Tick { .. } => elapsed += 1,
            SessionEvent::TimeExpired { section } => {
                elapsed += 1;
                println!("Section {} submitted on expiry", section + 1);
            }
            SessionEvent::AnswerSynced(id) => println!("Saved {id}"),
            SessionEvent::AnswerSaveFailed(id) => println!("Save failed for {id}, will retry"),
            SessionEvent::StaleSaveDiscarded(_) => {}
            SessionEvent::Idle => {
                tokio::time::sleep(Duration::from_secs(seconds - elapsed)).await;
                break;
            }
        }
    }
}

fn print_answers(session: &ExamSession) {
    let mut table = Table::new();
    table.set_header(vec!["Question", "Section", "Answer", "Synced", "Marked"]);

    for question in session.navigator().all() {
        let answer = session.answers().get(&question.id);
        table.add_row(vec![
            Cell::new(&question.id),
            Cell::new(format!("{} {}", question.section, question.module)),
            Cell::new(answer.map(|a| a.selected.as_str()).unwrap_or("-")),
            Cell::new(match answer {
                Some(a) if a.synced => "yes",
                Some(_) => "no",
                None => "-",
            }),
            Cell::new(if session.review().is_marked(&question.id) {
                "yes"
            } else {
                ""
            }),
        ]);
    }

    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_script_steps() {
        let script: Script = toml::from_str(
            r#"
[[steps]]
action = "answer"
question = "q1"
choice = "B"

[[steps]]
action = "wait"
seconds = 3

[[steps]]
action = "finish_section"

[[steps]]
action = "goto"
index = 2
"#,
        )
        .unwrap();
        assert_eq!(
            script.steps,
            vec![
                Step::Answer {
                    question: "q1".into(),
                    choice: "B".into()
                },
                Step::Wait { seconds: 3 },
                Step::FinishSection,
                Step::Goto { index: 2 },
            ]
        );
    }

    #[test]
    fn unknown_action_is_rejected() {
        let result: Result<Script, _> = toml::from_str(
            r#"
[[steps]]
action = "teleport"
"#,
        );
        assert!(result.is_err());
    }
}
