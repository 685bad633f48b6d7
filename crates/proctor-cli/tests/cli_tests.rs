//! CLI integration tests using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn proctor() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("proctor").unwrap()
}

/// A temp dir populated by `proctor init`.
fn initialized() -> TempDir {
    let dir = TempDir::new().unwrap();
    proctor()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
    dir
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    proctor()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created proctor.toml"))
        .stdout(predicate::str::contains("Created exams/sample-exam.json"))
        .stdout(predicate::str::contains("Created exams/sample-script.toml"));

    assert!(dir.path().join("proctor.toml").exists());
    assert!(dir.path().join("exams/sample-exam.json").exists());
}

#[test]
fn init_skips_existing() {
    let dir = initialized();

    proctor()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn validate_sample_exam() {
    let dir = initialized();

    proctor()
        .current_dir(dir.path())
        .arg("validate")
        .arg("--exam")
        .arg("exams/sample-exam.json")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 sections, 3 questions"))
        .stdout(predicate::str::contains("Reading"))
        .stdout(predicate::str::contains("35:00"))
        .stdout(predicate::str::contains("Exam valid"));
}

#[test]
fn validate_rejects_question_without_choices() {
    let dir = TempDir::new().unwrap();
    let exam = dir.path().join("bad.json");
    std::fs::write(
        &exam,
        r#"{"id": "e", "title": "Bad", "sections": [{"section": "Math", "module": 1,
            "questions": [{"id": "q1", "questionText": "?", "choices": []}]}]}"#,
    )
    .unwrap();

    proctor()
        .arg("validate")
        .arg("--exam")
        .arg(&exam)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"))
        .stderr(predicate::str::contains("invalid exam"));
}

#[test]
fn validate_nonexistent_file() {
    proctor()
        .arg("validate")
        .arg("--exam")
        .arg("nonexistent.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn replay_offline_completes_sample_attempt() {
    let dir = initialized();

    proctor()
        .current_dir(dir.path())
        .env_remove("PROCTOR_BASE_URL")
        .arg("replay")
        .arg("--exam")
        .arg("exams/sample-exam.json")
        .arg("--script")
        .arg("exams/sample-script.toml")
        .arg("--offline")
        .assert()
        .success()
        .stdout(predicate::str::contains("Answered reading-1: deliberate"))
        .stdout(predicate::str::contains("Review reading-2: marked"))
        .stdout(predicate::str::contains("Final state: completed"));
}

#[test]
fn replay_reports_failing_step() {
    let dir = initialized();
    let script = dir.path().join("bad-script.toml");
    std::fs::write(
        &script,
        r#"
[[steps]]
action = "answer"
question = "reading-1"
choice = "not a choice"
"#,
    )
    .unwrap();

    proctor()
        .current_dir(dir.path())
        .arg("replay")
        .arg("--exam")
        .arg("exams/sample-exam.json")
        .arg("--script")
        .arg(&script)
        .arg("--offline")
        .assert()
        .failure()
        .stderr(predicate::str::contains("step 1"));
}

#[test]
fn help_output() {
    proctor()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Timed exam session engine"));
}

#[test]
fn version_output() {
    proctor()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("proctor"));
}
