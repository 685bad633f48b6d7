//! The `proctor init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    write_if_missing("proctor.toml", SAMPLE_CONFIG)?;

    std::fs::create_dir_all("exams")?;
    write_if_missing("exams/sample-exam.json", SAMPLE_EXAM)?;
    write_if_missing("exams/sample-script.toml", SAMPLE_SCRIPT)?;

    println!("\nNext steps:");
    println!("  1. Edit proctor.toml with your server URL and token");
    println!("  2. Run: proctor validate --exam exams/sample-exam.json");
    println!(
        "  3. Run: proctor replay --exam exams/sample-exam.json --script exams/sample-script.toml --offline"
    );

    Ok(())
}

fn write_if_missing(path: &str, content: &str) -> Result<()> {
    if std::path::Path::new(path).exists() {
        println!("{path} already exists, skipping.");
    } else {
        std::fs::write(path, content)?;
        println!("Created {path}");
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# proctor configuration

base_url = "http://localhost:8080"
api_token = "${PROCTOR_TOKEN}"
request_timeout_secs = 30

[session]
slow_start_threshold_secs = 15
autosave_debounce_ms = 2000
flush_passes = 3
default_section_seconds = 1920
"#;

const SAMPLE_EXAM: &str = r#"{
  "id": "sample-exam",
  "title": "Sample Practice Test",
  "sections": [
    {
      "section": "Reading",
      "module": 1,
      "durationSeconds": 1920,
      "questions": [
        {
          "id": "reading-1",
          "questionText": "Which choice completes the text with the most logical word?",
          "choices": ["arbitrary", "deliberate", "fleeting", "obscure"]
        },
        {
          "id": "reading-2",
          "questionText": "Which choice best states the main idea of the text?",
          "choices": ["A", "B", "C", "D"]
        }
      ]
    },
    {
      "section": "Math",
      "module": 1,
      "durationSeconds": 2100,
      "questions": [
        {
          "id": "math-1",
          "questionText": "If 3x + 5 = 20, what is the value of x?",
          "choices": ["3", "5", "15", "25"]
        }
      ]
    }
  ]
}
"#;

const SAMPLE_SCRIPT: &str = r#"# Steps run in order against one exam session.

[[steps]]
action = "answer"
question = "reading-1"
choice = "deliberate"

[[steps]]
action = "review"
question = "reading-2"

[[steps]]
action = "next"

[[steps]]
action = "answer"
question = "reading-2"
choice = "C"

[[steps]]
action = "finish_section"

[[steps]]
action = "begin_next"

[[steps]]
action = "answer"
question = "math-1"
choice = "5"

[[steps]]
action = "submit"
"#;
