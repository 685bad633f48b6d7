//! The `proctor validate` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use proctor_core::config::DEFAULT_SECTION_SECONDS;

use super::load_exam;

pub fn execute(exam_path: PathBuf) -> Result<()> {
    let exam = load_exam(&exam_path)?;
    println!(
        "Exam: {} ({} sections, {} questions)",
        exam.title,
        exam.sections.len(),
        exam.questions.len()
    );

    let mut table = Table::new();
    table.set_header(vec!["#", "Section", "Module", "Questions", "Time"]);
    for (index, plan) in exam.sections.iter().enumerate() {
        let count = exam
            .questions
            .iter()
            .filter(|q| q.is_in(&plan.section, plan.module))
            .count();
        let seconds = plan.duration_seconds.unwrap_or(DEFAULT_SECTION_SECONDS);
        let time = match plan.duration_seconds {
            Some(_) => format!("{}:{:02}", seconds / 60, seconds % 60),
            None => format!("{}:{:02} (default)", seconds / 60, seconds % 60),
        };
        table.add_row(vec![
            Cell::new(index + 1),
            Cell::new(&plan.section),
            Cell::new(plan.module),
            Cell::new(count),
            Cell::new(time),
        ]);
    }
    println!("{table}");
    println!("Exam valid.");

    Ok(())
}
