pub mod init;
pub mod replay;
pub mod validate;

use std::path::Path;

use anyhow::{Context, Result};

use proctor_core::model::Exam;
use proctor_core::wire::{parse_exam, ExamDto};

/// Read and validate an exam JSON file.
pub fn load_exam(path: &Path) -> Result<Exam> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read exam: {}", path.display()))?;
    let dto: ExamDto = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse exam: {}", path.display()))?;
    parse_exam(dto).with_context(|| format!("invalid exam: {}", path.display()))
}
