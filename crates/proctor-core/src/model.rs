//! Core data model types for proctor.
//!
//! These are the types the session engine, the editor, and the service
//! implementations share: identifiers, questions, exams, and attempts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Server-assigned identifier of one student's run of one exam.
    AttemptId
);
string_id!(
    /// Identifier of an exam.
    ExamId
);
string_id!(
    /// Identifier of a question.
    QuestionId
);

/// Authoring difficulty tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "Easy"),
            Difficulty::Medium => write!(f, "Medium"),
            Difficulty::Hard => write!(f, "Hard"),
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

/// A question as seen by the engine.
///
/// Immutable for the duration of an attempt. `correct_answer` and
/// `explanation` are only populated for authors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    /// Section name, e.g. "Reading" or "Math".
    pub section: String,
    /// Module index within the section, starting at 1.
    pub module: u32,
    pub text: String,
    /// Ordered answer choices. Answers reference choices by value.
    pub choices: Vec<String>,
    #[serde(default)]
    pub correct_answer: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub skill: Option<String>,
    /// Ordering position within its module.
    #[serde(default)]
    pub position: Option<u32>,
}

impl Question {
    /// Returns `true` if `choice` is one of this question's choices.
    pub fn has_choice(&self, choice: &str) -> bool {
        self.choices.iter().any(|c| c == choice)
    }

    /// Returns `true` if this question belongs to the given section and module.
    pub fn is_in(&self, section: &str, module: u32) -> bool {
        self.section == section && self.module == module
    }
}

/// One timed unit of an exam: a section and module with its own budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionPlan {
    pub section: String,
    pub module: u32,
    /// Time budget. `None` falls back to the configured default.
    #[serde(default)]
    pub duration_seconds: Option<u64>,
}

impl fmt::Display for SectionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} module {}", self.section, self.module)
    }
}

/// An exam as delivered to a student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exam {
    pub id: ExamId,
    pub title: String,
    /// Timed units, in the order they are taken.
    pub sections: Vec<SectionPlan>,
    /// All questions, ordered by section then position.
    pub questions: Vec<Question>,
}

/// An answer already persisted by the server, returned on resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedAnswer {
    pub question_id: QuestionId,
    pub selected_answer: String,
    #[serde(default)]
    pub time_spent_seconds: u64,
}

/// Validated result of starting (or resuming) an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptStart {
    pub attempt_id: AttemptId,
    pub exam: Exam,
    /// Whether the server resumed an existing attempt.
    pub resumed: bool,
    /// Index into `exam.sections` of the section in progress.
    pub current_section: usize,
    /// When the current section was started, as recorded by the server.
    pub section_started_at: Option<DateTime<Utc>>,
    pub answers: Vec<SavedAnswer>,
    pub marked: Vec<QuestionId>,
}

/// Lifecycle status of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    NotStarted,
    InProgress,
    SectionComplete,
    Submitted,
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptStatus::NotStarted => write!(f, "not_started"),
            AttemptStatus::InProgress => write!(f, "in_progress"),
            AttemptStatus::SectionComplete => write!(f, "section_complete"),
            AttemptStatus::Submitted => write!(f, "submitted"),
        }
    }
}

/// One student's run of one exam, owned by the session controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub id: AttemptId,
    pub exam_id: ExamId,
    pub current_section: usize,
    pub section_started_at: DateTime<Utc>,
    pub section_budget_seconds: u64,
    pub status: AttemptStatus,
}

/// Server response to a section submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionAdvance {
    /// Start of the next section as recorded by the server, if it reports one.
    pub next_section_started_at: Option<DateTime<Utc>>,
}

/// An exam as seen by an author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamDetails {
    pub id: ExamId,
    pub title: String,
    #[serde(default)]
    pub code: Option<String>,
    pub questions: Vec<Question>,
}

/// A question to be created; the server assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuestion {
    pub section: String,
    pub module: u32,
    pub text: String,
    pub choices: Vec<String>,
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: Option<String>,
    pub difficulty: Difficulty,
}

impl NewQuestion {
    /// Placeholder question added from the editor's "add question" action.
    pub fn template(section: &str, module: u32) -> Self {
        Self {
            section: section.to_string(),
            module,
            text: "New Question".to_string(),
            choices: ["Option A", "Option B", "Option C", "Option D"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            correct_answer: "Option A".to_string(),
            explanation: Some(String::new()),
            difficulty: Difficulty::Medium,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_display_and_parse() {
        assert_eq!(Difficulty::Hard.to_string(), "Hard");
        assert_eq!("easy".parse::<Difficulty>().unwrap(), Difficulty::Easy);
        assert_eq!(" MEDIUM ".parse::<Difficulty>().unwrap(), Difficulty::Medium);
        assert!("brutal".parse::<Difficulty>().is_err());
    }

    #[test]
    fn ids_are_transparent_in_json() {
        let id = QuestionId::new("q-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"q-1\"");
        assert_eq!(id.to_string(), "q-1");
    }

    #[test]
    fn template_correct_answer_is_a_choice() {
        let q = NewQuestion::template("Math", 2);
        assert!(q.choices.contains(&q.correct_answer));
        assert_eq!(q.module, 2);
        assert_eq!(q.difficulty, Difficulty::Medium);
    }

    #[test]
    fn attempt_status_display() {
        assert_eq!(AttemptStatus::SectionComplete.to_string(), "section_complete");
    }
}
