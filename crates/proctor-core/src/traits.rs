//! Core trait definitions for the external services and the wall clock.
//!
//! These async traits are implemented over HTTP by the `proctor-client`
//! crate and in memory by [`crate::mock`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::model::{
    AttemptId, AttemptStart, ExamDetails, ExamId, NewQuestion, Question, QuestionId,
    SectionAdvance,
};

// ---------------------------------------------------------------------------
// Submission service
// ---------------------------------------------------------------------------

/// The service that owns attempts and persisted answers.
#[async_trait]
pub trait SubmissionService: Send + Sync {
    /// Start an attempt, or resume the student's existing one for this exam.
    async fn start_attempt(&self, exam_id: &ExamId) -> Result<AttemptStart, ServiceError>;

    /// Store an answer. Replaying the same submission must be harmless.
    async fn save_answer(
        &self,
        attempt_id: &AttemptId,
        submission: &AnswerSubmission,
    ) -> Result<(), ServiceError>;

    /// Close a section so the next one can begin.
    async fn submit_section(
        &self,
        attempt_id: &AttemptId,
        section_index: usize,
    ) -> Result<SectionAdvance, ServiceError>;

    /// Finish the attempt.
    async fn submit_attempt(&self, attempt_id: &AttemptId) -> Result<(), ServiceError>;
}

/// Body of an answer save, keyed on the server by `(attempt, question)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
    pub question_id: QuestionId,
    pub selected_answer: String,
    pub time_spent_seconds: u64,
}

// ---------------------------------------------------------------------------
// Content service
// ---------------------------------------------------------------------------

/// The service that stores authored exams.
#[async_trait]
pub trait ContentService: Send + Sync {
    /// Fetch an exam with all of its questions, including correct answers.
    async fn fetch_exam(&self, exam_id: &ExamId) -> Result<ExamDetails, ServiceError>;

    /// Replace a question with the given full body.
    async fn update_question(&self, question: &Question) -> Result<(), ServiceError>;

    /// Create questions; returns the server-assigned ids when the server reports them.
    async fn create_questions(
        &self,
        exam_id: &ExamId,
        questions: &[NewQuestion],
    ) -> Result<Vec<QuestionId>, ServiceError>;

    /// Delete a question.
    async fn delete_question(&self, question_id: &QuestionId) -> Result<(), ServiceError>;
}

// ---------------------------------------------------------------------------
// Time source
// ---------------------------------------------------------------------------

/// Wall-clock time used for timestamps and time-on-question tracking.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

impl TimeSource for WallClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
