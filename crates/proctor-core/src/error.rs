//! Error types for the session engine and its collaborators.
//!
//! `ServiceError` is defined here rather than in the HTTP client so the
//! controllers can classify failures without knowing the transport.

use thiserror::Error;

use crate::model::QuestionId;
use crate::session::SessionState;

/// Errors returned by the submission and content services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// A network error occurred.
    #[error("network error: {0}")]
    Network(String),

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// The bearer token was rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The addressed resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The response did not match the expected contract.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ServiceError {
    /// Returns `true` if repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Network(_) | ServiceError::Timeout(_) => true,
            ServiceError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// A service response that violates the data model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing or empty field: {0}")]
    EmptyField(&'static str),

    #[error("exam has no sections")]
    NoSections,

    #[error("section {0} has no questions")]
    EmptySection(String),

    #[error("duplicate question id: {0}")]
    DuplicateQuestion(QuestionId),

    #[error("question {0} has no choices")]
    NoChoices(QuestionId),

    #[error("correct answer of question {0} is not one of its choices")]
    CorrectAnswerNotAChoice(QuestionId),

    #[error("unknown difficulty on question {question}: {value}")]
    UnknownDifficulty { question: QuestionId, value: String },

    #[error("current section {index} out of range ({count} sections)")]
    SectionOutOfRange { index: usize, count: usize },

    #[error("reference to unknown question: {0}")]
    UnknownQuestion(QuestionId),
}

impl From<ValidationError> for ServiceError {
    fn from(e: ValidationError) -> Self {
        ServiceError::InvalidResponse(e.to_string())
    }
}

/// Errors surfaced by the exam session controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("failed to start attempt: {0}")]
    StartFailed(#[source] ServiceError),

    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("unknown question: {0}")]
    UnknownQuestion(QuestionId),

    #[error("question {0} is not in the current section")]
    OutsideSection(QuestionId),

    #[error("'{choice}' is not a choice of question {question}")]
    InvalidChoice { question: QuestionId, choice: String },

    #[error("{unsynced} answer(s) could not be saved, submission postponed")]
    SyncIncomplete { unsynced: usize },

    #[error("submission failed: {0}")]
    SubmitFailed(#[source] ServiceError),
}

/// A draft edit that would leave the question in an invalid state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("choice index {index} out of range ({count} choices)")]
    ChoiceOutOfRange { index: usize, count: usize },

    #[error("correct answer '{0}' is not one of the choices")]
    NotAChoice(String),

    #[error("cannot remove the correct answer '{0}', pick another correct answer first")]
    RemovesCorrectAnswer(String),

    #[error("a question needs at least one choice")]
    LastChoice,
}

/// Errors surfaced by the content editor session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditorError {
    #[error("no exam loaded")]
    NotLoaded,

    #[error("no question selected")]
    NoSelection,

    #[error("unknown question: {0}")]
    UnknownQuestion(QuestionId),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("failed to load exam: {0}")]
    LoadFailed(#[source] ServiceError),

    #[error("failed to save question {question}: {source}")]
    SaveFailed {
        question: QuestionId,
        #[source]
        source: ServiceError,
    },

    #[error("content service error: {0}")]
    Service(#[from] ServiceError),
}
