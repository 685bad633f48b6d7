//! Review flags and the navigator overlay.

use std::collections::HashSet;

use serde::Serialize;

use crate::answers::AnswerStore;
use crate::model::{Question, QuestionId};

/// Questions the student marked to revisit. Local state only.
#[derive(Debug, Default)]
pub struct ReviewFlags {
    marked: HashSet<QuestionId>,
}

impl ReviewFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip membership; returns whether the question is now marked.
    pub fn toggle(&mut self, question_id: &QuestionId) -> bool {
        if self.marked.remove(question_id) {
            false
        } else {
            self.marked.insert(question_id.clone());
            true
        }
    }

    pub fn mark(&mut self, question_id: QuestionId) {
        self.marked.insert(question_id);
    }

    pub fn is_marked(&self, question_id: &QuestionId) -> bool {
        self.marked.contains(question_id)
    }

    pub fn len(&self) -> usize {
        self.marked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marked.is_empty()
    }
}

/// Answer state of one question in the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerState {
    Answered,
    Unanswered,
}

/// One cell of the in-session question overlay.
///
/// `marked` is independent of `state`: a question can be answered and marked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlayEntry {
    /// Position within the current section, starting at 0.
    pub index: usize,
    pub question_id: QuestionId,
    pub state: AnswerState,
    pub marked: bool,
}

/// Build the overlay for a sequence of questions.
pub fn overlay<'a>(
    questions: impl IntoIterator<Item = &'a Question>,
    answers: &AnswerStore,
    review: &ReviewFlags,
) -> Vec<OverlayEntry> {
    questions
        .into_iter()
        .enumerate()
        .map(|(index, q)| OverlayEntry {
            index,
            question_id: q.id.clone(),
            state: if answers.is_answered(&q.id) {
                AnswerState::Answered
            } else {
                AnswerState::Unanswered
            },
            marked: review.is_marked(&q.id),
        })
        .collect()
}
