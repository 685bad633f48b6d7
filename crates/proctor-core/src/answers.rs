//! In-memory answer store.
//!
//! Holds at most one answer per question. Only the session controller
//! selects answers; the autosave dispatcher only flips the `synced` bit.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::QuestionId;

/// A student's current answer to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    /// The selected choice, by value.
    pub selected: String,
    /// Whether the server has confirmed this exact value.
    pub synced: bool,
    pub time_spent_seconds: u64,
}

#[derive(Debug, Default)]
pub struct AnswerStore {
    entries: HashMap<QuestionId, Answer>,
}

impl AnswerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a selection, replacing any previous answer to the question.
    ///
    /// Returns `true` if the entry needs saving: the value changed, or the
    /// previous value was never confirmed.
    pub fn select(&mut self, question_id: QuestionId, choice: &str, time_spent_seconds: u64) -> bool {
        match self.entries.get_mut(&question_id) {
            Some(answer) if answer.selected == choice => {
                answer.time_spent_seconds = time_spent_seconds;
                !answer.synced
            }
            Some(answer) => {
                answer.selected = choice.to_string();
                answer.synced = false;
                answer.time_spent_seconds = time_spent_seconds;
                true
            }
            None => {
                self.entries.insert(
                    question_id,
                    Answer {
                        selected: choice.to_string(),
                        synced: false,
                        time_spent_seconds,
                    },
                );
                true
            }
        }
    }

    /// Load an answer the server already holds.
    pub fn seed_synced(&mut self, question_id: QuestionId, choice: &str, time_spent_seconds: u64) {
        self.entries.insert(
            question_id,
            Answer {
                selected: choice.to_string(),
                synced: true,
                time_spent_seconds,
            },
        );
    }

    /// Mark the entry synced if it still holds `value`.
    ///
    /// A save that carried an older value must not confirm a newer one;
    /// returns `false` in that case.
    pub fn mark_synced_if_current(&mut self, question_id: &QuestionId, value: &str) -> bool {
        match self.entries.get_mut(question_id) {
            Some(answer) if answer.selected == value => {
                answer.synced = true;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, question_id: &QuestionId) -> Option<&Answer> {
        self.entries.get(question_id)
    }

    pub fn selected(&self, question_id: &QuestionId) -> Option<&str> {
        self.entries.get(question_id).map(|a| a.selected.as_str())
    }

    pub fn is_answered(&self, question_id: &QuestionId) -> bool {
        self.entries.contains_key(question_id)
    }

    /// Questions whose current value is not confirmed, in id order.
    pub fn unsynced(&self) -> Vec<QuestionId> {
        let mut ids: Vec<QuestionId> = self
            .entries
            .iter()
            .filter(|(_, a)| !a.synced)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QuestionId, &Answer)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(id: &str) -> QuestionId {
        QuestionId::new(id)
    }

    #[test]
    fn reselection_replaces_instead_of_appending() {
        let mut store = AnswerStore::new();
        assert!(store.select(q("q1"), "A", 0));
        assert!(store.select(q("q1"), "C", 4));
        assert_eq!(store.len(), 1);
        assert_eq!(store.selected(&q("q1")), Some("C"));
        assert_eq!(store.get(&q("q1")).unwrap().time_spent_seconds, 4);
    }

    #[test]
    fn last_selection_wins_for_any_sequence() {
        let mut store = AnswerStore::new();
        for choice in ["A", "B", "A", "D", "B"] {
            store.select(q("q1"), choice, 0);
        }
        assert_eq!(store.selected(&q("q1")), Some("B"));
    }

    #[test]
    fn stale_value_does_not_confirm_newer_one() {
        let mut store = AnswerStore::new();
        store.select(q("q1"), "A", 0);
        store.select(q("q1"), "B", 0);
        assert!(!store.mark_synced_if_current(&q("q1"), "A"));
        assert!(!store.get(&q("q1")).unwrap().synced);
        assert!(store.mark_synced_if_current(&q("q1"), "B"));
        assert!(store.get(&q("q1")).unwrap().synced);
    }

    #[test]
    fn reselecting_a_synced_value_needs_no_save() {
        let mut store = AnswerStore::new();
        store.seed_synced(q("q1"), "A", 10);
        assert!(!store.select(q("q1"), "A", 12));
        assert!(store.get(&q("q1")).unwrap().synced);
    }

    #[test]
    fn reselecting_an_unsynced_value_asks_for_a_save() {
        let mut store = AnswerStore::new();
        store.select(q("q1"), "A", 0);
        assert!(store.select(q("q1"), "A", 0));
    }

    #[test]
    fn unsynced_is_sorted() {
        let mut store = AnswerStore::new();
        store.select(q("q3"), "A", 0);
        store.select(q("q1"), "A", 0);
        store.seed_synced(q("q2"), "A", 0);
        assert_eq!(store.unsynced(), vec![q("q1"), q("q3")]);
    }
}
