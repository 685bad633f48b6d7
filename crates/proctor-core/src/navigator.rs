//! Deterministic addressing over the question sequence.
//!
//! The navigator keeps the full ordered sequence and an optional
//! section/module filter. Indices are always positions in the filtered
//! view; changing the filter resets the cursor to 0.

use serde::{Deserialize, Serialize};

use crate::model::{Question, QuestionId};

/// A `(section, module)` unit the navigator can be narrowed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectionFilter {
    pub section: String,
    pub module: u32,
}

impl SectionFilter {
    pub fn new(section: impl Into<String>, module: u32) -> Self {
        Self {
            section: section.into(),
            module,
        }
    }

    fn matches(&self, question: &Question) -> bool {
        question.is_in(&self.section, self.module)
    }
}

#[derive(Debug, Default)]
pub struct Navigator {
    questions: Vec<Question>,
    filter: Option<SectionFilter>,
    /// Positions in `questions` that pass the filter.
    view: Vec<usize>,
    current: usize,
}

impl Navigator {
    pub fn new(questions: Vec<Question>) -> Self {
        let mut nav = Self {
            questions,
            filter: None,
            view: Vec::new(),
            current: 0,
        };
        nav.rebuild_view();
        nav
    }

    /// Narrow the view to one section and module, resetting the cursor.
    pub fn set_filter(&mut self, section: &str, module: u32) {
        self.filter = Some(SectionFilter::new(section, module));
        self.rebuild_view();
        self.current = 0;
    }

    /// Show the full sequence again, resetting the cursor.
    pub fn clear_filter(&mut self) {
        self.filter = None;
        self.rebuild_view();
        self.current = 0;
    }

    pub fn filter(&self) -> Option<&SectionFilter> {
        self.filter.as_ref()
    }

    /// Number of questions in the current view.
    pub fn count(&self) -> usize {
        self.view.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> Option<&Question> {
        self.question_at(self.current)
    }

    pub fn question_at(&self, index: usize) -> Option<&Question> {
        self.view.get(index).map(|&i| &self.questions[i])
    }

    /// Move forward one question. No-op at the last index.
    pub fn next(&mut self) -> bool {
        if self.current + 1 < self.view.len() {
            self.current += 1;
            true
        } else {
            false
        }
    }

    /// Move back one question. No-op at index 0.
    pub fn previous(&mut self) -> bool {
        if self.current > 0 {
            self.current -= 1;
            true
        } else {
            false
        }
    }

    /// Move to an index in the view. Out-of-range indices are ignored.
    pub fn go_to(&mut self, index: usize) -> bool {
        if index < self.view.len() {
            self.current = index;
            true
        } else {
            false
        }
    }

    /// Move to a question in the view by id.
    pub fn jump_to(&mut self, question_id: &QuestionId) -> bool {
        match self.position_of(question_id) {
            Some(index) => {
                self.current = index;
                true
            }
            None => false,
        }
    }

    /// Position of a question in the current view.
    pub fn position_of(&self, question_id: &QuestionId) -> Option<usize> {
        self.view
            .iter()
            .position(|&i| &self.questions[i].id == question_id)
    }

    /// Questions in the current view, in order.
    pub fn filtered(&self) -> impl Iterator<Item = &Question> {
        self.view.iter().map(move |&i| &self.questions[i])
    }

    /// Look a question up in the full sequence, ignoring the filter.
    pub fn find(&self, question_id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| &q.id == question_id)
    }

    pub fn all(&self) -> &[Question] {
        &self.questions
    }

    /// Distinct `(section, module)` units in sequence order.
    pub fn sections(&self) -> Vec<SectionFilter> {
        let mut units: Vec<SectionFilter> = Vec::new();
        for q in &self.questions {
            if !units.iter().any(|u| u.matches(q)) {
                units.push(SectionFilter::new(q.section.clone(), q.module));
            }
        }
        units
    }

    /// Replace the sequence, keeping the filter and clamping the cursor.
    pub fn replace(&mut self, questions: Vec<Question>) {
        self.questions = questions;
        self.rebuild_view();
        self.clamp();
    }

    /// Replace one question by id. Returns `false` if it is not present.
    pub fn update(&mut self, question: Question) -> bool {
        match self.questions.iter_mut().find(|q| q.id == question.id) {
            Some(slot) => {
                *slot = question;
                self.rebuild_view();
                self.clamp();
                true
            }
            None => false,
        }
    }

    /// Remove a question by id. Returns `false` if it is not present.
    pub fn remove(&mut self, question_id: &QuestionId) -> bool {
        let before = self.questions.len();
        self.questions.retain(|q| &q.id != question_id);
        if self.questions.len() == before {
            return false;
        }
        self.rebuild_view();
        self.clamp();
        true
    }

    fn rebuild_view(&mut self) {
        self.view = self
            .questions
            .iter()
            .enumerate()
            .filter(|(_, q)| self.filter.as_ref().map_or(true, |f| f.matches(q)))
            .map(|(i, _)| i)
            .collect();
    }

    fn clamp(&mut self) {
        if self.current >= self.view.len() {
            self.current = self.view.len().saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, section: &str, module: u32) -> Question {
        Question {
            id: QuestionId::new(id),
            section: section.into(),
            module,
            text: format!("prompt {id}"),
            choices: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            correct_answer: None,
            explanation: None,
            difficulty: None,
            domain: None,
            skill: None,
            position: None,
        }
    }

    fn sample() -> Navigator {
        Navigator::new(vec![
            question("r1", "Reading", 1),
            question("r2", "Reading", 1),
            question("r3", "Reading", 2),
            question("m1", "Math", 1),
            question("m2", "Math", 1),
        ])
    }

    #[test]
    fn bounds_are_no_ops() {
        let mut nav = sample();
        assert!(!nav.previous());
        assert_eq!(nav.current_index(), 0);
        assert!(nav.go_to(4));
        assert!(!nav.next());
        assert_eq!(nav.current_index(), 4);
        assert!(!nav.go_to(5));
        assert_eq!(nav.current_index(), 4);
    }

    #[test]
    fn empty_sequence_stays_at_zero() {
        let mut nav = Navigator::new(vec![]);
        assert!(!nav.next());
        assert!(!nav.previous());
        assert_eq!(nav.current_index(), 0);
        assert!(nav.current().is_none());
    }

    #[test]
    fn switching_filter_resets_index() {
        let mut nav = sample();
        nav.set_filter("Reading", 1);
        assert_eq!(nav.count(), 2);
        nav.next();
        assert_eq!(nav.current_index(), 1);

        nav.set_filter("Math", 1);
        assert_eq!(nav.current_index(), 0);
        assert_eq!(nav.current().unwrap().id.as_str(), "m1");
    }

    #[test]
    fn jump_to_only_reaches_the_view() {
        let mut nav = sample();
        nav.set_filter("Math", 1);
        assert!(nav.jump_to(&QuestionId::new("m2")));
        assert_eq!(nav.current_index(), 1);
        assert!(!nav.jump_to(&QuestionId::new("r1")));
        assert_eq!(nav.current_index(), 1);
        assert!(nav.find(&QuestionId::new("r1")).is_some());
    }

    #[test]
    fn sections_are_listed_in_order() {
        let nav = sample();
        let units = nav.sections();
        assert_eq!(
            units,
            vec![
                SectionFilter::new("Reading", 1),
                SectionFilter::new("Reading", 2),
                SectionFilter::new("Math", 1),
            ]
        );
    }

    #[test]
    fn remove_clamps_cursor() {
        let mut nav = sample();
        nav.set_filter("Math", 1);
        nav.next();
        assert!(nav.remove(&QuestionId::new("m2")));
        assert_eq!(nav.count(), 1);
        assert_eq!(nav.current_index(), 0);
        assert!(!nav.remove(&QuestionId::new("m2")));
    }

    #[test]
    fn update_replaces_by_id() {
        let mut nav = sample();
        let mut edited = question("r2", "Reading", 1);
        edited.text = "edited".into();
        assert!(nav.update(edited));
        assert_eq!(nav.find(&QuestionId::new("r2")).unwrap().text, "edited");
    }
}
