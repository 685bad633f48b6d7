//! Content editor session.
//!
//! The authoring counterpart of [`crate::session::ExamSession`]: one author
//! edits one question at a time as a draft. Edits mark the draft dirty and
//! restart a quiet-period debounce; when it fires the whole question is
//! saved. Changing the selection without saving discards the draft.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::{EditorError, PatchError};
use crate::model::{Difficulty, ExamDetails, ExamId, NewQuestion, Question, QuestionId};
use crate::navigator::{Navigator, SectionFilter};
use crate::schedule::Debouncer;
use crate::session::{NoopObserver, SessionObserver};
use crate::traits::ContentService;

/// Editor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    /// No question selected.
    Idle,
    Editing { dirty: bool },
    Saving,
}

/// A field-level change to a question draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionPatch {
    Text(String),
    /// Replace the choice at `index`. If it was the correct answer, the
    /// correct answer follows it.
    Choice { index: usize, text: String },
    AddChoice(String),
    RemoveChoice(usize),
    CorrectAnswer(String),
    Explanation(Option<String>),
    Difficulty(Difficulty),
    Domain(Option<String>),
    Skill(Option<String>),
}

impl QuestionPatch {
    /// Apply the patch. On error the question is left untouched.
    pub fn apply(&self, question: &mut Question) -> Result<(), PatchError> {
        match self {
            QuestionPatch::Text(text) => question.text = text.clone(),
            QuestionPatch::Choice { index, text } => {
                let count = question.choices.len();
                let slot = question
                    .choices
                    .get_mut(*index)
                    .ok_or(PatchError::ChoiceOutOfRange {
                        index: *index,
                        count,
                    })?;
                let previous = std::mem::replace(slot, text.clone());
                if question.correct_answer.as_deref() == Some(previous.as_str()) {
                    question.correct_answer = Some(text.clone());
                }
            }
            QuestionPatch::AddChoice(text) => question.choices.push(text.clone()),
            QuestionPatch::RemoveChoice(index) => {
                let count = question.choices.len();
                let Some(choice) = question.choices.get(*index) else {
                    return Err(PatchError::ChoiceOutOfRange {
                        index: *index,
                        count,
                    });
                };
                if question.correct_answer.as_deref() == Some(choice.as_str()) {
                    return Err(PatchError::RemovesCorrectAnswer(choice.clone()));
                }
                if count == 1 {
                    return Err(PatchError::LastChoice);
                }
                question.choices.remove(*index);
            }
            QuestionPatch::CorrectAnswer(answer) => {
                if !question.has_choice(answer) {
                    return Err(PatchError::NotAChoice(answer.clone()));
                }
                question.correct_answer = Some(answer.clone());
            }
            QuestionPatch::Explanation(explanation) => question.explanation = explanation.clone(),
            QuestionPatch::Difficulty(difficulty) => question.difficulty = Some(*difficulty),
            QuestionPatch::Domain(domain) => question.domain = domain.clone(),
            QuestionPatch::Skill(skill) => question.skill = skill.clone(),
        }
        Ok(())
    }
}

/// A working copy of one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorDraft {
    pub question: Question,
    pub dirty: bool,
}

/// What [`EditorSession::next_event`] observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    /// The debounce fired and the draft was saved.
    Saved(QuestionId),
    /// The debounce fired and the save failed; the draft stays dirty.
    SaveFailed(QuestionId),
    /// No autosave is scheduled.
    Idle,
}

pub struct EditorSession {
    service: Arc<dyn ContentService>,
    observer: Arc<dyn SessionObserver>,
    config: SessionConfig,
    state: EditorState,
    exam_id: Option<ExamId>,
    exam: Option<ExamDetails>,
    /// Persisted copies of every question.
    navigator: Navigator,
    draft: Option<EditorDraft>,
    debounce: Debouncer,
    slow: bool,
    last_error: Option<EditorError>,
}

impl EditorSession {
    pub fn new(service: Arc<dyn ContentService>, config: SessionConfig) -> Self {
        let debounce = Debouncer::new(config.autosave_debounce);
        Self {
            service,
            observer: Arc::new(NoopObserver),
            config,
            state: EditorState::Idle,
            exam_id: None,
            exam: None,
            navigator: Navigator::default(),
            draft: None,
            debounce,
            slow: false,
            last_error: None,
        }
    }

    /// Receive slow-load notifications through `on_slow_start`.
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    pub fn exam(&self) -> Option<&ExamDetails> {
        self.exam.as_ref()
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn draft(&self) -> Option<&EditorDraft> {
        self.draft.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.draft.as_ref().is_some_and(|d| d.dirty)
    }

    pub fn is_slow(&self) -> bool {
        self.slow
    }

    pub fn last_error(&self) -> Option<&EditorError> {
        self.last_error.as_ref()
    }

    /// Whether an autosave is scheduled.
    pub fn autosave_pending(&self) -> bool {
        self.debounce.is_pending()
    }

    /// Fetch `exam_id` for authoring and select the first question of its
    /// first section.
    pub async fn load(&mut self, exam_id: ExamId) -> Result<(), EditorError> {
        self.exam_id = Some(exam_id.clone());
        self.slow = false;
        self.discard_draft();

        let service = Arc::clone(&self.service);
        let request = service.fetch_exam(&exam_id);
        tokio::pin!(request);
        let watchdog = tokio::time::sleep(self.config.slow_start_threshold);
        tokio::pin!(watchdog);

        let result = loop {
            tokio::select! {
                result = &mut request => break result,
                () = &mut watchdog, if !self.slow => {
                    self.slow = true;
                    warn!(exam = %exam_id, "exam load is taking longer than expected");
                    self.observer.on_slow_start(&exam_id);
                }
            }
        };
        self.slow = false;

        match result {
            Ok(details) => {
                info!(exam = %details.id, questions = details.questions.len(), "exam loaded for editing");
                self.last_error = None;
                self.install(details);
                if let Some(first) = self.navigator.sections().into_iter().next() {
                    self.navigator.set_filter(&first.section, first.module);
                }
                self.select_cursor();
                Ok(())
            }
            Err(e) => {
                error!(exam = %exam_id, "failed to load exam: {e}");
                let err = EditorError::LoadFailed(e);
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Re-run the last load.
    pub async fn retry(&mut self) -> Result<(), EditorError> {
        let exam_id = self.exam_id.clone().ok_or(EditorError::NotLoaded)?;
        self.load(exam_id).await
    }

    /// Show only one section and module; selects its first question.
    pub fn set_filter(&mut self, section: &str, module: u32) {
        self.discard_draft();
        self.navigator.set_filter(section, module);
        self.select_cursor();
    }

    /// Start editing a fresh copy of the persisted question.
    ///
    /// Any unsaved draft is discarded. A question outside the current
    /// filter switches the filter to its section.
    pub fn select_question(&mut self, question_id: &QuestionId) -> Result<(), EditorError> {
        let question = self
            .navigator
            .find(question_id)
            .cloned()
            .ok_or_else(|| EditorError::UnknownQuestion(question_id.clone()))?;
        if self.navigator.position_of(question_id).is_none() {
            self.navigator.set_filter(&question.section, question.module);
        }
        self.navigator.jump_to(question_id);
        self.discard_draft();
        debug!(question = %question_id, "question selected");
        self.draft = Some(EditorDraft {
            question,
            dirty: false,
        });
        self.state = EditorState::Editing { dirty: false };
        Ok(())
    }

    /// Apply a change to the draft and restart the autosave debounce.
    pub fn edit(&mut self, patch: QuestionPatch) -> Result<(), EditorError> {
        let draft = self.draft.as_mut().ok_or(EditorError::NoSelection)?;
        let mut question = draft.question.clone();
        patch.apply(&mut question)?;
        draft.question = question;
        draft.dirty = true;
        self.debounce.schedule();
        self.state = EditorState::Editing { dirty: true };
        Ok(())
    }

    /// Persist the draft with a full replace. A clean draft is not sent.
    pub async fn save(&mut self) -> Result<(), EditorError> {
        let draft = self.draft.as_ref().ok_or(EditorError::NoSelection)?;
        self.debounce.cancel();
        if !draft.dirty {
            return Ok(());
        }
        let question = draft.question.clone();

        self.state = EditorState::Saving;
        match self.service.update_question(&question).await {
            Ok(()) => {
                info!(question = %question.id, "question saved");
                if let Some(slot) = self
                    .exam
                    .as_mut()
                    .and_then(|e| e.questions.iter_mut().find(|q| q.id == question.id))
                {
                    *slot = question.clone();
                }
                self.navigator.update(question);
                if let Some(draft) = self.draft.as_mut() {
                    draft.dirty = false;
                }
                self.last_error = None;
                self.state = EditorState::Editing { dirty: false };
                Ok(())
            }
            Err(e) => {
                warn!(question = %question.id, "question save failed: {e}");
                let err = EditorError::SaveFailed {
                    question: question.id,
                    source: e,
                };
                self.last_error = Some(err.clone());
                self.state = EditorState::Editing { dirty: true };
                Err(err)
            }
        }
    }

    /// Save, then move to the next question. Stays put if the save fails.
    pub async fn save_and_advance(&mut self) -> Result<bool, EditorError> {
        self.save().await?;
        Ok(self.next())
    }

    /// Select the next question in the filtered list. Unsaved edits are discarded.
    pub fn next(&mut self) -> bool {
        let moved = self.navigator.next();
        if moved {
            self.select_cursor();
        }
        moved
    }

    pub fn previous(&mut self) -> bool {
        let moved = self.navigator.previous();
        if moved {
            self.select_cursor();
        }
        moved
    }

    /// Create a placeholder question in the current section and select it.
    pub async fn add_question(&mut self) -> Result<QuestionId, EditorError> {
        let exam_id = self.loaded_exam_id()?;
        let SectionFilter { section, module } = self
            .navigator
            .filter()
            .cloned()
            .or_else(|| self.navigator.sections().into_iter().next())
            .unwrap_or_else(|| SectionFilter::new("Reading", 1));

        let template = NewQuestion::template(&section, module);
        let created = self
            .service
            .create_questions(&exam_id, std::slice::from_ref(&template))
            .await?;
        info!(exam = %exam_id, section = %section, module, "question created");

        // The server is the source of ids and ordering; reload to pick both up.
        let details = self.service.fetch_exam(&exam_id).await?;
        self.discard_draft();
        self.install(details);
        self.navigator.set_filter(&section, module);

        let new_id = match created.into_iter().next() {
            Some(id) => id,
            None => self
                .navigator
                .filtered()
                .last()
                .map(|q| q.id.clone())
                .ok_or(EditorError::NoSelection)?,
        };
        self.select_question(&new_id)?;
        Ok(new_id)
    }

    /// Delete the selected question and clear the selection.
    pub async fn delete_question(&mut self) -> Result<QuestionId, EditorError> {
        let question_id = self
            .draft
            .as_ref()
            .map(|d| d.question.id.clone())
            .ok_or(EditorError::NoSelection)?;
        self.service.delete_question(&question_id).await?;
        info!(question = %question_id, "question deleted");
        if let Some(exam) = self.exam.as_mut() {
            exam.questions.retain(|q| q.id != question_id);
        }
        self.navigator.remove(&question_id);
        self.discard_draft();
        Ok(question_id)
    }

    /// Wait for the autosave debounce and save the draft.
    ///
    /// Returns [`EditorEvent::Idle`] immediately when nothing is scheduled.
    pub async fn next_event(&mut self) -> EditorEvent {
        if !self.debounce.is_pending() {
            return EditorEvent::Idle;
        }
        self.debounce.fired().await;
        let Some(question_id) = self.draft.as_ref().map(|d| d.question.id.clone()) else {
            return EditorEvent::Idle;
        };
        debug!(question = %question_id, "autosave debounce fired");
        match self.save().await {
            Ok(()) => EditorEvent::Saved(question_id),
            Err(_) => EditorEvent::SaveFailed(question_id),
        }
    }

    /// Drop the draft and any scheduled autosave.
    pub fn unmount(&mut self) {
        if self.is_dirty() {
            debug!("discarding unsaved draft on unmount");
        }
        self.discard_draft();
    }

    fn install(&mut self, details: ExamDetails) {
        let filter = self.navigator.filter().cloned();
        self.navigator.replace(details.questions.clone());
        if let Some(filter) = filter {
            self.navigator.set_filter(&filter.section, filter.module);
        }
        self.exam = Some(details);
    }

    fn loaded_exam_id(&self) -> Result<ExamId, EditorError> {
        self.exam
            .as_ref()
            .map(|e| e.id.clone())
            .ok_or(EditorError::NotLoaded)
    }

    /// Make the question under the cursor the selection.
    fn select_cursor(&mut self) {
        self.discard_draft();
        if let Some(question) = self.navigator.current().cloned() {
            self.draft = Some(EditorDraft {
                question,
                dirty: false,
            });
            self.state = EditorState::Editing { dirty: false };
        }
    }

    fn discard_draft(&mut self) {
        self.debounce.cancel();
        self.draft = None;
        self.state = EditorState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::{sample_exam_details, InMemoryContentService};

    fn q(id: &str) -> QuestionId {
        QuestionId::new(id)
    }

    fn question() -> Question {
        sample_exam_details().questions.remove(0)
    }

    async fn loaded(service: &Arc<InMemoryContentService>) -> EditorSession {
        let mut editor = EditorSession::new(service.clone(), SessionConfig::default());
        editor.load(ExamId::new("sat-practice-1")).await.unwrap();
        editor
    }

    #[test]
    fn editing_the_correct_choice_moves_the_correct_answer() {
        let mut question = question();
        assert_eq!(question.correct_answer.as_deref(), Some("B"));
        QuestionPatch::Choice {
            index: 1,
            text: "Bee".into(),
        }
        .apply(&mut question)
        .unwrap();
        assert_eq!(question.choices[1], "Bee");
        assert_eq!(question.correct_answer.as_deref(), Some("Bee"));
    }

    #[test]
    fn editing_another_choice_keeps_the_correct_answer() {
        let mut question = question();
        QuestionPatch::Choice {
            index: 0,
            text: "Ay".into(),
        }
        .apply(&mut question)
        .unwrap();
        assert_eq!(question.correct_answer.as_deref(), Some("B"));
    }

    #[test]
    fn invalid_patches_leave_the_question_untouched() {
        let mut question = question();
        let before = question.clone();
        assert_eq!(
            QuestionPatch::CorrectAnswer("Z".into()).apply(&mut question),
            Err(PatchError::NotAChoice("Z".into()))
        );
        assert_eq!(
            QuestionPatch::RemoveChoice(1).apply(&mut question),
            Err(PatchError::RemovesCorrectAnswer("B".into()))
        );
        assert!(matches!(
            QuestionPatch::Choice {
                index: 9,
                text: "x".into()
            }
            .apply(&mut question),
            Err(PatchError::ChoiceOutOfRange { index: 9, count: 4 })
        ));
        assert_eq!(question, before);
    }

    #[test]
    fn last_choice_cannot_be_removed() {
        let mut question = question();
        question.choices = vec!["only".into()];
        question.correct_answer = None;
        assert_eq!(
            QuestionPatch::RemoveChoice(0).apply(&mut question),
            Err(PatchError::LastChoice)
        );
    }

    #[tokio::test]
    async fn load_selects_first_question_of_first_section() {
        let service = Arc::new(InMemoryContentService::sample());
        let editor = loaded(&service).await;
        assert_eq!(editor.navigator().count(), 3);
        assert_eq!(editor.draft().unwrap().question.id, q("r1"));
        assert_eq!(editor.state(), EditorState::Editing { dirty: false });
    }

    #[tokio::test]
    async fn load_failure_is_reported_and_retryable() {
        let service = Arc::new(InMemoryContentService::sample());
        service.set_offline(true);
        let mut editor = EditorSession::new(service.clone(), SessionConfig::default());
        assert!(matches!(
            editor.load(ExamId::new("sat-practice-1")).await,
            Err(EditorError::LoadFailed(_))
        ));
        service.set_offline(false);
        editor.retry().await.unwrap();
        assert!(editor.exam().is_some());
    }

    #[tokio::test]
    async fn reselecting_discards_unsaved_edits() {
        let service = Arc::new(InMemoryContentService::sample());
        let mut editor = loaded(&service).await;

        editor.select_question(&q("r1")).unwrap();
        editor
            .edit(QuestionPatch::Text("Rewritten".into()))
            .unwrap();
        assert!(editor.is_dirty());

        editor.select_question(&q("r2")).unwrap();
        editor.select_question(&q("r1")).unwrap();
        assert_eq!(editor.draft().unwrap().question.text, "Question r1");
        assert!(!editor.is_dirty());
        assert!(!editor.autosave_pending());
        assert_eq!(service.update_calls(), 0);
    }

    #[tokio::test]
    async fn selecting_outside_the_filter_switches_section() {
        let service = Arc::new(InMemoryContentService::sample());
        let mut editor = loaded(&service).await;
        editor.select_question(&q("m2")).unwrap();
        assert_eq!(editor.navigator().filter().unwrap().section, "Math");
        assert_eq!(editor.navigator().current_index(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn autosave_fires_after_quiet_period() {
        let service = Arc::new(InMemoryContentService::sample());
        let mut editor = loaded(&service).await;
        editor.edit(QuestionPatch::Text("One".into())).unwrap();
        tokio::time::advance(Duration::from_millis(1500)).await;
        editor.edit(QuestionPatch::Text("Two".into())).unwrap();

        assert_eq!(editor.next_event().await, EditorEvent::Saved(q("r1")));
        assert_eq!(service.update_calls(), 1);
        assert_eq!(service.question(&q("r1")).unwrap().text, "Two");
        assert_eq!(editor.state(), EditorState::Editing { dirty: false });
        assert_eq!(editor.next_event().await, EditorEvent::Idle);
    }

    #[tokio::test]
    async fn failed_save_keeps_the_draft_dirty() {
        let service = Arc::new(InMemoryContentService::sample());
        let mut editor = loaded(&service).await;
        editor
            .edit(QuestionPatch::Difficulty(Difficulty::Hard))
            .unwrap();
        service.set_offline(true);

        assert!(matches!(
            editor.save_and_advance().await,
            Err(EditorError::SaveFailed { .. })
        ));
        assert!(editor.is_dirty());
        assert_eq!(editor.navigator().current_index(), 0);
        assert!(editor.last_error().is_some());

        service.set_offline(false);
        assert!(editor.save_and_advance().await.unwrap());
        assert_eq!(editor.draft().unwrap().question.id, q("r2"));
        assert_eq!(
            service.question(&q("r1")).unwrap().difficulty,
            Some(Difficulty::Hard)
        );
    }

    #[tokio::test]
    async fn saved_copy_is_what_reselection_shows() {
        let service = Arc::new(InMemoryContentService::sample());
        let mut editor = loaded(&service).await;
        editor
            .edit(QuestionPatch::Choice {
                index: 1,
                text: "Bee".into(),
            })
            .unwrap();
        editor.save().await.unwrap();
        let saved_id = editor.draft().unwrap().question.id.clone();
        let held = editor
            .exam()
            .unwrap()
            .questions
            .iter()
            .find(|x| x.id == saved_id)
            .unwrap();
        assert_eq!(held.choices[1], "Bee");
        editor.next();
        editor.previous();
        let draft = editor.draft().unwrap();
        assert_eq!(draft.question.correct_answer.as_deref(), Some("Bee"));
    }

    #[tokio::test]
    async fn add_question_uses_template_in_current_section() {
        let service = Arc::new(InMemoryContentService::sample());
        let mut editor = loaded(&service).await;
        editor.set_filter("Math", 1);

        let id = editor.add_question().await.unwrap();
        assert_eq!(service.question_count(), 6);
        let draft = editor.draft().unwrap();
        assert_eq!(draft.question.id, id);
        assert_eq!(draft.question.section, "Math");
        assert_eq!(draft.question.correct_answer.as_deref(), Some("Option A"));
        assert_eq!(draft.question.choices.len(), 4);
        assert_eq!(editor.navigator().count(), 3);
    }

    #[tokio::test]
    async fn delete_question_clears_selection() {
        let service = Arc::new(InMemoryContentService::sample());
        let mut editor = loaded(&service).await;
        editor.select_question(&q("r2")).unwrap();

        assert_eq!(editor.delete_question().await.unwrap(), q("r2"));
        assert!(editor.draft().is_none());
        assert_eq!(editor.state(), EditorState::Idle);
        assert_eq!(editor.navigator().count(), 2);
        assert_eq!(service.question_count(), 4);
        assert!(editor.exam().unwrap().questions.iter().all(|x| x.id != q("r2")));
        assert!(matches!(
            editor.delete_question().await,
            Err(EditorError::NoSelection)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_cancels_autosave() {
        let service = Arc::new(InMemoryContentService::sample());
        let mut editor = loaded(&service).await;
        editor.edit(QuestionPatch::Text("gone".into())).unwrap();
        editor.unmount();
        assert_eq!(editor.next_event().await, EditorEvent::Idle);
        assert_eq!(service.update_calls(), 0);
    }
}
