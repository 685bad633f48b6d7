//! Exam session controller.
//!
//! Owns one student's attempt for the lifetime of the exam screen and
//! mediates every state transition:
//!
//! ```text
//! loading ──► active ──► section_transition ──► active ──► submitting ──► completed
//!    │                                                  ▲
//!    └──► load_failed ──(retry)──► loading              └── time expired / submit
//! ```
//!
//! The controller is driven from a single task. User actions are `&mut self`
//! calls; clock ticks and autosave completions are delivered by awaiting
//! [`ExamSession::next_event`]. Network failures during the attempt never
//! escape as panics or poisoned state: autosave failures only leave answers
//! unsynced, and only `start` is fatal to the screen.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::answers::AnswerStore;
use crate::autosave::{AutosaveDispatcher, SaveReport};
use crate::clock::{ClockTick, SessionClock};
use crate::config::SessionConfig;
use crate::error::{ServiceError, SessionError};
use crate::model::{
    Attempt, AttemptStart, AttemptStatus, Exam, ExamId, Question, QuestionId, SectionPlan,
};
use crate::navigator::Navigator;
use crate::review::{overlay, OverlayEntry, ReviewFlags};
use crate::traits::{SubmissionService, TimeSource, WallClock};

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Loading,
    LoadFailed,
    Active,
    SectionTransition,
    Submitting,
    Completed,
    /// The exam screen was left; the attempt can be resumed from the server.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Loading => write!(f, "loading"),
            SessionState::LoadFailed => write!(f, "load_failed"),
            SessionState::Active => write!(f, "active"),
            SessionState::SectionTransition => write!(f, "section_transition"),
            SessionState::Submitting => write!(f, "submitting"),
            SessionState::Completed => write!(f, "completed"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// What [`ExamSession::next_event`] observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// One second elapsed in the active section.
    Tick { remaining: u64 },
    /// The section ran out of time and was submitted.
    TimeExpired { section: usize },
    AnswerSynced(QuestionId),
    /// The save failed; the answer will be resent at the next retry point.
    AnswerSaveFailed(QuestionId),
    /// A save completed for a value that has since been replaced.
    StaleSaveDiscarded(QuestionId),
    /// Nothing is ticking and no save is outstanding.
    Idle,
}

/// Receives session notifications, typically to drive a UI.
pub trait SessionObserver: Send + Sync {
    fn on_state_change(&self, from: SessionState, to: SessionState);
    /// The start request has been pending longer than the slow threshold.
    fn on_slow_start(&self, exam_id: &ExamId);
    fn on_tick(&self, remaining_seconds: u64);
    fn on_time_expired(&self, section_index: usize);
}

/// No-op observer.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn on_state_change(&self, _: SessionState, _: SessionState) {}
    fn on_slow_start(&self, _: &ExamId) {}
    fn on_tick(&self, _: u64) {}
    fn on_time_expired(&self, _: usize) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finalize {
    /// Student-initiated: unsynced answers or a failed submission return
    /// the student to the section.
    Manual,
    /// Timer-initiated: proceeds regardless of unsynced answers.
    Forced,
}

enum Wake {
    Tick,
    Saved(Option<SaveReport>),
}

pub struct ExamSession {
    service: Arc<dyn SubmissionService>,
    time: Arc<dyn TimeSource>,
    observer: Arc<dyn SessionObserver>,
    config: SessionConfig,
    state: SessionState,
    exam_id: Option<ExamId>,
    slow: bool,
    last_error: Option<ServiceError>,
    attempt: Option<Attempt>,
    exam: Option<Exam>,
    navigator: Navigator,
    answers: AnswerStore,
    review: ReviewFlags,
    clock: SessionClock,
    ticker: Option<Interval>,
    dispatcher: Option<AutosaveDispatcher>,
    /// Question on screen and since when.
    visit: Option<(QuestionId, DateTime<Utc>)>,
    time_spent: HashMap<QuestionId, u64>,
    next_section_start: Option<DateTime<Utc>>,
    final_submit_failed: bool,
}

impl ExamSession {
    pub fn new(service: Arc<dyn SubmissionService>, config: SessionConfig) -> Self {
        Self {
            service,
            time: Arc::new(WallClock),
            observer: Arc::new(NoopObserver),
            config,
            state: SessionState::Loading,
            exam_id: None,
            slow: false,
            last_error: None,
            attempt: None,
            exam: None,
            navigator: Navigator::default(),
            answers: AnswerStore::new(),
            review: ReviewFlags::new(),
            clock: SessionClock::stopped(),
            ticker: None,
            dispatcher: None,
            visit: None,
            time_spent: HashMap::new(),
            next_section_start: None,
            final_submit_failed: false,
        }
    }

    pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    // -- accessors ----------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the pending start has outlived the slow threshold.
    pub fn is_slow(&self) -> bool {
        self.slow
    }

    pub fn attempt(&self) -> Option<&Attempt> {
        self.attempt.as_ref()
    }

    pub fn exam(&self) -> Option<&Exam> {
        self.exam.as_ref()
    }

    pub fn answers(&self) -> &AnswerStore {
        &self.answers
    }

    pub fn review(&self) -> &ReviewFlags {
        &self.review
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.navigator.current()
    }

    /// Index into the exam's sections of the section in progress.
    pub fn section_index(&self) -> usize {
        self.attempt.as_ref().map_or(0, |a| a.current_section)
    }

    pub fn current_section(&self) -> Option<&SectionPlan> {
        self.exam.as_ref()?.sections.get(self.section_index())
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.clock.remaining()
    }

    /// The most recent service failure, if any.
    pub fn last_error(&self) -> Option<&ServiceError> {
        self.last_error.as_ref()
    }

    /// Answered/unanswered/marked state of every question in the current section.
    pub fn overlay(&self) -> Vec<OverlayEntry> {
        overlay(self.navigator.filtered(), &self.answers, &self.review)
    }

    // -- lifecycle ----------------------------------------------------------

    /// Start or resume the student's attempt at `exam_id`.
    ///
    /// The request is never cancelled by the engine. If it is still pending
    /// after the slow threshold the observer is told, and `is_slow` reports
    /// `true` until it resolves.
    pub async fn start(&mut self, exam_id: ExamId) -> Result<(), SessionError> {
        if self.attempt.is_some()
            || !matches!(self.state, SessionState::Loading | SessionState::LoadFailed)
        {
            return Err(self.invalid("start"));
        }
        self.exam_id = Some(exam_id.clone());
        self.slow = false;
        self.last_error = None;
        self.transition(SessionState::Loading);

        let service = Arc::clone(&self.service);
        let request = service.start_attempt(&exam_id);
        tokio::pin!(request);
        let watchdog = tokio::time::sleep(self.config.slow_start_threshold);
        tokio::pin!(watchdog);

        let result = loop {
            tokio::select! {
                result = &mut request => break result,
                () = &mut watchdog, if !self.slow => {
                    self.slow = true;
                    warn!(exam = %exam_id, "attempt start is taking longer than expected");
                    self.observer.on_slow_start(&exam_id);
                }
            }
        };
        self.slow = false;

        match result {
            Ok(start) => {
                self.install(start);
                Ok(())
            }
            Err(e) => {
                error!(exam = %exam_id, "failed to start attempt: {e}");
                self.last_error = Some(e.clone());
                self.transition(SessionState::LoadFailed);
                Err(SessionError::StartFailed(e))
            }
        }
    }

    /// Re-run a failed start.
    pub async fn retry(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::LoadFailed {
            return Err(self.invalid("retry"));
        }
        let Some(exam_id) = self.exam_id.clone() else {
            return Err(self.invalid("retry"));
        };
        self.start(exam_id).await
    }

    /// Submit the current section early and move to the break before the
    /// next one. On the final section this is a full [`submit`](Self::submit).
    pub async fn finish_section(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Active {
            return Err(self.invalid("finish the section"));
        }
        if self.is_final_section() {
            return self.submit().await;
        }
        self.close_section().await;
        Ok(())
    }

    /// Leave the break and start the next section's clock.
    pub fn begin_next_section(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::SectionTransition {
            return Err(self.invalid("begin the next section"));
        }
        let index = self.section_index();
        let started_at = self
            .next_section_start
            .take()
            .unwrap_or_else(|| self.time.now());
        self.enter_section(index, started_at);
        Ok(())
    }

    /// The section clock reached zero.
    ///
    /// Submits the current section without waiting for outstanding saves and
    /// moves on to the next section, or finishes the attempt if this was the
    /// last one. Ignored unless the session is active, which makes it
    /// mutually exclusive with [`submit`](Self::submit).
    pub async fn time_expired(&mut self) {
        if self.state != SessionState::Active {
            debug!(state = %self.state, "time expiry ignored");
            return;
        }
        let section = self.section_index();
        info!(section, "section time expired");
        self.observer.on_time_expired(section);
        self.close_section().await;
    }

    /// Finish the attempt.
    ///
    /// Every unsynced answer is resent before the attempt is submitted. If
    /// some still fail, or the submission itself fails, the student is
    /// returned to the section with an error and can try again. Ignored
    /// unless the session is active.
    pub async fn submit(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Active => {
                self.clock.pause();
                self.ticker = None;
                self.end_visit();
                self.transition(SessionState::Submitting);
                self.finalize(Finalize::Manual).await
            }
            // A timer-forced submission that failed may be retried by hand.
            SessionState::Submitting if self.final_submit_failed => {
                self.finalize(Finalize::Forced).await
            }
            state => {
                debug!(%state, "submit ignored");
                Ok(())
            }
        }
    }

    /// Tear the session down when the exam screen goes away.
    ///
    /// Stops the clock and drops outstanding saves without flushing. The
    /// attempt itself lives on the server and resumes on the next start.
    pub fn unmount(&mut self) {
        self.clock.stop();
        self.ticker = None;
        if let Some(dispatcher) = self.dispatcher.as_mut() {
            dispatcher.cancel_all();
        }
        self.end_visit();
        info!(unsynced = self.answers.unsynced().len(), "session unmounted");
        self.transition(SessionState::Closed);
    }

    // -- student actions ----------------------------------------------------

    /// Record a choice and schedule its save. Never waits on the network.
    pub fn select_answer(
        &mut self,
        question_id: &QuestionId,
        choice: &str,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Active {
            return Err(self.invalid("select an answer"));
        }
        let question = self
            .navigator
            .find(question_id)
            .ok_or_else(|| SessionError::UnknownQuestion(question_id.clone()))?;
        if !question.has_choice(choice) {
            return Err(SessionError::InvalidChoice {
                question: question_id.clone(),
                choice: choice.to_string(),
            });
        }
        if self.navigator.position_of(question_id).is_none() {
            return Err(SessionError::OutsideSection(question_id.clone()));
        }

        let spent = self.time_spent_on(question_id);
        let needs_save = self.answers.select(question_id.clone(), choice, spent);
        debug!(question = %question_id, choice, needs_save, "answer selected");
        if let Some(dispatcher) = self.dispatcher.as_mut() {
            if needs_save {
                dispatcher.enqueue(question_id, &self.answers);
            }
            dispatcher.retry_failed(&self.answers);
        }
        Ok(())
    }

    /// Flip the review mark. Returns whether the question is now marked;
    /// unknown questions are ignored and report `false`.
    pub fn toggle_review(&mut self, question_id: &QuestionId) -> bool {
        if self.navigator.find(question_id).is_none() {
            debug!(question = %question_id, "review toggle for unknown question ignored");
            return false;
        }
        self.review.toggle(question_id)
    }

    pub fn next(&mut self) -> bool {
        self.navigate(Navigator::next)
    }

    pub fn previous(&mut self) -> bool {
        self.navigate(Navigator::previous)
    }

    pub fn go_to(&mut self, index: usize) -> bool {
        self.navigate(|nav| nav.go_to(index))
    }

    pub fn jump_to(&mut self, question_id: &QuestionId) -> bool {
        self.navigate(|nav| nav.jump_to(question_id))
    }

    // -- event pump ---------------------------------------------------------

    /// Wait for the next clock tick or save completion and apply it.
    ///
    /// Returns [`SessionEvent::Idle`] immediately when there is nothing to
    /// wait for.
    pub async fn next_event(&mut self) -> SessionEvent {
        let ticking = self.state == SessionState::Active && self.ticker.is_some();
        let saving = self.dispatcher.as_ref().is_some_and(|d| d.has_pending());
        if !ticking && !saving {
            return SessionEvent::Idle;
        }

        let wake = tokio::select! {
            () = tick_or_pending(self.ticker.as_mut()), if ticking => Wake::Tick,
            report = settle_or_pending(self.dispatcher.as_mut(), &mut self.answers), if saving => {
                Wake::Saved(report)
            }
        };

        match wake {
            Wake::Tick => self.on_tick().await,
            Wake::Saved(Some(report)) => match report {
                SaveReport::Synced(id) => SessionEvent::AnswerSynced(id),
                SaveReport::Stale(id) => SessionEvent::StaleSaveDiscarded(id),
                SaveReport::Failed { question_id, .. } => {
                    SessionEvent::AnswerSaveFailed(question_id)
                }
            },
            Wake::Saved(None) => SessionEvent::Idle,
        }
    }

    /// Wait until no save is outstanding, without advancing the clock.
    pub async fn settle_saves(&mut self) {
        if let Some(dispatcher) = self.dispatcher.as_mut() {
            while dispatcher.next_completion(&mut self.answers).await.is_some() {}
        }
    }

    // -- internals ----------------------------------------------------------

    fn install(&mut self, start: AttemptStart) {
        let AttemptStart {
            attempt_id,
            exam,
            resumed,
            current_section,
            section_started_at,
            answers,
            marked,
        } = start;
        let started_at = section_started_at.unwrap_or_else(|| self.time.now());
        info!(
            attempt = %attempt_id,
            exam = %exam.id,
            resumed,
            section = current_section,
            restored_answers = answers.len(),
            "attempt started"
        );

        self.answers = AnswerStore::new();
        self.time_spent.clear();
        for saved in answers {
            self.time_spent
                .insert(saved.question_id.clone(), saved.time_spent_seconds);
            self.answers.seed_synced(
                saved.question_id,
                &saved.selected_answer,
                saved.time_spent_seconds,
            );
        }
        self.review = ReviewFlags::new();
        for question_id in marked {
            self.review.mark(question_id);
        }

        self.navigator = Navigator::new(exam.questions.clone());
        self.dispatcher = Some(AutosaveDispatcher::new(
            Arc::clone(&self.service),
            attempt_id.clone(),
        ));
        self.attempt = Some(Attempt {
            id: attempt_id,
            exam_id: exam.id.clone(),
            current_section,
            section_started_at: started_at,
            section_budget_seconds: 0,
            status: AttemptStatus::InProgress,
        });
        self.exam = Some(exam);
        self.enter_section(current_section, started_at);
    }

    fn enter_section(&mut self, index: usize, started_at: DateTime<Utc>) {
        let Some(plan) = self
            .exam
            .as_ref()
            .and_then(|e| e.sections.get(index))
            .cloned()
        else {
            return;
        };
        let budget = plan
            .duration_seconds
            .unwrap_or(self.config.default_section_seconds);
        if let Some(attempt) = self.attempt.as_mut() {
            attempt.current_section = index;
            attempt.section_started_at = started_at;
            attempt.section_budget_seconds = budget;
            attempt.status = AttemptStatus::InProgress;
        }

        self.navigator.set_filter(&plan.section, plan.module);
        self.clock = SessionClock::reconstruct(budget, started_at, self.time.now());
        info!(section = %plan, budget, remaining = self.clock.remaining(), "section active");
        self.start_ticker();
        self.begin_visit();
        self.transition(SessionState::Active);
    }

    /// Submit the current section without flushing and move past it.
    async fn close_section(&mut self) {
        self.clock.pause();
        self.ticker = None;
        self.end_visit();
        let Some(attempt) = self.attempt.as_mut() else {
            return;
        };
        attempt.status = AttemptStatus::SectionComplete;
        let index = attempt.current_section;
        let attempt_id = attempt.id.clone();

        if self.is_final_section() {
            self.transition(SessionState::Submitting);
            // The outcome is kept in `last_error`; a failed forced submit can be retried.
            let _ = self.finalize(Finalize::Forced).await;
            return;
        }

        self.transition(SessionState::SectionTransition);
        match self.service.submit_section(&attempt_id, index).await {
            Ok(advance) => self.next_section_start = advance.next_section_started_at,
            Err(e) => {
                warn!(section = index, "section submission failed: {e}");
                self.last_error = Some(e);
                self.next_section_start = None;
            }
        }
        if let Some(attempt) = self.attempt.as_mut() {
            attempt.current_section = index + 1;
        }
    }

    async fn finalize(&mut self, mut mode: Finalize) -> Result<(), SessionError> {
        let passes = self.config.flush_passes;
        let unsynced = match self.dispatcher.as_mut() {
            Some(dispatcher) => dispatcher.flush(&mut self.answers, passes).await,
            None => 0,
        };
        if unsynced > 0 {
            if mode == Finalize::Manual && self.try_reactivate() {
                warn!(unsynced, "answers still unsynced, submission postponed");
                return Err(SessionError::SyncIncomplete { unsynced });
            }
            mode = Finalize::Forced;
            warn!(unsynced, "submitting with unsynced answers");
        }

        let Some(attempt_id) = self.attempt.as_ref().map(|a| a.id.clone()) else {
            return Err(self.invalid("submit"));
        };
        match self.service.submit_attempt(&attempt_id).await {
            Ok(()) => {
                self.final_submit_failed = false;
                if let Some(attempt) = self.attempt.as_mut() {
                    attempt.status = AttemptStatus::Submitted;
                }
                info!(attempt = %attempt_id, "attempt submitted");
                self.transition(SessionState::Completed);
                Ok(())
            }
            Err(e) => {
                error!(attempt = %attempt_id, "attempt submission failed: {e}");
                self.last_error = Some(e.clone());
                if mode == Finalize::Forced || !self.try_reactivate() {
                    self.final_submit_failed = true;
                }
                Err(SessionError::SubmitFailed(e))
            }
        }
    }

    /// Return from a postponed manual submission to the running section.
    ///
    /// The clock is rebuilt from the section's start, so time spent
    /// submitting is not handed back. Returns `false` if the section ran out
    /// of time meanwhile; the submission then counts as forced.
    fn try_reactivate(&mut self) -> bool {
        let Some(attempt) = self.attempt.as_mut() else {
            return false;
        };
        self.clock = SessionClock::reconstruct(
            attempt.section_budget_seconds,
            attempt.section_started_at,
            self.time.now(),
        );
        if self.clock.remaining() == 0 {
            self.clock.pause();
            let section = attempt.current_section;
            info!(section, "section time ran out during submission");
            self.observer.on_time_expired(section);
            return false;
        }
        attempt.status = AttemptStatus::InProgress;
        self.start_ticker();
        self.begin_visit();
        self.transition(SessionState::Active);
        true
    }

    async fn on_tick(&mut self) -> SessionEvent {
        match self.clock.tick() {
            ClockTick::Running { remaining } => {
                self.observer.on_tick(remaining);
                SessionEvent::Tick { remaining }
            }
            ClockTick::Expired => {
                let section = self.section_index();
                self.observer.on_tick(0);
                self.time_expired().await;
                SessionEvent::TimeExpired { section }
            }
            ClockTick::Idle => SessionEvent::Idle,
        }
    }

    fn start_ticker(&mut self) {
        let period = self.config.tick_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        // Late ticks are delivered back to back rather than skipped.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        self.ticker = Some(ticker);
    }

    fn navigate(&mut self, step: impl FnOnce(&mut Navigator) -> bool) -> bool {
        let moved = step(&mut self.navigator);
        if moved && self.state == SessionState::Active {
            self.end_visit();
            self.begin_visit();
        }
        moved
    }

    fn begin_visit(&mut self) {
        let now = self.time.now();
        self.visit = self.navigator.current().map(|q| (q.id.clone(), now));
    }

    fn end_visit(&mut self) {
        if let Some((question_id, since)) = self.visit.take() {
            let seconds = (self.time.now() - since).num_seconds().max(0) as u64;
            *self.time_spent.entry(question_id).or_insert(0) += seconds;
        }
    }

    fn time_spent_on(&self, question_id: &QuestionId) -> u64 {
        let mut spent = self.time_spent.get(question_id).copied().unwrap_or(0);
        if let Some((current, since)) = &self.visit {
            if current == question_id {
                spent += (self.time.now() - *since).num_seconds().max(0) as u64;
            }
        }
        spent
    }

    fn is_final_section(&self) -> bool {
        self.exam
            .as_ref()
            .map_or(true, |e| self.section_index() + 1 >= e.sections.len())
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        info!(%from, %to, "session state change");
        self.state = to;
        self.observer.on_state_change(from, to);
    }

    fn invalid(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            operation,
            state: self.state,
        }
    }
}

async fn tick_or_pending(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn settle_or_pending(
    dispatcher: Option<&mut AutosaveDispatcher>,
    answers: &mut AnswerStore,
) -> Option<SaveReport> {
    match dispatcher {
        Some(dispatcher) => dispatcher.next_completion(answers).await,
        None => std::future::pending().await,
    }
}
