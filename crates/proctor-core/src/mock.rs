//! In-memory services for tests and offline replays.
//!
//! Both services keep their state behind mutexes and can be told to go
//! offline, delay individual calls, or fail, so the session state machines
//! can be exercised without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::model::{
    AttemptId, AttemptStart, Difficulty, Exam, ExamDetails, ExamId, NewQuestion, Question,
    QuestionId, SavedAnswer, SectionAdvance, SectionPlan,
};
use crate::traits::{AnswerSubmission, ContentService, SubmissionService, TimeSource, WallClock};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Manual time
// ---------------------------------------------------------------------------

/// A wall clock that only moves when told to.
#[derive(Debug)]
pub struct ManualTime {
    now: Mutex<DateTime<Utc>>,
}

impl ManualTime {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// A fixed, arbitrary starting instant.
    pub fn fixed() -> Self {
        Self::new(
            Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0)
                .single()
                .unwrap_or_default(),
        )
    }

    pub fn advance(&self, seconds: i64) {
        let mut now = lock(&self.now);
        *now += chrono::Duration::seconds(seconds);
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *lock(&self.now) = now;
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

/// A wall clock that follows the tokio clock.
///
/// Under a paused runtime, `now()` moves exactly as far as the runtime's
/// timers do, so server timestamps and countdowns stay consistent.
#[derive(Debug)]
pub struct TokioTime {
    origin: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl TokioTime {
    /// Must be called from within a runtime.
    pub fn new() -> Self {
        Self {
            origin: ManualTime::fixed().now(),
            started: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for TokioTime {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.started.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.origin + elapsed
    }
}

// ---------------------------------------------------------------------------
// Sample data
// ---------------------------------------------------------------------------

fn sample_question(id: &str, section: &str, module: u32, correct: &str) -> Question {
    Question {
        id: QuestionId::new(id),
        section: section.to_string(),
        module,
        text: format!("Question {id}"),
        choices: ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect(),
        correct_answer: Some(correct.to_string()),
        explanation: None,
        difficulty: Some(Difficulty::Medium),
        domain: None,
        skill: None,
        position: None,
    }
}

fn sample_questions() -> Vec<Question> {
    vec![
        sample_question("r1", "Reading", 1, "B"),
        sample_question("r2", "Reading", 1, "A"),
        sample_question("r3", "Reading", 1, "D"),
        sample_question("m1", "Math", 1, "C"),
        sample_question("m2", "Math", 1, "A"),
    ]
}

/// A two-section exam (Reading then Math), 90 seconds per section.
pub fn sample_exam() -> Exam {
    let questions = sample_questions()
        .into_iter()
        .map(|q| Question {
            correct_answer: None,
            ..q
        })
        .collect();
    Exam {
        id: ExamId::new("sat-practice-1"),
        title: "SAT Practice Test 1".to_string(),
        sections: vec![
            SectionPlan {
                section: "Reading".to_string(),
                module: 1,
                duration_seconds: Some(90),
            },
            SectionPlan {
                section: "Math".to_string(),
                module: 1,
                duration_seconds: Some(90),
            },
        ],
        questions,
    }
}

/// The author's view of [`sample_exam`], with correct answers.
pub fn sample_exam_details() -> ExamDetails {
    ExamDetails {
        id: ExamId::new("sat-practice-1"),
        title: "SAT Practice Test 1".to_string(),
        code: Some("SAT-P1".to_string()),
        questions: sample_questions(),
    }
}

// ---------------------------------------------------------------------------
// Submission service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct AttemptRecord {
    id: AttemptId,
    current_section: usize,
    section_started_at: DateTime<Utc>,
    submitted: bool,
}

/// An in-memory submission service with resume-or-create semantics.
pub struct InMemorySubmissionService {
    exam: Exam,
    time: Arc<dyn TimeSource>,
    attempt: Mutex<Option<AttemptRecord>>,
    stored: Mutex<HashMap<QuestionId, AnswerSubmission>>,
    save_log: Mutex<Vec<AnswerSubmission>>,
    save_delays: Mutex<HashMap<(QuestionId, String), Duration>>,
    start_delay: Mutex<Duration>,
    section_submissions: Mutex<Vec<usize>>,
    offline: AtomicBool,
    reject_submissions: AtomicBool,
    failing_starts: AtomicU32,
    start_calls: AtomicU32,
    save_calls: AtomicU32,
    attempt_submissions: AtomicU32,
}

impl InMemorySubmissionService {
    pub fn new(exam: Exam) -> Self {
        Self {
            exam,
            time: Arc::new(WallClock),
            attempt: Mutex::new(None),
            stored: Mutex::new(HashMap::new()),
            save_log: Mutex::new(Vec::new()),
            save_delays: Mutex::new(HashMap::new()),
            start_delay: Mutex::new(Duration::ZERO),
            section_submissions: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
            reject_submissions: AtomicBool::new(false),
            failing_starts: AtomicU32::new(0),
            start_calls: AtomicU32::new(0),
            save_calls: AtomicU32::new(0),
            attempt_submissions: AtomicU32::new(0),
        }
    }

    /// A service serving [`sample_exam`].
    pub fn sample() -> Self {
        Self::new(sample_exam())
    }

    /// Use `time` for the section timestamps the service records.
    pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_start_delay(&self, delay: Duration) {
        *lock(&self.start_delay) = delay;
    }

    /// Make the next `count` starts fail with a network error.
    pub fn fail_next_starts(&self, count: u32) {
        self.failing_starts.store(count, Ordering::SeqCst);
    }

    /// Delay saves of `value` for `question_id`.
    pub fn delay_save(&self, question_id: &QuestionId, value: &str, delay: Duration) {
        lock(&self.save_delays).insert((question_id.clone(), value.to_string()), delay);
    }

    /// Make section and attempt submissions fail.
    pub fn reject_submissions(&self, reject: bool) {
        self.reject_submissions.store(reject, Ordering::SeqCst);
    }

    /// The value the service currently holds for a question.
    pub fn stored_answer(&self, question_id: &QuestionId) -> Option<String> {
        lock(&self.stored)
            .get(question_id)
            .map(|s| s.selected_answer.clone())
    }

    /// Values applied for a question, in the order they were applied.
    pub fn save_log_values(&self, question_id: &QuestionId) -> Vec<String> {
        lock(&self.save_log)
            .iter()
            .filter(|s| &s.question_id == question_id)
            .map(|s| s.selected_answer.clone())
            .collect()
    }

    pub fn start_calls(&self) -> u32 {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn save_calls(&self) -> u32 {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn section_submissions(&self) -> Vec<usize> {
        lock(&self.section_submissions).clone()
    }

    pub fn attempt_submissions(&self) -> u32 {
        self.attempt_submissions.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> Result<(), ServiceError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(ServiceError::Network("connection refused".into()))
        } else {
            Ok(())
        }
    }

    fn check_attempt(&self, attempt_id: &AttemptId) -> Result<(), ServiceError> {
        match lock(&self.attempt).as_ref() {
            Some(record) if &record.id == attempt_id => Ok(()),
            _ => Err(ServiceError::NotFound(format!("attempt {attempt_id}"))),
        }
    }
}

#[async_trait]
impl SubmissionService for InMemorySubmissionService {
    async fn start_attempt(&self, exam_id: &ExamId) -> Result<AttemptStart, ServiceError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.start_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.ensure_online()?;
        if self
            .failing_starts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ServiceError::Network("connection reset".into()));
        }
        if exam_id != &self.exam.id {
            return Err(ServiceError::NotFound(format!("exam {exam_id}")));
        }

        let now = self.time.now();
        let (record, resumed) = {
            let mut guard = lock(&self.attempt);
            let resumed = guard.is_some();
            let record = guard
                .get_or_insert_with(|| AttemptRecord {
                    id: AttemptId::new(Uuid::new_v4().to_string()),
                    current_section: 0,
                    section_started_at: now,
                    submitted: false,
                })
                .clone();
            (record, resumed)
        };

        let mut answers: Vec<SavedAnswer> = lock(&self.stored)
            .values()
            .map(|s| SavedAnswer {
                question_id: s.question_id.clone(),
                selected_answer: s.selected_answer.clone(),
                time_spent_seconds: s.time_spent_seconds,
            })
            .collect();
        answers.sort_by(|a, b| a.question_id.cmp(&b.question_id));

        Ok(AttemptStart {
            attempt_id: record.id,
            exam: self.exam.clone(),
            resumed,
            current_section: record.current_section,
            section_started_at: Some(record.section_started_at),
            answers,
            marked: Vec::new(),
        })
    }

    async fn save_answer(
        &self,
        attempt_id: &AttemptId,
        submission: &AnswerSubmission,
    ) -> Result<(), ServiceError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;
        self.check_attempt(attempt_id)?;
        let delay = lock(&self.save_delays)
            .get(&(
                submission.question_id.clone(),
                submission.selected_answer.clone(),
            ))
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.stored).insert(submission.question_id.clone(), submission.clone());
        lock(&self.save_log).push(submission.clone());
        Ok(())
    }

    async fn submit_section(
        &self,
        attempt_id: &AttemptId,
        section_index: usize,
    ) -> Result<SectionAdvance, ServiceError> {
        self.ensure_online()?;
        self.check_attempt(attempt_id)?;
        if self.reject_submissions.load(Ordering::SeqCst) {
            return Err(ServiceError::Api {
                status: 500,
                message: "submission rejected".into(),
            });
        }
        let now = self.time.now();
        if let Some(record) = lock(&self.attempt).as_mut() {
            record.current_section = section_index + 1;
            record.section_started_at = now;
        }
        lock(&self.section_submissions).push(section_index);
        Ok(SectionAdvance {
            next_section_started_at: Some(now),
        })
    }

    async fn submit_attempt(&self, attempt_id: &AttemptId) -> Result<(), ServiceError> {
        self.ensure_online()?;
        self.check_attempt(attempt_id)?;
        if self.reject_submissions.load(Ordering::SeqCst) {
            return Err(ServiceError::Api {
                status: 500,
                message: "submission rejected".into(),
            });
        }
        if let Some(record) = lock(&self.attempt).as_mut() {
            record.submitted = true;
        }
        self.attempt_submissions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Content service
// ---------------------------------------------------------------------------

/// An in-memory content service holding one exam.
pub struct InMemoryContentService {
    exam_id: ExamId,
    title: String,
    code: Option<String>,
    questions: Mutex<Vec<Question>>,
    fetch_delay: Mutex<Duration>,
    update_delay: Mutex<Duration>,
    offline: AtomicBool,
    fetch_calls: AtomicU32,
    update_calls: AtomicU32,
}

impl InMemoryContentService {
    pub fn new(details: ExamDetails) -> Self {
        Self {
            exam_id: details.id,
            title: details.title,
            code: details.code,
            questions: Mutex::new(details.questions),
            fetch_delay: Mutex::new(Duration::ZERO),
            update_delay: Mutex::new(Duration::ZERO),
            offline: AtomicBool::new(false),
            fetch_calls: AtomicU32::new(0),
            update_calls: AtomicU32::new(0),
        }
    }

    /// A service holding [`sample_exam_details`].
    pub fn sample() -> Self {
        Self::new(sample_exam_details())
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *lock(&self.fetch_delay) = delay;
    }

    pub fn set_update_delay(&self, delay: Duration) {
        *lock(&self.update_delay) = delay;
    }

    /// The persisted copy of a question.
    pub fn question(&self, question_id: &QuestionId) -> Option<Question> {
        lock(&self.questions)
            .iter()
            .find(|q| &q.id == question_id)
            .cloned()
    }

    pub fn question_count(&self) -> usize {
        lock(&self.questions).len()
    }

    pub fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> u32 {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> Result<(), ServiceError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(ServiceError::Network("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ContentService for InMemoryContentService {
    async fn fetch_exam(&self, exam_id: &ExamId) -> Result<ExamDetails, ServiceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.fetch_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.ensure_online()?;
        if exam_id != &self.exam_id {
            return Err(ServiceError::NotFound(format!("exam {exam_id}")));
        }
        Ok(ExamDetails {
            id: self.exam_id.clone(),
            title: self.title.clone(),
            code: self.code.clone(),
            questions: lock(&self.questions).clone(),
        })
    }

    async fn update_question(&self, question: &Question) -> Result<(), ServiceError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.update_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.ensure_online()?;
        let mut questions = lock(&self.questions);
        match questions.iter_mut().find(|q| q.id == question.id) {
            Some(slot) => {
                *slot = question.clone();
                Ok(())
            }
            None => Err(ServiceError::NotFound(format!("question {}", question.id))),
        }
    }

    async fn create_questions(
        &self,
        exam_id: &ExamId,
        questions: &[NewQuestion],
    ) -> Result<Vec<QuestionId>, ServiceError> {
        self.ensure_online()?;
        if exam_id != &self.exam_id {
            return Err(ServiceError::NotFound(format!("exam {exam_id}")));
        }
        let mut stored = lock(&self.questions);
        let mut ids = Vec::with_capacity(questions.len());
        for new in questions {
            let id = QuestionId::new(Uuid::new_v4().to_string());
            stored.push(Question {
                id: id.clone(),
                section: new.section.clone(),
                module: new.module,
                text: new.text.clone(),
                choices: new.choices.clone(),
                correct_answer: Some(new.correct_answer.clone()),
                explanation: new.explanation.clone(),
                difficulty: Some(new.difficulty),
                domain: None,
                skill: None,
                position: None,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn delete_question(&self, question_id: &QuestionId) -> Result<(), ServiceError> {
        self.ensure_online()?;
        let mut questions = lock(&self.questions);
        let before = questions.len();
        questions.retain(|q| &q.id != question_id);
        if questions.len() == before {
            return Err(ServiceError::NotFound(format!("question {question_id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_start_resumes_the_same_attempt() {
        let service = InMemorySubmissionService::sample();
        let exam_id = ExamId::new("sat-practice-1");

        let first = service.start_attempt(&exam_id).await.unwrap();
        assert!(!first.resumed);
        service
            .save_answer(
                &first.attempt_id,
                &AnswerSubmission {
                    question_id: QuestionId::new("r1"),
                    selected_answer: "B".into(),
                    time_spent_seconds: 7,
                },
            )
            .await
            .unwrap();

        let second = service.start_attempt(&exam_id).await.unwrap();
        assert!(second.resumed);
        assert_eq!(second.attempt_id, first.attempt_id);
        assert_eq!(second.section_started_at, first.section_started_at);
        assert_eq!(second.answers.len(), 1);
        assert_eq!(second.answers[0].selected_answer, "B");
    }

    #[tokio::test]
    async fn unknown_exam_is_not_found() {
        let service = InMemorySubmissionService::sample();
        let err = service
            .start_attempt(&ExamId::new("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn content_service_round_trips_updates() {
        let service = InMemoryContentService::sample();
        let mut question = service.question(&QuestionId::new("r1")).unwrap();
        question.text = "Rewritten".into();
        service.update_question(&question).await.unwrap();
        assert_eq!(
            service.question(&QuestionId::new("r1")).unwrap().text,
            "Rewritten"
        );
    }

    #[test]
    fn manual_time_advances() {
        let time = ManualTime::fixed();
        let start = time.now();
        time.advance(30);
        assert_eq!((time.now() - start).num_seconds(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_time_follows_paused_clock() {
        let time = TokioTime::new();
        let start = time.now();
        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!((time.now() - start).num_seconds(), 40);
    }
}
