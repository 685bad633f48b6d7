//! Autosave dispatcher.
//!
//! Turns answer-store mutations into save calls against the submission
//! service without blocking the caller. Saves run as tasks in a `JoinSet`;
//! their outcomes are applied back by the owner through
//! [`AutosaveDispatcher::next_completion`], so the answer store is only
//! ever touched on the owning task.
//!
//! Per question, at most one save is in flight. A newer value selected
//! while a save is outstanding is held and sent once the outstanding save
//! settles, so the server applies values in selection order. A completion
//! only confirms the store entry if the value it carried is still current.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::task::{Id, JoinSet};
use tracing::{debug, warn};

use crate::answers::AnswerStore;
use crate::error::ServiceError;
use crate::model::{AttemptId, QuestionId};
use crate::traits::{AnswerSubmission, SubmissionService};

/// Outcome of one settled save, as applied to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveReport {
    /// The server confirmed the current value.
    Synced(QuestionId),
    /// The save succeeded but carried a value that has since been replaced.
    Stale(QuestionId),
    /// The save failed; the entry stays unsynced until the next retry point.
    Failed {
        question_id: QuestionId,
        error: ServiceError,
    },
}

struct SaveOutcome {
    question_id: QuestionId,
    value: String,
    result: Result<(), ServiceError>,
}

pub struct AutosaveDispatcher {
    service: Arc<dyn SubmissionService>,
    attempt_id: AttemptId,
    /// Question → value carried by its outstanding save.
    in_flight: HashMap<QuestionId, String>,
    /// Questions re-selected while a save was outstanding.
    held: HashSet<QuestionId>,
    /// Questions whose last save failed and have not been retried.
    failed: HashSet<QuestionId>,
    /// Task → question, so a task that never reports back can be attributed.
    owners: HashMap<Id, QuestionId>,
    tasks: JoinSet<SaveOutcome>,
}

impl AutosaveDispatcher {
    pub fn new(service: Arc<dyn SubmissionService>, attempt_id: AttemptId) -> Self {
        Self {
            service,
            attempt_id,
            in_flight: HashMap::new(),
            held: HashSet::new(),
            failed: HashSet::new(),
            owners: HashMap::new(),
            tasks: JoinSet::new(),
        }
    }

    pub fn attempt_id(&self) -> &AttemptId {
        &self.attempt_id
    }

    /// Schedule a save of the question's current answer.
    pub fn enqueue(&mut self, question_id: &QuestionId, answers: &AnswerStore) {
        self.failed.remove(question_id);
        if self.in_flight.contains_key(question_id) {
            debug!(question = %question_id, "save outstanding, holding newer value");
            self.held.insert(question_id.clone());
            return;
        }
        self.send(question_id, answers);
    }

    /// Re-send every question whose last save failed, once each.
    pub fn retry_failed(&mut self, answers: &AnswerStore) {
        let failed: Vec<QuestionId> = self.failed.drain().collect();
        for question_id in failed {
            if answers.get(&question_id).is_some_and(|a| !a.synced) {
                debug!(question = %question_id, "retrying failed save");
                self.enqueue(&question_id, answers);
            }
        }
    }

    /// Number of saves currently outstanding.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Questions whose last save failed.
    pub fn failed(&self) -> Vec<QuestionId> {
        let mut ids: Vec<QuestionId> = self.failed.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Wait for the next save to settle and apply it to the store.
    ///
    /// Returns `None` when nothing is outstanding.
    pub async fn next_completion(&mut self, answers: &mut AnswerStore) -> Option<SaveReport> {
        loop {
            match self.tasks.join_next_with_id().await? {
                Ok((id, outcome)) => {
                    self.owners.remove(&id);
                    return Some(self.apply(outcome, answers));
                }
                Err(e) => {
                    warn!("autosave task ended abnormally: {e}");
                    let Some(question_id) = self.owners.remove(&e.id()) else {
                        continue;
                    };
                    return Some(self.apply(
                        SaveOutcome {
                            question_id,
                            value: String::new(),
                            result: Err(ServiceError::Network(format!("save interrupted: {e}"))),
                        },
                        answers,
                    ));
                }
            }
        }
    }

    /// Send every unsynced answer and wait for the results, up to `passes`
    /// times. Returns how many answers are still unsynced.
    pub async fn flush(&mut self, answers: &mut AnswerStore, passes: u32) -> usize {
        for pass in 1..=passes {
            for question_id in answers.unsynced() {
                if !self.in_flight.contains_key(&question_id) {
                    self.failed.remove(&question_id);
                    self.send(&question_id, answers);
                }
            }
            while self.next_completion(answers).await.is_some() {}

            let remaining = answers.unsynced().len();
            debug!(pass, remaining, "flush pass complete");
            if remaining == 0 {
                return 0;
            }
        }
        answers.unsynced().len()
    }

    /// Abort outstanding saves without waiting for them.
    pub fn cancel_all(&mut self) {
        self.tasks.abort_all();
        self.tasks.detach_all();
        self.in_flight.clear();
        self.held.clear();
        self.failed.clear();
        self.owners.clear();
    }

    fn send(&mut self, question_id: &QuestionId, answers: &AnswerStore) {
        let Some(answer) = answers.get(question_id) else {
            return;
        };
        let submission = AnswerSubmission {
            question_id: question_id.clone(),
            selected_answer: answer.selected.clone(),
            time_spent_seconds: answer.time_spent_seconds,
        };
        self.in_flight
            .insert(question_id.clone(), submission.selected_answer.clone());

        let service = Arc::clone(&self.service);
        let attempt_id = self.attempt_id.clone();
        debug!(question = %question_id, value = %submission.selected_answer, "saving answer");
        let handle = self.tasks.spawn(async move {
            let result = service.save_answer(&attempt_id, &submission).await;
            SaveOutcome {
                question_id: submission.question_id,
                value: submission.selected_answer,
                result,
            }
        });
        self.owners.insert(handle.id(), question_id.clone());
    }

    fn apply(&mut self, outcome: SaveOutcome, answers: &mut AnswerStore) -> SaveReport {
        let SaveOutcome {
            question_id,
            value,
            result,
        } = outcome;
        self.in_flight.remove(&question_id);
        let resend = self.held.remove(&question_id);

        let report = match result {
            Ok(()) => {
                if answers.mark_synced_if_current(&question_id, &value) {
                    debug!(question = %question_id, "answer synced");
                    SaveReport::Synced(question_id.clone())
                } else {
                    debug!(question = %question_id, stale = %value, "discarding stale save result");
                    SaveReport::Stale(question_id.clone())
                }
            }
            Err(error) => {
                warn!(question = %question_id, "autosave failed: {error}");
                if !resend {
                    self.failed.insert(question_id.clone());
                }
                SaveReport::Failed {
                    question_id: question_id.clone(),
                    error,
                }
            }
        };

        if resend {
            self.send(&question_id, answers);
        }
        report
    }
}
