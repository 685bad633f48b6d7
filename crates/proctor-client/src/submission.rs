//! Submission service over HTTP.

use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, instrument};

use proctor_core::error::ServiceError;
use proctor_core::model::{AttemptId, AttemptStart, ExamId, SectionAdvance};
use proctor_core::traits::{AnswerSubmission, SubmissionService};
use proctor_core::wire::{parse_start_response, SectionAdvanceDto, StartAttemptResponse};

use crate::http::ApiClient;

/// The student-facing attempt API.
pub struct HttpSubmissionService {
    api: ApiClient,
}

impl HttpSubmissionService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl SubmissionService for HttpSubmissionService {
    #[instrument(skip(self), fields(exam = %exam_id))]
    async fn start_attempt(&self, exam_id: &ExamId) -> Result<AttemptStart, ServiceError> {
        let req = self.api.request(
            Method::POST,
            &["api", "student", "exams", exam_id.as_str(), "start"],
        );
        let dto: StartAttemptResponse = self.api.send_json(req).await?;
        let start = parse_start_response(dto)?;
        debug!(attempt = %start.attempt_id, resumed = start.resumed, "attempt start response");
        Ok(start)
    }

    #[instrument(skip(self, submission), fields(attempt = %attempt_id, question = %submission.question_id))]
    async fn save_answer(
        &self,
        attempt_id: &AttemptId,
        submission: &AnswerSubmission,
    ) -> Result<(), ServiceError> {
        let req = self
            .api
            .request(
                Method::POST,
                &["api", "student", "attempts", attempt_id.as_str(), "answers"],
            )
            .json(submission);
        self.api.send(req).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(attempt = %attempt_id))]
    async fn submit_section(
        &self,
        attempt_id: &AttemptId,
        section_index: usize,
    ) -> Result<SectionAdvance, ServiceError> {
        let index = section_index.to_string();
        let req = self.api.request(
            Method::POST,
            &[
                "api",
                "student",
                "attempts",
                attempt_id.as_str(),
                "sections",
                index.as_str(),
                "submit",
            ],
        );
        let dto: Option<SectionAdvanceDto> = self.api.send_optional_json(req).await?;
        Ok(dto.map(SectionAdvance::from).unwrap_or_default())
    }

    #[instrument(skip(self), fields(attempt = %attempt_id))]
    async fn submit_attempt(&self, attempt_id: &AttemptId) -> Result<(), ServiceError> {
        let req = self.api.request(
            Method::POST,
            &["api", "student", "attempts", attempt_id.as_str(), "submit"],
        );
        self.api.send(req).await?;
        Ok(())
    }
}
