//! Content (authoring) service over HTTP.

use async_trait::async_trait;
use reqwest::Method;
use tracing::instrument;

use proctor_core::error::ServiceError;
use proctor_core::model::{ExamDetails, ExamId, NewQuestion, Question, QuestionId};
use proctor_core::traits::ContentService;
use proctor_core::wire::{parse_exam_details, CreatedQuestionDto, ExamDetailsDto, QuestionBody};

use crate::http::ApiClient;

/// The admin question API.
pub struct HttpContentService {
    api: ApiClient,
}

impl HttpContentService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ContentService for HttpContentService {
    #[instrument(skip(self), fields(exam = %exam_id))]
    async fn fetch_exam(&self, exam_id: &ExamId) -> Result<ExamDetails, ServiceError> {
        let req = self
            .api
            .request(Method::GET, &["api", "admin", "exams", exam_id.as_str()]);
        let dto: ExamDetailsDto = self.api.send_json(req).await?;
        Ok(parse_exam_details(dto)?)
    }

    #[instrument(skip(self, question), fields(question = %question.id))]
    async fn update_question(&self, question: &Question) -> Result<(), ServiceError> {
        let req = self
            .api
            .request(Method::PUT, &["api", "admin", "questions", question.id.as_str()])
            .json(&QuestionBody::from(question));
        self.api.send(req).await?;
        Ok(())
    }

    #[instrument(skip(self, questions), fields(exam = %exam_id, count = questions.len()))]
    async fn create_questions(
        &self,
        exam_id: &ExamId,
        questions: &[NewQuestion],
    ) -> Result<Vec<QuestionId>, ServiceError> {
        let bodies: Vec<QuestionBody> = questions.iter().map(QuestionBody::from).collect();
        let req = self
            .api
            .request(
                Method::POST,
                &["api", "admin", "exams", exam_id.as_str(), "questions"],
            )
            .json(&bodies);
        let created: Option<Vec<CreatedQuestionDto>> = self.api.send_optional_json(req).await?;
        Ok(created
            .unwrap_or_default()
            .into_iter()
            .map(|c| QuestionId::new(c.id))
            .collect())
    }

    #[instrument(skip(self), fields(question = %question_id))]
    async fn delete_question(&self, question_id: &QuestionId) -> Result<(), ServiceError> {
        let req = self.api.request(
            Method::DELETE,
            &["api", "admin", "questions", question_id.as_str()],
        );
        self.api.send(req).await?;
        Ok(())
    }
}
