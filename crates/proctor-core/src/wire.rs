//! JSON wire format of the submission and content services.
//!
//! Responses are deserialized into these loosely shaped DTOs and then
//! validated into the typed model. Anything that would leave the engine with
//! dangling ids or unanswerable questions is rejected here rather than
//! surfacing later as a UI bug.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::{
    AttemptId, AttemptStart, Difficulty, Exam, ExamDetails, ExamId, NewQuestion, Question,
    QuestionId, SavedAnswer, SectionAdvance, SectionPlan,
};

/// `POST /exams/{examId}/start` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAttemptResponse {
    #[serde(alias = "studentExamId")]
    pub attempt_id: String,
    #[serde(default)]
    pub resumed: bool,
    #[serde(default)]
    pub current_section: usize,
    #[serde(default)]
    pub section_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub answers: Vec<SavedAnswerDto>,
    #[serde(default)]
    pub marked: Vec<String>,
    pub exam: ExamDto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamDto {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub sections: Vec<SectionDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionDto {
    pub section: String,
    pub module: u32,
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    #[serde(default, alias = "question")]
    pub questions: Vec<QuestionDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDto {
    pub id: String,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub module: Option<u32>,
    #[serde(alias = "text")]
    pub question_text: String,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub correct_answer: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub skill: Option<String>,
    #[serde(default)]
    pub position: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedAnswerDto {
    pub question_id: String,
    pub selected_answer: String,
    #[serde(default)]
    pub time_spent_seconds: u64,
}

/// Section submission response. The body is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionAdvanceDto {
    #[serde(default)]
    pub next_section_started_at: Option<DateTime<Utc>>,
}

impl From<SectionAdvanceDto> for SectionAdvance {
    fn from(dto: SectionAdvanceDto) -> Self {
        SectionAdvance {
            next_section_started_at: dto.next_section_started_at,
        }
    }
}

/// `GET /admin/exams/{examId}` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamDetailsDto {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub questions: Vec<QuestionDto>,
}

/// One element of the question-creation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedQuestionDto {
    pub id: String,
}

/// Full question body sent on create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionBody {
    pub section: String,
    pub module: u32,
    pub question_text: String,
    pub choices: Vec<String>,
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
    pub difficulty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,
}

impl From<&Question> for QuestionBody {
    fn from(q: &Question) -> Self {
        QuestionBody {
            section: q.section.clone(),
            module: q.module,
            question_text: q.text.clone(),
            choices: q.choices.clone(),
            correct_answer: q.correct_answer.clone(),
            explanation: q.explanation.clone(),
            difficulty: q.difficulty.map(|d| d.to_string()),
            domain: q.domain.clone(),
            skill: q.skill.clone(),
        }
    }
}

impl From<&NewQuestion> for QuestionBody {
    fn from(q: &NewQuestion) -> Self {
        QuestionBody {
            section: q.section.clone(),
            module: q.module,
            question_text: q.text.clone(),
            choices: q.choices.clone(),
            correct_answer: Some(q.correct_answer.clone()),
            explanation: q.explanation.clone(),
            difficulty: Some(q.difficulty.to_string()),
            domain: None,
            skill: None,
        }
    }
}

fn non_empty(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::EmptyField(field))
    } else {
        Ok(())
    }
}

/// Validate one question. `section`/`module` fill in what the DTO omits.
fn parse_question(
    dto: QuestionDto,
    section: Option<(&str, u32)>,
) -> Result<Question, ValidationError> {
    non_empty(&dto.id, "question.id")?;
    let id = QuestionId::new(dto.id);
    if dto.choices.is_empty() {
        return Err(ValidationError::NoChoices(id));
    }
    if let Some(correct) = &dto.correct_answer {
        if !dto.choices.contains(correct) {
            return Err(ValidationError::CorrectAnswerNotAChoice(id));
        }
    }
    let difficulty = match dto.difficulty.as_deref() {
        None | Some("") => None,
        Some(value) => Some(value.parse::<Difficulty>().map_err(|_| {
            ValidationError::UnknownDifficulty {
                question: id.clone(),
                value: value.to_string(),
            }
        })?),
    };
    // The enclosing section wins over whatever the question claims.
    let (section, module) = match section {
        Some((name, module)) => (name.to_string(), module),
        None => (
            dto.section.ok_or(ValidationError::EmptyField("question.section"))?,
            dto.module.ok_or(ValidationError::EmptyField("question.module"))?,
        ),
    };
    Ok(Question {
        id,
        section,
        module,
        text: dto.question_text,
        choices: dto.choices,
        correct_answer: dto.correct_answer,
        explanation: dto.explanation,
        difficulty,
        domain: dto.domain,
        skill: dto.skill,
        position: dto.position,
    })
}

fn ensure_unique(questions: &[Question]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for q in questions {
        if !seen.insert(&q.id) {
            return Err(ValidationError::DuplicateQuestion(q.id.clone()));
        }
    }
    Ok(())
}

/// Validate an exam as delivered to a student.
pub fn parse_exam(dto: ExamDto) -> Result<Exam, ValidationError> {
    non_empty(&dto.id, "exam.id")?;
    if dto.sections.is_empty() {
        return Err(ValidationError::NoSections);
    }

    let mut sections = Vec::with_capacity(dto.sections.len());
    let mut questions = Vec::new();
    for section in dto.sections {
        non_empty(&section.section, "section.section")?;
        let plan = SectionPlan {
            section: section.section,
            module: section.module,
            duration_seconds: section.duration_seconds,
        };
        if section.questions.is_empty() {
            return Err(ValidationError::EmptySection(plan.to_string()));
        }
        for q in section.questions {
            questions.push(parse_question(q, Some((plan.section.as_str(), plan.module)))?);
        }
        sections.push(plan);
    }
    ensure_unique(&questions)?;

    Ok(Exam {
        id: ExamId::new(dto.id),
        title: dto.title,
        sections,
        questions,
    })
}

/// Validate a start response into an [`AttemptStart`].
pub fn parse_start_response(dto: StartAttemptResponse) -> Result<AttemptStart, ValidationError> {
    non_empty(&dto.attempt_id, "attemptId")?;
    let exam = parse_exam(dto.exam)?;

    if dto.current_section >= exam.sections.len() {
        return Err(ValidationError::SectionOutOfRange {
            index: dto.current_section,
            count: exam.sections.len(),
        });
    }

    let known: HashSet<&QuestionId> = exam.questions.iter().map(|q| &q.id).collect();
    let mut answers = Vec::with_capacity(dto.answers.len());
    for a in dto.answers {
        let question_id = QuestionId::new(a.question_id);
        if !known.contains(&question_id) {
            return Err(ValidationError::UnknownQuestion(question_id));
        }
        answers.push(SavedAnswer {
            question_id,
            selected_answer: a.selected_answer,
            time_spent_seconds: a.time_spent_seconds,
        });
    }
    let mut marked = Vec::with_capacity(dto.marked.len());
    for id in dto.marked {
        let question_id = QuestionId::new(id);
        if !known.contains(&question_id) {
            return Err(ValidationError::UnknownQuestion(question_id));
        }
        marked.push(question_id);
    }

    Ok(AttemptStart {
        attempt_id: AttemptId::new(dto.attempt_id),
        exam,
        resumed: dto.resumed,
        current_section: dto.current_section,
        section_started_at: dto.section_started_at,
        answers,
        marked,
    })
}

/// Validate an author's exam response into [`ExamDetails`].
pub fn parse_exam_details(dto: ExamDetailsDto) -> Result<ExamDetails, ValidationError> {
    non_empty(&dto.id, "id")?;
    let questions = dto
        .questions
        .into_iter()
        .map(|q| parse_question(q, None))
        .collect::<Result<Vec<_>, _>>()?;
    ensure_unique(&questions)?;
    Ok(ExamDetails {
        id: ExamId::new(dto.id),
        title: dto.title,
        code: dto.code,
        questions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_json(extra: serde_json::Value) -> StartAttemptResponse {
        let mut value = serde_json::json!({
            "attemptId": "att-1",
            "exam": {
                "id": "exam-1",
                "title": "Practice",
                "sections": [
                    {
                        "section": "Reading",
                        "module": 1,
                        "durationSeconds": 1920,
                        "questions": [
                            {"id": "q1", "questionText": "One", "choices": ["A", "B"]},
                            {"id": "q2", "questionText": "Two", "choices": ["A", "B"]}
                        ]
                    },
                    {
                        "section": "Math",
                        "module": 1,
                        "question": [
                            {"id": "q3", "text": "Three", "choices": ["1", "2"]}
                        ]
                    }
                ]
            }
        });
        if let (Some(base), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn parses_a_fresh_start() {
        let start = parse_start_response(start_json(serde_json::json!({}))).unwrap();
        assert_eq!(start.attempt_id.as_str(), "att-1");
        assert!(!start.resumed);
        assert_eq!(start.exam.sections.len(), 2);
        assert_eq!(start.exam.sections[0].duration_seconds, Some(1920));
        assert_eq!(start.exam.sections[1].duration_seconds, None);
        assert_eq!(start.exam.questions.len(), 3);
        assert_eq!(start.exam.questions[2].section, "Math");
        assert!(start.section_started_at.is_none());
    }

    #[test]
    fn parses_a_resume_with_answers() {
        let start = parse_start_response(start_json(serde_json::json!({
            "resumed": true,
            "currentSection": 1,
            "sectionStartedAt": "2026-03-14T09:00:00Z",
            "answers": [{"questionId": "q1", "selectedAnswer": "B", "timeSpentSeconds": 40}],
            "marked": ["q2"]
        })))
        .unwrap();
        assert!(start.resumed);
        assert_eq!(start.current_section, 1);
        assert!(start.section_started_at.is_some());
        assert_eq!(start.answers[0].selected_answer, "B");
        assert_eq!(start.marked, vec![QuestionId::new("q2")]);
    }

    #[test]
    fn accepts_legacy_attempt_id_field() {
        let mut value = serde_json::to_value(start_json(serde_json::json!({}))).unwrap();
        let obj = value.as_object_mut().unwrap();
        let id = obj.remove("attemptId").unwrap();
        obj.insert("studentExamId".into(), id);
        let dto: StartAttemptResponse = serde_json::from_value(value).unwrap();
        assert_eq!(dto.attempt_id, "att-1");
    }

    #[test]
    fn rejects_answers_to_unknown_questions() {
        let err = parse_start_response(start_json(serde_json::json!({
            "answers": [{"questionId": "ghost", "selectedAnswer": "A"}]
        })))
        .unwrap_err();
        assert_eq!(err, ValidationError::UnknownQuestion(QuestionId::new("ghost")));
    }

    #[test]
    fn rejects_out_of_range_section() {
        let err = parse_start_response(start_json(serde_json::json!({"currentSection": 2})))
            .unwrap_err();
        assert!(matches!(err, ValidationError::SectionOutOfRange { index: 2, count: 2 }));
    }

    #[test]
    fn rejects_empty_attempt_id() {
        let err = parse_start_response(start_json(serde_json::json!({"attemptId": " "})))
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptyField("attemptId"));
    }

    #[test]
    fn rejects_duplicate_question_ids() {
        let dto: ExamDetailsDto = serde_json::from_value(serde_json::json!({
            "id": "exam-1",
            "title": "Dupes",
            "questions": [
                {"id": "q1", "section": "Math", "module": 1, "questionText": "a", "choices": ["1"]},
                {"id": "q1", "section": "Math", "module": 1, "questionText": "b", "choices": ["1"]}
            ]
        }))
        .unwrap();
        let err = parse_exam_details(dto).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateQuestion(QuestionId::new("q1")));
    }

    #[test]
    fn rejects_correct_answer_outside_choices() {
        let dto: ExamDetailsDto = serde_json::from_value(serde_json::json!({
            "id": "exam-1",
            "questions": [
                {"id": "q1", "section": "Math", "module": 1, "questionText": "a",
                 "choices": ["1", "2"], "correctAnswer": "3"}
            ]
        }))
        .unwrap();
        assert_eq!(
            parse_exam_details(dto).unwrap_err(),
            ValidationError::CorrectAnswerNotAChoice(QuestionId::new("q1"))
        );
    }

    #[test]
    fn question_body_uses_api_field_names() {
        let details_dto: ExamDetailsDto = serde_json::from_value(serde_json::json!({
            "id": "exam-1",
            "questions": [
                {"id": "q1", "section": "Reading", "module": 2, "questionText": "a",
                 "choices": ["x", "y"], "correctAnswer": "y", "difficulty": "hard"}
            ]
        }))
        .unwrap();
        let details = parse_exam_details(details_dto).unwrap();
        let body = QuestionBody::from(&details.questions[0]);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["questionText"], "a");
        assert_eq!(json["correctAnswer"], "y");
        assert_eq!(json["difficulty"], "Hard");
        assert!(json.get("domain").is_none());
    }
}
