// src/models/exam.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

use super::question::{QuestionType, QuestionWithAnswerKey};

/// Represents the 'exams' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Exam {
    pub id: i64,
    pub title: String,
    pub subject: String,

    /// School grade or level, free text (e.g. "5º ano").
    pub grade: String,

    /// Number of questions; equals the persisted question rows once assembled.
    pub question_count: i64,

    /// Requested question kinds, in request order. May repeat.
    pub question_types: Json<Vec<QuestionType>>,

    pub topics: Option<String>,
    pub estimated_duration: Option<String>,

    /// Owner. Never changes after creation.
    pub user_id: i64,

    /// One-way flag: set by the owner, never cleared.
    pub answer_key_saved: bool,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Exam with its ordered questions and their answer keys.
#[derive(Debug, Clone, Serialize)]
pub struct ExamComplete {
    #[serde(flatten)]
    pub exam: Exam,
    pub questions: Vec<QuestionWithAnswerKey>,
}

/// DTO for generating a new exam.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateExamRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(min = 1, max = 100))]
    pub subject: String,
    #[validate(length(min = 1, max = 50))]
    pub grade: String,
    #[validate(range(min = 1, max = 50))]
    pub question_count: u32,
    #[serde(default)]
    pub question_types: Vec<QuestionType>,
    #[validate(length(max = 2000))]
    pub topics: Option<String>,
    #[validate(length(max = 50))]
    pub estimated_duration: Option<String>,
}

/// Pagination for exam listings. No limit means unrestricted.
#[derive(Debug, Default, Deserialize)]
pub struct ExamListParams {
    #[serde(default)]
    pub skip: u32,
    pub limit: Option<u32>,
}
