// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

use super::answer_key::AnswerKeyEntry;

/// Closed set of question kinds. Stored and serialized by their tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
pub enum QuestionType {
    #[serde(rename = "multipla_escolha")]
    #[sqlx(rename = "multipla_escolha")]
    MultipleChoice,

    #[serde(rename = "verdadeiro_falso")]
    #[sqlx(rename = "verdadeiro_falso")]
    TrueFalse,

    #[serde(rename = "dissertativa")]
    #[sqlx(rename = "dissertativa")]
    FreeResponse,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multipla_escolha",
            QuestionType::TrueFalse => "verdadeiro_falso",
            QuestionType::FreeResponse => "dissertativa",
        }
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Question {
    pub id: i64,

    pub exam_id: i64,

    /// 1-based position inside the exam.
    pub number: i64,

    /// Mapped from the database column 'type' since `type` is a reserved keyword in Rust.
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub question_type: QuestionType,

    pub prompt: String,

    /// Present for multiple choice questions, stored as a JSON array.
    pub choices: Option<Json<Vec<String>>>,

    pub correct_answer: Option<String>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A question together with its answer key, for the complete exam view.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionWithAnswerKey {
    #[serde(flatten)]
    pub question: Question,
    pub answer_key: Option<AnswerKeyEntry>,
}
