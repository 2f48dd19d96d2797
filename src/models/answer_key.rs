// src/models/answer_key.rs

use serde::Serialize;
use sqlx::FromRow;

/// Points awarded per question. Per-question weighting is not supported.
pub const DEFAULT_POINTS: i64 = 1;

/// Represents the 'answer_keys' table in the database.
/// At most one row per question.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AnswerKeyEntry {
    pub id: i64,
    pub question_id: i64,

    /// Never null; empty when the generator gave no answer.
    pub answer: String,

    pub explanation: Option<String>,
    pub points: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// One line of the answer key view.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AnswerKeyLine {
    pub question_number: i64,
    pub answer: String,
    pub explanation: Option<String>,
}
