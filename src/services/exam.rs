// src/services/exam.rs

//! Exam aggregate: generation, atomic assembly, answer-key flag and read paths.
//!
//! Every read and write is scoped to the owner. An exam owned by someone else
//! is reported exactly like a missing one.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{Executor, Sqlite, SqlitePool, Transaction, types::Json};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        answer_key::{AnswerKeyEntry, AnswerKeyLine, DEFAULT_POINTS},
        exam::{CreateExamRequest, Exam, ExamComplete, ExamListParams},
        question::{Question, QuestionWithAnswerKey},
    },
    services::generator::{GeneratedExam, GenerationRequest, QuestionGenerator, reconcile_count},
};

fn exam_not_found() -> AppError {
    AppError::NotFound("Exam not found".to_string())
}

/// Validates the request, asks the generator for questions and persists the result.
///
/// Nothing reaches the generator when the request is invalid.
pub async fn generate_exam(
    pool: &SqlitePool,
    generator: &dyn QuestionGenerator,
    owner_id: i64,
    req: &CreateExamRequest,
) -> Result<ExamComplete, AppError> {
    if req.question_types.is_empty() {
        return Err(AppError::BadRequest(
            "Select at least one question type".to_string(),
        ));
    }
    req.validate()?;

    let request = GenerationRequest {
        subject: req.subject.clone(),
        grade: req.grade.clone(),
        question_types: req.question_types.clone(),
        question_count: req.question_count,
        topics: req.topics.clone(),
    };

    tracing::info!(
        "Generating exam '{}' ({} questions) for user {}",
        req.title,
        req.question_count,
        owner_id
    );

    let generated = generator
        .generate(&request)
        .await
        .and_then(|exam| reconcile_count(exam, req.question_count))
        .map_err(|e| {
            tracing::error!("Exam generation failed for user {}: {}", owner_id, e);
            AppError::Generation(e)
        })?;

    assemble_exam(pool, owner_id, req, generated).await
}

/// Persists an exam with all its questions and answer keys in one transaction.
///
/// Questions are numbered by their position in `generated`. On any failure the
/// transaction is rolled back and nothing of the exam remains.
pub async fn assemble_exam(
    pool: &SqlitePool,
    owner_id: i64,
    req: &CreateExamRequest,
    generated: GeneratedExam,
) -> Result<ExamComplete, AppError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::AssemblyFailed(e.to_string()))?;

    match insert_aggregate(&mut tx, owner_id, req, &generated).await {
        Ok(exam) => {
            tx.commit()
                .await
                .map_err(|e| AppError::AssemblyFailed(e.to_string()))?;
            tracing::info!(
                "Exam {} assembled with {} questions",
                exam.exam.id,
                exam.questions.len()
            );
            Ok(exam)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!("Rollback after failed assembly also failed: {:?}", rollback_err);
            }
            Err(AppError::AssemblyFailed(e.to_string()))
        }
    }
}

async fn insert_aggregate(
    tx: &mut Transaction<'_, Sqlite>,
    owner_id: i64,
    req: &CreateExamRequest,
    generated: &GeneratedExam,
) -> Result<ExamComplete, sqlx::Error> {
    let now = Utc::now();

    let exam = sqlx::query_as::<_, Exam>(
        r#"
        INSERT INTO exams (
            title, subject, grade, question_count, question_types,
            topics, estimated_duration, user_id, answer_key_saved, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, FALSE, ?)
        RETURNING *
        "#,
    )
    .bind(&req.title)
    .bind(&req.subject)
    .bind(&req.grade)
    .bind(generated.questions.len() as i64)
    .bind(Json(&req.question_types))
    .bind(&req.topics)
    .bind(&req.estimated_duration)
    .bind(owner_id)
    .bind(now)
    .fetch_one(&mut **tx)
    .await?;

    let mut questions = Vec::with_capacity(generated.questions.len());

    for (index, generated_question) in generated.questions.iter().enumerate() {
        let number = index as i64 + 1;

        if let Some(reported) = generated_question.number {
            if reported as i64 != number {
                tracing::debug!("Renumbering generated question {} as {}", reported, number);
            }
        }

        let question = sqlx::query_as::<_, Question>(
            r#"
            INSERT INTO questions (exam_id, number, type, prompt, choices, correct_answer, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(exam.id)
        .bind(number)
        .bind(generated_question.question_type)
        .bind(&generated_question.prompt)
        .bind(generated_question.choices.as_ref().map(Json))
        .bind(&generated_question.correct_answer)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        let answer_key = sqlx::query_as::<_, AnswerKeyEntry>(
            r#"
            INSERT INTO answer_keys (question_id, answer, explanation, points, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(question.id)
        .bind(generated_question.correct_answer.clone().unwrap_or_default())
        .bind(&generated_question.explanation)
        .bind(DEFAULT_POINTS)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        questions.push(QuestionWithAnswerKey {
            question,
            answer_key: Some(answer_key),
        });
    }

    Ok(ExamComplete { exam, questions })
}

async fn find_owned_exam<'e, E>(executor: E, owner_id: i64, exam_id: i64) -> Result<Exam, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Exam>("SELECT * FROM exams WHERE id = ? AND user_id = ?")
        .bind(exam_id)
        .bind(owner_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(exam_not_found)
}

/// Marks the answer key of a fully assembled exam as saved.
///
/// The flag only moves from false to true; saving twice is a no-op.
pub async fn save_answer_key(pool: &SqlitePool, owner_id: i64, exam_id: i64) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        UPDATE exams
        SET answer_key_saved = TRUE, updated_at = ?
        WHERE id = ? AND user_id = ?
          AND (SELECT COUNT(*) FROM questions WHERE questions.exam_id = exams.id) = exams.question_count
        "#,
    )
    .bind(Utc::now())
    .bind(exam_id)
    .bind(owner_id)
    .execute(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to save answer key for exam {}: {:?}", exam_id, e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(exam_not_found());
    }

    Ok(())
}

/// Answer key of an exam, one line per question that has an entry.
pub async fn get_answer_key(
    pool: &SqlitePool,
    owner_id: i64,
    exam_id: i64,
) -> Result<Vec<AnswerKeyLine>, AppError> {
    find_owned_exam(pool, owner_id, exam_id).await?;

    let lines = sqlx::query_as::<_, AnswerKeyLine>(
        r#"
        SELECT q.number AS question_number, a.answer, a.explanation
        FROM questions q
        JOIN answer_keys a ON a.question_id = q.id
        WHERE q.exam_id = ?
        ORDER BY q.number
        "#,
    )
    .bind(exam_id)
    .fetch_all(pool)
    .await?;

    Ok(lines)
}

/// Exams owned by the caller, oldest first.
pub async fn list_exams(
    pool: &SqlitePool,
    owner_id: i64,
    params: &ExamListParams,
) -> Result<Vec<Exam>, AppError> {
    // SQLite treats a negative LIMIT as no limit.
    let limit = params.limit.map(i64::from).unwrap_or(-1);

    let exams = sqlx::query_as::<_, Exam>(
        "SELECT * FROM exams WHERE user_id = ? ORDER BY id LIMIT ? OFFSET ?",
    )
    .bind(owner_id)
    .bind(limit)
    .bind(i64::from(params.skip))
    .fetch_all(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list exams for user {}: {:?}", owner_id, e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(exams)
}

/// Exams owned by the caller whose answer key has been saved.
/// An empty list means no matches; database failures are reported as errors.
pub async fn list_exams_with_saved_key(
    pool: &SqlitePool,
    owner_id: i64,
) -> Result<Vec<Exam>, AppError> {
    let exams = sqlx::query_as::<_, Exam>(
        "SELECT * FROM exams WHERE user_id = ? AND answer_key_saved = TRUE ORDER BY id",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
    .map_err(|e| {
        tracing::error!(
            "Failed to list exams with saved answer key for user {}: {:?}",
            owner_id,
            e
        );
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(exams)
}

/// Complete view: exam, questions in order, and each question's answer key.
pub async fn get_exam(pool: &SqlitePool, owner_id: i64, exam_id: i64) -> Result<ExamComplete, AppError> {
    let exam = find_owned_exam(pool, owner_id, exam_id).await?;

    let questions =
        sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE exam_id = ? ORDER BY number")
            .bind(exam_id)
            .fetch_all(pool)
            .await?;

    let mut answer_keys: HashMap<i64, AnswerKeyEntry> = sqlx::query_as::<_, AnswerKeyEntry>(
        r#"
        SELECT a.*
        FROM answer_keys a
        JOIN questions q ON q.id = a.question_id
        WHERE q.exam_id = ?
        "#,
    )
    .bind(exam_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|entry| (entry.question_id, entry))
    .collect();

    let questions = questions
        .into_iter()
        .map(|question| {
            let answer_key = answer_keys.remove(&question.id);
            QuestionWithAnswerKey {
                question,
                answer_key,
            }
        })
        .collect();

    Ok(ExamComplete { exam, questions })
}

/// Removes the exam with its questions and answer keys, all or nothing.
pub async fn delete_exam(pool: &SqlitePool, owner_id: i64, exam_id: i64) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    find_owned_exam(&mut *tx, owner_id, exam_id).await?;

    sqlx::query(
        "DELETE FROM answer_keys WHERE question_id IN (SELECT id FROM questions WHERE exam_id = ?)",
    )
    .bind(exam_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM questions WHERE exam_id = ?")
        .bind(exam_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM exams WHERE id = ? AND user_id = ?")
        .bind(exam_id)
        .bind(owner_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await.map_err(|e| {
        tracing::error!("Failed to delete exam {}: {:?}", exam_id, e);
        AppError::InternalServerError(e.to_string())
    })?;

    tracing::info!("Exam {} deleted by user {}", exam_id, owner_id);
    Ok(())
}

/// Download reference for the rendered document of an exam.
pub async fn export_reference(
    pool: &SqlitePool,
    owner_id: i64,
    exam_id: i64,
) -> Result<String, AppError> {
    find_owned_exam(pool, owner_id, exam_id).await?;
    Ok(format!("/api/v1/exams/{}/pdf", exam_id))
}
