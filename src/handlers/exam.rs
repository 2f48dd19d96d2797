// src/handlers/exam.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::SqlitePool;

use crate::{
    config::Config,
    error::AppError,
    models::exam::{CreateExamRequest, ExamListParams},
    services::{exam, generator::QuestionGenerator},
    utils::jwt::Claims,
};

/// Generates a new exam with the AI service and stores it with its answer key.
/// Returns 201 and the complete exam.
pub async fn generate_exam(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    State(generator): State<Arc<dyn QuestionGenerator>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let exam = exam::generate_exam(&pool, generator.as_ref(), user_id, &payload)
        .await
        .map_err(|e| match e {
            AppError::Generation(err) if !config.debug => AppError::Generation(err.redacted()),
            other => other,
        })?;

    Ok((StatusCode::CREATED, Json(exam)))
}

/// Lists the caller's exams. Supports `skip` and `limit`.
pub async fn list_exams(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<ExamListParams>,
) -> Result<impl IntoResponse, AppError> {
    let exams = exam::list_exams(&pool, claims.user_id()?, &params).await?;
    Ok(Json(exams))
}

/// Lists the caller's exams whose answer key was saved.
pub async fn list_exams_with_answer_key(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let exams = exam::list_exams_with_saved_key(&pool, claims.user_id()?).await?;
    Ok(Json(exams))
}

pub async fn get_exam(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = exam::get_exam(&pool, claims.user_id()?, id).await?;
    Ok(Json(exam))
}

/// Deletes an exam together with its questions and answer keys.
pub async fn delete_exam(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    exam::delete_exam(&pool, claims.user_id()?, id).await?;
    Ok(Json(json!({ "message": "Exam deleted" })))
}

/// Marks the exam's answer key as saved. Cannot be undone.
pub async fn save_answer_key(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    exam::save_answer_key(&pool, claims.user_id()?, id).await?;
    Ok(Json(json!({ "message": "Answer key saved" })))
}

pub async fn get_answer_key(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let lines = exam::get_answer_key(&pool, claims.user_id()?, id).await?;
    Ok(Json(lines))
}

pub async fn export_exam(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let download_url = exam::export_reference(&pool, claims.user_id()?, id).await?;
    Ok(Json(json!({ "download_url": download_url })))
}
