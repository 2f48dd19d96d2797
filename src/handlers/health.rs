// src/handlers/health.rs

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;
use sqlx::SqlitePool;

use crate::error::AppError;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "message": "ProvaFácil API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Liveness probe. Also checks that the database answers.
pub async fn health(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&pool)
        .await?;

    Ok(Json(json!({ "status": "healthy" })))
}
