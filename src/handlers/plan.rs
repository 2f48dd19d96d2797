// src/handlers/plan.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::{PageParams, plan::CreatePlanRequest},
    services::plan,
    utils::jwt::Claims,
};

/// Lists the plans on offer. Public.
pub async fn list_plans(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let plans = plan::list_active_plans(&pool).await?;
    Ok(Json(plans))
}

/// Returns the caller's active subscription, enrolling them in the free plan if needed.
pub async fn my_plan(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let subscription = plan::current_subscription(&pool, claims.user_id()?).await?;
    Ok(Json(subscription))
}

pub async fn subscribe(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(plan_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let (subscription, plan) = plan::subscribe(&pool, claims.user_id()?, plan_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Subscription created",
            "subscription_id": subscription.id,
            "plan": plan.name,
            "price": plan.price,
        })),
    ))
}

pub async fn cancel_subscription(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    plan::cancel_subscription(&pool, claims.user_id()?).await?;
    Ok(Json(json!({ "message": "Subscription cancelled" })))
}

/// Creates a plan.
/// Admin only.
pub async fn create_plan(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreatePlanRequest>,
) -> Result<impl IntoResponse, AppError> {
    let plan = plan::create_plan(&pool, &payload).await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

/// Lists every subscription.
/// Admin only.
pub async fn list_subscriptions(
    State(pool): State<SqlitePool>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let subscriptions = plan::list_subscriptions(&pool, &page).await?;
    Ok(Json(subscriptions))
}
