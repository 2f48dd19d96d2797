// src/handlers/payment.rs

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
    error::AppError,
    models::{
        PageParams,
        payment::{CreatePaymentRequest, PaymentWebhook},
    },
    services::{payment, payment_gateway::PaymentGateway},
    utils::jwt::Claims,
};

pub async fn create_payment(
    State(pool): State<SqlitePool>,
    State(gateway): State<Arc<dyn PaymentGateway>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let created =
        payment::create_payment(&pool, gateway.as_ref(), claims.user_id()?, &payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_payments(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let payments = payment::list_payments(&pool, claims.user_id()?, &page).await?;
    Ok(Json(payments))
}

pub async fn get_payment(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let payment = payment::get_payment(&pool, claims.user_id()?, id).await?;
    Ok(Json(payment))
}

/// Receives status notifications from the payment gateway.
/// Unauthenticated: the payment state is re-read from the gateway itself.
pub async fn mercadopago_webhook(
    State(pool): State<SqlitePool>,
    State(gateway): State<Arc<dyn PaymentGateway>>,
    Json(payload): Json<PaymentWebhook>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = payment::process_webhook(&pool, gateway.as_ref(), &payload).await?;
    tracing::debug!("Webhook processed: {:?}", outcome);
    Ok(Json(json!({ "status": "success" })))
}

/// Lists every payment.
/// Admin only.
pub async fn list_all_payments(
    State(pool): State<SqlitePool>,
    Query(page): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let payments = payment::list_all_payments(&pool, &page).await?;
    Ok(Json(payments))
}
