// src/services/plan.rs

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        PageParams,
        plan::{
            CreatePlanRequest, Plan, PlanKind, Subscription, SubscriptionResponse,
            SubscriptionStatus,
        },
    },
};

pub async fn list_active_plans(pool: &SqlitePool) -> Result<Vec<Plan>, AppError> {
    let plans = sqlx::query_as::<_, Plan>(
        "SELECT * FROM plans WHERE is_active = TRUE ORDER BY price, id",
    )
    .fetch_all(pool)
    .await?;

    Ok(plans)
}

async fn find_plan(tx: &mut Transaction<'_, Sqlite>, plan_id: i64) -> Result<Option<Plan>, sqlx::Error> {
    sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = ?")
        .bind(plan_id)
        .fetch_optional(&mut **tx)
        .await
}

async fn find_active_subscription(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
) -> Result<Option<Subscription>, sqlx::Error> {
    sqlx::query_as::<_, Subscription>(
        "SELECT * FROM subscriptions WHERE user_id = ? AND status = ? ORDER BY id DESC LIMIT 1",
    )
    .bind(user_id)
    .bind(SubscriptionStatus::Active)
    .fetch_optional(&mut **tx)
    .await
}

async fn insert_subscription(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
    plan_id: i64,
    status: SubscriptionStatus,
) -> Result<Subscription, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as::<_, Subscription>(
        r#"
        INSERT INTO subscriptions (user_id, plan_id, status, started_at, exams_used, created_at)
        VALUES (?, ?, ?, ?, 0, ?)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(plan_id)
    .bind(status)
    .bind(now)
    .bind(now)
    .fetch_one(&mut **tx)
    .await
}

async fn cancel_subscription_row(
    tx: &mut Transaction<'_, Sqlite>,
    subscription_id: i64,
) -> Result<(), sqlx::Error> {
    let now = Utc::now();
    sqlx::query("UPDATE subscriptions SET status = ?, ended_at = ?, updated_at = ? WHERE id = ?")
        .bind(SubscriptionStatus::Cancelled)
        .bind(now)
        .bind(now)
        .bind(subscription_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Current active subscription. Users without one are enrolled in the free plan.
pub async fn current_subscription(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<SubscriptionResponse, AppError> {
    let mut tx = pool.begin().await?;

    let subscription = match find_active_subscription(&mut tx, user_id).await? {
        Some(subscription) => subscription,
        None => {
            let free_plan = sqlx::query_as::<_, Plan>(
                "SELECT * FROM plans WHERE kind = ? ORDER BY id LIMIT 1",
            )
            .bind(PlanKind::Free)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::NotFound("Free plan not found".to_string()))?;

            tracing::info!("Enrolling user {} in the free plan", user_id);
            insert_subscription(&mut tx, user_id, free_plan.id, SubscriptionStatus::Active).await?
        }
    };

    let plan = find_plan(&mut tx, subscription.plan_id)
        .await?
        .ok_or_else(|| AppError::InternalServerError(format!(
            "subscription {} references missing plan {}",
            subscription.id, subscription.plan_id
        )))?;

    tx.commit().await?;

    Ok(SubscriptionResponse { subscription, plan })
}

/// Replaces the active subscription (if any) with a pending one for `plan_id`.
pub async fn subscribe(
    pool: &SqlitePool,
    user_id: i64,
    plan_id: i64,
) -> Result<(Subscription, Plan), AppError> {
    let mut tx = pool.begin().await?;

    let plan = find_plan(&mut tx, plan_id)
        .await?
        .ok_or(AppError::NotFound("Plan not found".to_string()))?;

    if let Some(active) = find_active_subscription(&mut tx, user_id).await? {
        cancel_subscription_row(&mut tx, active.id).await?;
    }

    let subscription =
        insert_subscription(&mut tx, user_id, plan.id, SubscriptionStatus::Pending).await?;

    tx.commit().await?;

    tracing::info!(
        "User {} started subscription {} to plan {}",
        user_id,
        subscription.id,
        plan.name
    );
    Ok((subscription, plan))
}

pub async fn cancel_subscription(pool: &SqlitePool, user_id: i64) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    let active = find_active_subscription(&mut tx, user_id)
        .await?
        .ok_or(AppError::NotFound("No active subscription found".to_string()))?;

    cancel_subscription_row(&mut tx, active.id).await?;
    tx.commit().await?;

    tracing::info!("User {} cancelled subscription {}", user_id, active.id);
    Ok(())
}

pub async fn create_plan(pool: &SqlitePool, req: &CreatePlanRequest) -> Result<Plan, AppError> {
    req.validate()?;

    let plan = sqlx::query_as::<_, Plan>(
        r#"
        INSERT INTO plans (name, kind, price, monthly_exams, features, is_active, created_at)
        VALUES (?, ?, ?, ?, ?, TRUE, ?)
        RETURNING *
        "#,
    )
    .bind(&req.name)
    .bind(req.kind)
    .bind(req.price)
    .bind(req.monthly_exams)
    .bind(&req.features)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create plan: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(plan)
}

pub async fn list_subscriptions(
    pool: &SqlitePool,
    page: &PageParams,
) -> Result<Vec<Subscription>, AppError> {
    let subscriptions = sqlx::query_as::<_, Subscription>(
        "SELECT * FROM subscriptions ORDER BY id LIMIT ? OFFSET ?",
    )
    .bind(i64::from(page.limit))
    .bind(i64::from(page.skip))
    .fetch_all(pool)
    .await?;

    Ok(subscriptions)
}
