// src/models/plan.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum PlanKind {
    #[serde(rename = "gratuito")]
    #[sqlx(rename = "gratuito")]
    Free,

    #[serde(rename = "professor")]
    #[sqlx(rename = "professor")]
    Teacher,

    #[serde(rename = "escola")]
    #[sqlx(rename = "escola")]
    School,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum SubscriptionStatus {
    #[serde(rename = "ativa")]
    #[sqlx(rename = "ativa")]
    Active,

    #[serde(rename = "cancelada")]
    #[sqlx(rename = "cancelada")]
    Cancelled,

    #[serde(rename = "pendente")]
    #[sqlx(rename = "pendente")]
    Pending,

    #[serde(rename = "expirada")]
    #[sqlx(rename = "expirada")]
    Expired,
}

/// Represents the 'plans' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Plan {
    pub id: i64,
    pub name: String,
    pub kind: PlanKind,
    pub price: f64,

    /// Exams a subscriber may generate per month.
    pub monthly_exams: i64,

    /// Human readable feature list.
    pub features: Option<String>,

    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Represents the 'subscriptions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub plan_id: i64,
    pub status: SubscriptionStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub exams_used: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Subscription with the plan it refers to.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub plan: Plan,
}

/// DTO for creating a plan (admin).
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePlanRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub kind: PlanKind,
    #[validate(range(min = 0.0))]
    pub price: f64,
    #[validate(range(min = 0))]
    pub monthly_exams: i64,
    #[validate(length(max = 500))]
    pub features: Option<String>,
}
