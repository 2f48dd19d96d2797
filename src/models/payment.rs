// src/models/payment.rs

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use validator::Validate;

/// Local payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum PaymentStatus {
    #[serde(rename = "pendente")]
    #[sqlx(rename = "pendente")]
    Pending,

    #[serde(rename = "aprovado")]
    #[sqlx(rename = "aprovado")]
    Approved,

    #[serde(rename = "rejeitado")]
    #[sqlx(rename = "rejeitado")]
    Rejected,

    #[serde(rename = "cancelado")]
    #[sqlx(rename = "cancelado")]
    Cancelled,

    #[serde(rename = "estornado")]
    #[sqlx(rename = "estornado")]
    Refunded,
}

impl PaymentStatus {
    /// Maps a gateway status onto the local set. Unknown statuses are pending.
    pub fn from_gateway(status: &str) -> Self {
        match status {
            "approved" => PaymentStatus::Approved,
            "rejected" => PaymentStatus::Rejected,
            "cancelled" => PaymentStatus::Cancelled,
            "pending" | "in_process" => PaymentStatus::Pending,
            "refunded" => PaymentStatus::Refunded,
            other => {
                tracing::warn!("Unknown gateway payment status '{}', treating as pending", other);
                PaymentStatus::Pending
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum PaymentMethod {
    #[serde(rename = "cartao_credito")]
    #[sqlx(rename = "cartao_credito")]
    CreditCard,

    #[serde(rename = "cartao_debito")]
    #[sqlx(rename = "cartao_debito")]
    DebitCard,

    #[serde(rename = "pix")]
    #[sqlx(rename = "pix")]
    Pix,

    #[serde(rename = "boleto")]
    #[sqlx(rename = "boleto")]
    Boleto,
}

impl PaymentMethod {
    /// Payment method identifier understood by the gateway.
    pub fn gateway_method_id(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard | PaymentMethod::DebitCard => "visa",
            PaymentMethod::Pix => "pix",
            PaymentMethod::Boleto => "bolbradesco",
        }
    }
}

/// Represents the 'payments' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Payment {
    pub id: i64,
    pub user_id: i64,
    pub subscription_id: Option<i64>,
    pub amount: f64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,

    /// Transaction id assigned by the gateway.
    pub gateway_id: Option<String>,

    /// Last full document received from the gateway.
    pub gateway_data: Option<Json<serde_json::Value>>,

    pub paid_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Payment plus the gateway redirect URLs returned on creation.
#[derive(Debug, Serialize)]
pub struct CreatedPaymentResponse {
    #[serde(flatten)]
    pub payment: Payment,
    pub init_point: Option<String>,
    pub sandbox_init_point: Option<String>,
}

/// DTO for creating a payment.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentRequest {
    #[validate(range(exclusive_min = 0.0))]
    pub amount: f64,
    pub method: PaymentMethod,
    pub subscription_id: Option<i64>,
    #[validate(email)]
    pub payer_email: String,
}

/// Notification body posted by the gateway.
#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl PaymentWebhook {
    /// Gateway payment id carried by a `payment` notification.
    /// The id may arrive as a number or a string.
    pub fn payment_id(&self) -> Option<String> {
        if self.kind != "payment" {
            return None;
        }
        match self.data.get("id")? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
