// src/services/payment.rs

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction, types::Json};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        PageParams,
        payment::{CreatePaymentRequest, CreatedPaymentResponse, Payment, PaymentStatus, PaymentWebhook},
        plan::SubscriptionStatus,
    },
    services::payment_gateway::{GatewayPaymentRequest, PaymentGateway},
};

/// Outcome of a gateway notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Not a payment notification.
    Ignored,
    /// The gateway payment is not one of ours.
    UnknownPayment,
    /// The gateway document carries a reference to another user or subscription.
    ReferenceMismatch,
    Updated { payment_id: i64, status: PaymentStatus },
}

/// Reference sent to the gateway so its documents can be traced back to us.
fn external_reference(user_id: i64, subscription_id: Option<i64>) -> String {
    format!(
        "user_{}_subscription_{}",
        user_id,
        subscription_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "none".to_string())
    )
}

/// Charges the caller through the gateway and records the payment.
pub async fn create_payment(
    pool: &SqlitePool,
    gateway: &dyn PaymentGateway,
    user_id: i64,
    req: &CreatePaymentRequest,
) -> Result<CreatedPaymentResponse, AppError> {
    req.validate()?;

    if let Some(subscription_id) = req.subscription_id {
        sqlx::query_scalar::<_, i64>("SELECT id FROM subscriptions WHERE id = ? AND user_id = ?")
            .bind(subscription_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or(AppError::NotFound("Subscription not found".to_string()))?;
    }

    let external_reference = external_reference(user_id, req.subscription_id);

    let gateway_payment = gateway
        .create_payment(&GatewayPaymentRequest {
            amount: req.amount,
            description: format!("Pagamento ProvaFácil - usuário {}", user_id),
            payer_email: req.payer_email.clone(),
            method_id: req.method.gateway_method_id().to_string(),
            external_reference,
        })
        .await?;

    let status = PaymentStatus::from_gateway(&gateway_payment.status);
    let now = Utc::now();

    let mut tx = pool.begin().await?;
    let payment = sqlx::query_as::<_, Payment>(
        r#"
        INSERT INTO payments (user_id, subscription_id, amount, method, status, gateway_id, gateway_data, paid_at, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(req.subscription_id)
    .bind(req.amount)
    .bind(req.method)
    .bind(status)
    .bind(&gateway_payment.id)
    .bind(Json(&gateway_payment.raw))
    .bind((status == PaymentStatus::Approved).then_some(now))
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!(
            "Gateway payment {} created but not recorded: {:?}",
            gateway_payment.id,
            e
        );
        AppError::InternalServerError(e.to_string())
    })?;

    // Instant methods come back approved and never see a later transition.
    if status == PaymentStatus::Approved {
        if let Some(subscription_id) = payment.subscription_id {
            activate_subscription(&mut tx, user_id, subscription_id).await?;
        }
    }

    tx.commit().await?;

    tracing::info!("Payment {} created for user {}", payment.id, user_id);

    Ok(CreatedPaymentResponse {
        payment,
        init_point: gateway_payment.init_point,
        sandbox_init_point: gateway_payment.sandbox_init_point,
    })
}

pub async fn list_payments(
    pool: &SqlitePool,
    user_id: i64,
    page: &PageParams,
) -> Result<Vec<Payment>, AppError> {
    let payments = sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE user_id = ? ORDER BY id LIMIT ? OFFSET ?",
    )
    .bind(user_id)
    .bind(i64::from(page.limit))
    .bind(i64::from(page.skip))
    .fetch_all(pool)
    .await?;

    Ok(payments)
}

pub async fn get_payment(pool: &SqlitePool, user_id: i64, payment_id: i64) -> Result<Payment, AppError> {
    sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ? AND user_id = ?")
        .bind(payment_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Payment not found".to_string()))
}

pub async fn list_all_payments(pool: &SqlitePool, page: &PageParams) -> Result<Vec<Payment>, AppError> {
    let payments = sqlx::query_as::<_, Payment>("SELECT * FROM payments ORDER BY id LIMIT ? OFFSET ?")
        .bind(i64::from(page.limit))
        .bind(i64::from(page.skip))
        .fetch_all(pool)
        .await?;

    Ok(payments)
}

/// Makes `subscription_id` the user's only active subscription.
async fn activate_subscription(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
    subscription_id: i64,
) -> Result<(), sqlx::Error> {
    let now = Utc::now();

    sqlx::query(
        "UPDATE subscriptions SET status = ?, ended_at = ?, updated_at = ? WHERE user_id = ? AND status = ? AND id != ?",
    )
    .bind(SubscriptionStatus::Cancelled)
    .bind(now)
    .bind(now)
    .bind(user_id)
    .bind(SubscriptionStatus::Active)
    .bind(subscription_id)
    .execute(&mut **tx)
    .await?;

    sqlx::query("UPDATE subscriptions SET status = ?, started_at = ?, updated_at = ? WHERE id = ?")
        .bind(SubscriptionStatus::Active)
        .bind(now)
        .bind(now)
        .bind(subscription_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// Applies a gateway status notification.
///
/// The gateway is asked for the current state of the payment; the local row,
/// and on its first approval the referenced subscription, are updated together.
pub async fn process_webhook(
    pool: &SqlitePool,
    gateway: &dyn PaymentGateway,
    webhook: &PaymentWebhook,
) -> Result<WebhookOutcome, AppError> {
    let Some(gateway_id) = webhook.payment_id() else {
        tracing::debug!("Ignoring gateway notification of type '{}'", webhook.kind);
        return Ok(WebhookOutcome::Ignored);
    };

    let gateway_payment = gateway.get_payment(&gateway_id).await?;
    let status = PaymentStatus::from_gateway(&gateway_payment.status);

    let mut tx = pool.begin().await?;

    let Some(payment) = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE gateway_id = ?")
        .bind(&gateway_id)
        .fetch_optional(&mut *tx)
        .await?
    else {
        tracing::warn!("Gateway notification for unknown payment {}", gateway_id);
        return Ok(WebhookOutcome::UnknownPayment);
    };

    if let Some(reference) = &gateway_payment.external_reference {
        let expected = external_reference(payment.user_id, payment.subscription_id);
        if *reference != expected {
            tracing::warn!(
                "Gateway payment {} references '{}', expected '{}'",
                gateway_id,
                reference,
                expected
            );
            return Ok(WebhookOutcome::ReferenceMismatch);
        }
    }

    // Notifications are redelivered; only the transition into approval touches subscriptions.
    let newly_approved =
        payment.status != PaymentStatus::Approved && status == PaymentStatus::Approved;

    let now = Utc::now();
    sqlx::query(
        "UPDATE payments SET status = ?, gateway_data = ?, paid_at = COALESCE(paid_at, ?), updated_at = ? WHERE id = ?",
    )
    .bind(status)
    .bind(Json(&gateway_payment.raw))
    .bind((status == PaymentStatus::Approved).then_some(now))
    .bind(now)
    .bind(payment.id)
    .execute(&mut *tx)
    .await?;

    if newly_approved {
        if let Some(subscription_id) = payment.subscription_id {
            activate_subscription(&mut tx, payment.user_id, subscription_id).await?;
            tracing::info!("Subscription {} activated by payment {}", subscription_id, payment.id);
        }
    }

    tx.commit().await?;

    tracing::info!("Payment {} is now {:?}", payment.id, status);
    Ok(WebhookOutcome::Updated {
        payment_id: payment.id,
        status,
    })
}
