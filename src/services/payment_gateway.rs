// src/services/payment_gateway.rs

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment gateway request failed: {0}")]
    Request(String),

    #[error("payment gateway rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected payment gateway response: {0}")]
    InvalidResponse(String),
}

/// What the core asks the gateway to charge.
#[derive(Debug, Clone)]
pub struct GatewayPaymentRequest {
    pub amount: f64,
    pub description: String,
    pub payer_email: String,
    pub method_id: String,
    pub external_reference: String,
}

/// A payment as known by the gateway.
#[derive(Debug, Clone)]
pub struct GatewayPayment {
    pub id: String,
    /// Raw gateway status, mapped with `PaymentStatus::from_gateway`.
    pub status: String,
    pub external_reference: Option<String>,
    pub init_point: Option<String>,
    pub sandbox_init_point: Option<String>,
    pub raw: serde_json::Value,
}

impl GatewayPayment {
    /// Reads the fields the core cares about out of a gateway document.
    pub fn from_document(raw: serde_json::Value) -> Result<Self, GatewayError> {
        let id = match raw.get("id") {
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
            _ => {
                return Err(GatewayError::InvalidResponse(
                    "payment document has no id".to_string(),
                ));
            }
        };

        let text = |key: &str| raw.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let status = text("status").unwrap_or_default();
        let external_reference = text("external_reference");
        let init_point = text("init_point");
        let sandbox_init_point = text("sandbox_init_point");

        Ok(Self {
            id,
            status,
            external_reference,
            init_point,
            sandbox_init_point,
            raw,
        })
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment(
        &self,
        request: &GatewayPaymentRequest,
    ) -> Result<GatewayPayment, GatewayError>;

    async fn get_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError>;
}

#[derive(Debug, Serialize)]
struct MpPayer<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct MpBackUrls {
    success: String,
    failure: String,
    pending: String,
}

#[derive(Debug, Serialize)]
struct MpPaymentBody<'a> {
    transaction_amount: f64,
    description: &'a str,
    payment_method_id: &'a str,
    payer: MpPayer<'a>,
    external_reference: &'a str,
    notification_url: String,
    back_urls: MpBackUrls,
}

/// Mercado Pago REST client.
pub struct MercadoPagoClient {
    http: reqwest::Client,
    base_url: Url,
    access_token: String,
    public_base_url: Url,
}

impl MercadoPagoClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.mercado_pago_base_url.clone(),
            access_token: config.mercado_pago_access_token.clone(),
            public_base_url: config.public_base_url.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.base_url
            .join(path)
            .map_err(|e| GatewayError::Request(e.to_string()))
    }

    fn public_url(&self, path: &str) -> String {
        self.public_base_url
            .join(path)
            .map(String::from)
            .unwrap_or_else(|_| path.to_string())
    }

    async fn read_document(response: reqwest::Response) -> Result<GatewayPayment, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        GatewayPayment::from_document(raw)
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoClient {
    async fn create_payment(
        &self,
        request: &GatewayPaymentRequest,
    ) -> Result<GatewayPayment, GatewayError> {
        let body = MpPaymentBody {
            transaction_amount: request.amount,
            description: &request.description,
            payment_method_id: &request.method_id,
            payer: MpPayer {
                email: &request.payer_email,
            },
            external_reference: &request.external_reference,
            notification_url: self.public_url("api/v1/payments/webhooks/mercadopago"),
            back_urls: MpBackUrls {
                success: self.public_url("dashboard/pagamento/sucesso"),
                failure: self.public_url("dashboard/pagamento/falha"),
                pending: self.public_url("dashboard/pagamento/pendente"),
            },
        };

        let response = self
            .http
            .post(self.endpoint("v1/payments")?)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;

        Self::read_document(response).await
    }

    async fn get_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        let response = self
            .http
            .get(self.endpoint(&format!("v1/payments/{}", payment_id))?)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;

        Self::read_document(response).await
    }
}
