// tests/billing_tests.rs

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use provafacil::{
    config::{Config, parse_base_url},
    db,
    routes,
    services::{
        generator::{GeneratedExam, GenerationError, GenerationRequest, QuestionGenerator},
        payment_gateway::{GatewayError, GatewayPayment, GatewayPaymentRequest, PaymentGateway},
    },
    state::AppState,
    utils::jwt::{ROLE_ADMIN, ROLE_USER, sign_jwt},
};

const SECRET: &str = "billing_test_secret";

struct NoGenerator;

#[async_trait]
impl QuestionGenerator for NoGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<GeneratedExam, GenerationError> {
        Err(GenerationError::Failure("not used".to_string()))
    }
}

/// Gateway holding a single payment, "777", whose status the test controls.
struct FakeGateway {
    status: Mutex<String>,
}

impl FakeGateway {
    fn document(&self) -> GatewayPayment {
        let status = self.status.lock().unwrap().clone();
        GatewayPayment::from_document(serde_json::json!({
            "id": 777,
            "status": status,
            "init_point": "https://pay.test/777",
            "sandbox_init_point": "https://sandbox.pay.test/777"
        }))
        .unwrap()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_payment(
        &self,
        _request: &GatewayPaymentRequest,
    ) -> Result<GatewayPayment, GatewayError> {
        Ok(self.document())
    }

    async fn get_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        if payment_id == "777" {
            Ok(self.document())
        } else {
            Err(GatewayError::Rejected {
                status: 404,
                body: "not found".to_string(),
            })
        }
    }
}

async fn spawn_app() -> (String, Arc<FakeGateway>) {
    let pool = db::memory_pool()
        .await
        .expect("Failed to create in-memory database");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: SECRET.to_string(),
        rust_log: "error".to_string(),
        debug: false,
        bind_addr: "127.0.0.1:0".to_string(),
        cors_origins: vec!["http://localhost:3000".to_string()],
        gemini_api_key: String::new(),
        gemini_model: "test-model".to_string(),
        gemini_base_url: parse_base_url("http://127.0.0.1:9").unwrap(),
        generation_timeout: Duration::from_secs(5),
        mercado_pago_access_token: "TEST-token".to_string(),
        mercado_pago_base_url: parse_base_url("http://127.0.0.1:9").unwrap(),
        public_base_url: parse_base_url("http://localhost:3000").unwrap(),
    };

    let gateway = Arc::new(FakeGateway {
        status: Mutex::new("pending".to_string()),
    });

    let state = AppState {
        pool,
        config,
        generator: Arc::new(NoGenerator),
        payments: gateway.clone(),
    };

    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, gateway)
}

fn bearer(user_id: i64, role: &str) -> String {
    format!("Bearer {}", sign_jwt(user_id, role, true, SECRET, 600).unwrap())
}

#[tokio::test]
async fn plans_are_public_and_seeded() {
    let (address, _) = spawn_app().await;

    let plans: Vec<serde_json::Value> = reqwest::get(format!("{}/api/v1/plans", address))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let names: Vec<&str> = plans.iter().map(|p| p["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Gratuito", "Professor", "Escola"]);
    assert_eq!(plans[0]["kind"], "gratuito");
}

#[tokio::test]
async fn first_visit_enrols_in_free_plan() {
    let (address, _) = spawn_app().await;
    let client = reqwest::Client::new();
    let auth = bearer(5, ROLE_USER);

    let first: serde_json::Value = client
        .get(format!("{}/api/v1/plans/mine", address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["plan"]["kind"], "gratuito");
    assert_eq!(first["status"], "ativa");

    // A second visit returns the same subscription.
    let second: serde_json::Value = client
        .get(format!("{}/api/v1/plans/mine", address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["id"], second["id"]);
}

#[tokio::test]
async fn admin_routes_reject_regular_users() {
    let (address, _) = spawn_app().await;
    let client = reqwest::Client::new();

    let plan = serde_json::json!({
        "name": "Rede",
        "kind": "escola",
        "price": 499.0,
        "monthly_exams": 1000,
        "features": "Várias escolas"
    });

    let response = client
        .post(format!("{}/api/v1/plans", address))
        .header("Authorization", bearer(1, ROLE_USER))
        .json(&plan)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = client
        .post(format!("{}/api/v1/plans", address))
        .json(&plan)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    let response = client
        .post(format!("{}/api/v1/plans", address))
        .header("Authorization", bearer(99, ROLE_ADMIN))
        .json(&plan)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    let response = client
        .get(format!("{}/api/v1/payments/admin/all", address))
        .header("Authorization", bearer(1, ROLE_USER))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn subscription_payment_flow() {
    let (address, gateway) = spawn_app().await;
    let client = reqwest::Client::new();
    let auth = bearer(1, ROLE_USER);

    let plans: Vec<serde_json::Value> = reqwest::get(format!("{}/api/v1/plans", address))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let professor_plan = plans[1]["id"].as_i64().unwrap();

    // 1. Start on the free plan, then subscribe to the paid one
    client
        .get(format!("{}/api/v1/plans/mine", address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap();

    let response = client
        .post(format!("{}/api/v1/plans/{}/subscribe", address, professor_plan))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let subscribed: serde_json::Value = response.json().await.unwrap();
    let subscription_id = subscribed["subscription_id"].as_i64().unwrap();

    // 2. Pay for it
    let response = client
        .post(format!("{}/api/v1/payments", address))
        .header("Authorization", &auth)
        .json(&serde_json::json!({
            "amount": 29.9,
            "method": "pix",
            "subscription_id": subscription_id,
            "payer_email": "prof@escola.test"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let created: serde_json::Value = response.json().await.unwrap();
    assert_eq!(created["status"], "pendente");
    assert_eq!(created["init_point"], "https://pay.test/777");
    let payment_id = created["id"].as_i64().unwrap();

    // 3. Gateway approves and notifies us
    *gateway.status.lock().unwrap() = "approved".to_string();
    let response = client
        .post(format!("{}/api/v1/payments/webhooks/mercadopago", address))
        .json(&serde_json::json!({"type": "payment", "data": {"id": "777"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let payment: serde_json::Value = client
        .get(format!("{}/api/v1/payments/{}", address, payment_id))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(payment["status"], "aprovado");

    let mine: serde_json::Value = client
        .get(format!("{}/api/v1/plans/mine", address))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mine["id"], subscription_id);
    assert_eq!(mine["plan"]["kind"], "professor");

    // 4. Other users cannot read the payment
    let response = client
        .get(format!("{}/api/v1/payments/{}", address, payment_id))
        .header("Authorization", bearer(2, ROLE_USER))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    // 5. Admin sees it in the global listing
    let all: Vec<serde_json::Value> = client
        .get(format!("{}/api/v1/payments/admin/all", address))
        .header("Authorization", bearer(99, ROLE_ADMIN))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn cancelling_without_subscription_is_404() {
    let (address, _) = spawn_app().await;

    let response = reqwest::Client::new()
        .delete(format!("{}/api/v1/plans/subscription", address))
        .header("Authorization", bearer(3, ROLE_USER))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 404);
}
