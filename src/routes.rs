// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{exam, health, payment, plan},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Serves the banner and health probe at the root.
/// * Nests the exam, plan and payment routers under `/api/v1`.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state.
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    let exam_routes = Router::new()
        .route("/generate", post(exam::generate_exam))
        .route("/", get(exam::list_exams))
        .route("/with-answer-key", get(exam::list_exams_with_answer_key))
        .route("/{id}", get(exam::get_exam).delete(exam::delete_exam))
        .route(
            "/{id}/answer-key",
            post(exam::save_answer_key).get(exam::get_answer_key),
        )
        .route("/{id}/export", get(exam::export_exam))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let plan_routes = Router::new()
        .route("/", get(plan::list_plans))
        .merge(
            Router::new()
                .route("/mine", get(plan::my_plan))
                .route("/{id}/subscribe", post(plan::subscribe))
                .route("/subscription", delete(plan::cancel_subscription))
                .layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        .merge(
            Router::new()
                .route("/", post(plan::create_plan))
                .route("/admin/subscriptions", get(plan::list_subscriptions))
                // Auth first, then Admin check
                .layer(middleware::from_fn(admin_middleware))
                .layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        );

    let payment_routes = Router::new()
        .route("/webhooks/mercadopago", post(payment::mercadopago_webhook))
        .merge(
            Router::new()
                .route("/", post(payment::create_payment).get(payment::list_payments))
                .route("/{id}", get(payment::get_payment))
                .layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        .merge(
            Router::new()
                .route("/admin/all", get(payment::list_all_payments))
                .layer(middleware::from_fn(admin_middleware))
                .layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        );

    let api_routes = Router::new()
        .nest("/exams", exam_routes)
        .nest("/plans", plan_routes)
        .nest("/payments", payment_routes);

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .nest("/api/v1", api_routes)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
