use std::sync::Arc;

use crate::config::Config;
use crate::services::{generator::QuestionGenerator, payment_gateway::PaymentGateway};
use axum::extract::FromRef;
use sqlx::SqlitePool;

/// Built once at start-up; handlers pull the parts they need.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub generator: Arc<dyn QuestionGenerator>,
    pub payments: Arc<dyn PaymentGateway>,
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<dyn QuestionGenerator> {
    fn from_ref(state: &AppState) -> Self {
        state.generator.clone()
    }
}

impl FromRef<AppState> for Arc<dyn PaymentGateway> {
    fn from_ref(state: &AppState) -> Self {
        state.payments.clone()
    }
}
