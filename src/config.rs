// src/config.rs

use std::env;
use std::time::Duration;

use dotenvy::dotenv;
use url::Url;

/// Upper bound for a single generation call when `GENERATION_TIMEOUT_SECS` is unset.
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,

    /// Exposes generation failure details to clients when true.
    pub debug: bool,
    pub bind_addr: String,
    pub cors_origins: Vec<String>,

    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: Url,
    pub generation_timeout: Duration,

    pub mercado_pago_access_token: String,
    pub mercado_pago_base_url: Url,
    /// Public address of the frontend, used for gateway notification and return URLs.
    pub public_base_url: Url,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let debug = env::var("APP_DEBUG")
            .ok()
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|v| parse_origins(&v))
            .unwrap_or_else(|_| default_cors_origins());

        let gemini_api_key = env::var("GEMINI_API_KEY").unwrap_or_default();

        let gemini_model =
            env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".to_string());

        let gemini_base_url = base_url_from_env(
            "GEMINI_BASE_URL",
            "https://generativelanguage.googleapis.com/",
        );

        let generation_timeout = Duration::from_secs(
            env::var("GENERATION_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_GENERATION_TIMEOUT_SECS),
        );

        let mercado_pago_access_token = env::var("MERCADO_PAGO_ACCESS_TOKEN").unwrap_or_default();

        let mercado_pago_base_url =
            base_url_from_env("MERCADO_PAGO_BASE_URL", "https://api.mercadopago.com/");

        let public_base_url = base_url_from_env(
            "PUBLIC_BASE_URL",
            cors_origins
                .first()
                .map(String::as_str)
                .unwrap_or("http://localhost:3000"),
        );

        Self {
            database_url,
            jwt_secret,
            rust_log,
            debug,
            bind_addr,
            cors_origins,
            gemini_api_key,
            gemini_model,
            gemini_base_url,
            generation_timeout,
            mercado_pago_access_token,
            mercado_pago_base_url,
            public_base_url,
        }
    }
}

fn base_url_from_env(key: &str, default: &str) -> Url {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    parse_base_url(&raw).unwrap_or_else(|e| panic!("{} is not a valid URL: {}", key, e))
}

/// Parses a base URL, forcing a trailing slash so `Url::join` keeps the full path.
pub fn parse_base_url(raw: &str) -> Result<Url, url::ParseError> {
    let trimmed = raw.trim();
    if trimmed.ends_with('/') {
        Url::parse(trimmed)
    } else {
        Url::parse(&format!("{}/", trimmed))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn default_cors_origins() -> Vec<String> {
    [
        "http://localhost:3000",
        "http://localhost:3001",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:3001",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}
