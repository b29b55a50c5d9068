use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    routing::get,
};
use serde::Serialize;
use sqlx::SqlitePool;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::warn;

use crate::{
    api,
    auth::TokenKeys,
    config::Config,
    google_books::GoogleBooksClient,
    utils::{Clock, SystemClock},
};

/// Shared handles every handler receives.
#[derive(Clone)]
pub struct AppState {
    pub database: SqlitePool,
    pub config: Arc<Config>,
    pub tokens: Arc<TokenKeys>,
    pub google_books: Arc<GoogleBooksClient>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(database: SqlitePool, config: Config) -> anyhow::Result<Self> {
        let tokens = TokenKeys::from_config(&config);
        let google_books = GoogleBooksClient::from_config(&config)?;
        Ok(Self {
            database,
            config: Arc::new(config),
            tokens: Arc::new(tokens),
            google_books: Arc::new(google_books),
            clock: Arc::new(SystemClock),
        })
    }
}

#[derive(Serialize)]
struct Root {
    message: String,
    version: &'static str,
    docs: &'static str,
}

async fn root(State(state): State<AppState>) -> Json<Root> {
    Json(Root {
        message: format!("Welcome to {} API", state.config.app_name),
        version: env!("CARGO_PKG_VERSION"),
        docs: "/api-docs/openapi.json",
    })
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    database: &'static str,
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Health>) {
    match sqlx::query("SELECT 1").execute(&state.database).await {
        Ok(_) => (
            StatusCode::OK,
            Json(Health {
                status: "healthy",
                database: "connected",
            }),
        ),
        Err(e) => {
            warn!("health check failed: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(Health {
                    status: "unhealthy",
                    database: "unavailable",
                }),
            )
        }
    }
}

fn cors(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring invalid CORS origin {origin}");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// The complete application: `/`, `/health`, the API and its OpenAPI document.
pub fn app(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);
    let cors = cors(&state.config.cors_origins);
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(api::router())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
