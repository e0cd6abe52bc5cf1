use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod error;
mod gemini;
mod gmail;
mod routes;
mod state;
mod store;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Signaldesk API",
        version = "0.1.0",
        description = "Turns behavioral event logs into outreach decisions and drives each decision record through its draft lifecycle at most once."
    ),
    paths(
        routes::health::health_check,
        routes::logs::load_logs,
        routes::logs::list_logs,
        routes::decisions::create_decision,
        routes::decisions::list_decisions,
        routes::decisions::get_decision,
        routes::dispatch::run_dispatch_pass,
    ),
    components(schemas(
        HealthResponse,
        signaldesk_core::error::ApiError,
        signaldesk_core::logs::LogEvent,
        signaldesk_core::logs::LogLine,
        signaldesk_core::logs::LoadLogsRequest,
        signaldesk_core::logs::LoadLogsResponse,
        signaldesk_core::signals::SignalTag,
        signaldesk_core::classify::Category,
        signaldesk_core::decision::Decision,
        signaldesk_core::decision::CreateDecisionRequest,
        signaldesk_core::store::DraftStatus,
        signaldesk_core::store::DecisionRecord,
        signaldesk_core::dispatch::DispatchReport,
    ))
)]
struct ApiDoc;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signaldesk_api=debug,signaldesk_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Database connection
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let generator = gemini::GeminiGenerator::from_env()
        .expect("Gemini generator configuration is incomplete");
    let mailer = gmail::GmailDrafter::from_env()
        .expect("Gmail drafter configuration is incomplete");

    let app_state = state::AppState {
        db: pool,
        generator: Arc::new(generator),
        mailer: Arc::new(mailer),
    };

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::logs::router())
        .merge(routes::decisions::router())
        .merge(routes::dispatch::router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Signaldesk API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
