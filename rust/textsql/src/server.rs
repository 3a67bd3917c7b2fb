use crate::{
    config::AppConfig,
    db::{PostgresGateway, SqlGateway},
    error::{Result, ServiceError},
    generator::{GeminiGenerator, SqlGenerator},
    models::{
        ConnectionReport, ExecuteRequest, ExecutionOutcome, GenerateRequest, GenerateResponse,
    },
    state::AppState,
    validator::{self, Verdict},
};
use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const INDEX_HTML: &str = include_str!("../templates/index.html");

pub struct Server {
    config: AppConfig,
    state: AppState,
}

impl Server {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let generator = GeminiGenerator::new(config.generation.clone())
            .context("failed to build generation client")?;
        let gateway = PostgresGateway::new(config.database.clone());
        Ok(Self::with_components(
            config,
            Arc::new(generator),
            Arc::new(gateway),
        ))
    }

    /// Wires the router around caller-supplied generator and gateway implementations.
    pub fn with_components(
        config: AppConfig,
        generator: Arc<dyn SqlGenerator>,
        gateway: Arc<dyn SqlGateway>,
    ) -> Self {
        let state = AppState::new(generator, gateway);
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(Self::index))
            .route("/healthz", get(Self::health))
            .route("/generate", post(Self::generate))
            .route("/execute", post(Self::execute))
            .route("/test-connection", get(Self::test_connection))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        info!(%addr, "textsql listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }

    async fn index() -> Html<&'static str> {
        Html(INDEX_HTML)
    }

    async fn health() -> Json<serde_json::Value> {
        Json(json!({ "status": "ok" }))
    }

    async fn generate(
        State(state): State<AppState>,
        payload: std::result::Result<Json<GenerateRequest>, JsonRejection>,
    ) -> Result<Json<GenerateResponse>> {
        let Json(request) = payload.map_err(invalid_body)?;
        let input = request.input.unwrap_or_default();
        if input.is_empty() {
            return Err(ServiceError::InvalidRequest("No input provided".into()));
        }

        // Generation failures travel back in `sql_query`; executing that text
        // fails at the database with a syntax error.
        let sql_query = match state.generator.generate(&input).await {
            Ok(sql) => sql,
            Err(err) => {
                warn!(error = %err, "SQL generation failed");
                format!("Error generating SQL query: {err}")
            }
        };

        Ok(Json(GenerateResponse { sql_query }))
    }

    async fn execute(
        State(state): State<AppState>,
        payload: std::result::Result<Json<ExecuteRequest>, JsonRejection>,
    ) -> Result<Json<ExecutionOutcome>> {
        let Json(request) = payload.map_err(invalid_body)?;
        let statement = request.sql_query.unwrap_or_default();
        if statement.is_empty() {
            return Err(ServiceError::InvalidRequest("No SQL query provided".into()));
        }

        if let Verdict::Rejected(keyword) = validator::validate(&statement) {
            return Err(ServiceError::Rejected(keyword));
        }

        let outcome = state.gateway.execute(&statement).await?;
        Ok(Json(outcome))
    }

    async fn test_connection(State(state): State<AppState>) -> Json<ConnectionReport> {
        match state.gateway.probe().await {
            Ok(()) => Json(ConnectionReport::ok()),
            Err(err) => {
                warn!(error = %err, "database connectivity check failed");
                Json(ConnectionReport::failed(err.to_string()))
            }
        }
    }
}

fn invalid_body(rejection: JsonRejection) -> ServiceError {
    ServiceError::InvalidRequest(rejection.body_text())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
