//! HTTP server exposing the tools.
//!
//! Every tool in the [`ToolRegistry`] is reachable two ways: through a plain
//! JSON API and through the MCP Streamable HTTP endpoint that MCP clients
//! (Cursor, Claude, ...) connect to.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/tools/list` | List all tools with schemas |
//! | `POST` | `/tools/{name}` | Call a tool by name |
//! | `GET`  | `/health` | Version and per-source cache sizes |
//! | `*`    | `/mcp` | MCP JSON-RPC (see [`crate::mcp`]) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "'Foo' (Foo) is not in the acme registry" } }
//! ```
//!
//! Error codes: `invalid_arguments` (400), `not_found` (404), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::error::{classify, ErrorCode};
use crate::harvest::Harvester;
use crate::mcp::McpBridge;
use crate::traits::{ToolContext, ToolInfo, ToolRegistry};

/// Shared state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    harvester: Arc<Harvester>,
    tools: Arc<ToolRegistry>,
    ctx: ToolContext,
}

/// Builds the full router: JSON API, MCP endpoint, CORS.
///
/// The harvester should already be started; the router does not load the
/// index or refresh registries.
pub fn router(harvester: Arc<Harvester>) -> Router {
    let tools = Arc::new(ToolRegistry::for_sources(&harvester));
    let ctx = ToolContext::new(Arc::clone(&harvester));

    let bridge = McpBridge::new(Arc::clone(&tools), ctx.clone());
    let mcp = StreamableHttpService::new(
        move || Ok(bridge.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let state = AppState {
        harvester,
        tools,
        ctx,
    };

    Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .nest_service("/mcp", mcp)
        .layer(cors)
        .with_state(state)
}

/// Starts the harvester and serves until the process is terminated.
///
/// This is the entry point behind `harvest serve mcp`.
pub async fn run_server(harvester: Arc<Harvester>) -> anyhow::Result<()> {
    let bind_addr = harvester.config().server.bind.clone();

    for report in harvester.start().await {
        if let Ok(count) = report.result {
            tracing::info!(source = %report.source, entries = count, "registry ready");
        }
    }
    tracing::info!(records = harvester.store().len(), "index loaded");

    let app = router(Arc::clone(&harvester));
    for info in ToolRegistry::for_sources(&harvester).infos() {
        tracing::info!(tool = %info.name, "registered tool");
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening (MCP endpoint at /mcp)");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

/// Error type that converts into an HTTP response.
struct AppError {
    code: ErrorCode,
    message: String,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self.code {
            ErrorCode::InvalidArguments => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            code: classify(&err),
            message: format!("{:#}", err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(message = %self.message, "tool call failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.as_str(),
                message: self.message,
            },
        };
        (status, Json(body)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    /// Cached entries per source. Zero means the startup refresh failed.
    registries: BTreeMap<String, usize>,
    harvested: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let registries = state
        .harvester
        .caches()
        .map(|c| (c.source().to_string(), c.len()))
        .collect();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        registries,
        harvested: state.harvester.store().len(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: state.tools.infos(),
    })
}

// ============ POST /tools/{name} ============

/// Unified tool dispatch: look up, validate, execute.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = state.tools.call(&name, &params, &state.ctx).await?;
    Ok(Json(serde_json::json!({ "result": result })))
}
