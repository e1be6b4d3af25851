//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{ConnectionList, ErrorResponse, HealthResponse, HistoryResponse, TurnRole, TurnView},
    state::AppState,
    ws::ws_handler,
};

use axum::{Router, routing::get};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::list_connections,
        handlers::get_history,
    ),
    components(
        schemas(HealthResponse, ConnectionList, HistoryResponse, TurnView, TurnRole, ErrorResponse)
    ),
    tags(
        (name = "Companion API", description = "Connection and conversation inspection for the companion chat service")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/health", get(handlers::health))
        .route("/connections", get(handlers::list_connections))
        .route("/connections/{id}/history", get(handlers::get_history))
        .route("/ws/{client_id}", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
