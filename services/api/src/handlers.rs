//! Axum Handlers for the REST API
//!
//! Read-only views of the connection registry. They use `utoipa` doc comments
//! to generate OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;

use crate::{
    models::{ConnectionList, ErrorResponse, HealthResponse, HistoryResponse, TurnView},
    state::AppState,
};

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
        }
    }
}

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        connections: state.sessions.len().await,
    })
}

/// List the ids of all live WebSocket connections.
#[utoipa::path(
    get,
    path = "/connections",
    responses(
        (status = 200, description = "Connected client ids", body = ConnectionList)
    )
)]
pub async fn list_connections(State(state): State<Arc<AppState>>) -> Json<ConnectionList> {
    Json(ConnectionList {
        connections: state.sessions.connection_ids().await,
    })
}

/// Get the conversation history of a connected client.
#[utoipa::path(
    get,
    path = "/connections/{id}/history",
    responses(
        (status = 200, description = "Conversation history", body = HistoryResponse),
        (status = 404, description = "Client not connected", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Client id the WebSocket was opened with")
    )
)]
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let turns = state
        .sessions
        .get_history(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Client '{}' is not connected", id)))?;

    Ok(Json(HistoryResponse {
        client_id: id,
        turns: turns.into_iter().map(TurnView::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::testing::test_state;
    use companion_core::history::Turn;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn health_reports_connection_count() {
        let state = Arc::new(test_state());
        let (tx, _rx) = mpsc::channel(4);
        state.sessions.register("a", tx).await;

        let Json(body) = health(State(state)).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.connections, 1);
    }

    #[tokio::test]
    async fn history_of_unknown_client_is_not_found() {
        let state = Arc::new(test_state());
        let result = get_history(State(state), Path("ghost".to_string())).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn history_and_connection_listing() {
        let state = Arc::new(test_state());
        let (tx_b, _rx_b) = mpsc::channel(4);
        let (tx_a, _rx_a) = mpsc::channel(4);
        state.sessions.register("b", tx_b).await;
        let a = state.sessions.register("a", tx_a).await;
        state
            .sessions
            .append_exchange(&a, Turn::user("hi"), Turn::assistant("hello"))
            .await;

        let Json(list) = list_connections(State(state.clone())).await;
        assert_eq!(list.connections, vec!["a".to_string(), "b".to_string()]);

        let Json(history) = get_history(State(state), Path("a".to_string()))
            .await
            .unwrap();
        assert_eq!(history.client_id, "a");
        assert_eq!(history.turns.len(), 2);
        assert_eq!(history.turns[1].text, "hello");
    }
}
