use std::collections::HashMap;
use std::future::Future;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::QueryFacade;
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::models::Transaction;

/// Response structure for current-block endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct CurrentBlockResponse {
    pub block_number: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscribeResponse {
    pub success: bool,
}

/// Query parameters for get-transactions endpoint
#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionsResponse {
    pub trxs: Vec<Transaction>,
}

/// Response structure for status endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub current_block: u64,
    pub subscriber_count: usize,
    pub transaction_count: usize,
}

/// Error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub facade: QueryFacade,
}

/// Build the router with every route and layer the server exposes
pub fn create_router(facade: QueryFacade) -> Router {
    Router::new()
        .route("/current-block", get(get_current_block))
        .route("/subscribe", post(subscribe))
        .route("/get-transactions", get(get_transactions))
        .route("/status", get(get_status))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(AppState { facade })
}

/// HTTP API server
pub struct ApiServer {
    facade: QueryFacade,
    pub host: String,
    pub port: u16,
}

impl ApiServer {
    pub fn new(facade: QueryFacade, host: impl Into<String>, port: u16) -> Self {
        Self {
            facade,
            host: host.into(),
            port,
        }
    }

    pub fn from_config(facade: QueryFacade, config: &ApiConfig) -> Self {
        Self::new(facade, config.host.clone(), config.port)
    }

    /// Serve until `shutdown` resolves, then drain open connections
    pub async fn start_with_shutdown<F>(&self, shutdown: F) -> Result<(), ApiError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = create_router(self.facade.clone());

        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ApiError::Server(format!("Failed to bind to {}: {}", addr, e)))?;

        log::info!("HTTP API server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ApiError::Server(format!("Server error: {}", e)))?;

        log::info!("HTTP API server stopped");
        Ok(())
    }
}

/// GET /current-block
pub async fn get_current_block(State(state): State<AppState>) -> Json<CurrentBlockResponse> {
    Json(CurrentBlockResponse {
        block_number: state.facade.get_current_block(),
    })
}

/// POST /subscribe
///
/// The body is read as a JSON object of strings whatever its Content-Type.
/// A missing `address` key counts as an invalid address, not a bad request.
pub async fn subscribe(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SubscribeResponse>, (StatusCode, Json<ErrorResponse>)> {
    let fields: HashMap<String, String> = serde_json::from_slice(&body).map_err(|e| {
        log::debug!("Rejected subscribe request: {}", e);
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "invalid_request".to_string(),
                message: format!("Failed to parse request body: {}", e),
            }),
        )
    })?;

    let address = fields.get("address").map(String::as_str).unwrap_or_default();
    Ok(Json(SubscribeResponse {
        success: state.facade.subscribe(address),
    }))
}

/// GET /get-transactions?address=0x...
pub async fn get_transactions(
    Query(params): Query<TransactionsQuery>,
    State(state): State<AppState>,
) -> Json<TransactionsResponse> {
    Json(TransactionsResponse {
        trxs: state.facade.get_transactions(&params.address),
    })
}

/// GET /status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let store = state.facade.store();
    Json(StatusResponse {
        status: "healthy".to_string(),
        current_block: store.get_latest_block(),
        subscriber_count: store.subscriber_count(),
        transaction_count: store.transaction_count(),
    })
}
