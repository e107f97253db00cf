//! REST API server for the payment gate
//!
//! Exposes the gate via HTTP endpoints for the transport layer
//! excluded from the core.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use uuid::Uuid;

use crate::error::GateError;
use crate::gate::PaymentGate;
use crate::models::OrderRequest;

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub gate: Arc<PaymentGate>,
}

fn status_for(error: &GateError) -> StatusCode {
    match error {
        GateError::Validation(_) => StatusCode::BAD_REQUEST,
        GateError::PolicyViolation(_) => StatusCode::FORBIDDEN,
        GateError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
        GateError::System(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Order Submission Endpoint
/// =============================

async fn submit_order(
    State(state): State<ApiState>,
    Json(request): Json<OrderRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.gate.submit(request).await {
        Ok(response) => (StatusCode::OK, Json(ApiResponse::success(response))),
        Err(e) => (status_for(&e), Json(ApiResponse::error(e.to_string()))),
    }
}

/// =============================
/// Audit Endpoints
/// =============================

async fn get_audit_record(
    State(state): State<ApiState>,
    Path(audit_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    let audit_id = match Uuid::parse_str(&audit_id) {
        Ok(id) => id,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error(format!("invalid audit id: {}", e))),
            )
        }
    };

    match state.gate.audit_log().get(audit_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(ApiResponse::success(record))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("no audit record {}", audit_id))),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

async fn list_audit_records(
    State(state): State<ApiState>,
    Path(identity): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.gate.audit_log().list_for_identity(&identity).await {
        Ok(ids) => (StatusCode::OK, Json(ApiResponse::success(ids))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

/// =============================
/// Server Startup
/// =============================

pub fn build_router(gate: Arc<PaymentGate>) -> Router {
    let state = ApiState { gate };

    Router::new()
        .route("/health", get(health))
        .route("/orders", post(submit_order))
        .route("/audit/:audit_id", get(get_audit_record))
        .route("/audit/identity/:identity", get(list_audit_records))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(gate: Arc<PaymentGate>, port: u16) -> crate::Result<()> {
    let app = build_router(gate);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Payment gate API listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| GateError::System(format!("server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&GateError::Validation("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&GateError::RateLimitExceeded("x".to_string())),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_for(&GateError::System("x".to_string())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&GateError::Execution("x".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_api_response_envelope() {
        let ok = ApiResponse::success(serde_json::json!({"k": "v"}));
        assert!(ok.success);
        assert!(ok.error.is_none());

        let err = ApiResponse::error("boom".to_string());
        assert!(!err.success);
        assert_eq!(err.error.as_deref(), Some("boom"));
    }
}
