//! HTTP API for registering and verifying proofs.
//!
//! Every response body carries `success`. Failures add a human-readable
//! `error` and a stable machine `code`.

use crate::config::AppConfig;
use crate::error::{ProofError, ProofResult};
use crate::proof::{Amount, ProofHash, ProofRecord, ProofSubmission, RegisterProofRequest};
use crate::service::ProofService;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::future::Future;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Server state
#[derive(Clone)]
pub struct AppState {
    pub service: ProofService,
}

impl AppState {
    pub fn new(service: ProofService) -> Self {
        Self { service }
    }
}

/// Stored record as reported to clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofDetails {
    pub timestamp: u64,
    /// RFC 3339 rendering of `timestamp`
    pub registered_at: Option<String>,
    pub requested_amount: Amount,
    pub net_worth: Amount,
    pub is_approved: bool,
    pub wallet_address: String,
}

impl From<ProofRecord> for ProofDetails {
    fn from(record: ProofRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            registered_at: record.registered_at().map(|at| at.to_rfc3339()),
            requested_amount: record.requested_amount,
            net_worth: record.net_worth,
            is_approved: record.is_approved,
            wallet_address: record.wallet_address,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    success: bool,
    proof_hash: ProofHash,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExistsResponse {
    success: bool,
    proof_hash: ProofHash,
    exists: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifiedResponse {
    success: bool,
    exists: bool,
    proof_hash: ProofHash,
    details: ProofDetails,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DetailsResponse {
    success: bool,
    proof_hash: ProofHash,
    details: ProofDetails,
}

#[derive(Serialize)]
struct HealthResponse {
    success: bool,
    status: &'static str,
    connected: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: &'static str,
}

impl ProofError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProofError::Validation(_) => StatusCode::BAD_REQUEST,
            ProofError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProofError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.code(), "Request failed: {}", self);
        } else {
            debug!(code = self.code(), "Request rejected: {}", self);
        }

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            code: self.code(),
        };
        (status, Json(body)).into_response()
    }
}

/// Build the API router
pub fn router(state: AppState, cors_origin: &str) -> ProofResult<Router> {
    Ok(Router::new()
        .route("/register", post(register_proof))
        .route("/api/register-proof", post(register_proof))
        .route("/verify/:proof_hash", get(verify_with_details))
        .route("/api/verify-proof/:proof_hash", get(verify_exists))
        .route("/api/proof-details/:proof_hash", get(proof_details))
        .route("/health", get(health))
        .fallback(route_not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(cors_origin)?),
        )
        .with_state(state))
}

/// CORS restricted to a single origin, with credentials
pub fn cors_layer(origin: &str) -> ProofResult<CorsLayer> {
    let origin: HeaderValue = origin
        .trim()
        .parse()
        .map_err(|e| ProofError::Config(format!("Invalid CORS origin {:?}: {}", origin, e)))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true))
}

async fn register_proof(
    State(state): State<AppState>,
    payload: Result<Json<RegisterProofRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, ProofError> {
    let Json(request) = payload.map_err(|e| ProofError::Validation(e.body_text()))?;
    let submission = ProofSubmission::try_from(request)?;

    let proof_hash = state.service.register_proof(submission).await?;
    Ok(Json(RegisterResponse {
        success: true,
        proof_hash,
    }))
}

/// Existence plus the stored record; an unknown proof is a 404
async fn verify_with_details(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<VerifiedResponse>, ProofError> {
    let proof_hash: ProofHash = raw.parse()?;

    if !state.service.verify_proof(proof_hash).await? {
        return Err(ProofError::NotFound(proof_hash.to_hex()));
    }
    let record = state.service.get_proof_details(proof_hash).await?;

    Ok(Json(VerifiedResponse {
        success: true,
        exists: true,
        proof_hash,
        details: record.into(),
    }))
}

/// Existence only; answers 200 either way
async fn verify_exists(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<ExistsResponse>, ProofError> {
    let proof_hash: ProofHash = raw.parse()?;
    let exists = state.service.verify_proof(proof_hash).await?;

    Ok(Json(ExistsResponse {
        success: true,
        proof_hash,
        exists,
    }))
}

async fn proof_details(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<DetailsResponse>, ProofError> {
    let proof_hash: ProofHash = raw.parse()?;
    let record = state.service.get_proof_details(proof_hash).await?;

    Ok(Json(DetailsResponse {
        success: true,
        proof_hash,
        details: record.into(),
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        status: "ok",
        connected: state.service.is_connected(),
    })
}

async fn route_not_found() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            success: false,
            error: "Route not found".to_string(),
            code: "ROUTE_NOT_FOUND",
        }),
    )
}

/// Resolves on Ctrl+C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

/// Serve the API until `shutdown` resolves, then release the chain connection
pub async fn serve<S>(config: &AppConfig, service: ProofService, shutdown: S) -> ProofResult<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let app = router(AppState::new(service.clone()), &config.cors_origin)?;

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!("Proof registry API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    service.disconnect().await;
    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{TxFailure, TxFailureKind};

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ProofError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ProofError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ProofError::Connection("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ProofError::Transaction(TxFailure::new(TxFailureKind::Duplicate, "dup")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_details_render_registration_time() {
        let details = ProofDetails::from(ProofRecord {
            timestamp: 1_700_000_000,
            requested_amount: Amount(1),
            net_worth: Amount(2),
            is_approved: false,
            wallet_address: "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string(),
        });

        assert_eq!(
            details.registered_at.as_deref(),
            Some("2023-11-14T22:13:20+00:00")
        );
    }

    #[test]
    fn test_details_serialize_large_amounts() {
        let details = ProofDetails::from(ProofRecord {
            timestamp: 1,
            requested_amount: Amount(u128::MAX),
            net_worth: Amount(0),
            is_approved: true,
            wallet_address: String::new(),
        });

        let body = serde_json::to_string(&details).unwrap();
        assert!(body.contains(&format!("\"requestedAmount\":{}", u128::MAX)));
        assert!(body.contains("\"netWorth\":0"));
    }

    #[test]
    fn test_cors_layer_rejects_invalid_origin() {
        assert!(cors_layer("http://localhost:3000").is_ok());
        assert!(matches!(
            cors_layer("http://bad\norigin"),
            Err(ProofError::Config(_))
        ));
    }
}
