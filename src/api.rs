//! REST API for the Wagering Engine
//!
//! Thin structured-result surface over the engine facade:
//! - POST /api/races                   - Create a race (admin)
//! - POST /api/races/:id/open          - Open wagering (admin)
//! - POST /api/races/:id/close         - Close wagering (admin)
//! - POST /api/races/:id/settle        - Declare the winner and settle (admin)
//! - GET  /api/races/:id               - Race status with pools
//! - POST /api/wagers                  - Allocate a deposit address
//! - GET  /api/wagers/:id              - Deposit status
//! - POST /api/payouts/process         - Send pending payouts (admin)
//! - POST /api/refunds/process         - Send pending refunds (admin)
//! - POST /api/deposits/collect        - Sweep confirmed deposits (admin)
//!
//! Errors never cross this boundary as panics; every handler returns a
//! structured success or error body.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::common::error::EngineError;
use crate::payout::DispatchReport;
use crate::service::WagerEngine;
use crate::settlement::SettlementError;
use crate::types::{Bet, DepositAddress, Race};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateRaceRequest {
    pub title: String,
    pub runners: Vec<String>,
    pub scheduled_start: i64,
}

#[derive(Debug, Serialize)]
pub struct RunnerInfo {
    pub number: u8,
    pub name: String,
    pub pool_lamports: u64,
}

#[derive(Debug, Serialize)]
pub struct RaceResponse {
    pub id: String,
    pub title: String,
    pub status: String,
    pub winner: Option<u8>,
    pub scheduled_start: i64,
    pub total_pool_lamports: u64,
    pub runners: Vec<RunnerInfo>,
}

impl From<&Race> for RaceResponse {
    fn from(race: &Race) -> Self {
        Self {
            id: race.id.clone(),
            title: race.title.clone(),
            status: race.status.to_string(),
            winner: race.winner,
            scheduled_start: race.scheduled_start,
            total_pool_lamports: race.total_pool(),
            runners: race
                .runners
                .iter()
                .map(|r| RunnerInfo {
                    number: r.number,
                    name: r.name.clone(),
                    pool_lamports: r.pool_lamports,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AllocateRequest {
    pub race_id: String,
    pub runner_number: u8,
    pub claimed_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AllocateResponse {
    pub success: bool,
    pub deposit_id: Option<String>,
    pub address: Option<String>,
    pub expires_at: Option<i64>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BetInfo {
    pub id: String,
    pub amount_lamports: u64,
    pub odds_at_placement: f64,
    pub winnings_lamports: Option<u64>,
    pub payout_status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DepositStatusResponse {
    pub id: String,
    pub status: String,
    pub race_id: String,
    pub runner_number: u8,
    pub address: String,
    pub observed_lamports: Option<u64>,
    pub observed_signature: Option<String>,
    pub expires_at: i64,
    pub bet: Option<BetInfo>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl DepositStatusResponse {
    fn from_parts(deposit: &DepositAddress, bet: Option<&Bet>) -> Self {
        Self {
            id: deposit.id.clone(),
            status: deposit.status.to_string(),
            race_id: deposit.race_id.clone(),
            runner_number: deposit.runner_number,
            address: deposit.address.clone(),
            observed_lamports: deposit.observed_lamports,
            observed_signature: deposit.observed_signature.clone(),
            expires_at: deposit.expires_at,
            bet: bet.map(|b| BetInfo {
                id: b.id.clone(),
                amount_lamports: b.amount_lamports,
                odds_at_placement: b.odds_at_placement,
                winnings_lamports: b.winnings_lamports,
                payout_status: b.payout_status.map(|s| s.to_string()),
            }),
            created_at: deposit.created_at,
            updated_at: deposit.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SettleRequest {
    pub winner: u8,
}

#[derive(Debug, Serialize)]
pub struct SettleResponse {
    pub success: bool,
    pub winner: Option<u8>,
    pub total_pool_lamports: Option<u64>,
    pub distributable_lamports: Option<u64>,
    pub payouts: Option<usize>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub success: bool,
    pub processed: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub message: Option<String>,
}

impl DispatchResponse {
    fn from_report(report: &DispatchReport) -> Self {
        Self {
            success: true,
            processed: report.processed,
            completed: report.completed,
            failed: report.failed,
            skipped: report.skipped,
            message: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    pub details: Option<String>,
}

// =============================================================================
// Application State
// =============================================================================

pub type AppState = Arc<WagerEngine>;

fn error_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Validation(_) | EngineError::Allocation(_) => StatusCode::BAD_REQUEST,
        EngineError::Settlement(SettlementError::RaceNotFound(_)) => StatusCode::NOT_FOUND,
        EngineError::Settlement(_) => StatusCode::CONFLICT,
        EngineError::Dispatch(crate::payout::DispatchError::AlreadyRunning(_)) => {
            StatusCode::CONFLICT
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: EngineError) -> (StatusCode, Json<ErrorResponse>) {
    let status = error_status(&err);
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.error_code(),
            details: None,
        }),
    )
}

// =============================================================================
// API Handlers
// =============================================================================

/// POST /api/races
async fn handle_create_race(
    State(engine): State<AppState>,
    Json(req): Json<CreateRaceRequest>,
) -> impl IntoResponse {
    match engine
        .create_race(req.title, req.runners, req.scheduled_start)
        .await
    {
        Ok(race) => (StatusCode::OK, Json(RaceResponse::from(&race))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// POST /api/races/:id/open
async fn handle_open_race(
    State(engine): State<AppState>,
    Path(race_id): Path<String>,
) -> impl IntoResponse {
    match engine.open_race(&race_id).await {
        Ok(race) => (StatusCode::OK, Json(RaceResponse::from(&race))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// POST /api/races/:id/close
async fn handle_close_race(
    State(engine): State<AppState>,
    Path(race_id): Path<String>,
) -> impl IntoResponse {
    match engine.close_race(&race_id).await {
        Ok(race) => (StatusCode::OK, Json(RaceResponse::from(&race))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// GET /api/races/:id
async fn handle_get_race(
    State(engine): State<AppState>,
    Path(race_id): Path<String>,
) -> impl IntoResponse {
    match engine.get_race(&race_id).await {
        Ok(Some(race)) => (StatusCode::OK, Json(RaceResponse::from(&race))).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("race {} not found", race_id),
                code: "NOT_FOUND",
                details: None,
            }),
        )
            .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// POST /api/races/:id/settle
///
/// Declare the winner and settle the race. One-time and irreversible.
async fn handle_settle(
    State(engine): State<AppState>,
    Path(race_id): Path<String>,
    Json(req): Json<SettleRequest>,
) -> impl IntoResponse {
    match engine.settle(&race_id, req.winner).await {
        Ok(sheet) => {
            let response = SettleResponse {
                success: true,
                winner: Some(sheet.winner),
                total_pool_lamports: Some(sheet.total_pool_lamports),
                distributable_lamports: Some(sheet.distributable_lamports),
                payouts: Some(sheet.entries.len()),
                message: None,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => error_response(e).into_response(),
    }
}

/// POST /api/wagers
///
/// Allocate a fresh single-use deposit address for a wager. The wager is
/// live once a transfer arrives at the address before it expires.
async fn handle_allocate(
    State(engine): State<AppState>,
    Json(req): Json<AllocateRequest>,
) -> impl IntoResponse {
    match engine
        .allocate(&req.race_id, req.runner_number, req.claimed_by)
        .await
    {
        Ok(deposit) => {
            let response = AllocateResponse {
                success: true,
                deposit_id: Some(deposit.id),
                address: Some(deposit.address),
                expires_at: Some(deposit.expires_at),
                message: None,
            };
            (StatusCode::OK, Json(response))
        }
        Err(e) => {
            let response = AllocateResponse {
                success: false,
                deposit_id: None,
                address: None,
                expires_at: None,
                message: Some(e.to_string()),
            };
            (StatusCode::BAD_REQUEST, Json(response))
        }
    }
}

/// GET /api/wagers/:id
async fn handle_deposit_status(
    State(engine): State<AppState>,
    Path(deposit_id): Path<String>,
) -> impl IntoResponse {
    match engine.deposit_status(&deposit_id).await {
        Ok(Some((deposit, bet))) => (
            StatusCode::OK,
            Json(DepositStatusResponse::from_parts(&deposit, bet.as_ref())),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("deposit {} not found", deposit_id),
                code: "NOT_FOUND",
                details: None,
            }),
        )
            .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// POST /api/payouts/process
async fn handle_process_payouts(State(engine): State<AppState>) -> impl IntoResponse {
    match engine.process_payouts().await {
        Ok(report) => (StatusCode::OK, Json(DispatchResponse::from_report(&report))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// POST /api/refunds/process
async fn handle_process_refunds(State(engine): State<AppState>) -> impl IntoResponse {
    match engine.process_refunds().await {
        Ok(report) => (StatusCode::OK, Json(DispatchResponse::from_report(&report))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// POST /api/deposits/collect
async fn handle_collect_deposits(State(engine): State<AppState>) -> impl IntoResponse {
    match engine.collect_deposits().await {
        Ok(report) => (StatusCode::OK, Json(DispatchResponse::from_report(&report))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// GET /api/health
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "trackside",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// =============================================================================
// Router Setup
// =============================================================================

/// Create the API router with all endpoints
pub fn create_router(engine: Arc<WagerEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/races", post(handle_create_race))
        .route("/api/races/:id", get(handle_get_race))
        .route("/api/races/:id/open", post(handle_open_race))
        .route("/api/races/:id/close", post(handle_close_race))
        .route("/api/races/:id/settle", post(handle_settle))
        .route("/api/wagers", post(handle_allocate))
        .route("/api/wagers/:id", get(handle_deposit_status))
        .route("/api/payouts/process", post(handle_process_payouts))
        .route("/api/refunds/process", post(handle_process_refunds))
        .route("/api/deposits/collect", post(handle_collect_deposits))
        .layer(cors)
        .with_state(engine)
}

/// Start the API server
pub async fn start_server(engine: Arc<WagerEngine>, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(engine);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "API server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, Network};
    use crate::events::engine_event_channel;
    use crate::keystore::KeyStore;
    use crate::ledger::MockLedgerGateway;
    use crate::storage::MemoryStore;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    fn test_engine() -> Arc<WagerEngine> {
        let config = EngineConfig {
            network: Network::Devnet,
            rpc_url: "http://localhost:8899".to_string(),
            min_bet_lamports: 10_000_000,
            max_bet_lamports: 20_000_000_000,
            house_edge: 0.05,
            deposit_expiry_mins: 30,
            poll_interval_secs: 5,
            keystore_passphrase: None,
            treasury_key_hex: hex::encode(solana_sdk::signature::Keypair::new().to_bytes()),
            fee_reserve_lamports: 5_000,
            collect_split: None,
            db_path: ":memory:".to_string(),
            api_port: 0,
            log_level: "info".to_string(),
            log_json: false,
        };
        let (events, _rx) = engine_event_channel();
        Arc::new(
            WagerEngine::new(
                config,
                Arc::new(MemoryStore::new()),
                Arc::new(MockLedgerGateway::new()),
                Arc::new(KeyStore::new(None)),
                events,
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router(test_engine());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_race_returns_not_found() {
        let app = create_router(test_engine());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/races/race_missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_allocate_against_missing_race_is_structured_error() {
        let app = create_router(test_engine());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/wagers")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"race_id":"race_missing","runner_number":1}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
