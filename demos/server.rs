// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! REST API server for the settlement engine.
//!
//! Run with: `cargo run --example server`
//!
//! # Example requests
//!
//! ```bash
//! # Register a dispatch
//! curl -X POST http://localhost:3000/dispatches \
//!   -H "Content-Type: application/json" \
//!   -d '{"id": 1, "driver_id": 7, "issued_at": "2025-03-01T06:00:00Z", "expected_value": "5000", "crates_loaded": 50}'
//!
//! # Submit the day's collection
//! curl -X POST http://localhost:3000/collections \
//!   -H "Content-Type: application/json" \
//!   -d '{"dispatchId": 1, "driverId": 7, "collectionDate": "2025-03-01T18:00:00Z",
//!        "denominations": [{"noteValue": "500", "noteCount": 8}], "totalOnlineReceived": "950",
//!        "returnedFullCrates": 2, "returnedEmptyCrates": 45, "expectedCash": "5000"}'
//!
//! # Verify it
//! curl -X POST http://localhost:3000/collections/1/verify \
//!   -H "Content-Type: application/json" -d '{"verifiedBy": "office-1", "notes": "counted"}'
//!
//! # Driver statistics for March
//! curl 'http://localhost:3000/drivers/7/stats?from=2025-03-01T00:00:00Z&to=2025-03-31T23:59:59Z'
//! ```

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use driver_settlement_rs::{
    ActorId, CollectionRecord, CollectionStatus, DateRange, Dispatch, DriverId, DriverStats, ErrorKind,
    PenaltyNotice, SettlementEngine, SettlementError, SubmissionId, SubmissionPayload,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// === Request/Response DTOs ===

/// Request body for verification.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub verified_by: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Request body for marking a collection reconciled.
#[derive(Debug, Default, Deserialize)]
pub struct ReconcileRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

/// Optional date bounds, inclusive.
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl From<RangeQuery> for DateRange {
    fn from(query: RangeQuery) -> Self {
        DateRange {
            from: query.from,
            to: query.to,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<CollectionStatus>,
}

/// Response body for a driver's ledger.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverResponse {
    pub driver: DriverId,
    pub collections: usize,
    pub cumulative_variance: Decimal,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

// === Application State ===

/// Shared application state containing the settlement engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SettlementEngine>,
}

// === Error Handling ===

/// Wrapper for converting `SettlementError` into HTTP responses.
pub struct AppError(SettlementError);

impl From<SettlementError> for AppError {
    fn from(err: SettlementError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match self.0.kind() {
            ErrorKind::Validation => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_FAILED"),
            ErrorKind::Conflict => (StatusCode::CONFLICT, "CONFLICT"),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ErrorKind::InvalidState => (StatusCode::CONFLICT, "INVALID_STATE"),
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
                field: self.0.field().map(|field| field.to_string()),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

/// POST /dispatches - Register a dispatch snapshot.
async fn register_dispatch(
    State(state): State<AppState>,
    Json(dispatch): Json<Dispatch>,
) -> Result<StatusCode, AppError> {
    state.engine.register_dispatch(dispatch)?;
    Ok(StatusCode::CREATED)
}

/// POST /collections - Submit a collection.
async fn submit_collection(
    State(state): State<AppState>,
    Json(payload): Json<SubmissionPayload>,
) -> Result<(StatusCode, Json<CollectionRecord>), AppError> {
    let record = state.engine.submit_payload(payload, Utc::now())?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /collections?status=Verified - List collections in submission order.
async fn list_collections(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Json<Vec<CollectionRecord>> {
    let records = match query.status {
        Some(status) => state.engine.collections_with_status(status),
        None => state.engine.collections(),
    };
    Json(records)
}

/// GET /collections/:id - Get a collection.
async fn get_collection(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<CollectionRecord>, AppError> {
    Ok(Json(state.engine.collection(SubmissionId(id))?))
}

/// PUT /collections/:id - Amend a collection before verification.
async fn amend_collection(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(payload): Json<SubmissionPayload>,
) -> Result<Json<CollectionRecord>, AppError> {
    let record = state
        .engine
        .amend_payload(SubmissionId(id), payload)?;
    Ok(Json(record))
}

/// POST /collections/:id/verify - Verify a submitted collection.
async fn verify_collection(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<CollectionRecord>, AppError> {
    let record = state.engine.verify(
        SubmissionId(id),
        ActorId(request.verified_by),
        request.notes.as_deref(),
    )?;
    Ok(Json(record))
}

/// POST /collections/:id/reconcile - Mark a verified collection reconciled.
async fn reconcile_collection(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(request): Json<ReconcileRequest>,
) -> Result<Json<CollectionRecord>, AppError> {
    let record = state
        .engine
        .mark_reconciled(SubmissionId(id), request.notes.as_deref())?;
    Ok(Json(record))
}

/// GET /drivers - List driver ledgers.
async fn list_drivers(State(state): State<AppState>) -> Json<Vec<DriverResponse>> {
    let drivers = state
        .engine
        .drivers()
        .iter()
        .map(|ledger| DriverResponse {
            driver: ledger.driver_id(),
            collections: ledger.collections(),
            cumulative_variance: ledger.cumulative_variance(),
        })
        .collect();
    Json(drivers)
}

/// GET /drivers/:id/collections - A driver's collections, newest first.
async fn driver_collections(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Query(range): Query<RangeQuery>,
) -> Json<Vec<CollectionRecord>> {
    Json(state.engine.collections_by_driver(DriverId(id), range.into()))
}

/// GET /drivers/:id/stats - A driver's aggregate statistics.
async fn driver_stats(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Query(range): Query<RangeQuery>,
) -> Json<DriverStats> {
    Json(state.engine.driver_stats(DriverId(id), range.into()))
}

/// POST /penalties/drain - Hand queued penalty notices to the caller.
async fn drain_penalties(State(state): State<AppState>) -> Json<Vec<PenaltyNotice>> {
    Json(state.engine.drain_penalties())
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/dispatches", post(register_dispatch))
        .route("/collections", get(list_collections).post(submit_collection))
        .route("/collections/{id}", get(get_collection).put(amend_collection))
        .route("/collections/{id}/verify", post(verify_collection))
        .route("/collections/{id}/reconcile", post(reconcile_collection))
        .route("/drivers", get(list_drivers))
        .route("/drivers/{id}/collections", get(driver_collections))
        .route("/drivers/{id}/stats", get(driver_stats))
        .route("/penalties/drain", post(drain_penalties))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(fmt::layer())
        .init();

    let state = AppState {
        engine: Arc::new(SettlementEngine::new()),
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    info!("settlement API server running on http://127.0.0.1:3000");
    info!("  POST /dispatches                 - Register a dispatch");
    info!("  POST /collections                - Submit a collection");
    info!("  GET  /collections[/:id]          - List or get collections");
    info!("  PUT  /collections/:id            - Amend before verification");
    info!("  POST /collections/:id/verify     - Verify");
    info!("  POST /collections/:id/reconcile  - Mark reconciled");
    info!("  GET  /drivers[/:id/collections|/:id/stats]");
    info!("  POST /penalties/drain            - Take queued penalty notices");

    axum::serve(listener, app).await.unwrap();
}
