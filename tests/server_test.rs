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

//! Integration tests for the REST API server with concurrent requests.
//!
//! These tests verify that the server settles each dispatch at most once,
//! maps errors to the right status codes, and keeps driver figures
//! consistent under thousands of concurrent requests.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use driver_settlement_rs::{
    ActorId, CollectionRecord, DateRange, Dispatch, DriverId, DriverStats, ErrorKind,
    SettlementEngine, SettlementError, SubmissionId, SubmissionPayload,
};
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;

// === DTOs (duplicated from the demo server for test isolation) ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub verified_by: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SettlementEngine>,
}

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

async fn register_dispatch(
    State(state): State<AppState>,
    Json(dispatch): Json<Dispatch>,
) -> Result<StatusCode, AppError> {
    state.engine.register_dispatch(dispatch)?;
    Ok(StatusCode::CREATED)
}

async fn submit_collection(
    State(state): State<AppState>,
    Json(payload): Json<SubmissionPayload>,
) -> Result<(StatusCode, Json<CollectionRecord>), AppError> {
    let record = state.engine.submit_payload(payload, Utc::now())?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_collections(State(state): State<AppState>) -> Json<Vec<CollectionRecord>> {
    Json(state.engine.collections())
}

async fn get_collection(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<CollectionRecord>, AppError> {
    Ok(Json(state.engine.collection(SubmissionId(id))?))
}

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

async fn driver_stats(State(state): State<AppState>, Path(id): Path<u32>) -> Json<DriverStats> {
    Json(state.engine.driver_stats(DriverId(id), DateRange::all()))
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/dispatches", post(register_dispatch))
        .route("/collections", get(list_collections).post(submit_collection))
        .route("/collections/{id}", get(get_collection))
        .route("/collections/{id}/verify", post(verify_collection))
        .route("/drivers/{id}/stats", get(driver_stats))
        .with_state(state)
}

/// Test server that binds to an ephemeral port.
struct TestServer {
    base_url: String,
    engine: Arc<SettlementEngine>,
}

impl TestServer {
    async fn new() -> Self {
        let engine = Arc::new(SettlementEngine::new());
        let state = AppState {
            engine: engine.clone(),
        };

        let app = create_router(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to be ready by polling with retries
        let client = Client::new();
        let health_url = format!("{}/collections", base_url);
        for _ in 0..50 {
            match client.get(&health_url).send().await {
                Ok(_) => break,
                Err(_) => tokio::time::sleep(tokio::time::Duration::from_millis(50)).await,
            }
        }

        TestServer { base_url, engine }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Registers dispatches `first..first + count` for `driver`, expecting 1000 each.
    async fn register(&self, client: &Client, driver: u32, first: u32, count: u32) {
        for id in first..first + count {
            let response = client
                .post(self.url("/dispatches"))
                .json(&json!({
                    "id": id,
                    "driver_id": driver,
                    "issued_at": "2025-04-01T06:00:00Z",
                    "expected_value": "1000",
                    "crates_loaded": 10
                }))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }
    }
}

/// Payload settling `dispatch` with `online` received and all crates back.
fn collection_payload(dispatch: u32, driver: u32, day: u32, online: &str) -> serde_json::Value {
    json!({
        "dispatchId": dispatch,
        "driverId": driver,
        "collectionDate": format!("2025-04-{day:02}T18:00:00Z"),
        "totalOnlineReceived": online,
        "returnedEmptyCrates": 10,
        "expectedCash": "1000"
    })
}

// === Tests ===
// These tests are ignored in CI due to connection issues on some platforms.
// Run manually with: cargo test --test server_test -- --ignored

/// Submit, fetch, verify and read statistics over HTTP.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn collection_lifecycle() {
    let server = TestServer::new().await;
    let client = Client::new();
    server.register(&client, 7, 1, 1).await;

    let response = client
        .post(server.url("/collections"))
        .json(&collection_payload(1, 7, 2, "950"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["id"], 1);
    assert_eq!(body["reconciliation"]["rawVariance"], "-50");
    assert_eq!(body["reconciliation"]["varianceStatus"], "WithinTolerance");

    let response = client
        .post(server.url("/collections/1/verify"))
        .json(&json!({ "verifiedBy": "office-1", "notes": "ok" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = client
        .get(server.url("/collections/1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "Verified");
    assert_eq!(body["verifiedBy"], "office-1");

    let stats: serde_json::Value = client
        .get(server.url("/drivers/7/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["totalCollections"], 1);
    assert_eq!(stats["verified"], 1);
    assert_eq!(stats["cumulativeVariance"], "-50");
}

/// Errors map to status codes and name the offending field.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn errors_map_to_status_codes() {
    let server = TestServer::new().await;
    let client = Client::new();
    server.register(&client, 7, 1, 1).await;

    let mut missing_expected = collection_payload(1, 7, 2, "1000");
    missing_expected
        .as_object_mut()
        .unwrap()
        .remove("expectedCash");
    let response = client
        .post(server.url("/collections"))
        .json(&missing_expected)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let error: ErrorResponse = response.json().await.unwrap();
    assert_eq!(error.code, "VALIDATION_FAILED");
    assert_eq!(error.field.as_deref(), Some("expectedCash"));

    let response = client
        .post(server.url("/collections"))
        .json(&collection_payload(42, 7, 2, "1000"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client
        .post(server.url("/collections/1/verify"))
        .json(&json!({ "verifiedBy": "office-1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client
        .post(server.url("/dispatches"))
        .json(&json!({
            "id": 1,
            "driver_id": 7,
            "issued_at": "2025-04-01T06:00:00Z",
            "expected_value": "1000",
            "crates_loaded": 10
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

/// Concurrent submissions for the same dispatch: exactly one is accepted.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn concurrent_duplicate_submissions_rejected() {
    let server = TestServer::new().await;
    let client = Client::new();
    server.register(&client, 7, 1, 1).await;

    const NUM_DUPLICATES: usize = 100;

    let mut handles = Vec::with_capacity(NUM_DUPLICATES);

    for i in 0..NUM_DUPLICATES {
        let client = client.clone();
        let url = server.url("/collections");

        let handle = tokio::spawn(async move {
            let online = (900 + i).to_string();
            let response = client
                .post(&url)
                .json(&collection_payload(1, 7, 2, &online))
                .send()
                .await
                .unwrap();
            response.status()
        });

        handles.push(handle);
    }

    let results: Vec<_> = futures::future::join_all(handles).await;

    let successful = results
        .iter()
        .filter(|r| *r.as_ref().unwrap() == StatusCode::CREATED)
        .count();
    let conflicts = results
        .iter()
        .filter(|r| *r.as_ref().unwrap() == StatusCode::CONFLICT)
        .count();

    // Exactly one should succeed, the rest should be conflicts
    assert_eq!(successful, 1, "Exactly one submission should succeed");
    assert_eq!(conflicts, NUM_DUPLICATES - 1, "Others should be conflicts");

    assert_eq!(server.engine.collections().len(), 1);
    assert_eq!(server.engine.variance_chain(DriverId(7)).len(), 1);
}

/// Concurrent submissions across many drivers.
/// Each driver's cumulative variance is exactly the sum of their variances.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn concurrent_submissions_many_drivers() {
    let server = TestServer::new().await;
    let client = Client::new();

    const NUM_DRIVERS: u32 = 20;
    const PER_DRIVER: u32 = 25;
    const BATCH_SIZE: usize = 100; // Limit concurrent connections

    let mut all_requests: Vec<(u32, u32, u32)> = Vec::new();
    for driver in 1..=NUM_DRIVERS {
        let first = driver * 1000;
        server.register(&client, driver, first, PER_DRIVER).await;
        for n in 0..PER_DRIVER {
            // days run backwards so most inserts are backdated
            all_requests.push((driver, first + n, PER_DRIVER - n));
        }
    }

    let start = Instant::now();
    let total_requests = all_requests.len();
    let mut successful = 0usize;

    for batch in all_requests.chunks(BATCH_SIZE) {
        let mut handles = Vec::with_capacity(batch.len());

        for &(driver, dispatch, day) in batch {
            let client = client.clone();
            let url = server.url("/collections");

            handles.push(tokio::spawn(async move {
                // every collection is 2.50 short
                let response = client
                    .post(&url)
                    .json(&collection_payload(dispatch, driver, day, "997.50"))
                    .send()
                    .await
                    .unwrap();
                response.status()
            }));
        }

        let results: Vec<_> = futures::future::join_all(handles).await;
        successful += results
            .iter()
            .filter(|r| r.as_ref().unwrap().is_success())
            .count();
    }

    let elapsed = start.elapsed();
    println!(
        "Processed {} submissions in {:?} ({:.0} req/s)",
        total_requests,
        elapsed,
        total_requests as f64 / elapsed.as_secs_f64()
    );

    assert_eq!(successful, total_requests, "All submissions should succeed");

    let expected: Decimal = dec!(-2.50) * Decimal::from(PER_DRIVER);
    for driver in 1..=NUM_DRIVERS {
        let stats = server
            .engine
            .driver_stats(DriverId(driver), DateRange::all());
        assert_eq!(stats.total_collections, PER_DRIVER as usize);
        assert_eq!(stats.cumulative_variance, expected);
        assert_eq!(stats.total_variance, expected);
    }
}

/// Concurrent reads while submissions are in flight.
#[tokio::test]
#[ignore = "requires running server, may fail in CI"]
async fn concurrent_reads_and_writes() {
    let server = TestServer::new().await;
    let client = Client::new();

    const NUM_WRITES: u32 = 200;
    server.register(&client, 5, 1, NUM_WRITES).await;

    let mut handles = Vec::new();
    for dispatch in 1..=NUM_WRITES {
        let write_client = client.clone();
        let url = server.url("/collections");
        handles.push(tokio::spawn(async move {
            let day = dispatch % 28 + 1;
            write_client
                .post(&url)
                .json(&collection_payload(dispatch, 5, day, "1001"))
                .send()
                .await
                .unwrap()
                .status()
        }));

        let read_client = client.clone();
        let url = server.url("/drivers/5/stats");
        handles.push(tokio::spawn(async move {
            read_client.get(&url).send().await.unwrap().status()
        }));
    }

    let results: Vec<_> = futures::future::join_all(handles).await;
    assert!(results.iter().all(|r| r.as_ref().unwrap().is_success()));

    let stats = server.engine.driver_stats(DriverId(5), DateRange::all());
    assert_eq!(stats.total_collections, NUM_WRITES as usize);
    assert_eq!(stats.cumulative_variance, Decimal::from(NUM_WRITES));
}
