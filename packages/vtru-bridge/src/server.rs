//! HTTP API
//!
//! Presentation-layer adapter over the synchronizer and orchestrator: health
//! and metrics endpoints, the latest balance snapshot, wrap limits, and
//! amount validation/submission.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use alloy::primitives::Address;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use eyre::eyre;
use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clients::{ContractReader, ContractWriter, Wallet};
use crate::orchestrator::{
    parse_amount, Notification, OperationError, OperationReceipt, OperationResult,
    SwapOrchestrator,
};
use crate::synchronizer::BalanceSynchronizer;
use crate::types::{BalanceSnapshot, Direction, Flow, WrapLimits};

/// Prometheus metrics
pub struct Metrics {
    pub polls_total: IntCounter,
    pub poll_failures_total: IntCounter,
    pub operations_succeeded_total: IntCounter,
    pub operations_failed_total: IntCounter,
    pub operations_rejected_total: IntCounter,
    pub last_snapshot_unix: IntGauge,
    pub in_flight: IntGauge,
    pub registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let polls_total = IntCounter::new(
            "vtru_bridge_balance_polls_total",
            "Total number of balance refreshes attempted",
        )
        .expect("constant metric name is valid");

        let poll_failures_total = IntCounter::new(
            "vtru_bridge_balance_poll_failures_total",
            "Total number of balance refreshes that failed",
        )
        .expect("constant metric name is valid");

        let operations_succeeded_total = IntCounter::new(
            "vtru_bridge_operations_succeeded_total",
            "Total number of confirmed wrap, unwrap and bridge operations",
        )
        .expect("constant metric name is valid");

        let operations_failed_total = IntCounter::new(
            "vtru_bridge_operations_failed_total",
            "Total number of operations that failed after submission began",
        )
        .expect("constant metric name is valid");

        let operations_rejected_total = IntCounter::new(
            "vtru_bridge_operations_rejected_total",
            "Total number of operations rejected before anything was submitted",
        )
        .expect("constant metric name is valid");

        let last_snapshot_unix = IntGauge::new(
            "vtru_bridge_last_snapshot_unix",
            "Unix time of the last successful balance refresh",
        )
        .expect("constant metric name is valid");

        let in_flight = IntGauge::new(
            "vtru_bridge_operation_in_flight",
            "1 while an operation is in flight",
        )
        .expect("constant metric name is valid");

        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(polls_total.clone()),
            Box::new(poll_failures_total.clone()),
            Box::new(operations_succeeded_total.clone()),
            Box::new(operations_failed_total.clone()),
            Box::new(operations_rejected_total.clone()),
            Box::new(last_snapshot_unix.clone()),
            Box::new(in_flight.clone()),
        ];
        for metric in collectors {
            registry
                .register(metric)
                .expect("metric registration must not be called twice");
        }

        Self {
            polls_total,
            poll_failures_total,
            operations_succeeded_total,
            operations_failed_total,
            operations_rejected_total,
            last_snapshot_unix,
            in_flight,
            registry,
        }
    }

    /// Count an operation outcome
    pub fn record(&self, result: &OperationResult) {
        match result {
            OperationResult::Success(_) => self.operations_succeeded_total.inc(),
            OperationResult::Failure(_) => self.operations_failed_total.inc(),
            OperationResult::Rejected(_) => self.operations_rejected_total.inc(),
        }
    }
}

/// Combined app state
pub struct AppState<R, W, X> {
    pub synchronizer: Arc<BalanceSynchronizer<R, W>>,
    pub orchestrator: Arc<SwapOrchestrator<R, W, X>>,
    pub metrics: Arc<Metrics>,
}

// Manual impl: derive would require R, W, X: Clone
impl<R, W, X> Clone for AppState<R, W, X> {
    fn clone(&self) -> Self {
        Self {
            synchronizer: Arc::clone(&self.synchronizer),
            orchestrator: Arc::clone(&self.orchestrator),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub flow: Flow,
    pub account: Option<Address>,
    pub in_flight: bool,
    pub polls: u64,
    pub poll_failures: u64,
    pub last_snapshot_unix: i64,
}

/// Amount + direction submitted by the presentation layer
#[derive(Debug, Clone, Deserialize)]
pub struct OperationRequest {
    pub amount: String,
    pub direction: Direction,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    /// Base units of the source asset, when the amount parsed
    pub amount_raw: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub notification: Notification,
    pub receipt: Option<OperationReceipt>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Health check endpoint handler
pub async fn health_check<R, W, X>(State(state): State<AppState<R, W, X>>) -> Json<HealthResponse>
where
    R: ContractReader + 'static,
    W: Wallet + 'static,
    X: ContractWriter + 'static,
{
    let stats = state.synchronizer.stats();
    Json(HealthResponse {
        status: "healthy".to_string(),
        flow: state.synchronizer.flow(),
        account: state.synchronizer.latest().account,
        in_flight: state.orchestrator.is_in_flight(),
        polls: stats.polls.load(Ordering::Relaxed),
        poll_failures: stats.poll_failures.load(Ordering::Relaxed),
        last_snapshot_unix: stats.last_success_unix.load(Ordering::Relaxed),
    })
}

/// Liveness probe (always returns OK if server is running)
pub async fn liveness() -> &'static str {
    "OK"
}

/// Readiness probe (ready after the first successful balance refresh)
pub async fn readiness<R, W, X>(State(state): State<AppState<R, W, X>>) -> (StatusCode, &'static str)
where
    R: ContractReader + 'static,
    W: Wallet + 'static,
    X: ContractWriter + 'static,
{
    if state.synchronizer.stats().last_success_unix.load(Ordering::Relaxed) > 0 {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY")
    }
}

/// Prometheus metrics endpoint
pub async fn prometheus_metrics<R, W, X>(State(state): State<AppState<R, W, X>>) -> Response
where
    R: ContractReader + 'static,
    W: Wallet + 'static,
    X: ContractWriter + 'static,
{
    // Bring counters up to date with the synchronizer's atomics
    let stats = state.synchronizer.stats();
    let metrics = &state.metrics;
    let polls = stats.polls.load(Ordering::Relaxed);
    metrics
        .polls_total
        .inc_by(polls.saturating_sub(metrics.polls_total.get()));
    let failures = stats.poll_failures.load(Ordering::Relaxed);
    metrics
        .poll_failures_total
        .inc_by(failures.saturating_sub(metrics.poll_failures_total.get()));
    metrics
        .last_snapshot_unix
        .set(stats.last_success_unix.load(Ordering::Relaxed));
    metrics
        .in_flight
        .set(state.orchestrator.is_in_flight() as i64);

    let encoder = TextEncoder::new();
    let metric_families = metrics.registry.gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response();
    }

    match Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

/// Latest published balance snapshot
pub async fn snapshot<R, W, X>(State(state): State<AppState<R, W, X>>) -> Json<BalanceSnapshot>
where
    R: ContractReader + 'static,
    W: Wallet + 'static,
    X: ContractWriter + 'static,
{
    Json(state.synchronizer.latest())
}

/// Circuit breaker limits for the snapshot's account
pub async fn limits<R, W, X>(
    State(state): State<AppState<R, W, X>>,
) -> Result<Json<WrapLimits>, (StatusCode, Json<ErrorResponse>)>
where
    R: ContractReader + 'static,
    W: Wallet + 'static,
    X: ContractWriter + 'static,
{
    let account = state.synchronizer.latest().account;
    state
        .synchronizer
        .fetch_limits(account)
        .await
        .map(Json)
        .map_err(|e| {
            warn!(error = %e, "Failed to fetch wrap limits");
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: "Wrap limits are currently unavailable".to_string(),
                }),
            )
        })
}

/// Validate an amount against the latest snapshot without submitting
pub async fn validate_amount<R, W, X>(
    State(state): State<AppState<R, W, X>>,
    Json(request): Json<OperationRequest>,
) -> Json<ValidateResponse>
where
    R: ContractReader + 'static,
    W: Wallet + 'static,
    X: ContractWriter + 'static,
{
    let snapshot = state.synchronizer.latest();
    let parsed = parse_amount(&request.amount, request.direction);
    let amount_raw = parsed.as_ref().ok().map(|a| a.to_string());
    let result = parsed.and_then(|amount| {
        state
            .orchestrator
            .check(amount, request.direction, &snapshot)
    });

    Json(ValidateResponse {
        valid: result.is_ok(),
        amount_raw,
        reason: result.err().map(|e| e.to_string()),
    })
}

/// Validate and run an operation
pub async fn execute<R, W, X>(
    State(state): State<AppState<R, W, X>>,
    Json(request): Json<OperationRequest>,
) -> (StatusCode, Json<ExecuteResponse>)
where
    R: ContractReader + 'static,
    W: Wallet + 'static,
    X: ContractWriter + 'static,
{
    let snapshot = state.synchronizer.latest();
    let direction = request.direction;

    // Detached so a dropped connection cannot cut the write sequence short
    let orchestrator = Arc::clone(&state.orchestrator);
    let metrics = Arc::clone(&state.metrics);
    let task = tokio::spawn(async move {
        let result = orchestrator
            .submit(&request.amount, direction, &snapshot)
            .await;
        metrics.record(&result);
        if let Some(e) = result.error() {
            warn!(direction = %direction, error = %e, "Operation did not complete");
        }
        result
    });

    let result = match task.await {
        Ok(result) => result,
        Err(e) => {
            let result = OperationResult::Failure(OperationError::Submit {
                operation: direction.operation_name(),
                cause: eyre!("operation task ended unexpectedly: {}", e),
            });
            state.metrics.record(&result);
            result
        }
    };

    let status = status_for(&result);
    let notification = result.notification(direction);
    let receipt = match result {
        OperationResult::Success(receipt) => Some(receipt),
        _ => None,
    };

    (
        status,
        Json(ExecuteResponse {
            notification,
            receipt,
        }),
    )
}

/// HTTP status for an operation outcome
pub fn status_for(result: &OperationResult) -> StatusCode {
    match result {
        OperationResult::Success(_) => StatusCode::OK,
        OperationResult::Failure(_) => StatusCode::BAD_GATEWAY,
        OperationResult::Rejected(OperationError::Busy) => StatusCode::CONFLICT,
        OperationResult::Rejected(OperationError::NotConnected) => StatusCode::PRECONDITION_FAILED,
        OperationResult::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

pub fn router<R, W, X>(state: AppState<R, W, X>) -> Router
where
    R: ContractReader + 'static,
    W: Wallet + 'static,
    X: ContractWriter + 'static,
{
    Router::new()
        .route("/health", get(health_check::<R, W, X>))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness::<R, W, X>))
        .route("/metrics", get(prometheus_metrics::<R, W, X>))
        .route("/snapshot", get(snapshot::<R, W, X>))
        .route("/limits", get(limits::<R, W, X>))
        .route("/validate", post(validate_amount::<R, W, X>))
        .route("/execute", post(execute::<R, W, X>))
        .with_state(state)
}

/// Start the HTTP API
pub async fn start_server<R, W, X>(
    bind_address: &str,
    port: u16,
    state: AppState<R, W, X>,
) -> eyre::Result<()>
where
    R: ContractReader + 'static,
    W: Wallet + 'static,
    X: ContractWriter + 'static,
{
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}:{}: {}", bind_address, port, e))?;
    info!("API server listening on {}", addr);
    info!("  /health   - Full health status (JSON)");
    info!("  /snapshot - Latest balance snapshot");
    info!("  /execute  - Submit wrap, unwrap or bridge");
    info!("  /metrics  - Prometheus metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
