//! HTTP handlers over mock collaborators

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};

use common::{units, Harness, MockReader, MockWallet, MockWriter, ALICE};
use vtru_bridge::orchestrator::OrchestratorConfig;
use vtru_bridge::registry::{ChainKey, ContractKey, POLYGON_CHAIN_ID, VITRUVEO_CHAIN_ID};
use vtru_bridge::server::{self, AppState, Metrics, OperationRequest};
use vtru_bridge::synchronizer::PollTiming;
use vtru_bridge::types::{Direction, Flow};

fn state(h: &Harness, flow: Flow) -> AppState<MockReader, MockWallet, MockWriter> {
    AppState {
        synchronizer: h.synchronizer(flow, PollTiming::default()),
        orchestrator: h.orchestrator(OrchestratorConfig::default()),
        metrics: Arc::new(Metrics::new()),
    }
}

fn request(amount: &str, direction: Direction) -> Json<OperationRequest> {
    Json(OperationRequest {
        amount: amount.to_string(),
        direction,
    })
}

#[tokio::test]
async fn test_readiness_after_first_successful_poll() {
    let h = Harness::new(MockWallet::connected(ALICE, VITRUVEO_CHAIN_ID));
    let state = state(&h, Flow::Wrap);

    let (status, _) = server::readiness(State(state.clone())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    state.synchronizer.tick().await;
    let (status, body) = server::readiness(State(state.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
    assert_eq!(server::liveness().await, "OK");
}

#[tokio::test]
async fn test_health_and_snapshot_reflect_latest_poll() {
    let h = Harness::new(MockWallet::connected(ALICE, VITRUVEO_CHAIN_ID));
    h.reader
        .set_token(ContractKey::WrappedVtru, ALICE, units(25, 18));
    let state = state(&h, Flow::Wrap);
    state.synchronizer.tick().await;

    let Json(health) = server::health_check(State(state.clone())).await;
    assert_eq!(health.status, "healthy");
    assert_eq!(health.account, Some(ALICE));
    assert_eq!(health.polls, 1);
    assert!(!health.in_flight);

    let Json(snapshot) = server::snapshot(State(state.clone())).await;
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["flow"], "wrap");
    assert_eq!(json["balances"][0]["holding"], "wrapped_vtru");
    assert_eq!(json["balances"][0]["amount"]["display"], "25");
    assert_eq!(json["balances"][0]["amount"]["raw"], "25000000000000000000");
}

#[tokio::test]
async fn test_validate_endpoint() {
    let h = Harness::new(MockWallet::connected(ALICE, VITRUVEO_CHAIN_ID));
    h.reader
        .set_native(ChainKey::Vitruveo, ALICE, units(2, 18));
    let state = state(&h, Flow::Wrap);
    state.synchronizer.tick().await;

    let Json(ok) =
        server::validate_amount(State(state.clone()), request("1.5", Direction::UnwrappedToWrapped))
            .await;
    assert!(ok.valid);
    assert_eq!(ok.amount_raw.as_deref(), Some("1500000000000000000"));

    let Json(too_much) =
        server::validate_amount(State(state.clone()), request("3", Direction::UnwrappedToWrapped))
            .await;
    assert!(!too_much.valid);
    assert_eq!(too_much.amount_raw.as_deref(), Some("3000000000000000000"));
    assert!(too_much.reason.unwrap().contains("exceeds"));

    let Json(malformed) =
        server::validate_amount(State(state.clone()), request("1.2.3", Direction::UnwrappedToWrapped))
            .await;
    assert!(!malformed.valid);
    assert!(malformed.amount_raw.is_none());
    assert!(malformed.reason.is_some());
}

#[tokio::test]
async fn test_execute_status_codes() {
    let h = Harness::new(MockWallet::connected(ALICE, VITRUVEO_CHAIN_ID));
    h.reader
        .set_token(ContractKey::WrappedVtru, ALICE, units(10, 18));
    let state = state(&h, Flow::Wrap);
    state.synchronizer.tick().await;

    let (status, Json(body)) =
        server::execute(State(state.clone()), request("0", Direction::WrappedToUnwrapped)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body.receipt.is_none());

    let (status, Json(body)) =
        server::execute(State(state.clone()), request("4", Direction::WrappedToUnwrapped)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.notification.title, "Unwrap Successful");
    assert!(body.receipt.is_some());

    h.writer.fail_on("unwrap");
    let (status, Json(body)) =
        server::execute(State(state.clone()), request("4", Direction::WrappedToUnwrapped)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body.notification.title, "Unwrap Failed");

    assert_eq!(state.metrics.operations_succeeded_total.get(), 1);
    assert_eq!(state.metrics.operations_failed_total.get(), 1);
    assert_eq!(state.metrics.operations_rejected_total.get(), 1);
}

#[tokio::test]
async fn test_execute_conflicts_while_in_flight() {
    let h = Harness::new(MockWallet::connected(ALICE, VITRUVEO_CHAIN_ID));
    h.reader
        .set_token(ContractKey::WrappedVtru, ALICE, units(10, 18));
    let state = state(&h, Flow::Wrap);
    state.synchronizer.tick().await;
    let gate = h.writer.hold();

    let first = {
        let state = state.clone();
        tokio::spawn(async move {
            server::execute(State(state), request("1", Direction::WrappedToUnwrapped)).await
        })
    };
    h.writer.entered.notified().await;

    let (status, Json(body)) =
        server::execute(State(state.clone()), request("1", Direction::WrappedToUnwrapped)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body.notification.title, "Unwrap Not Submitted");

    gate.notify_one();
    let (status, _) = first.await.unwrap();
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint_exports_poll_counters() {
    let h = Harness::new(MockWallet::connected(ALICE, VITRUVEO_CHAIN_ID));
    let state = state(&h, Flow::Wrap);
    state.synchronizer.tick().await;
    h.reader.set_failing(true);
    state.synchronizer.tick().await;

    let response = server::prometheus_metrics(State(state.clone())).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.metrics.polls_total.get(), 2);
    assert_eq!(state.metrics.poll_failures_total.get(), 1);

    // Scraping twice must not double count
    server::prometheus_metrics(State(state.clone())).await;
    assert_eq!(state.metrics.polls_total.get(), 2);
}

#[tokio::test]
async fn test_limits_unavailable_without_wrap_reads() {
    let h = Harness::new(MockWallet::connected(ALICE, VITRUVEO_CHAIN_ID));
    h.reader.set_failing(true);
    let state = state(&h, Flow::Wrap);

    let err = server::limits(State(state)).await.unwrap_err();
    assert_eq!(err.0, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_client_disconnect_does_not_cancel_bridge_sequence() {
    let h = Harness::new(MockWallet::connected(ALICE, POLYGON_CHAIN_ID));
    h.reader
        .set_token(ContractKey::PolygonUsdc, ALICE, units(100, 6));
    let state = state(&h, Flow::Bridge);
    state.synchronizer.tick().await;
    let gate = h.writer.hold();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server::router(state.clone());
    tokio::spawn(async move { axum::serve(listener, app).await });

    let body = r#"{"amount":"10","direction":"polygon_to_vitruveo"}"#;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(
            format!(
                "POST /execute HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            )
            .as_bytes(),
        )
        .await
        .unwrap();

    // Approval is blocked in the writer; hang up before it confirms
    h.writer.entered.notified().await;
    drop(stream);
    sleep(Duration::from_millis(50)).await;
    assert!(state.orchestrator.is_in_flight());

    gate.notify_one();
    timeout(Duration::from_secs(5), h.writer.entered.notified())
        .await
        .expect("bridge transfer is submitted after the approval");
    gate.notify_one();

    timeout(Duration::from_secs(5), async {
        while state.orchestrator.is_in_flight() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("operation completes");

    assert_eq!(h.writer.methods(), vec!["approve", "bridge"]);
    assert_eq!(state.metrics.operations_succeeded_total.get(), 1);
}
