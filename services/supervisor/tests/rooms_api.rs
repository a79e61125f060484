//! HTTP API integration tests.
//!
//! Serve the router on a local port with an in-process coordinator and talk
//! to it over HTTP.

use std::sync::Arc;
use std::time::Duration;

use roomvisor_model::{Region, RoomId};
use roomvisor_supervisor::{
    adapters::{FakePresenceService, FakeStreamService},
    api,
    capacity::FakeCapacityProvider,
    coordinator::{Collaborators, CoordinatorConfig, DeployCoordinator},
    notify::RecordingNotifier,
    queue::{AdmissionQueue, MemoryAdmissionQueue},
    state::AppState,
};
use tokio::net::TcpListener;

struct ApiTestHarness {
    base_url: String,
    client: reqwest::Client,
    queue: Arc<MemoryAdmissionQueue>,
    capacity: Arc<FakeCapacityProvider>,
}

impl ApiTestHarness {
    async fn new(capacity: FakeCapacityProvider) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info,roomvisor_supervisor=debug".into()),
            )
            .with_test_writer()
            .try_init();

        let queue = Arc::new(MemoryAdmissionQueue::new());
        let capacity = Arc::new(capacity);
        let coordinator = DeployCoordinator::new(
            Collaborators {
                queue: queue.clone(),
                capacity: capacity.clone(),
                streams: Arc::new(FakeStreamService::new()),
                presence: Arc::new(FakePresenceService::new()),
                notifier: Arc::new(RecordingNotifier::new()),
            },
            CoordinatorConfig::default(),
        );

        let app = api::create_router(AppState::new(coordinator));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            queue,
            capacity,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn one_euw_slot() -> FakeCapacityProvider {
    FakeCapacityProvider::new()
        .with_unit(1, 1)
        .with_node("euw-1", Some(Region::Euw), 1, 1)
}

#[tokio::test]
async fn test_deploy_room_runs_when_capacity_is_free() {
    let h = ApiTestHarness::new(one_euw_slot()).await;

    let resp = h
        .client
        .put(h.url("/v1/rooms/42"))
        .json(&serde_json::json!({ "region": "EUW" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "status": "running" }));
    assert!(h.capacity.is_deployed(RoomId::new(42)));
}

#[tokio::test]
async fn test_deploy_room_without_body_defaults_to_any() {
    let h = ApiTestHarness::new(FakeCapacityProvider::new()).await;

    let resp = h.client.put(h.url("/v1/rooms/7")).send().await.unwrap();

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "status": "queued", "position": 0 }));
    assert_eq!(h.queue.entries()[0].region, Region::Any);
}

#[tokio::test]
async fn test_queue_endpoints() {
    let h = ApiTestHarness::new(FakeCapacityProvider::new()).await;
    for room in ["1", "2"] {
        let resp = h
            .client
            .put(h.url(&format!("/v1/rooms/{room}")))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    let size: serde_json::Value = h
        .client
        .get(h.url("/v1/queue"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(size, serde_json::json!({ "size": 2 }));

    let queued: serde_json::Value = h
        .client
        .get(h.url("/v1/queue/2"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(queued, serde_json::json!({ "queued": true }));

    let absent: serde_json::Value = h
        .client
        .get(h.url("/v1/queue/3"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(absent, serde_json::json!({ "queued": false }));
}

#[tokio::test]
async fn test_destroy_room_admits_queued_room() {
    let h = ApiTestHarness::new(one_euw_slot()).await;
    h.capacity.place(RoomId::new(7), "euw-1");
    h.queue.add(RoomId::new(3), Region::Euw).await.unwrap();

    let resp = h.client.delete(h.url("/v1/rooms/7")).send().await.unwrap();

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({}));

    tokio::time::timeout(Duration::from_secs(5), async {
        while !h.capacity.is_deployed(RoomId::new(3)) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("queued room was not admitted");
    assert_eq!(h.queue.size().await.unwrap(), 0);
}

#[tokio::test]
async fn test_destroy_unknown_room_is_not_found() {
    let h = ApiTestHarness::new(one_euw_slot()).await;

    let resp = h
        .client
        .delete(h.url("/v1/rooms/404"))
        .header("x-request-id", "req-test-1")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 404);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/problem+json"
    );
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "room_not_found");
    assert_eq!(body["request_id"], "req-test-1");
}

#[tokio::test]
async fn test_invalid_input_is_rejected() {
    let h = ApiTestHarness::new(one_euw_slot()).await;

    let resp = h.client.put(h.url("/v1/rooms/abc")).send().await.unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "invalid_room_id");

    let resp = h
        .client
        .put(h.url("/v1/rooms/5"))
        .json(&serde_json::json!({ "region": "MARS" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "invalid_request");
}

#[tokio::test]
async fn test_provision_failure_is_bad_gateway() {
    let capacity = one_euw_slot();
    capacity.fail_deploy(Some("api server down"));
    let h = ApiTestHarness::new(capacity).await;

    let resp = h
        .client
        .put(h.url("/v1/rooms/42"))
        .json(&serde_json::json!({ "region": "EUW" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 502);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["failed_step"], "deploy_unit");
    assert_eq!(
        body["completed_steps"],
        serde_json::json!(["create_stream", "set_current_item"])
    );
}

#[tokio::test]
async fn test_health_endpoints() {
    let h = ApiTestHarness::new(FakeCapacityProvider::new()).await;

    let resp = h.client.get(h.url("/healthz")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let resp = h.client.get(h.url("/readyz")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["components"]["queue"]["status"], "ok");
    assert_eq!(body["components"]["queue"]["queued"], 0);

    let resp = h.client.get(h.url("/livez")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
}
