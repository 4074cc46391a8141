use super::*;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use flow_core::{
    ActorId, CoreConfig, FlowEvent, InMemoryDirectory, NonEmptyText, PatientId, PatientSummary,
    SystemClock, TenantId,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_stream::StreamExt;
use tower::ServiceExt;

const KEY: &str = "test-key";

struct TestApp {
    router: Router,
    registry: Arc<FlowRegistry>,
    tenant: TenantId,
    patients: Vec<PatientId>,
    actor: ActorId,
}

fn app() -> TestApp {
    app_with(CoreConfig::default())
}

fn app_with(config: CoreConfig) -> TestApp {
    let tenant = TenantId::new();
    let patients: Vec<PatientId> = (0..3).map(|_| PatientId::new()).collect();
    let mut directory = InMemoryDirectory::new();
    for (n, patient_id) in patients.iter().enumerate() {
        directory.insert(
            tenant,
            PatientSummary {
                patient_id: *patient_id,
                display_name: NonEmptyText::new(format!("Patient {n}")).unwrap(),
                contact: None,
            },
        );
    }

    let registry = Arc::new(FlowRegistry::new(
        config,
        Arc::new(SystemClock),
        Arc::new(directory),
    ));
    registry.register_tenant(tenant).unwrap();

    TestApp {
        router: router(AppState::new(registry.clone(), Some(KEY.into()))),
        registry,
        tenant,
        patients,
        actor: ActorId::new(),
    }
}

impl TestApp {
    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-api-key", KEY)
            .header("x-actor-id", self.actor.to_string())
            .header("x-actor-role", "nurse");
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn url(&self, path: &str) -> String {
        format!("/tenants/{}{path}", self.tenant)
    }

    async fn arrive(&self, n: usize) -> Value {
        let (status, body) = self
            .send(
                Method::POST,
                &self.url("/entries"),
                Some(json!({ "patient_id": self.patients[n].to_string(), "priority": 2 })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }

    async fn act(&self, entry_id: &str, action: &str, expected: &str) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            &self.url(&format!("/entries/{entry_id}/actions/{action}")),
            Some(json!({ "expected_status": expected })),
        )
        .await
    }
}

#[tokio::test]
async fn health_needs_no_key() {
    let app = app();
    let response = app
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn tenant_routes_require_the_api_key() {
    let app = app();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::get(app.url("/queue"))
                .header("x-api-key", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_actor_headers_are_a_bad_request() {
    let app = app();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::post(app.url("/entries"))
                .header("x-api-key", KEY)
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "patient_id": app.patients[0].to_string() }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn arrival_shows_up_in_the_queue() {
    let app = app();
    let entry = app.arrive(0).await;
    assert_eq!(entry["status"], "waiting");
    assert_eq!(entry["priority"], 2);
    assert_eq!(entry["legal_actions"], json!(["call", "no_show", "cancel"]));

    let (status, queue) = app.send(Method::GET, &app.url("/queue"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(queue["entries"][0]["id"], entry["id"]);
    assert_eq!(queue["last_sequence"], 1);
}

#[tokio::test]
async fn losing_a_race_is_a_conflict() {
    let app = app();
    let entry = app.arrive(0).await;
    let id = entry["id"].as_str().unwrap();

    let (status, outcome) = app.act(id, "call", "waiting").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["entry"]["status"], "called");

    let (status, body) = app.act(id, "call", "waiting").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "stale_state");
    assert!(body["message"].as_str().unwrap().contains("already called"));
}

#[tokio::test]
async fn illegal_actions_and_unknown_ids_map_to_their_statuses() {
    let app = app();
    let entry = app.arrive(0).await;
    let id = entry["id"].as_str().unwrap();

    let (status, body) = app.act(id, "complete", "waiting").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_transition");

    let (status, _) = app.act(id, "teleport", "waiting").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = flow_core::EntryId::new().to_string();
    let (status, _) = app.act(&missing, "call", "waiting").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(
            Method::GET,
            &format!("/tenants/{}/queue", TenantId::new()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn mode_change_after_start_is_locked() {
    let app = app();
    let entry = app.arrive(0).await;
    let id = entry["id"].as_str().unwrap();
    app.act(id, "call", "waiting").await;
    let (status, outcome) = app.act(id, "start", "called").await;
    assert_eq!(status, StatusCode::OK);
    let encounter_id = outcome["encounter"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(
            Method::PUT,
            &app.url(&format!("/encounters/{encounter_id}/mode")),
            Some(json!({ "mode": "team" })),
        )
        .await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(body["error"], "locked_state");

    let (status, record) = app
        .send(Method::GET, &app.url(&format!("/encounters/{encounter_id}")), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["history"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn patch_sets_and_clears_notes() {
    let app = app();
    let entry = app.arrive(0).await;
    let url = app.url(&format!("/entries/{}", entry["id"].as_str().unwrap()));

    let (status, updated) = app
        .send(Method::PATCH, &url, Some(json!({ "notes": "wheelchair", "priority": 1 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["notes"], "wheelchair");
    assert_eq!(updated["priority"], 1);

    let (_, cleared) = app.send(Method::PATCH, &url, Some(json!({ "notes": null }))).await;
    assert_eq!(cleared["notes"], Value::Null);

    let (status, _) = app
        .send(Method::PATCH, &url, Some(json!({ "expected_version": 1, "priority": 4 })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn reorder_puts_listed_entries_first() {
    let app = app();
    let first = app.arrive(0).await;
    let second = app.arrive(1).await;

    let (status, queue) = app
        .send(
            Method::PUT,
            &app.url("/queue"),
            Some(json!({ "entry_ids": [second["id"]] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(queue["entries"][0]["id"], second["id"]);
    assert_eq!(queue["entries"][1]["id"], first["id"]);
}

#[tokio::test]
async fn list_filters_by_status() {
    let app = app();
    let first = app.arrive(0).await;
    app.arrive(1).await;
    app.act(first["id"].as_str().unwrap(), "call", "waiting").await;

    let (status, list) = app
        .send(Method::GET, &app.url("/entries?status=called"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["entries"].as_array().unwrap().len(), 1);

    let (status, _) = app
        .send(Method::GET, &app.url("/entries?status=paused"), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn event_stream_replays_after_last_event_id() {
    let app = app();
    app.arrive(0).await;
    app.arrive(1).await;
    let flow = app.registry.tenant(&app.tenant).unwrap();

    let mut stream = events::frame_stream(flow.clone(), Some(1));
    let replayed = tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(replayed.sequence, 2);

    app.arrive(2).await;
    let live = tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(live.sequence, 3);
    assert!(matches!(live.event, FlowEvent::EntryAdded { .. }));
}

#[tokio::test]
async fn openapi_document_lists_the_tenant_routes() {
    let doc = ApiDoc::openapi();
    let json = serde_json::to_value(&doc).unwrap();
    assert!(json["paths"]
        .get("/tenants/{tenant}/entries/{id}/actions/{action}")
        .is_some());
}

#[tokio::test]
async fn lagging_subscriber_stream_ends_for_reconnect() {
    let config = CoreConfig::new(None, CoreConfig::default().utc_offset(), 16, 1).unwrap();
    let app = app_with(config);
    let flow = app.registry.tenant(&app.tenant).unwrap();

    let mut stream = events::frame_stream(flow.clone(), None);
    for n in 0..3 {
        app.arrive(n).await;
    }

    let next = tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .unwrap();
    assert!(next.is_none());

    // Reconnecting from the last frame the client saw replays what it missed.
    let mut resumed = events::frame_stream(flow, Some(0));
    let first = tokio::time::timeout(Duration::from_secs(1), resumed.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.sequence, 1);
}
