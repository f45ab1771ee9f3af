//! Integration tests: audit log, search, export, cleanup, stage moves, timelines.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;
use track_api::server::{self, AppState};
use track_audit::{AuditStore, AuditStoreConfig};
use track_move::{CoordinatorConfig, EntityCache, StageMoveCoordinator};
use track_remote::MockPersister;
use track_timeline::{StageTimeline, TimelineConfig};
use track_types::{Actor, ActorProvider, PersistenceFailure, StaticActor};

fn test_app() -> (axum::Router, Arc<MockPersister>) {
    let audit = Arc::new(AuditStore::in_memory(AuditStoreConfig::default()));
    let timeline = StageTimeline::new(Arc::clone(&audit), TimelineConfig::default());
    let persister = Arc::new(MockPersister::new());
    let actors: Arc<dyn ActorProvider> =
        Arc::new(StaticActor(Some(Actor::new("u-1", "Ana"))));
    let coordinator = StageMoveCoordinator::new(
        Arc::new(EntityCache::new("id", "stage_id")),
        Arc::clone(&audit),
        persister.clone(),
        Arc::clone(&actors),
        CoordinatorConfig::default(),
    );
    let state = Arc::new(AppState {
        audit,
        timeline,
        coordinator,
        actors,
    });
    (server::router(state), persister)
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> Value {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn log_update(app: &axum::Router, id: &str, old_title: &str, new_title: &str) -> Value {
    send(
        app,
        "POST",
        "/audit/log",
        Some(json!({
            "entity_type": "SERVICE_ORDER",
            "entity_id": id,
            "action": "UPDATE",
            "old_values": { "title": old_title, "total": 10 },
            "new_values": { "title": new_title, "total": 10 }
        })),
    )
    .await
}

#[tokio::test]
async fn health() {
    let (app, _) = test_app();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn log_records_one_change_and_session_actor() {
    let (app, _) = test_app();
    let j = log_update(&app, "so-1", "Inspection", "Inspection Updated").await;
    assert_eq!(j["code"], 200);
    let entry = &j["data"];
    assert_eq!(entry["actor_id"], "u-1");
    assert_eq!(entry["actor_name"], "Ana");
    let changes = entry["changes"].as_array().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["field"], "title");
    assert_eq!(changes[0]["change_type"], "modified");

    let j = send(&app, "GET", "/audit/history/SERVICE_ORDER/so-1", None).await;
    assert_eq!(j["data"].as_array().unwrap().len(), 1);
    let j = send(&app, "GET", "/audit/history/CLIENT/so-1", None).await;
    assert!(j["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn explicit_actor_overrides_session() {
    let (app, _) = test_app();
    let j = send(
        &app,
        "POST",
        "/audit/log",
        Some(json!({
            "entity_type": "CLIENT",
            "entity_id": "c-1",
            "action": "CREATE",
            "old_values": {},
            "new_values": { "name": "Acme" },
            "actor": { "id": "u-9", "name": "Bo" }
        })),
    )
    .await;
    assert_eq!(j["data"]["actor_id"], "u-9");
    assert_eq!(j["data"]["changes"][0]["change_type"], "added");
}

#[tokio::test]
async fn search_pages_and_summary_counts() {
    let (app, _) = test_app();
    for i in 0..4 {
        log_update(&app, &format!("so-{}", i), "a", "b").await;
    }
    let j = send(&app, "GET", "/audit/search?offset=1&limit=2", None).await;
    let page = j["data"].as_array().unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0]["entity_id"], "so-2");

    let j = send(&app, "GET", "/audit/search?start_date=not-a-date", None).await;
    assert!(j["data"].as_array().unwrap().is_empty());

    let j = send(&app, "GET", "/audit/summary?entity_type=SERVICE_ORDER", None).await;
    assert_eq!(j["data"]["total"], 4);
    assert_eq!(j["data"]["by_action"]["UPDATE"], 4);
    assert_eq!(j["data"]["by_action"]["DELETE"], 0);
    assert_eq!(j["data"]["by_actor"]["u-1"], 4);
}

#[tokio::test]
async fn malformed_pagination_is_an_empty_envelope() {
    let (app, _) = test_app();
    log_update(&app, "so-1", "a", "b").await;
    for uri in [
        "/audit/search?limit=abc",
        "/audit/search?offset=-1",
        "/audit/search?limit=1.5&entity_id=so-1",
    ] {
        let j = send(&app, "GET", uri, None).await;
        assert_eq!(j["code"], 200);
        assert!(j["data"].as_array().unwrap().is_empty(), "{}", uri);
    }
    let j = send(&app, "GET", "/audit/summary?limit=abc", None).await;
    assert_eq!(j["data"]["total"], 1);
}

#[tokio::test]
async fn export_csv_sets_content_type() {
    let (app, _) = test_app();
    log_update(&app, "so-1", "Inspection", "Inspection Updated").await;
    let req = Request::builder()
        .uri("/audit/export?format=csv&entity_id=so-1")
        .body(Body::empty())
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    let body = res.into_body().collect().await.unwrap().to_bytes();
    let csv = String::from_utf8(body.to_vec()).unwrap();
    assert_eq!(csv.lines().count(), 2);
    assert!(csv.contains("title: Inspection → Inspection Updated"));
}

#[tokio::test]
async fn cleanup_drops_older_entries() {
    let (app, _) = test_app();
    log_update(&app, "so-1", "a", "b").await;
    let j = send(
        &app,
        "POST",
        "/audit/cleanup",
        Some(json!({ "older_than": "1999-01-01T00:00:00Z" })),
    )
    .await;
    assert_eq!(j["data"]["removed"], 0);
    let j = send(
        &app,
        "POST",
        "/audit/cleanup",
        Some(json!({ "older_than": "2999-01-01T00:00:00Z" })),
    )
    .await;
    assert_eq!(j["data"]["removed"], 1);
}

#[tokio::test]
async fn move_updates_cache_audits_and_extends_timeline() {
    let (app, persister) = test_app();
    send(
        &app,
        "POST",
        "/audit/log",
        Some(json!({
            "entity_type": "SERVICE_ORDER",
            "entity_id": "so-1",
            "action": "CREATE",
            "old_values": {},
            "new_values": { "title": "Inspection", "stage_id": "s1", "funnel_id": "f-1" }
        })),
    )
    .await;
    send(
        &app,
        "PUT",
        "/cache/lists/funnel:f-1",
        Some(json!([{ "id": "so-1", "stage_id": "s1" }])),
    )
    .await;

    let j = send(
        &app,
        "POST",
        "/pipeline/move",
        Some(json!({ "entity_id": "so-1", "target_stage_id": "s2" })),
    )
    .await;
    assert_eq!(j["code"], 200);
    assert_eq!(j["data"]["from_stage_id"], "s1");
    assert_eq!(j["data"]["phase"], "committed");
    assert!(j["data"]["audit_entry_id"].is_string());
    assert_eq!(persister.calls(), vec![("so-1".to_string(), "s2".to_string())]);

    let j = send(&app, "GET", "/cache/lists/funnel:f-1", None).await;
    assert_eq!(j["data"]["rows"][0]["stage_id"], "s2");
    assert_eq!(j["data"]["needs_refresh"], true);

    let j = send(&app, "GET", "/timeline/so-1", None).await;
    let visits = j["data"].as_array().unwrap();
    assert_eq!(visits.len(), 2);
    assert_eq!(visits[0]["stage_id"], "s1");
    assert!(visits[0]["exited_at"].is_string());
    assert_eq!(visits[1]["stage_id"], "s2");
    assert_eq!(visits[1]["funnel_id"], "f-1");
    assert!(visits[1]["exited_at"].is_null());
}

#[tokio::test]
async fn rejected_move_rolls_back_cache() {
    let (app, persister) = test_app();
    send(
        &app,
        "PUT",
        "/cache/details/so-1",
        Some(json!({ "id": "so-1", "stage_id": "s1" })),
    )
    .await;
    persister.fail_next(PersistenceFailure::Rejected {
        status: 409,
        message: "stage is closed".into(),
    });
    let j = send(
        &app,
        "POST",
        "/pipeline/move",
        Some(json!({ "entity_id": "so-1", "target_stage_id": "s2" })),
    )
    .await;
    assert_eq!(j["code"], 409);
    assert_eq!(j["message"], "stage is closed");

    let j = send(&app, "GET", "/cache/details/so-1", None).await;
    assert_eq!(j["data"]["record"]["stage_id"], "s1");
    assert_eq!(j["data"]["needs_refresh"], false);
    let j = send(&app, "GET", "/audit/history/SERVICE_ORDER/so-1", None).await;
    assert!(j["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_cache_key_is_404_in_envelope() {
    let (app, _) = test_app();
    let j = send(&app, "GET", "/cache/lists/missing", None).await;
    assert_eq!(j["code"], 404);
    assert!(j["data"].is_null());
}
