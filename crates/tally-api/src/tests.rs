//! Router tests against an in-memory SQLite store.

use std::sync::Arc;

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode},
};
use chrono::NaiveDate;
use serde_json::{Value, json};
use tally_core::{
  clock::FixedClock,
  validate::{DuplicatePolicy, SnapshotValidator},
};
use tally_ops::{SearchEngine, SnapshotIntake};
use tally_store_sqlite::SqliteStore;
use tower::ServiceExt as _;

use crate::{ApiState, api_router};

async fn app(policy: DuplicatePolicy) -> Router {
  let store = Arc::new(SqliteStore::open_in_memory().await.expect("in-memory store"));
  let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
  let state = ApiState {
    store:  Arc::clone(&store),
    search: SearchEngine::new(Arc::clone(&store)),
    intake: SnapshotIntake::new(
      Arc::clone(&store),
      SnapshotValidator::new(policy),
      Arc::new(FixedClock::new(today)),
    ),
  };
  api_router(state)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
  let resp = app.clone().oneshot(req).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let body = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
  };
  (status, body)
}

fn get(uri: &str) -> Request<Body> { Request::builder().uri(uri).body(Body::empty()).unwrap() }

fn post_json(uri: &str, body: &Value) -> Request<Body> {
  Request::builder()
    .method("POST")
    .uri(uri)
    .header("content-type", "application/json")
    .body(Body::from(body.to_string()))
    .unwrap()
}

const MRBEAST: &str = "/platforms/youtube/identities/UCX6OQ3DkcsbYNE6H8uQQuVA";

fn observation(subscribers: i64, observed_at: &str) -> Value {
  json!({
    "platform": "youtube",
    "platform_id": "UCX6OQ3DkcsbYNE6H8uQQuVA",
    "display_name": "MrBeast",
    "subscribers": subscribers,
    "total_views": 5000,
    "observed_at": observed_at,
  })
}

// ─── Observations ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn post_observation_inserts() {
  let app = app(DuplicatePolicy::Reject).await;

  let (status, body) =
    send(&app, post_json("/observations", &observation(100, "2024-06-14T12:00:00Z"))).await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["outcome"], "inserted");
  assert_eq!(body["identity"]["username"], "mrbeast");
  assert_eq!(body["identity"]["platform"], "youtube");
  assert_eq!(body["snapshot"]["recorded_at"], "2024-06-14");
  assert_eq!(body["snapshot"]["subscribers"], 100);
  assert_eq!(body["snapshot"]["total_posts"], Value::Null);
}

#[tokio::test]
async fn post_duplicate_is_conflict() {
  let app = app(DuplicatePolicy::Reject).await;

  send(&app, post_json("/observations", &observation(100, "2024-06-14T08:00:00Z"))).await;
  let (status, body) =
    send(&app, post_json("/observations", &observation(120, "2024-06-14T20:00:00Z"))).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["outcome"], "rejected");
  assert_eq!(body["reason"], "duplicate_for_date");
}

#[tokio::test]
async fn post_duplicate_with_overwrite_replaces() {
  let app = app(DuplicatePolicy::Overwrite).await;

  send(&app, post_json("/observations", &observation(100, "2024-06-14T08:00:00Z"))).await;
  let (status, body) =
    send(&app, post_json("/observations", &observation(120, "2024-06-14T20:00:00Z"))).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["outcome"], "replaced");
  assert_eq!(body["snapshot"]["subscribers"], 120);
}

#[tokio::test]
async fn post_invalid_snapshot_is_unprocessable() {
  let app = app(DuplicatePolicy::Reject).await;

  let (status, body) =
    send(&app, post_json("/observations", &observation(0, "2024-06-14T12:00:00Z"))).await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["reason"], "zero_or_null_metric");

  let (status, body) =
    send(&app, post_json("/observations", &observation(10, "2024-06-16T12:00:00Z"))).await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["reason"], "future_dated");
}

#[tokio::test]
async fn post_unusable_identity_is_bad_request() {
  let app = app(DuplicatePolicy::Reject).await;

  let mut obs = observation(10, "2024-06-14T12:00:00Z");
  obs["display_name"] = json!("???");
  obs["platform_id"] = json!("--");
  let (status, body) = send(&app, post_json("/observations", &obs)).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].is_string());
}

// ─── Search ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn search_finds_ingested_identity() {
  let app = app(DuplicatePolicy::Reject).await;
  send(&app, post_json("/observations", &observation(100, "2024-06-14T12:00:00Z"))).await;

  for uri in ["/search?q=Mr.Beast", "/search?q=mrbeast&platform=youtube&limit=5"] {
    let (status, body) = send(&app, get(uri)).await;
    assert_eq!(status, StatusCode::OK, "{uri}");
    assert_eq!(body[0]["username"], "mrbeast", "{uri}");
  }
}

#[tokio::test]
async fn search_malformed_input_is_empty() {
  let app = app(DuplicatePolicy::Reject).await;
  send(&app, post_json("/observations", &observation(100, "2024-06-14T12:00:00Z"))).await;

  for uri in [
    "/search",
    "/search?q=m",
    "/search?q=mrbeast&platform=myspace",
    "/search?q=mrbeast&platform=twitch",
    "/search?q=mrbeast&limit=abc",
    "/search?q=mrbeast&limit=-1",
    "/search?q=mrbeast&limit=2.5",
  ] {
    let (status, body) = send(&app, get(uri)).await;
    assert_eq!(status, StatusCode::OK, "{uri}");
    assert_eq!(body, json!([]), "{uri}");
  }
}

// ─── Identities ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn get_identity_by_platform_key() {
  let app = app(DuplicatePolicy::Reject).await;
  send(&app, post_json("/observations", &observation(100, "2024-06-14T12:00:00Z"))).await;

  let (status, body) = send(&app, get(MRBEAST)).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["username"], "mrbeast");

  let (status, _) = send(&app, get("/platforms/youtube/identities/nobody")).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, _) = send(&app, get("/platforms/myspace/identities/UC1")).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn search_blank_limit_uses_default() {
  let app = app(DuplicatePolicy::Reject).await;
  send(&app, post_json("/observations", &observation(100, "2024-06-14T12:00:00Z"))).await;

  let (status, body) = send(&app, get("/search?q=mrbeast&limit=")).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body[0]["username"], "mrbeast");
}

#[tokio::test]
async fn lookup_does_not_collide_with_history() {
  let app = app(DuplicatePolicy::Reject).await;

  // An account whose upstream id is literally "snapshots".
  let mut obs = observation(100, "2024-06-14T12:00:00Z");
  obs["platform_id"] = json!("snapshots");
  obs["display_name"] = json!("Snapshots Channel");
  send(&app, post_json("/observations", &obs)).await;

  let (status, body) = send(&app, get("/platforms/youtube/identities/snapshots")).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["platform_id"], "snapshots");
  assert_eq!(body["username"], "snapshotschannel");
}

#[tokio::test]
async fn snapshot_history_filters_by_date() {
  let app = app(DuplicatePolicy::Reject).await;
  for at in ["2024-06-12T12:00:00Z", "2024-06-13T12:00:00Z", "2024-06-14T12:00:00Z"] {
    send(&app, post_json("/observations", &observation(100, at))).await;
  }
  let (_, identity) = send(&app, get(MRBEAST)).await;
  let id = identity["identity_id"].as_str().unwrap().to_owned();

  let (status, body) = send(&app, get(&format!("/identities/{id}/snapshots"))).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body.as_array().unwrap().len(), 3);
  assert_eq!(body[0]["recorded_at"], "2024-06-12");

  let (_, body) =
    send(&app, get(&format!("/identities/{id}/snapshots?from=2024-06-13&to=2024-06-14&limit=1")))
      .await;
  let dates: Vec<&str> =
    body.as_array().unwrap().iter().map(|s| s["recorded_at"].as_str().unwrap()).collect();
  assert_eq!(dates, ["2024-06-13"]);
}

#[tokio::test]
async fn snapshot_history_errors() {
  let app = app(DuplicatePolicy::Reject).await;

  let (status, _) = send(&app, get(&format!("/identities/{}/snapshots", uuid::Uuid::new_v4()))).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, _) = send(&app, get("/identities/not-a-uuid/snapshots")).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let id = uuid::Uuid::new_v4();
  let (status, _) =
    send(&app, get(&format!("/identities/{id}/snapshots?from=2024-06-14&to=2024-06-01"))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}
