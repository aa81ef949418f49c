//! Integration tests for `SqliteStore` against an in-memory database.

use std::time::Duration;

use chrono::NaiveDate;
use tally_core::{
  identity::{NewIdentity, Platform},
  rank::SearchTerms,
  snapshot::{Metrics, NewSnapshot, SnapshotCorrection},
  store::{CandidateQuery, CreatorStore, FaultClass, SnapshotQuery, StoreFault},
};
use uuid::Uuid;

use crate::{Error, SqliteStore, store::sql_limit};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn new_identity(platform: Platform, platform_id: &str, username: &str) -> NewIdentity {
  NewIdentity {
    platform,
    platform_id:  platform_id.into(),
    username:     username.into(),
    display_name: None,
  }
}

fn day(d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2024, 5, d).unwrap() }

fn snapshot(identity_id: Uuid, recorded_at: NaiveDate, subscribers: Option<i64>) -> NewSnapshot {
  NewSnapshot {
    identity_id,
    recorded_at,
    metrics: Metrics { subscribers, total_views: Some(1_000), total_posts: Some(10) },
  }
}

fn candidates(query: &str, platform: Option<Platform>) -> CandidateQuery {
  CandidateQuery::new(&SearchTerms::parse(query).unwrap(), platform)
}

// ─── Identities ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_identity() {
  let s = store().await;

  let mut input = new_identity(Platform::Youtube, "UC123", "mrbeast");
  input.display_name = Some("MrBeast".into());
  let created = s.create_identity(input).await.unwrap();

  let fetched = s.get_identity(created.identity_id).await.unwrap().unwrap();
  assert_eq!(fetched.platform, Platform::Youtube);
  assert_eq!(fetched.platform_id, "UC123");
  assert_eq!(fetched.username, "mrbeast");
  assert_eq!(fetched.display_name.as_deref(), Some("MrBeast"));

  let by_key = s.find_identity(Platform::Youtube, "UC123").await.unwrap().unwrap();
  assert_eq!(by_key.identity_id, created.identity_id);
}

#[tokio::test]
async fn get_identity_missing_returns_none() {
  let s = store().await;
  assert!(s.get_identity(Uuid::new_v4()).await.unwrap().is_none());
  assert!(s.find_identity(Platform::Kick, "nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn platform_key_is_unique() {
  let s = store().await;
  s.create_identity(new_identity(Platform::Twitch, "42", "first")).await.unwrap();

  let err = s
    .create_identity(new_identity(Platform::Twitch, "42", "second"))
    .await
    .unwrap_err();
  assert_eq!(err.class(), FaultClass::ConstraintViolation);

  // Same upstream id on another platform is a different identity.
  s.create_identity(new_identity(Platform::Kick, "42", "first")).await.unwrap();
}

#[tokio::test]
async fn find_by_username_filters_platform() {
  let s = store().await;
  s.create_identity(new_identity(Platform::Youtube, "a", "undefined")).await.unwrap();
  s.create_identity(new_identity(Platform::Twitch, "b", "undefined")).await.unwrap();
  s.create_identity(new_identity(Platform::Twitch, "c", "someone")).await.unwrap();

  assert_eq!(s.find_by_username(None, "undefined").await.unwrap().len(), 2);
  let twitch = s
    .find_by_username(Some(Platform::Twitch), "undefined")
    .await
    .unwrap();
  assert_eq!(twitch.len(), 1);
  assert_eq!(twitch[0].platform_id, "b");
}

#[tokio::test]
async fn set_username_updates_search_keys() {
  let s = store().await;
  let id = s
    .create_identity(new_identity(Platform::Youtube, "UC1", "undefined"))
    .await
    .unwrap();

  assert!(s.search_candidates(&candidates("mrbeast", None)).await.unwrap().is_empty());

  s.set_username(id.identity_id, "mrbeast".into()).await.unwrap();

  let found = s.search_candidates(&candidates("mrbeast", None)).await.unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].username, "mrbeast");
  assert!(s.search_candidates(&candidates("undefined", None)).await.unwrap().is_empty());
}

#[tokio::test]
async fn set_display_name_keeps_username() {
  let s = store().await;
  let id = s
    .create_identity(new_identity(Platform::Bluesky, "did:plc:x", "alice"))
    .await
    .unwrap();

  s.set_display_name(id.identity_id, Some("Alice In Chains".into())).await.unwrap();

  let fetched = s.get_identity(id.identity_id).await.unwrap().unwrap();
  assert_eq!(fetched.username, "alice");
  assert_eq!(fetched.display_name.as_deref(), Some("Alice In Chains"));
  assert_eq!(s.search_candidates(&candidates("inchains", None)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn renaming_missing_identity_errors() {
  let s = store().await;
  let err = s.set_username(Uuid::new_v4(), "x".into()).await.unwrap_err();
  assert!(matches!(err, Error::IdentityNotFound(_)));
  assert_eq!(err.class(), FaultClass::Other);
}

#[tokio::test]
async fn search_candidates_uses_folded_keys() {
  let s = store().await;
  let mut spaced = new_identity(Platform::Youtube, "1", "fan123");
  spaced.display_name = Some("Mr Beast Fan".into());
  s.create_identity(spaced).await.unwrap();
  s.create_identity(new_identity(Platform::Youtube, "2", "mr_beast")).await.unwrap();
  s.create_identity(new_identity(Platform::Twitch, "3", "mrbeast")).await.unwrap();
  s.create_identity(new_identity(Platform::Youtube, "4", "unrelated")).await.unwrap();

  let all = s.search_candidates(&candidates("Mr.Beast", None)).await.unwrap();
  assert_eq!(all.len(), 3);

  let yt = s
    .search_candidates(&candidates("mrbeast", Some(Platform::Youtube)))
    .await
    .unwrap();
  let names: Vec<_> = yt.iter().map(|c| c.username.as_str()).collect();
  assert_eq!(names, ["fan123", "mr_beast"]);
}

#[tokio::test]
async fn search_candidates_treats_wildcards_literally() {
  let s = store().await;
  s.create_identity(new_identity(Platform::Youtube, "1", "plain")).await.unwrap();

  let found = s.search_candidates(&candidates("%%", None)).await.unwrap();
  assert!(found.is_empty());
}

// ─── Snapshots ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_snapshot_rejects_same_day() {
  let s = store().await;
  let id = s
    .create_identity(new_identity(Platform::Youtube, "UC1", "a"))
    .await
    .unwrap()
    .identity_id;

  s.insert_snapshot(Uuid::new_v4(), snapshot(id, day(1), Some(10))).await.unwrap();
  assert!(s.snapshot_exists(id, day(1)).await.unwrap());
  assert!(!s.snapshot_exists(id, day(2)).await.unwrap());

  let err = s.insert_snapshot(Uuid::new_v4(), snapshot(id, day(1), Some(11))).await.unwrap_err();
  assert_eq!(err.class(), FaultClass::ConstraintViolation);
}

#[tokio::test]
async fn insert_snapshot_keeps_caller_id() {
  let s = store().await;
  let id = s
    .create_identity(new_identity(Platform::Youtube, "UC1", "a"))
    .await
    .unwrap()
    .identity_id;

  let chosen = Uuid::new_v4();
  let inserted = s.insert_snapshot(chosen, snapshot(id, day(1), Some(10))).await.unwrap();
  assert_eq!(inserted.snapshot_id, chosen);

  let stored = s
    .list_snapshots(&SnapshotQuery { identity_id: id, from: None, to: None, limit: None })
    .await
    .unwrap();
  assert_eq!(stored[0].snapshot_id, chosen);
}

#[tokio::test]
async fn unknown_identity_is_not_a_duplicate() {
  let s = store().await;
  let err = s
    .insert_snapshot(Uuid::new_v4(), snapshot(Uuid::new_v4(), day(1), Some(1)))
    .await
    .unwrap_err();
  assert_eq!(err.class(), FaultClass::Other);
}

#[tokio::test]
async fn upsert_replaces_metrics_in_place() {
  let s = store().await;
  let id = s
    .create_identity(new_identity(Platform::Youtube, "UC1", "a"))
    .await
    .unwrap()
    .identity_id;

  let first = s.insert_snapshot(Uuid::new_v4(), snapshot(id, day(1), Some(10))).await.unwrap();
  let second = s.upsert_snapshot(snapshot(id, day(1), Some(99))).await.unwrap();

  assert_eq!(second.snapshot_id, first.snapshot_id);
  assert_eq!(second.metrics.subscribers, Some(99));

  let all = s
    .list_snapshots(&SnapshotQuery { identity_id: id, from: None, to: None, limit: None })
    .await
    .unwrap();
  assert_eq!(all.len(), 1);
  assert_eq!(all[0].metrics.subscribers, Some(99));
}

#[tokio::test]
async fn upsert_inserts_when_absent() {
  let s = store().await;
  let id = s
    .create_identity(new_identity(Platform::Kick, "k", "a"))
    .await
    .unwrap()
    .identity_id;

  let snap = s.upsert_snapshot(snapshot(id, day(3), Some(5))).await.unwrap();
  assert_eq!(snap.recorded_at, day(3));
  assert!(s.snapshot_exists(id, day(3)).await.unwrap());
}

#[tokio::test]
async fn list_snapshots_filters_dates() {
  let s = store().await;
  let id = s
    .create_identity(new_identity(Platform::Youtube, "UC1", "a"))
    .await
    .unwrap()
    .identity_id;
  for d in [5, 1, 3, 2, 4] {
    s.insert_snapshot(Uuid::new_v4(), snapshot(id, day(d), Some(d as i64))).await.unwrap();
  }

  let mid = s
    .list_snapshots(&SnapshotQuery {
      identity_id: id,
      from:        Some(day(2)),
      to:          Some(day(4)),
      limit:       None,
    })
    .await
    .unwrap();
  let dates: Vec<_> = mid.iter().map(|s| s.recorded_at).collect();
  assert_eq!(dates, [day(2), day(3), day(4)]);

  let first_two = s
    .list_snapshots(&SnapshotQuery { identity_id: id, from: None, to: None, limit: Some(2) })
    .await
    .unwrap();
  assert_eq!(first_two.len(), 2);
  assert_eq!(first_two[0].recorded_at, day(1));

  let huge = s
    .list_snapshots(&SnapshotQuery {
      identity_id: id,
      from:        None,
      to:          None,
      limit:       Some(usize::MAX),
    })
    .await
    .unwrap();
  assert_eq!(huge.len(), 5);
}

#[test]
fn oversized_limits_saturate() {
  assert_eq!(sql_limit(None), -1);
  assert_eq!(sql_limit(Some(0)), 0);
  assert_eq!(sql_limit(Some(25)), 25);
  assert_eq!(sql_limit(Some(usize::MAX)), i64::MAX);
  assert_eq!(sql_limit(Some(i64::MAX as usize + 1)), i64::MAX);
}

#[tokio::test]
async fn scan_pages_visit_every_row_once() {
  let s = store().await;
  let id = s
    .create_identity(new_identity(Platform::Youtube, "UC1", "a"))
    .await
    .unwrap()
    .identity_id;
  for d in 1..=7 {
    s.insert_snapshot(Uuid::new_v4(), snapshot(id, day(d), Some(1))).await.unwrap();
  }

  let mut seen = Vec::new();
  let mut cursor = None;
  loop {
    let page = s.scan_snapshots(cursor, 3).await.unwrap();
    if page.is_empty() {
      break;
    }
    cursor = page.last().map(|s| s.snapshot_id);
    seen.extend(page.into_iter().map(|s| s.snapshot_id));
  }

  assert_eq!(seen.len(), 7);
  let mut sorted = seen.clone();
  sorted.sort();
  sorted.dedup();
  assert_eq!(sorted.len(), 7);
}

#[tokio::test]
async fn delete_and_correct_snapshots() {
  let s = store().await;
  let id = s
    .create_identity(new_identity(Platform::Youtube, "UC1", "a"))
    .await
    .unwrap()
    .identity_id;
  let a = s.insert_snapshot(Uuid::new_v4(), snapshot(id, day(1), None)).await.unwrap();
  let b = s.insert_snapshot(Uuid::new_v4(), snapshot(id, day(2), Some(3))).await.unwrap();

  let removed = s
    .delete_snapshots(vec![a.snapshot_id, Uuid::new_v4()])
    .await
    .unwrap();
  assert_eq!(removed, 1);

  let fixed = Metrics { subscribers: Some(3), total_views: None, total_posts: Some(10) };
  let changed = s
    .correct_snapshots(vec![SnapshotCorrection { snapshot_id: b.snapshot_id, metrics: fixed }])
    .await
    .unwrap();
  assert_eq!(changed, 1);

  let left = s
    .list_snapshots(&SnapshotQuery { identity_id: id, from: None, to: None, limit: None })
    .await
    .unwrap();
  assert_eq!(left.len(), 1);
  assert_eq!(left[0].metrics, fixed);
}

// ─── Leases ──────────────────────────────────────────────────────────────────

const TTL: Duration = Duration::from_secs(60);

#[tokio::test]
async fn lease_is_exclusive_until_released() {
  let s = store().await;
  let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

  assert!(s.acquire_lease("sweep", a, TTL).await.unwrap());
  assert!(!s.acquire_lease("sweep", b, TTL).await.unwrap());
  // Re-acquiring extends the holder's own lease.
  assert!(s.acquire_lease("sweep", a, TTL).await.unwrap());
  // Other names are independent.
  assert!(s.acquire_lease("other", b, TTL).await.unwrap());

  // Only the holder can release it.
  s.release_lease("sweep", b).await.unwrap();
  assert!(!s.acquire_lease("sweep", b, TTL).await.unwrap());

  s.release_lease("sweep", a).await.unwrap();
  assert!(s.acquire_lease("sweep", b, TTL).await.unwrap());
}

#[tokio::test]
async fn expired_lease_can_be_taken_over() {
  let s = store().await;
  let (stale, fresh) = (Uuid::new_v4(), Uuid::new_v4());

  assert!(s.acquire_lease("sweep", stale, Duration::ZERO).await.unwrap());
  assert!(s.acquire_lease("sweep", fresh, TTL).await.unwrap());
  assert!(!s.acquire_lease("sweep", stale, TTL).await.unwrap());
}

#[tokio::test]
async fn lease_is_shared_across_connections() {
  let path = std::env::temp_dir().join(format!("tally-lease-{}.db", Uuid::new_v4()));
  let first = SqliteStore::open(&path).await.unwrap();
  let second = SqliteStore::open(&path).await.unwrap();
  let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

  assert!(first.acquire_lease("sweep", a, TTL).await.unwrap());
  assert!(!second.acquire_lease("sweep", b, TTL).await.unwrap());

  first.release_lease("sweep", a).await.unwrap();
  assert!(second.acquire_lease("sweep", b, TTL).await.unwrap());

  drop((first, second));
  for suffix in ["", "-wal", "-shm"] {
    std::fs::remove_file(format!("{}{suffix}", path.display())).ok();
  }
}

#[tokio::test]
async fn store_is_usable_with_custom_timeout() {
  let s = store().await.with_timeout(Duration::from_secs(30));
  s.create_identity(new_identity(Platform::Tiktok, "t", "tok")).await.unwrap();
}

#[test]
fn timeout_is_transient() {
  let err = Error::Timeout(Duration::from_millis(10));
  assert_eq!(err.class(), FaultClass::Timeout);
  assert!(err.class().is_transient());
}
