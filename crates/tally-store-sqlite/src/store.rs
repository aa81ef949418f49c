//! [`SqliteStore`] — the SQLite implementation of [`CreatorStore`].

use std::{path::Path, time::Duration};

use chrono::{NaiveDate, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use tally_core::{
  identity::{CreatorIdentity, NewIdentity, Platform},
  rank::SearchKeys,
  snapshot::{NewSnapshot, SnapshotCorrection, StatSnapshot},
  store::{CandidateQuery, CreatorStore, SnapshotQuery},
};

use crate::{
  encode::{
    encode_date, encode_dt, encode_platform, encode_uuid, RawIdentity, RawSnapshot,
    IDENTITY_COLUMNS, SNAPSHOT_COLUMNS,
  },
  schema::SCHEMA,
  Error, Result,
};

/// Deadline applied to every call unless overridden with
/// [`SqliteStore::with_timeout`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A `LIMIT` operand. SQLite reads any negative value as "no limit", so
/// oversized counts saturate instead of wrapping.
pub(crate) fn sql_limit(limit: Option<usize>) -> i64 {
  limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX))
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Tally store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:    tokio_rusqlite::Connection,
  timeout: Duration,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, timeout: DEFAULT_TIMEOUT };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, timeout: DEFAULT_TIMEOUT };
    store.init_schema().await?;
    Ok(store)
  }

  /// Replace the per-call deadline.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await
  }

  /// Run `f` on the connection thread, bounded by the store deadline.
  ///
  /// A call that times out is abandoned, not aborted: its closure may still
  /// commit afterwards.
  async fn call<F, R>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&mut rusqlite::Connection) -> tokio_rusqlite::Result<R> + Send + 'static,
    R: Send + 'static,
  {
    match tokio::time::timeout(self.timeout, self.conn.call(f)).await {
      Ok(result) => Ok(result?),
      Err(_) => {
        tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "sqlite call timed out");
        Err(Error::Timeout(self.timeout))
      }
    }
  }

  /// Rewrite the folded search keys of one identity after a name change.
  ///
  /// `update` receives the current `(username, display_name)` and returns
  /// the new pair.
  async fn rewrite_names<F>(&self, id: Uuid, update: F) -> Result<()>
  where
    F: FnOnce(String, Option<String>) -> (String, Option<String>) + Send + 'static,
  {
    let id_str = encode_uuid(id);

    let changed = self
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current: Option<(String, Option<String>)> = tx
          .query_row(
            "SELECT username, display_name FROM identities WHERE identity_id = ?1",
            rusqlite::params![id_str],
            |row| Ok((row.get(0)?, row.get(1)?)),
          )
          .optional()?;

        let Some((username, display_name)) = current else {
          return Ok(0);
        };
        let (username, display_name) = update(username, display_name);
        let keys = SearchKeys::new(&username, display_name.as_deref());

        let n = tx.execute(
          "UPDATE identities
           SET username = ?2, display_name = ?3,
               search_username = ?4, search_user_key = ?5,
               search_display = ?6, search_disp_key = ?7
           WHERE identity_id = ?1",
          rusqlite::params![
            id_str,
            username,
            display_name,
            keys.username,
            keys.username_key,
            keys.display_name,
            keys.display_name_key,
          ],
        )?;
        tx.commit()?;
        Ok(n)
      })
      .await?;

    if changed == 0 {
      return Err(Error::IdentityNotFound(id));
    }
    Ok(())
  }

  async fn query_identities(
    &self,
    sql: String,
    params: Vec<Option<String>>,
  ) -> Result<Vec<CreatorIdentity>> {
    let raws: Vec<RawIdentity> = self
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawIdentity::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawIdentity::into_identity).collect()
  }

  async fn query_one_identity(
    &self,
    sql: String,
    params: Vec<String>,
  ) -> Result<Option<CreatorIdentity>> {
    let raw: Option<RawIdentity> = self
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params_from_iter(params.iter()), RawIdentity::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawIdentity::into_identity).transpose()
  }
}

// ─── CreatorStore impl ───────────────────────────────────────────────────────

impl CreatorStore for SqliteStore {
  type Error = Error;

  // ── Identities ────────────────────────────────────────────────────────────

  async fn create_identity(&self, input: NewIdentity) -> Result<CreatorIdentity> {
    let identity = CreatorIdentity {
      identity_id:  Uuid::new_v4(),
      platform:     input.platform,
      platform_id:  input.platform_id,
      username:     input.username,
      display_name: input.display_name,
      created_at:   Utc::now(),
    };

    let keys         = SearchKeys::of(&identity);
    let id_str       = encode_uuid(identity.identity_id);
    let platform_str = encode_platform(identity.platform);
    let platform_id  = identity.platform_id.clone();
    let username     = identity.username.clone();
    let display_name = identity.display_name.clone();
    let at_str       = encode_dt(identity.created_at);

    self
      .call(move |conn| {
        conn.execute(
          "INSERT INTO identities (
             identity_id, platform, platform_id, username, display_name, created_at,
             search_username, search_user_key, search_display, search_disp_key
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            id_str,
            platform_str,
            platform_id,
            username,
            display_name,
            at_str,
            keys.username,
            keys.username_key,
            keys.display_name,
            keys.display_name_key,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(identity)
  }

  async fn get_identity(&self, id: Uuid) -> Result<Option<CreatorIdentity>> {
    self
      .query_one_identity(
        format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE identity_id = ?1"),
        vec![encode_uuid(id)],
      )
      .await
  }

  async fn find_identity(
    &self,
    platform:    Platform,
    platform_id: &str,
  ) -> Result<Option<CreatorIdentity>> {
    self
      .query_one_identity(
        format!(
          "SELECT {IDENTITY_COLUMNS} FROM identities WHERE platform = ?1 AND platform_id = ?2"
        ),
        vec![encode_platform(platform).to_owned(), platform_id.to_owned()],
      )
      .await
  }

  async fn find_by_username(
    &self,
    platform: Option<Platform>,
    username: &str,
  ) -> Result<Vec<CreatorIdentity>> {
    let platform_str = platform.map(encode_platform).map(str::to_owned);
    self
      .query_identities(
        format!(
          "SELECT {IDENTITY_COLUMNS} FROM identities
           WHERE username = ?1 AND (?2 IS NULL OR platform = ?2)
           ORDER BY created_at, identity_id"
        ),
        vec![Some(username.to_owned()), platform_str],
      )
      .await
  }

  async fn set_username(&self, id: Uuid, username: String) -> Result<()> {
    self
      .rewrite_names(id, move |_, display_name| (username, display_name))
      .await
  }

  async fn set_display_name(&self, id: Uuid, display_name: Option<String>) -> Result<()> {
    self
      .rewrite_names(id, move |username, _| (username, display_name))
      .await
  }

  async fn search_candidates(&self, query: &CandidateQuery) -> Result<Vec<CreatorIdentity>> {
    let platform_str = query.platform.map(encode_platform).map(str::to_owned);
    self
      .query_identities(
        format!(
          "SELECT {IDENTITY_COLUMNS} FROM identities
           WHERE (instr(search_username, ?1) > 0
               OR instr(search_display, ?1) > 0
               OR instr(search_user_key, ?2) > 0
               OR instr(search_disp_key, ?2) > 0)
             AND (?3 IS NULL OR platform = ?3)
           ORDER BY created_at, identity_id"
        ),
        vec![
          Some(query.sanitized.clone()),
          Some(query.stripped.clone()),
          platform_str,
        ],
      )
      .await
  }

  // ── Snapshots ─────────────────────────────────────────────────────────────

  async fn insert_snapshot(&self, snapshot_id: Uuid, input: NewSnapshot) -> Result<StatSnapshot> {
    let snapshot = StatSnapshot {
      snapshot_id,
      identity_id: input.identity_id,
      recorded_at: input.recorded_at,
      metrics:     input.metrics,
      ingested_at: Utc::now(),
    };

    let snapshot_id_str = encode_uuid(snapshot.snapshot_id);
    let identity_id_str = encode_uuid(snapshot.identity_id);
    let recorded_at_str = encode_date(snapshot.recorded_at);
    let ingested_at_str = encode_dt(snapshot.ingested_at);
    let m               = snapshot.metrics;

    self
      .call(move |conn| {
        conn.execute(
          &format!("INSERT INTO snapshots ({SNAPSHOT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
          rusqlite::params![
            snapshot_id_str,
            identity_id_str,
            recorded_at_str,
            m.subscribers,
            m.total_views,
            m.total_posts,
            ingested_at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(snapshot)
  }

  async fn upsert_snapshot(&self, input: NewSnapshot) -> Result<StatSnapshot> {
    let snapshot_id_str = encode_uuid(Uuid::new_v4());
    let identity_id_str = encode_uuid(input.identity_id);
    let recorded_at_str = encode_date(input.recorded_at);
    let ingested_at_str = encode_dt(Utc::now());
    let m               = input.metrics;

    let raw: RawSnapshot = self
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          &format!(
            "INSERT INTO snapshots ({SNAPSHOT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (identity_id, recorded_at) DO UPDATE SET
               subscribers = excluded.subscribers,
               total_views = excluded.total_views,
               total_posts = excluded.total_posts,
               ingested_at = excluded.ingested_at"
          ),
          rusqlite::params![
            snapshot_id_str,
            identity_id_str,
            recorded_at_str,
            m.subscribers,
            m.total_views,
            m.total_posts,
            ingested_at_str,
          ],
        )?;
        let raw = tx.query_row(
          &format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE identity_id = ?1 AND recorded_at = ?2"
          ),
          rusqlite::params![identity_id_str, recorded_at_str],
          RawSnapshot::from_row,
        )?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.into_snapshot()
  }

  async fn snapshot_exists(&self, identity_id: Uuid, recorded_at: NaiveDate) -> Result<bool> {
    let identity_id_str = encode_uuid(identity_id);
    let recorded_at_str = encode_date(recorded_at);

    self
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM snapshots WHERE identity_id = ?1 AND recorded_at = ?2",
              rusqlite::params![identity_id_str, recorded_at_str],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await
  }

  async fn list_snapshots(&self, query: &SnapshotQuery) -> Result<Vec<StatSnapshot>> {
    let identity_id_str = encode_uuid(query.identity_id);
    let from_str        = query.from.map(encode_date);
    let to_str          = query.to.map(encode_date);
    let limit_val       = sql_limit(query.limit);

    let raws: Vec<RawSnapshot> = self
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
           WHERE identity_id = ?1
             AND (?2 IS NULL OR recorded_at >= ?2)
             AND (?3 IS NULL OR recorded_at <= ?3)
           ORDER BY recorded_at
           LIMIT ?4"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![identity_id_str, from_str, to_str, limit_val],
            RawSnapshot::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSnapshot::into_snapshot).collect()
  }

  async fn scan_snapshots(&self, after: Option<Uuid>, limit: usize) -> Result<Vec<StatSnapshot>> {
    let after_str = after.map(encode_uuid);
    let limit_val = sql_limit(Some(limit));

    let raws: Vec<RawSnapshot> = self
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
           WHERE (?1 IS NULL OR snapshot_id > ?1)
           ORDER BY snapshot_id
           LIMIT ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![after_str, limit_val], RawSnapshot::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSnapshot::into_snapshot).collect()
  }

  async fn delete_snapshots(&self, ids: Vec<Uuid>) -> Result<usize> {
    let id_strs: Vec<String> = ids.into_iter().map(encode_uuid).collect();

    self
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
          let mut stmt = tx.prepare("DELETE FROM snapshots WHERE snapshot_id = ?1")?;
          for id in &id_strs {
            removed += stmt.execute(rusqlite::params![id])?;
          }
        }
        tx.commit()?;
        Ok(removed)
      })
      .await
  }

  async fn correct_snapshots(&self, corrections: Vec<SnapshotCorrection>) -> Result<usize> {
    let rows: Vec<(String, Option<i64>, Option<i64>, Option<i64>)> = corrections
      .into_iter()
      .map(|c| {
        (
          encode_uuid(c.snapshot_id),
          c.metrics.subscribers,
          c.metrics.total_views,
          c.metrics.total_posts,
        )
      })
      .collect();

    self
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
          let mut stmt = tx.prepare(
            "UPDATE snapshots
             SET subscribers = ?2, total_views = ?3, total_posts = ?4
             WHERE snapshot_id = ?1",
          )?;
          for (id, subscribers, views, posts) in &rows {
            changed += stmt.execute(rusqlite::params![id, subscribers, views, posts])?;
          }
        }
        tx.commit()?;
        Ok(changed)
      })
      .await
  }

  // ── Leases ────────────────────────────────────────────────────────────────

  async fn acquire_lease(&self, name: &str, holder: Uuid, ttl: Duration) -> Result<bool> {
    let name       = name.to_owned();
    let holder_str = encode_uuid(holder);
    let now        = Utc::now().timestamp_millis();
    let ttl_ms     = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    let expires_at = now.saturating_add(ttl_ms);

    self
      .call(move |conn| {
        let claimed = conn.execute(
          "INSERT INTO leases (name, holder, expires_at) VALUES (?1, ?2, ?3)
           ON CONFLICT (name) DO UPDATE SET
             holder = excluded.holder,
             expires_at = excluded.expires_at
           WHERE leases.holder = excluded.holder OR leases.expires_at <= ?4",
          rusqlite::params![name, holder_str, expires_at, now],
        )?;
        Ok(claimed == 1)
      })
      .await
  }

  async fn release_lease(&self, name: &str, holder: Uuid) -> Result<()> {
    let name       = name.to_owned();
    let holder_str = encode_uuid(holder);

    self
      .call(move |conn| {
        conn.execute(
          "DELETE FROM leases WHERE name = ?1 AND holder = ?2",
          rusqlite::params![name, holder_str],
        )?;
        Ok(())
      })
      .await
  }
}
