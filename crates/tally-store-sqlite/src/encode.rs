//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, calendar dates as
//! `YYYY-MM-DD` (so string order is date order), and UUIDs as hyphenated
//! lowercase strings.

use chrono::{DateTime, NaiveDate, Utc};
use tally_core::{
  identity::{CreatorIdentity, Platform},
  snapshot::{Metrics, StatSnapshot},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ────────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Platform ─────────────────────────────────────────────────────────────────

pub fn encode_platform(p: Platform) -> &'static str {
  match p {
    Platform::Youtube => "youtube",
    Platform::Twitch => "twitch",
    Platform::Kick => "kick",
    Platform::Instagram => "instagram",
    Platform::Bluesky => "bluesky",
    Platform::Tiktok => "tiktok",
  }
}

pub fn decode_platform(s: &str) -> Result<Platform> { Ok(Platform::parse(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

pub const IDENTITY_COLUMNS: &str =
  "identity_id, platform, platform_id, username, display_name, created_at";

/// Raw strings read directly from an `identities` row.
pub struct RawIdentity {
  pub identity_id:  String,
  pub platform:     String,
  pub platform_id:  String,
  pub username:     String,
  pub display_name: Option<String>,
  pub created_at:   String,
}

impl RawIdentity {
  /// Read the columns listed in [`IDENTITY_COLUMNS`], in order.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      identity_id:  row.get(0)?,
      platform:     row.get(1)?,
      platform_id:  row.get(2)?,
      username:     row.get(3)?,
      display_name: row.get(4)?,
      created_at:   row.get(5)?,
    })
  }

  pub fn into_identity(self) -> Result<CreatorIdentity> {
    Ok(CreatorIdentity {
      identity_id:  decode_uuid(&self.identity_id)?,
      platform:     decode_platform(&self.platform)?,
      platform_id:  self.platform_id,
      username:     self.username,
      display_name: self.display_name,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

pub const SNAPSHOT_COLUMNS: &str =
  "snapshot_id, identity_id, recorded_at, subscribers, total_views, total_posts, ingested_at";

/// Raw values read directly from a `snapshots` row.
pub struct RawSnapshot {
  pub snapshot_id: String,
  pub identity_id: String,
  pub recorded_at: String,
  pub subscribers: Option<i64>,
  pub total_views: Option<i64>,
  pub total_posts: Option<i64>,
  pub ingested_at: String,
}

impl RawSnapshot {
  /// Read the columns listed in [`SNAPSHOT_COLUMNS`], in order.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      snapshot_id: row.get(0)?,
      identity_id: row.get(1)?,
      recorded_at: row.get(2)?,
      subscribers: row.get(3)?,
      total_views: row.get(4)?,
      total_posts: row.get(5)?,
      ingested_at: row.get(6)?,
    })
  }

  pub fn into_snapshot(self) -> Result<StatSnapshot> {
    Ok(StatSnapshot {
      snapshot_id: decode_uuid(&self.snapshot_id)?,
      identity_id: decode_uuid(&self.identity_id)?,
      recorded_at: decode_date(&self.recorded_at)?,
      metrics:     Metrics {
        subscribers: self.subscribers,
        total_views: self.total_views,
        total_posts: self.total_posts,
      },
      ingested_at: decode_dt(&self.ingested_at)?,
    })
  }
}
