//! The operating calendar.
//!
//! Every date-sensitive decision goes through a [`Clock`] fixed to one
//! documented UTC offset, never the ambient system zone.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset as _, Utc};

use crate::{Error, Result};

/// Source of calendar dates in the operating zone.
pub trait Clock: Send + Sync {
  /// Today's date in the operating zone.
  fn today(&self) -> NaiveDate;

  /// The calendar date of `at` in the operating zone.
  fn date_of(&self, at: DateTime<Utc>) -> NaiveDate;
}

/// Wall-clock dates in a fixed offset.
#[derive(Debug, Clone, Copy)]
pub struct ZonedClock {
  offset: FixedOffset,
}

impl ZonedClock {
  pub fn new(offset: FixedOffset) -> Self { Self { offset } }

  pub fn utc() -> Self { Self::new(utc_offset()) }

  /// Build from a configured zone: `UTC`, `Z`, or `±HH:MM`.
  pub fn from_config(zone: &str) -> Result<Self> { Ok(Self::new(parse_offset(zone)?)) }

  pub fn offset(&self) -> FixedOffset { self.offset }
}

impl Clock for ZonedClock {
  fn today(&self) -> NaiveDate { self.date_of(Utc::now()) }

  fn date_of(&self, at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&self.offset).date_naive()
  }
}

/// A clock pinned to one date. Observation timestamps are still mapped
/// through the offset.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
  pub today:  NaiveDate,
  pub offset: FixedOffset,
}

impl FixedClock {
  pub fn new(today: NaiveDate) -> Self { Self { today, offset: utc_offset() } }
}

impl Clock for FixedClock {
  fn today(&self) -> NaiveDate { self.today }

  fn date_of(&self, at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&self.offset).date_naive()
  }
}

fn utc_offset() -> FixedOffset { Utc.fix() }

/// Parse `UTC`, `Z`, or a `±HH:MM` / `±HHMM` offset.
pub fn parse_offset(zone: &str) -> Result<FixedOffset> {
  let trimmed = zone.trim();
  if trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("z") {
    return Ok(utc_offset());
  }

  let invalid = || Error::InvalidTimeZone(zone.to_owned());
  let (sign, rest) = match trimmed.as_bytes().first() {
    Some(b'+') => (1, &trimmed[1..]),
    Some(b'-') => (-1, &trimmed[1..]),
    _ => return Err(invalid()),
  };
  let digits: String = rest.chars().filter(|c| *c != ':').collect();
  if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
    return Err(invalid());
  }
  let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
  let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
  if minutes >= 60 {
    return Err(invalid());
  }
  FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}
