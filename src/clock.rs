//! Reference time that conversions align the first CSV row against.
//!
//! The reference time lives in memory only and starts out as the moment the
//! clock was created (normally process start). It is not persisted across
//! restarts.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use log::debug;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ClockError {
    #[error("invalid timestamp {0:?}: {1}")]
    InvalidTimestamp(String, chrono::ParseError),
}

/// Holds the target start time shared by every in-flight conversion.
///
/// Readers get a consistent snapshot; concurrent writers race and the last
/// one wins.
#[derive(Debug)]
pub struct ReferenceClock {
    reference: RwLock<DateTime<Utc>>,
}

impl Default for ReferenceClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl ReferenceClock {
    pub fn new(initial: DateTime<Utc>) -> Self {
        Self {
            reference: RwLock::new(initial),
        }
    }

    /// Get the current reference time.
    pub fn get(&self) -> DateTime<Utc> {
        *self
            .reference
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the reference time.
    pub fn set(&self, reference: DateTime<Utc>) {
        *self
            .reference
            .write()
            .unwrap_or_else(PoisonError::into_inner) = reference;
    }

    /// Parse `value` with [`parse_reference_time`] and store it. On failure
    /// the stored reference time is left untouched.
    pub fn set_from_str(&self, value: &str) -> Result<DateTime<Utc>, ClockError> {
        let reference = parse_reference_time(value)?;
        debug!("setting new reference time: {}", format_instant(&reference));
        self.set(reference);
        Ok(reference)
    }
}

/// Parse an ISO 8601 instant such as `2024-01-01T00:00:00.000Z` or
/// `2024-01-01T02:00:00+02:00`. Seconds may be left out
/// (`2024-01-01T00:00Z`).
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, ClockError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|err| parse_without_seconds(value).ok_or(err))
        .map_err(|err| ClockError::InvalidTimestamp(value.to_string(), err))
}

fn parse_without_seconds(value: &str) -> Option<DateTime<Utc>> {
    match value.strip_suffix(['Z', 'z']) {
        Some(naive) => NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M")
            .ok()
            .map(|dt| dt.and_utc()),
        None => DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M%:z")
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

/// Like [`parse_instant`], but a timestamp without a UTC designator (e.g.
/// `2024-01-01T00:00:00.000`, as browsers' `toISOString().slice(0, 23)`
/// produce) is read as UTC by appending `Z`.
pub fn parse_reference_time(value: &str) -> Result<DateTime<Utc>, ClockError> {
    let value = value.trim();
    match parse_instant(value) {
        Ok(dt) => Ok(dt),
        Err(err) if value.ends_with(['Z', 'z']) => Err(err),
        Err(err) => parse_instant(&format!("{value}Z")).map_err(|_| err),
    }
}

/// Canonical text form of an instant: RFC 3339 in UTC with a `Z` suffix.
/// Fractional seconds are only written when non-zero, in groups of three
/// digits.
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
