//! Instants and mutation stamps.
//!
//! Records carry wall-clock RFC 3339 timestamps written by the application.
//! Conflict resolution compares a single stamp per record: `updatedAt`,
//! falling back to `createdAt`.

use chrono::{DateTime, Utc};

use crate::Error;

/// The last-mutation instant of a record, if it has one.
///
/// `None` orders before every `Some`, so a stamped record always beats an
/// unstamped one and two unstamped records tie.
pub type MutationStamp = Option<DateTime<Utc>>;

/// Parses an RFC 3339 instant, normalizing it to UTC.
///
/// The offset (`Z` or `±hh:mm`) is required; a bare local date-time is
/// rejected.
pub fn parse_instant(raw: &str) -> crate::Result<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidTimestamp("empty timestamp".to_string()));
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvalidTimestamp(format!("{trimmed}: {e}")))
}
