//! Timestamp column helpers.
//!
//! All timestamps are written as RFC 3339 UTC strings, so string
//! comparison in SQL matches chronological order. Parsing also accepts
//! the `YYYY-MM-DD HH:MM:SS` form produced by SQLite's `datetime('now')`
//! for databases touched by other tooling.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::pool::{DbError, DbResult};

/// Format a timestamp for storage.
pub fn to_column(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

/// Parse a stored timestamp.
pub fn parse(raw: &str) -> DbResult<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| DbError::CorruptValue(format!("unparseable timestamp: {}", raw)))
}

/// Parse an optional stored timestamp.
pub fn parse_opt(raw: Option<String>) -> DbResult<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_formats() {
        let now = Utc::now();
        let round_tripped = parse(&to_column(now)).unwrap();
        assert_eq!(round_tripped.timestamp(), now.timestamp());

        assert!(parse("2026-07-01 12:30:00").is_ok());
        assert!(parse("not a timestamp").is_err());
    }
}
