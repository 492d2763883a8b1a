//! Timestamp column encoding.
//!
//! Instants are stored as fixed-width RFC 3339 UTC text with microsecond
//! precision, so string comparison orders them chronologically and
//! `strftime` can read them.

use chrono::{DateTime, SecondsFormat};

use fieldhub_domain::time::Timestamp;

use crate::error::decode_error;

pub(crate) fn encode(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode(value: &str) -> Result<Timestamp, sqlx::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.to_utc())
        .map_err(decode_error)
}

pub(crate) fn decode_opt(value: Option<String>) -> Result<Option<Timestamp>, sqlx::Error> {
    value.as_deref().map(decode).transpose()
}
