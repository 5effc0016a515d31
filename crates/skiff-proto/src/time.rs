//! Message timestamps.
//!
//! The server emits ISO-8601 strings that sometimes lack an explicit UTC
//! offset. Both forms must normalize to the same instant before any
//! comparison, so parsing is centralized here and the rest of the codebase
//! only ever sees UTC.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

/// A UTC timestamp with lenient ISO-8601 parsing.
///
/// Comparison and equality operate on the normalized UTC instant, so
/// `"2024-01-01T12:00:00"` and `"2024-01-01T12:00:00Z"` are the same
/// [`Timestamp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

/// Failure to parse an ISO-8601 timestamp string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid timestamp {input:?}: {source}")]
pub struct TimestampError {
    /// The string that failed to parse.
    pub input: String,
    /// Underlying parse error.
    #[source]
    pub source: chrono::ParseError,
}

impl Timestamp {
    /// Parse an ISO-8601 string, accepting both offset-carrying RFC 3339
    /// and naive (offset-less) forms. Naive timestamps are taken as UTC.
    pub fn parse(input: &str) -> Result<Self, TimestampError> {
        if let Ok(aware) = DateTime::parse_from_rfc3339(input) {
            return Ok(Self(aware.with_timezone(&Utc)));
        }

        NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Self(naive.and_utc()))
            .map_err(|source| TimestampError { input: input.to_owned(), source })
    }

    /// Construct from an already-normalized UTC instant.
    pub fn from_utc(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }

    /// The normalized UTC instant.
    pub fn as_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(de::Error::custom)
    }
}
