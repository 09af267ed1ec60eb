//! oneM2M compact timestamps (`ct`, `lt`, `et`).
//!
//! The wire format is the compact ISO-like form oneM2M uses:
//! `yyyyMMddTHHmmss,ffffff`. Internally we keep a `chrono::DateTime<Utc>` so
//! comparisons (`et < now`) stay cheap; [`CseTime`] serializes to and parses
//! from the compact string so event payloads and announced shadows carry the
//! same representation a wire client would see.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A oneM2M timestamp (`ct`, `lt`, or `et`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CseTime(DateTime<Utc>);

impl CseTime {
    /// The current time.
    pub fn now() -> Self {
        CseTime(Utc::now())
    }

    /// Construct from a `chrono::DateTime<Utc>`.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        CseTime(dt)
    }

    /// `now() + offset`, used to compute a default `et` from a relative
    /// expiration delta.
    pub fn now_plus(offset: Duration) -> Self {
        CseTime(Utc::now() + offset)
    }

    /// The underlying `chrono` value.
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Whether this timestamp is in the past relative to `now`.
    pub fn is_expired_at(&self, now: CseTime) -> bool {
        self.0 < now.0
    }

    /// Render in the compact oneM2M wire format.
    pub fn to_compact(&self) -> String {
        self.0.format("%Y%m%dT%H%M%S,%6f").to_string()
    }

    /// Parse the compact oneM2M wire format.
    pub fn parse_compact(s: &str) -> Result<Self, chrono::ParseError> {
        let normalized = s.replacen(',', ".", 1);
        let dt = chrono::NaiveDateTime::parse_from_str(&normalized, "%Y%m%dT%H%M%S%.f")?;
        Ok(CseTime(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)))
    }
}

impl fmt::Display for CseTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_compact())
    }
}

impl Serialize for CseTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_compact())
    }
}

impl<'de> Deserialize<'de> for CseTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CseTime::parse_compact(&s).map_err(serde::de::Error::custom)
    }
}
