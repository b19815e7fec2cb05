// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt::Display;
use std::fmt::Formatter;

use chrono::Duration;
use chrono::NaiveDateTime;
use chrono::SubsecRound;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ErrorReport;

const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// A timestamp without a timezone and millisecond precision.
///
/// The string form sorts lexicographically in chronological order, which the
/// stores rely on when comparing due dates.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    pub fn new(ndt: NaiveDateTime) -> Self {
        Self(ndt.trunc_subsecs(3))
    }

    /// Converts a timestamp into a `NaiveDateTime`.
    pub fn into_inner(self) -> NaiveDateTime {
        self.0
    }

    /// The current timestamp in the user's local time.
    #[cfg(feature = "clock")]
    pub fn now() -> Self {
        Self(chrono::Local::now().naive_local().trunc_subsecs(3))
    }

    /// This timestamp moved forward by a whole number of days.
    pub fn plus_days(self, days: i64) -> Self {
        Self(self.0 + Duration::days(days))
    }

    /// Milliseconds elapsed from `earlier` to this timestamp, or zero if
    /// `earlier` is in the future.
    pub fn millis_since(self, earlier: Timestamp) -> u64 {
        let elapsed = (self.0 - earlier.0).num_milliseconds();
        u64::try_from(elapsed).unwrap_or(0)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(FORMAT))
    }
}

impl TryFrom<String> for Timestamp {
    type Error = ErrorReport;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let ndt = NaiveDateTime::parse_from_str(&value, FORMAT)
            .map_err(|_| ErrorReport::new(format!("Failed to parse timestamp: '{value}'.")))?;
        Ok(Timestamp(ndt))
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> String {
        ts.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, FORMAT).unwrap()
    }

    #[test]
    fn test_timestamp_to_string() {
        let ts = Timestamp(parse("2023-10-05T14:30:15.123"));
        assert_eq!(ts.to_string(), "2023-10-05T14:30:15.123");
    }

    #[test]
    fn test_try_from_invalid_string() {
        let err = Timestamp::try_from("yesterday".to_string()).unwrap_err();
        assert_eq!(err.message(), "Failed to parse timestamp: 'yesterday'.");
    }

    #[test]
    fn test_deserialize() {
        let ts: Timestamp = serde_json::from_str("\"2023-10-05T14:30:15.123\"").unwrap();
        assert_eq!(ts.0, parse("2023-10-05T14:30:15.123"));
    }

    #[test]
    fn test_string_order_matches_time_order() {
        let earlier = Timestamp(parse("2023-09-30T23:59:59.999"));
        let later = Timestamp(parse("2023-10-01T00:00:00.000"));
        assert!(earlier < later);
        assert!(earlier.to_string() < later.to_string());
    }

    #[test]
    fn test_plus_days_and_millis_since() {
        let start = Timestamp(parse("2024-01-01T12:00:00.000"));
        let end = start.plus_days(6);
        assert_eq!(end.to_string(), "2024-01-07T12:00:00.000");
        assert_eq!(end.millis_since(start), 6 * 24 * 60 * 60 * 1000);
        assert_eq!(start.millis_since(end), 0);
    }
}
