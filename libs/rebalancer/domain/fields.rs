//! Serde field adapters for persisted state documents.
//!
//! State files written by earlier agent versions carry naive ISO-8601
//! timestamps (no offset) and checksummed addresses, so both are accepted on
//! read. New documents are always written as RFC 3339 UTC.

use chrono::{DateTime, NaiveDateTime, Utc};
use ethers::types::Address;
use ethers::utils::to_checksum;
use serde::{de, Deserialize, Deserializer, Serializer};

/// Parse an ISO-8601 timestamp, treating offset-less values as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(_) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|naive| naive.and_utc()),
    }
}

pub mod iso8601 {
    use super::*;

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw).map_err(de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => serializer.serialize_some(&dt.to_rfc3339()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| parse_timestamp(&raw).map_err(de::Error::custom))
                .transpose()
        }
    }
}

/// EIP-55 checksummed address strings.
pub mod checksummed {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Address, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_checksum(value, None))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<Address>().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_rfc3339() {
        let dt = parse_timestamp("2025-03-01T23:30:00+02:00").unwrap();
        assert_eq!(dt.day(), 1);
        assert_eq!(dt.hour(), 21);
    }

    #[test]
    fn test_parse_naive_legacy_timestamp() {
        let dt = parse_timestamp("2025-03-01T12:00:00.123456").unwrap();
        assert_eq!(dt.hour(), 12);
        assert_eq!(dt.nanosecond(), 123_456_000);

        let whole = parse_timestamp("2025-03-01T12:00:00").unwrap();
        assert_eq!(whole.second(), 0);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
    }
}
