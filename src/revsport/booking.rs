//! Calendar payload and booking parsing.
//!
//! The upstream calendar endpoint returns a JSON array of
//! `{title, start, end}` entries, where start/end are ISO-8601 datetimes
//! carrying the club's timezone offset. Dates and wall-clock times are
//! derived in that embedded offset, never reinterpreted into another
//! timezone.

use super::sessions::SessionConfig;
use super::types::{Booking, RawBookingEntry};
use chrono::DateTime;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::warn;

static BOOKED_BY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*booked by\s+").unwrap());

/// A calendar entry that could not be turned into a booking.
#[derive(Debug, Error)]
pub enum BookingParseError {
    #[error("invalid start timestamp '{value}': {source}")]
    InvalidStart {
        value: String,
        source: chrono::ParseError,
    },
    #[error("invalid end timestamp '{value}': {source}")]
    InvalidEnd {
        value: String,
        source: chrono::ParseError,
    },
}

/// Extracts the entries from a calendar response payload.
///
/// The upstream occasionally returns an object (an error page rendered
/// as JSON, or an empty map) instead of an array; that is treated as
/// "no bookings", not as an error. Individual elements that don't match
/// the expected shape are skipped.
pub fn parse_calendar_payload(payload: &serde_json::Value) -> Vec<RawBookingEntry> {
    let Some(items) = payload.as_array() else {
        warn!("Calendar payload is not an array; treating as no bookings");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping malformed calendar entry");
                None
            }
        })
        .collect()
}

/// Transforms one raw calendar entry into a structured booking.
///
/// Pure: the same entry always yields the same booking. The member name
/// is the title with a leading "Booked by " prefix removed
/// (case-insensitive); a title without the prefix is kept as-is.
pub fn parse_booking(
    boat_external_id: &str,
    entry: &RawBookingEntry,
    sessions: &SessionConfig,
) -> Result<Booking, BookingParseError> {
    let start = DateTime::parse_from_rfc3339(&entry.start).map_err(|source| {
        BookingParseError::InvalidStart {
            value: entry.start.clone(),
            source,
        }
    })?;
    let end =
        DateTime::parse_from_rfc3339(&entry.end).map_err(|source| BookingParseError::InvalidEnd {
            value: entry.end.clone(),
            source,
        })?;

    let start_time = start.format("%H:%M").to_string();
    let end_time = end.format("%H:%M").to_string();
    let session = sessions
        .match_session(&start_time, &end_time)
        .map(|name| name.to_string());

    Ok(Booking {
        boat_external_id: boat_external_id.to_string(),
        date: start.date_naive(),
        start_time,
        end_time,
        member_name: member_name_from_title(&entry.title),
        is_valid_session: session.is_some(),
        session,
    })
}

/// Parses all entries for one boat, absorbing per-entry anomalies.
///
/// Entries with unparseable timestamps are logged and skipped; they
/// never abort the rest of the boat's bookings.
pub fn parse_bookings(
    boat_external_id: &str,
    entries: &[RawBookingEntry],
    sessions: &SessionConfig,
) -> Vec<Booking> {
    entries
        .iter()
        .filter_map(
            |entry| match parse_booking(boat_external_id, entry, sessions) {
                Ok(booking) => Some(booking),
                Err(e) => {
                    warn!(boat_id = %boat_external_id, error = %e, "Skipping unparseable booking");
                    None
                }
            },
        )
        .collect()
}

fn member_name_from_title(title: &str) -> String {
    BOOKED_BY_REGEX.replace(title, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sessions() -> SessionConfig {
        SessionConfig::from_json_str(
            r#"{"sessions": [{"name": "morning1", "start": "06:30", "end": "07:30"}]}"#,
        )
        .unwrap()
    }

    fn entry(title: &str, start: &str, end: &str) -> RawBookingEntry {
        RawBookingEntry {
            title: title.to_string(),
            start: start.to_string(),
            end: end.to_string(),
        }
    }

    #[test]
    fn test_standard_booking_matches_session() {
        let raw = entry(
            "Booked by John Smith",
            "2025-11-21T06:30:00+11:00",
            "2025-11-21T07:30:00+11:00",
        );
        let booking = parse_booking("7", &raw, &sessions()).unwrap();

        assert_eq!(booking.date, NaiveDate::from_ymd_opt(2025, 11, 21).unwrap());
        assert_eq!(booking.start_time, "06:30");
        assert_eq!(booking.end_time, "07:30");
        assert_eq!(booking.member_name, "John Smith");
        assert_eq!(booking.session.as_deref(), Some("morning1"));
        assert!(booking.is_valid_session);
    }

    #[test]
    fn test_overlapping_booking_matches_no_session() {
        let raw = entry(
            "Booked by Jane Doe",
            "2025-11-21T06:45:00+11:00",
            "2025-11-21T07:45:00+11:00",
        );
        let booking = parse_booking("7", &raw, &sessions()).unwrap();

        assert_eq!(booking.session, None);
        assert!(!booking.is_valid_session);
    }

    #[test]
    fn test_title_without_prefix_kept_verbatim() {
        let raw = entry(
            "Maintenance block",
            "2025-11-21T09:00:00+11:00",
            "2025-11-21T10:00:00+11:00",
        );
        let booking = parse_booking("7", &raw, &sessions()).unwrap();
        assert_eq!(booking.member_name, "Maintenance block");
    }

    #[test]
    fn test_prefix_strip_is_case_insensitive() {
        let raw = entry(
            "BOOKED BY jane doe",
            "2025-11-21T09:00:00+11:00",
            "2025-11-21T10:00:00+11:00",
        );
        let booking = parse_booking("7", &raw, &sessions()).unwrap();
        assert_eq!(booking.member_name, "jane doe");
    }

    #[test]
    fn test_times_stay_in_embedded_offset() {
        // A negative-offset booking keeps its local date and wall-clock
        // time; nothing is converted to UTC.
        let raw = entry(
            "Booked by Al",
            "2025-01-05T22:30:00-05:00",
            "2025-01-05T23:30:00-05:00",
        );
        let booking = parse_booking("7", &raw, &sessions()).unwrap();
        assert_eq!(booking.date, NaiveDate::from_ymd_opt(2025, 1, 5).unwrap());
        assert_eq!(booking.start_time, "22:30");
        assert_eq!(booking.end_time, "23:30");
    }

    #[test]
    fn test_invalid_timestamp_is_an_error() {
        let raw = entry("Booked by Al", "not-a-date", "2025-01-05T23:30:00-05:00");
        assert!(parse_booking("7", &raw, &sessions()).is_err());
    }

    #[test]
    fn test_parse_bookings_skips_bad_entries() {
        let entries = vec![
            entry(
                "Booked by Al",
                "2025-11-21T06:30:00+11:00",
                "2025-11-21T07:30:00+11:00",
            ),
            entry("Booked by Bo", "garbage", "2025-11-21T07:30:00+11:00"),
        ];
        let bookings = parse_bookings("7", &entries, &sessions());
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].member_name, "Al");
    }

    #[test]
    fn test_non_array_payload_is_no_bookings() {
        let payload = serde_json::json!({"error": "boat not found"});
        assert!(parse_calendar_payload(&payload).is_empty());
    }

    #[test]
    fn test_array_payload_with_one_malformed_entry() {
        let payload = serde_json::json!([
            {"title": "Booked by Al", "start": "2025-11-21T06:30:00+11:00", "end": "2025-11-21T07:30:00+11:00"},
            {"unexpected": true}
        ]);
        let entries = parse_calendar_payload(&payload);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Booked by Al");
    }

    #[test]
    fn test_booking_parse_is_idempotent() {
        let raw = entry(
            "Booked by John Smith",
            "2025-11-21T06:30:00+11:00",
            "2025-11-21T07:30:00+11:00",
        );
        let a = parse_booking("7", &raw, &sessions()).unwrap();
        let b = parse_booking("7", &raw, &sessions()).unwrap();
        assert_eq!(a, b);
    }
}
