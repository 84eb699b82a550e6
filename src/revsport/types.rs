/// Types for boats, bookings and sync reports
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What kind of asset a register entry is.
///
/// The upstream has no explicit field for this; it is inferred from the
/// label pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoatCategory {
    /// A rowing boat (single, double, quad, eight)
    Rowing,
    /// A motorized support boat tracked alongside the rowing fleet
    Tinnie,
}

/// Rowing boat type, from the leading label token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoatType {
    #[serde(rename = "1X")]
    Single,
    #[serde(rename = "2X")]
    Double,
    #[serde(rename = "4X")]
    Quad,
    #[serde(rename = "8X")]
    Eight,
    /// No recognizable type token in the label. An explicit sentinel so
    /// callers always see "unknown" rather than a silent absence.
    Unknown,
}

impl BoatType {
    /// The display token for this type ("1X", "2X", ..., "Unknown").
    pub fn as_str(&self) -> &'static str {
        match self {
            BoatType::Single => "1X",
            BoatType::Double => "2X",
            BoatType::Quad => "4X",
            BoatType::Eight => "8X",
            BoatType::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for BoatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Usage tier of a rowing boat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    /// Race boats ("RACER" anywhere in the label)
    #[serde(rename = "R")]
    Racer,
    /// Race/training boats (standalone "RT" token)
    #[serde(rename = "RT")]
    RaceTraining,
    /// Training boats (the default)
    #[serde(rename = "T")]
    Training,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Racer => "R",
            Classification::RaceTraining => "RT",
            Classification::Training => "T",
        }
    }
}

/// One boat as scraped from the register page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Boat {
    /// The upstream's identifier, extracted from the calendar link.
    /// Stable across syncs; the natural key for upsert downstream.
    pub external_id: String,
    /// The untouched free-text label from the register page
    pub raw_label: String,
    pub category: BoatCategory,
    pub boat_type: BoatType,
    /// `None` for tinnies (not applicable) and for empty labels
    pub classification: Option<Classification>,
    /// Hull weight in kg, when the label carries one
    pub weight_kg: Option<u32>,
    /// Nickname from the last parenthesized group; empty when absent
    pub nickname: String,
    /// Whether the type token carried a `/+` or `/-` sweep suffix
    pub sweep_capable: bool,
    /// Label with type/classification/weight/nickname tokens stripped
    pub display_name: String,
    pub is_damaged: bool,
}

/// One raw calendar entry as returned by the upstream bookings endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBookingEntry {
    pub title: String,
    /// ISO-8601 datetime with timezone offset
    pub start: String,
    /// ISO-8601 datetime with timezone offset
    pub end: String,
}

/// A structured booking, scoped to one boat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub boat_external_id: String,
    /// Calendar date of the start instant, in its embedded offset
    pub date: NaiveDate,
    /// Wall-clock "HH:MM" of the start, in its embedded offset
    pub start_time: String,
    /// Wall-clock "HH:MM" of the end, in its embedded offset
    pub end_time: String,
    pub member_name: String,
    /// Matching configured session name, if the bounds match exactly
    pub session: Option<String>,
    /// False when the booking falls outside every configured session
    pub is_valid_session: bool,
}

/// Phase of a sync run, for logging and failure messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Authenticating,
    FetchingBoats,
    FetchingBookings,
    Done,
    Failed,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Authenticating => "authenticating",
            SyncPhase::FetchingBoats => "fetching-boats",
            SyncPhase::FetchingBookings => "fetching-bookings",
            SyncPhase::Done => "done",
            SyncPhase::Failed => "failed",
        }
    }
}

/// Aggregate result of one sync pass.
///
/// A sync counts as successful if login and the boat-list fetch
/// succeeded, even when some per-boat booking fetches failed; those are
/// surfaced through `warnings` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub boats: Vec<Boat>,
    pub bookings: Vec<Booking>,
    pub warnings: Vec<String>,
    /// Set only on total failure (login or boat-list fetch)
    pub error: Option<String>,
    /// Wall-clock duration of the sync pass
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl SyncResult {
    /// Builds a total-failure result carrying no data.
    pub fn failed(error: String, warnings: Vec<String>, duration: Duration) -> Self {
        Self {
            success: false,
            boats: Vec::new(),
            bookings: Vec::new(),
            warnings,
            error: Some(error),
            duration,
        }
    }

    pub fn boat_count(&self) -> usize {
        self.boats.len()
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    /// Bookings belonging to one boat, in fetch order.
    pub fn bookings_for(&self, external_id: &str) -> Vec<&Booking> {
        self.bookings
            .iter()
            .filter(|b| b.boat_external_id == external_id)
            .collect()
    }
}

/// Serializes `Duration` as integer milliseconds for downstream JSON.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
