//! RevSport upstream scraping subsystem.
//!
//! Everything needed to turn one club's RevSport site into structured
//! board data: the authenticated session client, the boat/booking
//! parsers, the sync adapter that orchestrates a full fetch cycle, and
//! the caching/coordination layer the serving path sits on.

mod boat;
mod booking;
mod cache;
mod client;
mod error;
mod sessions;
mod sync;
mod types;

pub use boat::{is_damaged, parse_label, parse_register_page, ParsedLabel};
pub use booking::{parse_booking, parse_bookings, parse_calendar_payload, BookingParseError};
pub use cache::{BoardCache, CircuitBreaker, ClubKey, SyncCoordinator};
pub use client::{RevSportClient, RevSportConfig};
pub use error::RevSportError;
pub use sessions::{SessionConfig, SessionWindow};
pub use sync::{SyncAdapter, SyncOptions, SyncWindow};
pub use types::{
    Boat, BoatCategory, BoatType, Booking, Classification, RawBookingEntry, SyncPhase, SyncResult,
};
