//! shedboard - scraper and sync core for rowing club booking boards.
//!
//! Sources boat and booking data from a club's RevSport site via an
//! authenticated cookie session, normalizes the free-text boat labels
//! and calendar entries into structured records, and aggregates them
//! into per-sync reports for the persistence and display layers.

pub mod revsport;
