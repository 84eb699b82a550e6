//! Sync adapter: coordinates the full fetch cycle.
//!
//! One run walks `authenticating -> fetching-boats -> fetching-bookings`
//! and produces a [`SyncResult`]. Login and boat-list failures fail the
//! whole run; per-boat booking failures are contained and reported as
//! warnings, since partial results are preferable to total failure.

use super::boat::parse_register_page;
use super::booking::{parse_bookings, parse_calendar_payload};
use super::client::RevSportClient;
use super::error::RevSportError;
use super::sessions::SessionConfig;
use super::types::{Boat, Booking, SyncPhase, SyncResult};
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Path of the boat register page.
const BOATS_PATH: &str = "/registers/boats";

/// Options controlling sync batching.
///
/// The fixed batch size and inter-batch delay are static backpressure
/// against the upstream; there is no dynamic rate adaptation.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Boats fetched concurrently per batch
    pub batch_size: usize,
    /// Pause between consecutive batches
    pub batch_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_delay: Duration::from_millis(500),
        }
    }
}

/// The date window bookings are fetched for.
#[derive(Debug, Clone)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// A window from now to `days` days ahead.
    pub fn next_days(days: i64) -> Self {
        let now = Utc::now();
        Self {
            start: now,
            end: now + chrono::Duration::days(days),
        }
    }
}

/// Orchestrates login, boat-list fetch and batched booking fetches.
pub struct SyncAdapter {
    client: RevSportClient,
    sessions: SessionConfig,
    options: SyncOptions,
}

impl SyncAdapter {
    pub fn new(client: RevSportClient, sessions: SessionConfig) -> Self {
        Self::with_options(client, sessions, SyncOptions::default())
    }

    pub fn with_options(
        client: RevSportClient,
        sessions: SessionConfig,
        options: SyncOptions,
    ) -> Self {
        Self {
            client,
            sessions,
            options,
        }
    }

    /// Runs one full sync pass. Never rejects: total failure is encoded
    /// in the returned result's `success`/`error` fields.
    pub async fn run(&self, window: &SyncWindow) -> SyncResult {
        let sync_id = generate_sync_id();
        let started = Instant::now();

        info!(
            sync_id = %sync_id,
            phase = SyncPhase::Authenticating.as_str(),
            "Starting sync"
        );
        if let Err(e) = self.client.login().await {
            return fail(&sync_id, SyncPhase::Authenticating, &e, started);
        }

        info!(
            sync_id = %sync_id,
            phase = SyncPhase::FetchingBoats.as_str(),
            "Fetching boat register"
        );
        let page = match self.client.get_text(BOATS_PATH).await {
            Ok(page) => page,
            Err(e) => return fail(&sync_id, SyncPhase::FetchingBoats, &e, started),
        };
        let boats = parse_register_page(&page);
        info!(sync_id = %sync_id, boats = boats.len(), "Parsed boat register");

        info!(
            sync_id = %sync_id,
            phase = SyncPhase::FetchingBookings.as_str(),
            batch_size = self.options.batch_size,
            "Fetching bookings"
        );
        let mut bookings = Vec::new();
        let mut warnings = Vec::new();

        let batch_size = self.options.batch_size.max(1);
        for (index, batch) in boats.chunks(batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.options.batch_delay).await;
            }

            let fetches = batch
                .iter()
                .map(|boat| self.fetch_boat_bookings(boat, window));
            for outcome in futures::future::join_all(fetches).await {
                match outcome {
                    Ok(batch_bookings) => bookings.extend(batch_bookings),
                    Err(warning) => warnings.push(warning),
                }
            }
        }

        info!(
            sync_id = %sync_id,
            phase = SyncPhase::Done.as_str(),
            boats = boats.len(),
            bookings = bookings.len(),
            warnings = warnings.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Sync completed"
        );

        SyncResult {
            success: true,
            boats,
            bookings,
            warnings,
            error: None,
            duration: started.elapsed(),
        }
    }

    /// Fetches and parses one boat's bookings.
    ///
    /// Fault-isolated: any failure becomes a warning string and an
    /// empty booking list for this boat, never an aborted sync.
    async fn fetch_boat_bookings(
        &self,
        boat: &Boat,
        window: &SyncWindow,
    ) -> Result<Vec<Booking>, String> {
        let path = format!(
            "{}/{}/bookings?start={}&end={}",
            BOATS_PATH,
            boat.external_id,
            window.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            window.end.to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        match self.client.get_json::<serde_json::Value>(&path).await {
            Ok(payload) => {
                let entries = parse_calendar_payload(&payload);
                Ok(parse_bookings(&boat.external_id, &entries, &self.sessions))
            }
            Err(e) => {
                warn!(
                    boat_id = %boat.external_id,
                    error = %e,
                    "Booking fetch failed for boat; continuing"
                );
                Err(format!(
                    "Failed to fetch bookings for boat {} ({}): {}",
                    boat.external_id, boat.display_name, e
                ))
            }
        }
    }
}

fn fail(sync_id: &str, phase: SyncPhase, err: &RevSportError, started: Instant) -> SyncResult {
    error!(
        sync_id = %sync_id,
        phase = phase.as_str(),
        error = %err,
        duration_ms = started.elapsed().as_millis() as u64,
        "Sync failed"
    );
    SyncResult::failed(
        format!("{} failed: {}", phase.as_str(), err),
        Vec::new(),
        started.elapsed(),
    )
}

/// Generates a unique id for correlating one sync run's log lines.
pub(crate) fn generate_sync_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    let random: u32 = rand::thread_rng().gen();
    format!("{:x}-{:08x}", timestamp & 0xFFFFFFFF, random)
}
