//! TTL-based caching and failure protection for sync results.
//!
//! Kiosk displays poll the board far more often than the upstream
//! should be scraped; the coordinator serves cached results inside a
//! TTL, shares one upstream sync among concurrent requests for the same
//! club, and stops hammering a broken upstream via a circuit breaker.

use super::error::RevSportError;
use super::sync::{generate_sync_id, SyncAdapter, SyncWindow};
use super::types::SyncResult;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// A cache/locking key for one club tenant.
///
/// Derived by hashing the tenant's base URL and username, so credential
/// material never sits in map keys.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct ClubKey(String);

impl ClubKey {
    pub fn from_credentials(base_url: &str, username: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(base_url.as_bytes());
        hasher.update(b"|");
        hasher.update(username.as_bytes());
        let result = hasher.finalize();
        // Use first 16 bytes as hex string
        let hash = hex::encode(&result[..16]);
        Self(hash)
    }

    /// Returns the internal hash string (for logging/debugging).
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClubKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only show first 8 chars for privacy
        write!(f, "{}...", &self.0[..8.min(self.0.len())])
    }
}

/// A cached sync result with metadata.
#[derive(Clone)]
struct CachedBoard {
    result: SyncResult,
    cached_at: Instant,
    ttl: Duration,
}

/// Thread-safe cache of successful sync results per club.
pub struct BoardCache {
    entries: DashMap<ClubKey, CachedBoard>,
    default_ttl: Duration,
}

impl BoardCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    /// Creates a cache with a 5-minute default TTL.
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(5 * 60))
    }

    /// Gets a cached result if it exists and hasn't expired.
    pub fn get(&self, key: &ClubKey) -> Option<SyncResult> {
        self.entries.get(key).and_then(|entry| {
            if entry.cached_at.elapsed() < entry.ttl {
                Some(entry.result.clone())
            } else {
                drop(entry);
                self.entries.remove(key);
                None
            }
        })
    }

    pub fn insert(&self, key: ClubKey, result: SyncResult) {
        self.insert_with_ttl(key, result, self.default_ttl);
    }

    pub fn insert_with_ttl(&self, key: ClubKey, result: SyncResult, ttl: Duration) {
        self.entries.insert(
            key,
            CachedBoard {
                result,
                cached_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn invalidate(&self, key: &ClubKey) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes expired entries. Call periodically for proactive cleanup.
    pub fn cleanup_expired(&self) {
        self.entries
            .retain(|_, entry| entry.cached_at.elapsed() < entry.ttl);
    }
}

impl Default for BoardCache {
    fn default() -> Self {
        Self::with_default_ttl()
    }
}

/// Circuit breaker for protecting against repeated sync failures.
pub struct CircuitBreaker {
    failure_count: std::sync::atomic::AtomicU32,
    last_failure: std::sync::Mutex<Option<Instant>>,
    threshold: u32,
    recovery_time: Duration,
}

impl CircuitBreaker {
    /// - `threshold`: failures before the breaker opens
    /// - `recovery_time`: how long to wait before allowing requests again
    pub fn new(threshold: u32, recovery_time: Duration) -> Self {
        Self {
            failure_count: std::sync::atomic::AtomicU32::new(0),
            last_failure: std::sync::Mutex::new(None),
            threshold,
            recovery_time,
        }
    }

    /// Default settings: 5 failures, 30s recovery.
    pub fn with_defaults() -> Self {
        Self::new(5, Duration::from_secs(30))
    }

    /// Returns true if the breaker is open (blocking syncs).
    pub fn is_open(&self) -> bool {
        let count = self
            .failure_count
            .load(std::sync::atomic::Ordering::Relaxed);
        if count < self.threshold {
            return false;
        }

        if let Ok(guard) = self.last_failure.lock() {
            if let Some(last) = *guard {
                if last.elapsed() > self.recovery_time {
                    drop(guard);
                    self.reset();
                    return false;
                }
            }
        }

        true
    }

    pub fn record_success(&self) {
        self.failure_count
            .store(0, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failure_count
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        if let Ok(mut guard) = self.last_failure.lock() {
            *guard = Some(Instant::now());
        }
    }

    pub fn reset(&self) {
        self.failure_count
            .store(0, std::sync::atomic::Ordering::Relaxed);
        if let Ok(mut guard) = self.last_failure.lock() {
            *guard = None;
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
            .load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Helper module for hex encoding (avoiding extra dependency).
mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Serving-path coordination: cache, breaker and per-club sync locks.
pub struct SyncCoordinator {
    pub cache: BoardCache,
    pub circuit_breaker: CircuitBreaker,
    /// Per-club locks so concurrent requests share one upstream sync
    sync_locks: DashMap<ClubKey, Arc<tokio::sync::Mutex<()>>>,
}

impl SyncCoordinator {
    pub fn new() -> Self {
        Self {
            cache: BoardCache::with_default_ttl(),
            circuit_breaker: CircuitBreaker::with_defaults(),
            sync_locks: DashMap::new(),
        }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            cache: BoardCache::new(ttl),
            circuit_breaker: CircuitBreaker::with_defaults(),
            sync_locks: DashMap::new(),
        }
    }

    /// Gets or creates the sync lock for a club.
    fn sync_lock(&self, key: &ClubKey) -> Arc<tokio::sync::Mutex<()>> {
        self.sync_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Serves a board for one club, syncing upstream only when needed.
    ///
    /// Order of checks mirrors the serving path: circuit breaker, cache,
    /// per-club lock, cache again (another request may have synced while
    /// we waited), then a real sync. Only successful results are cached;
    /// failed ones feed the breaker.
    pub async fn sync_with_cache(
        &self,
        key: &ClubKey,
        adapter: &SyncAdapter,
        window: &SyncWindow,
        force_refresh: bool,
    ) -> Result<SyncResult, RevSportError> {
        let request_id = generate_sync_id();

        if self.circuit_breaker.is_open() {
            warn!(
                request_id = %request_id,
                club = %key,
                "Circuit breaker is open, rejecting sync request"
            );
            return Err(RevSportError::CircuitBreakerOpen);
        }

        if !force_refresh {
            if let Some(cached) = self.cache.get(key) {
                info!(request_id = %request_id, club = %key, "Returning cached board");
                return Ok(cached);
            }
        }

        let lock = self.sync_lock(key);
        let _guard = lock.lock().await;

        if !force_refresh {
            if let Some(cached) = self.cache.get(key) {
                info!(
                    request_id = %request_id,
                    club = %key,
                    "Returning cached board (post-lock)"
                );
                return Ok(cached);
            }
        }

        let result = adapter.run(window).await;

        if result.success {
            self.circuit_breaker.record_success();
            self.cache.insert(key.clone(), result.clone());
        } else {
            self.circuit_breaker.record_failure();
        }

        Ok(result)
    }
}

impl Default for SyncCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
