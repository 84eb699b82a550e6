//! One-shot sync runner.
//!
//! Reads the tenant configuration from the environment, runs a single
//! sync pass over the next seven days and logs the report. The full
//! SaaS deployment drives [`shedboard::revsport`] from its own API
//! layer; this binary exists for cron-style syncs and local debugging.

use anyhow::{Context, Result};
use shedboard::revsport::{
    ClubKey, RevSportClient, RevSportConfig, SessionConfig, SyncAdapter, SyncCoordinator,
    SyncWindow,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config_from_env()?;
    let sessions = load_sessions()?;

    let key = ClubKey::from_credentials(&config.base_url, &config.username);
    let client = RevSportClient::new(config)?;
    let adapter = SyncAdapter::new(client, sessions);
    let coordinator = SyncCoordinator::new();

    let window = SyncWindow::next_days(7);
    let result = coordinator
        .sync_with_cache(&key, &adapter, &window, true)
        .await?;

    for warning in &result.warnings {
        warn!(club = %key, "{warning}");
    }
    info!(
        club = %key,
        success = result.success,
        boats = result.boat_count(),
        bookings = result.booking_count(),
        duration_ms = result.duration.as_millis() as u64,
        "Sync finished"
    );

    if !result.success {
        anyhow::bail!(
            "sync failed: {}",
            result.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn config_from_env() -> Result<RevSportConfig> {
    let base_url =
        std::env::var("REVSPORT_BASE_URL").context("REVSPORT_BASE_URL must be set")?;
    let username =
        std::env::var("REVSPORT_USERNAME").context("REVSPORT_USERNAME must be set")?;
    let password =
        std::env::var("REVSPORT_PASSWORD").context("REVSPORT_PASSWORD must be set")?;
    let debug = std::env::var("REVSPORT_DEBUG").is_ok_and(|v| v == "1" || v == "true");

    Ok(RevSportConfig {
        debug,
        ..RevSportConfig::new(&base_url, &username, &password)
    })
}

fn load_sessions() -> Result<SessionConfig> {
    match std::env::var("SHEDBOARD_SESSIONS_FILE") {
        Ok(path) => {
            let path = PathBuf::from(path);
            SessionConfig::from_json_file(&path)
                .map_err(|e| anyhow::anyhow!("failed to load sessions from {path:?}: {e}"))
        }
        Err(_) => {
            info!("No SHEDBOARD_SESSIONS_FILE set; bookings will not be matched to sessions");
            Ok(SessionConfig::empty())
        }
    }
}
