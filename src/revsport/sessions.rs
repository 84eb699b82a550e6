/// Configuration system for club-defined session windows
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One named session window (e.g. "morning1" = 06:30-07:30).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionWindow {
    pub name: String,
    /// Wall-clock start, "HH:MM"
    pub start: String,
    /// Wall-clock end, "HH:MM"
    pub end: String,
}

/// The set of session windows a club has configured.
///
/// Matching is exact string equality on both bounds; a booking that
/// merely overlaps a window does not belong to it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub sessions: Vec<SessionWindow>,
}

impl SessionConfig {
    /// Creates an empty configuration (no named sessions).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads session windows from a JSON file.
    ///
    /// # Arguments
    /// * `path` - Path to the sessions JSON file
    ///
    /// # Returns
    /// * `Ok(SessionConfig)` - Loaded configuration
    /// * `Err` - If the file doesn't exist or can't be parsed
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Parses session windows from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: SessionConfig = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Finds the session whose bounds exactly equal the given times.
    ///
    /// Both bounds must match; overlap or containment does not count.
    pub fn match_session(&self, start_time: &str, end_time: &str) -> Option<&str> {
        self.sessions
            .iter()
            .find(|w| w.start == start_time && w.end == end_time)
            .map(|w| w.name.as_str())
    }

    /// Gets a window by name.
    pub fn get(&self, name: &str) -> Option<&SessionWindow> {
        self.sessions.iter().find(|w| w.name == name)
    }
}
