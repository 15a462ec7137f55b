//! Timing recorder
//!
//! Records named spans with a wall-clock start and a monotonic duration.
//! The lifecycle opens one span per hook invocation (`"Did Load in app.rs"`)
//! plus an `"Application Start"` span covering startup.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A single recorded span
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingEntry {
    pub name: String,
    pub index: usize,
    pub pid: u32,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    #[serde(skip)]
    started: Instant,
}

impl TimingEntry {
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

#[derive(Default)]
struct TimingState {
    entries: Vec<TimingEntry>,
    open: HashMap<String, usize>,
}

/// Thread-safe span recorder
#[derive(Default)]
pub struct Timing {
    state: Mutex<TimingState>,
}

impl Timing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a span and return its index
    ///
    /// Starting a name that is already open closes the previous span first.
    pub fn start(&self, name: impl Into<String>) -> usize {
        let name = name.into();
        let mut state = self.lock();
        if let Some(index) = state.open.remove(&name) {
            close_entry(&mut state.entries[index]);
        }

        let index = state.entries.len();
        state.entries.push(TimingEntry {
            name: name.clone(),
            index,
            pid: std::process::id(),
            start: Utc::now(),
            end: None,
            duration_ms: None,
            started: Instant::now(),
        });
        state.open.insert(name, index);
        index
    }

    /// Close the open span called `name` and return its duration
    pub fn end(&self, name: &str) -> Option<Duration> {
        let mut state = self.lock();
        let index = state.open.remove(name)?;
        Some(close_entry(&mut state.entries[index]))
    }

    /// Snapshot of every span in start order
    pub fn entries(&self) -> Vec<TimingEntry> {
        self.lock().entries.clone()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.lock().entries)
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.open.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TimingState> {
        // Entries stay consistent even if a holder panicked mid-push.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn close_entry(entry: &mut TimingEntry) -> Duration {
    let elapsed = entry.started.elapsed();
    entry.end = Some(Utc::now());
    entry.duration_ms = Some(duration_ms(elapsed));
    elapsed
}

/// Whole milliseconds, saturating at `u64::MAX`
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_start_and_end_records_duration() {
        let timing = Timing::new();
        assert_eq!(timing.start("Did Load in app.rs"), 0);
        assert!(timing.entries()[0].is_open());

        std::thread::sleep(Duration::from_millis(5));
        let elapsed = timing.end("Did Load in app.rs").unwrap();

        assert!(elapsed >= Duration::from_millis(5));
        let entry = &timing.entries()[0];
        assert!(!entry.is_open());
        assert!(entry.duration_ms.unwrap() >= 5);
        assert!(timing.end("Did Load in app.rs").is_none());
    }

    #[test]
    fn test_restarting_open_span_closes_previous() {
        let timing = Timing::new();
        timing.start("Application Start");
        timing.start("Application Start");

        let entries = timing.entries();
        assert_eq!(entries.len(), 2);
        assert!(!entries[0].is_open());
        assert!(entries[1].is_open());
    }

    #[test]
    fn test_json_export_uses_camel_case() {
        let timing = Timing::new();
        timing.start("Will Ready in cache");
        timing.end("Will Ready in cache");

        let json = timing.to_json().unwrap();
        assert!(json.contains("\"name\":\"Will Ready in cache\""));
        assert!(json.contains("\"durationMs\""));
        assert!(!json.contains("started"));

        timing.clear();
        assert!(timing.entries().is_empty());
    }
}
