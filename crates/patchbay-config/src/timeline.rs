//! Timeline documents: tempo changes plus tick-stamped MIDI.
//!
//! ```json
//! {
//!   "ticksPerBeat": 480,
//!   "durationTicks": 1920,
//!   "tempo": [ { "tick": 0, "bpm": 120.0 }, { "tick": 960, "bpm": 90.0 } ],
//!   "events": [
//!     { "tick": 0, "message": { "type": "noteOn", "channel": 0, "note": 60, "velocity": 100 } },
//!     { "tick": 480, "message": { "type": "noteOff", "channel": 0, "note": 60 } }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use patchbay_core::{DEFAULT_TICKS_PER_BEAT, TempoChange, TempoMap, TimelineEvent};

use crate::error::ConfigError;

/// A playable timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineDocument {
    /// Ticks per quarter note.
    #[serde(default = "default_ticks_per_beat")]
    pub ticks_per_beat: u32,
    /// Explicit end of the timeline; the last event's tick when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ticks: Option<u64>,
    /// Tempo changes in any order.
    #[serde(default)]
    pub tempo: Vec<TempoChange>,
    /// Events in any order.
    #[serde(default)]
    pub events: Vec<TimelineEvent>,
}

fn default_ticks_per_beat() -> u32 {
    DEFAULT_TICKS_PER_BEAT
}

impl Default for TimelineDocument {
    fn default() -> Self {
        Self {
            ticks_per_beat: DEFAULT_TICKS_PER_BEAT,
            duration_ticks: None,
            tempo: Vec::new(),
            events: Vec::new(),
        }
    }
}

impl TimelineDocument {
    /// Parses a timeline, sorting events by tick.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let mut doc: Self = serde_json::from_str(json)?;
        if doc.ticks_per_beat == 0 {
            return Err(ConfigError::invalid("ticksPerBeat", "must be at least 1"));
        }
        if let Some(bad) = doc.tempo.iter().find(|c| !(c.bpm.is_finite() && c.bpm > 0.0)) {
            return Err(ConfigError::invalid(
                "tempo",
                format!("bpm at tick {} must be positive, got {}", bad.tick, bad.bpm),
            ));
        }
        doc.events.sort_by_key(|e| e.tick);
        Ok(doc)
    }

    /// Reads and parses a timeline file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_json(&json)
    }

    /// Writes the timeline as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| ConfigError::write_file(path, e))
    }

    /// Length of the timeline in ticks.
    pub fn duration_ticks(&self) -> u64 {
        self.duration_ticks
            .unwrap_or_else(|| self.events.iter().map(|e| e.tick).max().unwrap_or(0))
    }

    /// Tempo map for this timeline.
    ///
    /// `default_bpm` covers the span before the first change.
    pub fn tempo_map(&self, default_bpm: f64, multiplier: f64) -> TempoMap {
        TempoMap::with_default_bpm(&self.tempo, self.ticks_per_beat, multiplier, default_bpm)
    }
}
