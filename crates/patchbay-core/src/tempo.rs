//! Tempo maps: piecewise-linear conversion between ticks and seconds.
//!
//! A [`TempoMap`] is built once from a sorted list of [`TempoChange`]s and a
//! tempo multiplier. Each breakpoint stores the tick where a tempo takes
//! effect, the cumulative real time at that tick, and the local seconds per
//! tick. Conversions binary-search the breakpoint list and interpolate
//! linearly inside the containing segment, so [`TempoMap::tick_to_seconds`]
//! and [`TempoMap::seconds_to_tick`] are exact inverses up to floating-point
//! rounding.
//!
//! # Example
//!
//! ```rust
//! use patchbay_core::tempo::{TempoChange, TempoMap};
//!
//! // 120 BPM for one beat, then 60 BPM.
//! let map = TempoMap::new(
//!     &[TempoChange::new(0, 120.0), TempoChange::new(480, 60.0)],
//!     480,
//!     1.0,
//! );
//! assert!((map.tick_to_seconds(480.0) - 0.5).abs() < 1e-12);
//! assert!((map.tick_to_seconds(960.0) - 1.5).abs() < 1e-12);
//! assert!((map.seconds_to_tick(1.0) - 720.0).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};

/// Tempo used when no change is declared at tick 0.
pub const DEFAULT_BPM: f64 = 120.0;

/// Ticks per quarter note used when none is given.
pub const DEFAULT_TICKS_PER_BEAT: u32 = 480;

/// A tempo change taking effect at `tick`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TempoChange {
    /// Tick position where the tempo takes effect.
    pub tick: u64,
    /// Beats per minute from this tick on.
    pub bpm: f64,
}

impl TempoChange {
    /// Creates a tempo change.
    pub fn new(tick: u64, bpm: f64) -> Self {
        Self { tick, bpm }
    }
}

/// A single breakpoint of a [`TempoMap`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Breakpoint {
    /// Tick where this segment starts.
    pub tick: f64,
    /// Real time at `tick`, in seconds from tick 0.
    pub seconds: f64,
    /// Seconds per tick within this segment.
    pub seconds_per_tick: f64,
}

/// Piecewise-linear tick ↔ seconds mapping.
///
/// Breakpoints are sorted by tick and, because every rate is positive, by
/// seconds as well. The first breakpoint is always at tick 0.
#[derive(Clone, Debug, PartialEq)]
pub struct TempoMap {
    breakpoints: Vec<Breakpoint>,
    ticks_per_beat: u32,
    multiplier: f64,
}

impl Default for TempoMap {
    fn default() -> Self {
        Self::constant(DEFAULT_BPM, DEFAULT_TICKS_PER_BEAT)
    }
}

fn seconds_per_tick(bpm: f64, multiplier: f64, ticks_per_beat: u32) -> f64 {
    60.0 / (bpm * multiplier) / f64::from(ticks_per_beat)
}

fn valid_bpm(bpm: f64) -> bool {
    bpm.is_finite() && bpm > 0.0
}

impl TempoMap {
    /// Builds a map from tempo changes.
    ///
    /// Changes are sorted by tick; non-positive or non-finite tempos are
    /// ignored, and when several changes share a tick the last one wins. If
    /// nothing takes effect at tick 0, [`DEFAULT_BPM`] is used until the
    /// first change. A non-positive multiplier is treated as 1.
    pub fn new(changes: &[TempoChange], ticks_per_beat: u32, multiplier: f64) -> Self {
        Self::with_default_bpm(changes, ticks_per_beat, multiplier, DEFAULT_BPM)
    }

    /// Like [`new`](Self::new) with an explicit tempo for the span before
    /// the first change.
    pub fn with_default_bpm(
        changes: &[TempoChange],
        ticks_per_beat: u32,
        multiplier: f64,
        default_bpm: f64,
    ) -> Self {
        let ticks_per_beat = ticks_per_beat.max(1);
        let multiplier = if multiplier.is_finite() && multiplier > 0.0 {
            multiplier
        } else {
            1.0
        };
        let default_bpm = if valid_bpm(default_bpm) {
            default_bpm
        } else {
            DEFAULT_BPM
        };

        let mut sorted: Vec<TempoChange> =
            changes.iter().copied().filter(|c| valid_bpm(c.bpm)).collect();
        sorted.sort_by_key(|c| c.tick);

        let mut breakpoints: Vec<Breakpoint> = Vec::with_capacity(sorted.len() + 1);
        breakpoints.push(Breakpoint {
            tick: 0.0,
            seconds: 0.0,
            seconds_per_tick: seconds_per_tick(default_bpm, multiplier, ticks_per_beat),
        });

        for change in sorted {
            let tick = change.tick as f64;
            let rate = seconds_per_tick(change.bpm, multiplier, ticks_per_beat);
            let last = breakpoints[breakpoints.len() - 1];
            if tick <= last.tick {
                // Same tick as the previous breakpoint: replace its rate.
                let idx = breakpoints.len() - 1;
                breakpoints[idx].seconds_per_tick = rate;
                continue;
            }
            let seconds = last.seconds + (tick - last.tick) * last.seconds_per_tick;
            breakpoints.push(Breakpoint {
                tick,
                seconds,
                seconds_per_tick: rate,
            });
        }

        Self {
            breakpoints,
            ticks_per_beat,
            multiplier,
        }
    }

    /// A map with a single constant tempo.
    pub fn constant(bpm: f64, ticks_per_beat: u32) -> Self {
        Self::new(&[TempoChange::new(0, bpm)], ticks_per_beat, 1.0)
    }

    /// Rebuilds the map from the same changes with a new multiplier.
    pub fn with_multiplier(&self, multiplier: f64) -> Self {
        let changes: Vec<TempoChange> = self.changes();
        Self::new(&changes, self.ticks_per_beat, multiplier)
    }

    /// The tempo changes this map was built from (one per breakpoint).
    pub fn changes(&self) -> Vec<TempoChange> {
        self.breakpoints
            .iter()
            .map(|bp| TempoChange {
                tick: bp.tick as u64,
                bpm: 60.0 / (bp.seconds_per_tick * f64::from(self.ticks_per_beat) * self.multiplier),
            })
            .collect()
    }

    /// The breakpoints, sorted by tick.
    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    /// Ticks per quarter note.
    pub fn ticks_per_beat(&self) -> u32 {
        self.ticks_per_beat
    }

    /// Tempo multiplier baked into the map.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Index of the segment containing `tick`.
    fn segment_for_tick(&self, tick: f64) -> usize {
        // partition_point gives the first breakpoint strictly after `tick`.
        self.breakpoints
            .partition_point(|bp| bp.tick <= tick)
            .saturating_sub(1)
    }

    /// Index of the segment containing `seconds`.
    fn segment_for_seconds(&self, seconds: f64) -> usize {
        self.breakpoints
            .partition_point(|bp| bp.seconds <= seconds)
            .saturating_sub(1)
    }

    /// Converts a tick position to seconds from tick 0.
    ///
    /// Negative ticks extrapolate the first segment.
    pub fn tick_to_seconds(&self, tick: f64) -> f64 {
        let bp = self.breakpoints[self.segment_for_tick(tick)];
        bp.seconds + (tick - bp.tick) * bp.seconds_per_tick
    }

    /// Converts seconds from tick 0 to a (fractional) tick position.
    pub fn seconds_to_tick(&self, seconds: f64) -> f64 {
        let bp = self.breakpoints[self.segment_for_seconds(seconds)];
        bp.tick + (seconds - bp.seconds) / bp.seconds_per_tick
    }

    /// Effective tempo (multiplier applied) at `tick`.
    pub fn bpm_at(&self, tick: f64) -> f64 {
        let bp = self.breakpoints[self.segment_for_tick(tick)];
        60.0 / (bp.seconds_per_tick * f64::from(self.ticks_per_beat))
    }
}
