//! Parametric ADSR envelopes evaluated on shaped curves.
//!
//! An [`EnvelopeSpec`] describes attack, decay, sustain and release with a
//! curvature per moving segment. The same math serves two consumers:
//!
//! - **Real-time scheduling**: [`Segment::bake`] produces a fixed-resolution
//!   value curve handed to the rendering backend.
//! - **UI rendering**: [`EnvelopeSpec::draw_points`] samples the envelope for
//!   drawing, and [`EnvelopeSpec::playhead_ms`] places a time-domain playhead
//!   from the backend's reported phase and per-phase progress using the
//!   inverse curve.
//!
//! # Example
//!
//! ```rust
//! use patchbay_core::envelope::EnvelopeSpec;
//!
//! let env = EnvelopeSpec {
//!     attack_ms: 10.0,
//!     decay_ms: 100.0,
//!     sustain_level: 0.5,
//!     release_ms: 200.0,
//!     ..EnvelopeSpec::default()
//! };
//!
//! assert!((env.level_at(10.0, None) - 1.0).abs() < 1e-9);
//! assert!((env.level_at(110.0, None) - 0.5).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};

use crate::curve::{clamp_shape, inv_t_from_u, shaped_t};

/// Default number of points in a baked real-time curve.
pub const DEFAULT_CURVE_RESOLUTION: usize = 128;

/// Envelope phase as reported by a rendering backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopePhase {
    /// Envelope is inactive; output is zero.
    #[default]
    Idle,
    /// Rising from the current level toward peak.
    Attack,
    /// Falling from peak toward sustain.
    Decay,
    /// Holding at the sustain level while the gate is held.
    Sustain,
    /// Falling to zero after gate release.
    Release,
}

/// One moving piece of an envelope.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    /// Level at the start of the segment.
    pub start_level: f64,
    /// Level at the end of the segment.
    pub end_level: f64,
    /// Duration in milliseconds.
    pub duration_ms: f64,
    /// Curvature in `[-1, 1]`, 0 = linear.
    pub shape: f64,
}

impl Segment {
    /// Level at `elapsed_ms` into the segment.
    ///
    /// Zero-length segments jump straight to `end_level`.
    pub fn level_at(&self, elapsed_ms: f64) -> f64 {
        if self.duration_ms <= 0.0 {
            return self.end_level;
        }
        let t = elapsed_ms / self.duration_ms;
        self.start_level + (self.end_level - self.start_level) * shaped_t(t, self.shape)
    }

    /// Time in milliseconds at which the segment has completed `progress` of
    /// its level change.
    pub fn time_for_progress(&self, progress: f64) -> f64 {
        inv_t_from_u(progress, self.shape) * self.duration_ms.max(0.0)
    }

    /// Bakes the segment into `resolution` evenly time-spaced points,
    /// endpoints included.
    ///
    /// A resolution below 2 is raised to 2.
    pub fn bake(&self, resolution: usize) -> Vec<f32> {
        let n = resolution.max(2);
        let last = (n - 1) as f64;
        (0..n)
            .map(|i| {
                let t = i as f64 / last;
                (self.start_level + (self.end_level - self.start_level) * shaped_t(t, self.shape))
                    as f32
            })
            .collect()
    }
}

/// Attack/decay/sustain/release timings with per-segment curvature.
///
/// Field names serialize in camelCase to match persisted node state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvelopeSpec {
    /// Attack duration in milliseconds.
    pub attack_ms: f64,
    /// Decay duration in milliseconds.
    pub decay_ms: f64,
    /// Sustain level in `[0, 1]`.
    #[serde(alias = "sustain")]
    pub sustain_level: f64,
    /// Release duration in milliseconds.
    pub release_ms: f64,
    /// Attack curvature.
    pub attack_shape: f64,
    /// Decay curvature.
    pub decay_shape: f64,
    /// Release curvature.
    pub release_shape: f64,
}

impl Default for EnvelopeSpec {
    fn default() -> Self {
        Self {
            attack_ms: 10.0,
            decay_ms: 100.0,
            sustain_level: 0.7,
            release_ms: 200.0,
            attack_shape: 0.0,
            decay_shape: 0.0,
            release_shape: 0.0,
        }
    }
}

fn non_negative(ms: f64) -> f64 {
    if ms.is_finite() { ms.max(0.0) } else { 0.0 }
}

impl EnvelopeSpec {
    /// Returns a copy with times forced non-negative, sustain clamped to
    /// `[0, 1]` and shapes clamped to `[-1, 1]`.
    pub fn sanitized(self) -> Self {
        Self {
            attack_ms: non_negative(self.attack_ms),
            decay_ms: non_negative(self.decay_ms),
            sustain_level: if self.sustain_level.is_finite() {
                self.sustain_level.clamp(0.0, 1.0)
            } else {
                0.0
            },
            release_ms: non_negative(self.release_ms),
            attack_shape: clamp_shape(self.attack_shape),
            decay_shape: clamp_shape(self.decay_shape),
            release_shape: clamp_shape(self.release_shape),
        }
    }

    /// Attack segment from `from_level` to peak.
    pub fn attack(&self, from_level: f64) -> Segment {
        Segment {
            start_level: from_level,
            end_level: 1.0,
            duration_ms: self.attack_ms,
            shape: self.attack_shape,
        }
    }

    /// Decay segment from peak to sustain.
    pub fn decay(&self) -> Segment {
        Segment {
            start_level: 1.0,
            end_level: self.sustain_level,
            duration_ms: self.decay_ms,
            shape: self.decay_shape,
        }
    }

    /// Release segment from `from_level` to zero.
    pub fn release(&self, from_level: f64) -> Segment {
        Segment {
            start_level: from_level,
            end_level: 0.0,
            duration_ms: self.release_ms,
            shape: self.release_shape,
        }
    }

    /// Level while the gate is held, `elapsed_ms` after gate-on.
    pub fn held_level(&self, elapsed_ms: f64) -> f64 {
        if elapsed_ms < 0.0 {
            return 0.0;
        }
        if elapsed_ms < self.attack_ms {
            return self.attack(0.0).level_at(elapsed_ms);
        }
        let into_decay = elapsed_ms - self.attack_ms;
        if into_decay < self.decay_ms {
            return self.decay().level_at(into_decay);
        }
        self.sustain_level
    }

    /// Level `elapsed_ms` after gate-on, with an optional gate-off time
    /// (also measured from gate-on).
    ///
    /// Release starts from whatever level the held envelope reached at
    /// gate-off, so early releases fall from mid-attack or mid-decay.
    pub fn level_at(&self, elapsed_ms: f64, gate_off_ms: Option<f64>) -> f64 {
        match gate_off_ms {
            Some(off) if elapsed_ms >= off => {
                let release = self.release(self.held_level(off));
                let into_release = elapsed_ms - off;
                if into_release >= release.duration_ms {
                    0.0
                } else {
                    release.level_at(into_release)
                }
            }
            _ => self.held_level(elapsed_ms),
        }
    }

    /// Phase and time-domain progress `elapsed_ms` after gate-on.
    pub fn phase_at(&self, elapsed_ms: f64, gate_off_ms: Option<f64>) -> (EnvelopePhase, f64) {
        if elapsed_ms < 0.0 {
            return (EnvelopePhase::Idle, 0.0);
        }
        if let Some(off) = gate_off_ms
            && elapsed_ms >= off
        {
            let into_release = elapsed_ms - off;
            if into_release >= self.release_ms {
                return (EnvelopePhase::Idle, 0.0);
            }
            return (EnvelopePhase::Release, into_release / self.release_ms);
        }
        if elapsed_ms < self.attack_ms {
            return (EnvelopePhase::Attack, elapsed_ms / self.attack_ms);
        }
        let into_decay = elapsed_ms - self.attack_ms;
        if into_decay < self.decay_ms {
            return (EnvelopePhase::Decay, into_decay / self.decay_ms);
        }
        (EnvelopePhase::Sustain, 0.0)
    }

    /// Bakes the attack, decay and release segments at `resolution` points
    /// each, for handing to a real-time backend.
    ///
    /// The release curve is baked from the sustain level; backends rescale
    /// it when releasing early.
    pub fn bake(&self, resolution: usize) -> BakedEnvelope {
        BakedEnvelope {
            attack: self.attack(0.0).bake(resolution),
            decay: self.decay().bake(resolution),
            release: self.release(self.sustain_level).bake(resolution),
        }
    }

    /// Samples the envelope for drawing as `(ms, level)` pairs.
    ///
    /// The sustain stage is drawn as a flat run of `sustain_hold_ms`.
    /// Each moving segment gets `points_per_segment` points.
    pub fn draw_points(&self, sustain_hold_ms: f64, points_per_segment: usize) -> Vec<(f64, f64)> {
        let n = points_per_segment.max(2);
        let mut points = Vec::with_capacity(n * 3 + 1);
        let mut offset = 0.0;
        for segment in [self.attack(0.0), self.decay()] {
            push_segment(&mut points, &segment, offset, n);
            offset += segment.duration_ms;
        }
        offset += sustain_hold_ms.max(0.0);
        push_segment(&mut points, &self.release(self.sustain_level), offset, n);
        points
    }

    /// Places a time-domain playhead (in drawing milliseconds, matching
    /// [`draw_points`](Self::draw_points)) from a backend-reported phase and
    /// per-phase progress.
    ///
    /// `progress` is the fraction of the phase's level change completed, so
    /// the inverse curve is used to recover elapsed time under nonlinear
    /// shapes. Sustain progress is the fraction of the drawn hold.
    /// Returns `None` for [`EnvelopePhase::Idle`].
    pub fn playhead_ms(
        &self,
        phase: EnvelopePhase,
        progress: f64,
        sustain_hold_ms: f64,
    ) -> Option<f64> {
        let progress = if progress.is_finite() {
            progress.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let hold = sustain_hold_ms.max(0.0);
        match phase {
            EnvelopePhase::Idle => None,
            EnvelopePhase::Attack => Some(self.attack(0.0).time_for_progress(progress)),
            EnvelopePhase::Decay => {
                Some(self.attack_ms + self.decay().time_for_progress(progress))
            }
            EnvelopePhase::Sustain => Some(self.attack_ms + self.decay_ms + progress * hold),
            EnvelopePhase::Release => Some(
                self.attack_ms
                    + self.decay_ms
                    + hold
                    + self.release(self.sustain_level).time_for_progress(progress),
            ),
        }
    }
}

fn push_segment(points: &mut Vec<(f64, f64)>, segment: &Segment, offset: f64, n: usize) {
    let last = (n - 1) as f64;
    for i in 0..n {
        let t = i as f64 / last;
        points.push((offset + t * segment.duration_ms, segment.level_at(t * segment.duration_ms)));
    }
}

/// Real-time curves for the moving segments of an envelope.
#[derive(Clone, Debug, PartialEq)]
pub struct BakedEnvelope {
    /// Attack curve, 0 → 1.
    pub attack: Vec<f32>,
    /// Decay curve, 1 → sustain.
    pub decay: Vec<f32>,
    /// Release curve, sustain → 0.
    pub release: Vec<f32>,
}
