//! Shaped-curve math for parametric envelope segments.
//!
//! A segment's progress is a normalized time `t ∈ [0, 1]` mapped onto a
//! normalized level `u ∈ [0, 1]` by a one-parameter curve family:
//!
//! ```text
//! shape > 0:  u = (1 - e^(-k·t)) / (1 - e^(-k))     ease-out
//! shape < 0:  u = (e^(k·t) - 1) / (e^(k) - 1)       ease-in
//! shape = 0:  u = t                                  linear
//! where k = 5·|shape|
//! ```
//!
//! Both branches pass through `(0, 0)` and `(1, 1)` and converge to the
//! linear case as `shape → 0`. [`inv_t_from_u`] is the closed-form inverse of
//! [`shaped_t`], so real-time scheduling (forward) and playhead placement
//! (inverse) agree exactly.
//!
//! Evaluation uses `exp_m1`/`ln_1p` so that small curvatures keep full
//! precision instead of cancelling to zero.

/// Curvatures with magnitude below this are evaluated as linear.
pub const SHAPE_EPSILON: f64 = 1e-6;

/// Steepness of the exponential family at `|shape| == 1`.
pub const CURVATURE: f64 = 5.0;

/// Clamps a shape value into `[-1, 1]`. Non-finite shapes become linear.
#[inline]
pub fn clamp_shape(shape: f64) -> f64 {
    if shape.is_finite() {
        shape.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

#[inline]
fn clamp_unit(x: f64) -> f64 {
    if x.is_finite() { x.clamp(0.0, 1.0) } else { 0.0 }
}

/// Maps normalized time `t` to normalized level `u` for the given `shape`.
///
/// Inputs are clamped to `[0, 1]` and `[-1, 1]` respectively.
///
/// # Example
///
/// ```rust
/// use patchbay_core::curve::shaped_t;
///
/// assert_eq!(shaped_t(0.25, 0.0), 0.25);
/// // Ease-out rises faster than linear.
/// assert!(shaped_t(0.25, 0.8) > 0.25);
/// // Ease-in rises slower than linear.
/// assert!(shaped_t(0.25, -0.8) < 0.25);
/// ```
pub fn shaped_t(t: f64, shape: f64) -> f64 {
    let t = clamp_unit(t);
    let shape = clamp_shape(shape);
    if shape.abs() < SHAPE_EPSILON {
        return t;
    }
    let k = CURVATURE * shape.abs();
    let u = if shape > 0.0 {
        (-k * t).exp_m1() / (-k).exp_m1()
    } else {
        (k * t).exp_m1() / k.exp_m1()
    };
    clamp_unit(u)
}

/// Inverse of [`shaped_t`]: maps normalized level `u` back to normalized time.
///
/// For every `t` and `shape`, `inv_t_from_u(shaped_t(t, shape), shape) ≈ t`.
pub fn inv_t_from_u(u: f64, shape: f64) -> f64 {
    let u = clamp_unit(u);
    let shape = clamp_shape(shape);
    if shape.abs() < SHAPE_EPSILON {
        return u;
    }
    let k = CURVATURE * shape.abs();
    let t = if shape > 0.0 {
        -(u * (-k).exp_m1()).ln_1p() / k
    } else {
        (u * k.exp_m1()).ln_1p() / k
    };
    clamp_unit(t)
}

/// Interpolates between two levels along a shaped curve.
///
/// `progress` is the normalized time within the segment.
#[inline]
pub fn shaped_lerp(start: f64, end: f64, progress: f64, shape: f64) -> f64 {
    start + (end - start) * shaped_t(progress, shape)
}
