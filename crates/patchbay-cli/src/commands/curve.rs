//! Curve and envelope printouts.

use clap::Args;
use patchbay_core::{EnvelopeSpec, clamp_shape, inv_t_from_u, shaped_t};

#[derive(Args)]
pub struct CurveArgs {
    /// Curvature in [-1, 1]; positive eases out, negative eases in
    #[arg(short, long, allow_hyphen_values = true)]
    shape: f64,

    /// Number of sample points including both ends
    #[arg(short, long, default_value = "11")]
    points: usize,

    /// Also print the inverse mapped back from each level
    #[arg(long)]
    inverse: bool,
}

pub fn run_curve(args: &CurveArgs) -> anyhow::Result<()> {
    if args.points < 2 {
        anyhow::bail!("--points must be at least 2");
    }
    let shape = clamp_shape(args.shape);
    println!("shape = {shape}");

    let last = (args.points - 1) as f64;
    for i in 0..args.points {
        let t = i as f64 / last;
        let u = shaped_t(t, shape);
        if args.inverse {
            println!("{t:.4}  {u:.6}  {:.6}", inv_t_from_u(u, shape));
        } else {
            println!("{t:.4}  {u:.6}");
        }
    }
    Ok(())
}

#[derive(Args)]
pub struct EnvelopeArgs {
    /// Attack time in milliseconds
    #[arg(long, default_value = "10")]
    attack: f64,

    /// Decay time in milliseconds
    #[arg(long, default_value = "100")]
    decay: f64,

    /// Sustain level in [0, 1]
    #[arg(long, default_value = "0.7")]
    sustain: f64,

    /// Release time in milliseconds
    #[arg(long, default_value = "200")]
    release: f64,

    /// Attack curvature
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    attack_shape: f64,

    /// Decay curvature
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    decay_shape: f64,

    /// Release curvature
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    release_shape: f64,

    /// How long the sustain plateau is drawn, in milliseconds
    #[arg(long, default_value = "100")]
    hold: f64,

    /// Points per segment
    #[arg(short, long, default_value = "8")]
    points: usize,
}

pub fn run_envelope(args: &EnvelopeArgs) -> anyhow::Result<()> {
    let spec = EnvelopeSpec {
        attack_ms: args.attack,
        decay_ms: args.decay,
        sustain_level: args.sustain,
        release_ms: args.release,
        attack_shape: args.attack_shape,
        decay_shape: args.decay_shape,
        release_shape: args.release_shape,
    }
    .sanitized();

    println!("{:>10}  {:>8}", "ms", "level");
    for (ms, level) in spec.draw_points(args.hold.max(0.0), args.points.max(1)) {
        println!("{ms:>10.2}  {level:>8.4}");
    }
    Ok(())
}
