//! Tick and seconds conversion on a timeline's tempo map.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use patchbay_config::TimelineDocument;

use super::common;

#[derive(Args)]
pub struct TempoArgs {
    /// Timeline document
    timeline: PathBuf,

    /// Convert this tick to seconds
    #[arg(long, conflicts_with = "seconds")]
    tick: Option<f64>,

    /// Convert these seconds to a tick
    #[arg(long)]
    seconds: Option<f64>,

    /// Override the config's tempo multiplier
    #[arg(long)]
    multiplier: Option<f64>,

    /// Engine config file
    #[arg(long)]
    config: Option<PathBuf>,
}

pub fn run(args: TempoArgs) -> anyhow::Result<()> {
    let config = common::load_config(args.config.as_deref())?;
    let doc = TimelineDocument::load(&args.timeline)
        .with_context(|| format!("loading {}", args.timeline.display()))?;
    let multiplier = args
        .multiplier
        .unwrap_or(config.scheduler.tempo_multiplier);
    let map = doc.tempo_map(config.scheduler.default_bpm, multiplier);

    if let Some(tick) = args.tick {
        println!("{:.6}", map.tick_to_seconds(tick));
        return Ok(());
    }
    if let Some(seconds) = args.seconds {
        println!("{:.3}", map.seconds_to_tick(seconds));
        return Ok(());
    }

    println!("Ticks per beat: {}", map.ticks_per_beat());
    println!("Multiplier:     {}", map.multiplier());
    println!(
        "Duration:       {} ticks ({:.3}s)",
        doc.duration_ticks(),
        map.tick_to_seconds(doc.duration_ticks() as f64)
    );
    println!();
    println!("{:>10}  {:>10}  {:>8}", "tick", "seconds", "bpm");
    for bp in map.breakpoints() {
        println!(
            "{:>10.0}  {:>10.4}  {:>8.2}",
            bp.tick,
            bp.seconds,
            map.bpm_at(bp.tick)
        );
    }
    Ok(())
}
