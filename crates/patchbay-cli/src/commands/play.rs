//! Play a timeline into a graph.
//!
//! Offline mode drives the scheduler from a manual clock as fast as it can
//! poll; `--realtime` runs it on the playback worker against the wall clock
//! until the timeline ends or Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use clap::Args;
use patchbay_config::{TimelineDocument, load_graph};
use patchbay_core::{MidiMessage, NodeId, PortRef, RoutedEvent};
use patchbay_engine::{
    Clock, DispatchReport, ManualClock, OfflineDeviceGraph, PatchRuntime, PlaybackCommand,
    PlaybackMessage, PlaybackWorker, Scheduler, SchedulerSettings, SystemClock,
};

use super::common;

#[derive(Args)]
pub struct PlayArgs {
    /// Graph document (path or saved patch name)
    graph: PathBuf,

    /// Timeline document
    timeline: PathBuf,

    /// Node whose output the timeline plays from
    #[arg(short, long)]
    source: String,

    /// Output port on the source node
    #[arg(short, long, default_value = "midi_out")]
    port: String,

    /// Tick to start from
    #[arg(long, default_value = "0")]
    start: u64,

    /// Loop the timeline
    #[arg(long = "loop")]
    looping: bool,

    /// Offline only: stop after this many loops
    #[arg(long, default_value = "1")]
    loops: u32,

    /// Play against the wall clock
    #[arg(long)]
    realtime: bool,

    /// Only print the summary
    #[arg(short, long)]
    quiet: bool,

    /// Engine config file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Default)]
struct Stats {
    fired: usize,
    deliveries: usize,
    errors: usize,
    loops: u32,
}

/// Whether playback should keep going after a message.
#[derive(PartialEq, Eq)]
enum Flow {
    Continue,
    Ended,
}

struct Session {
    runtime: PatchRuntime<OfflineDeviceGraph>,
    source: PortRef,
    quiet: bool,
    stats: Stats,
}

impl Session {
    fn handle(&mut self, message: PlaybackMessage, now_ms: f64) -> Flow {
        match message {
            PlaybackMessage::EventFired(event) => {
                self.stats.fired += 1;
                let time_ms = event.scheduled_time * 1000.0;
                self.send(event.message, time_ms);
            }
            PlaybackMessage::AllNotesOff(sweep) => {
                if !self.quiet {
                    println!("{now_ms:>10.1}ms  all notes off");
                }
                for message in sweep {
                    self.send(message, now_ms);
                }
            }
            PlaybackMessage::Looped => {
                self.stats.loops += 1;
                if !self.quiet {
                    println!("{now_ms:>10.1}ms  loop {}", self.stats.loops);
                }
            }
            PlaybackMessage::PlaybackEnded => return Flow::Ended,
        }
        Flow::Continue
    }

    fn send(&mut self, message: MidiMessage, time_ms: f64) {
        let (_, report) = self.runtime.dispatch(&self.source, message, time_ms);
        self.record(&report, time_ms);
    }

    fn record(&mut self, report: &DispatchReport, time_ms: f64) {
        self.stats.deliveries += report.deliveries.len();
        self.stats.errors += report.errors.len();
        if report.truncated {
            tracing::warn!(time_ms, "dispatch truncated by routing limits");
        }
        for failure in &report.errors {
            tracing::warn!(node = %failure.node, port = %failure.port, "{}", failure.message);
        }
        if self.quiet {
            return;
        }
        for delivery in &report.deliveries {
            let marker = if delivery.consumed { " (consumed)" } else { "" };
            println!(
                "{time_ms:>10.1}ms  {:<20} {}{marker}",
                format!("{}.{}", delivery.node, delivery.port),
                describe(&delivery.event)
            );
        }
    }
}

fn describe(event: &RoutedEvent) -> String {
    match event {
        RoutedEvent::Midi(midi) => format!("{:?}", midi.message),
        RoutedEvent::Voice(voice) => format!("voice {} {:?}", voice.voice, voice.kind),
    }
}

pub fn run(args: PlayArgs) -> anyhow::Result<()> {
    let config = common::load_config(args.config.as_deref())?;
    let registry = common::registry(&config);
    let graph_path = common::resolve_patch(&args.graph);
    let report = load_graph(&graph_path, &registry)
        .with_context(|| format!("loading {}", graph_path.display()))?;
    let doc = TimelineDocument::load(&args.timeline)
        .with_context(|| format!("loading {}", args.timeline.display()))?;

    let source_id = NodeId::from(args.source.as_str());
    if report.graph.node(&source_id).is_none() {
        anyhow::bail!("source node '{}' is not in the graph", args.source);
    }

    let mut runtime = PatchRuntime::with_registry(registry, OfflineDeviceGraph::new());
    let applied = runtime.apply(&report.graph);
    for (node, error) in &applied.failures {
        tracing::warn!(node = %node, "{error}");
    }
    tracing::info!(
        nodes = applied.created.len(),
        connections = applied.sync.connected.len(),
        "graph applied"
    );

    let tempo = doc.tempo_map(
        config.scheduler.default_bpm,
        config.scheduler.tempo_multiplier,
    );
    let mut session = Session {
        runtime,
        source: PortRef::new(source_id, args.port.as_str()),
        quiet: args.quiet,
        stats: Stats::default(),
    };
    let settings = config.scheduler_settings();

    if args.realtime {
        let clock = SystemClock::new();
        let mut scheduler = Scheduler::new(clock, tempo, settings);
        scheduler.load_events(doc.events.clone(), doc.duration_ticks());
        scheduler.set_loop(args.looping);
        play_realtime(&mut session, scheduler, clock, settings, args.start)?;
    } else {
        let clock = ManualClock::new();
        let mut scheduler = Scheduler::new(clock.clone(), tempo, settings);
        scheduler.load_events(doc.events.clone(), doc.duration_ticks());
        scheduler.set_loop(args.looping);
        play_offline(&mut session, &mut scheduler, &clock, settings, args.start, args.loops);
    }

    let stats = &session.stats;
    println!(
        "Played {} event(s): {} deliveries, {} handler error(s), {} loop(s)",
        stats.fired, stats.deliveries, stats.errors, stats.loops
    );
    Ok(())
}

fn play_offline(
    session: &mut Session,
    scheduler: &mut Scheduler<ManualClock>,
    clock: &ManualClock,
    settings: SchedulerSettings,
    start_tick: u64,
    max_loops: u32,
) {
    let step = settings.interval.as_secs_f64();
    let tempo = scheduler.tempo();
    let span = tempo.tick_to_seconds(scheduler.duration_ticks() as f64)
        - tempo.tick_to_seconds(start_tick as f64);
    let passes = if scheduler.is_looping() {
        f64::from(max_loops.max(1)) + 1.0
    } else {
        1.0
    };
    let max_steps = ((span.max(0.0) * passes + settings.lookahead.as_secs_f64()) / step).ceil()
        as u64
        + 4;

    clock.set(0.0);
    scheduler.play(start_tick);
    let mut now = 0.0;
    for _ in 0..=max_steps {
        clock.set(now);
        for message in scheduler.poll() {
            if session.handle(message, now * 1000.0) == Flow::Ended {
                return;
            }
        }
        if scheduler.is_looping() && session.stats.loops >= max_loops {
            for message in scheduler.stop() {
                session.handle(message, now * 1000.0);
            }
            return;
        }
        now += step;
    }
    tracing::warn!(steps = max_steps, "offline playback did not end, stopping");
    for message in scheduler.stop() {
        session.handle(message, now * 1000.0);
    }
}

fn play_realtime(
    session: &mut Session,
    scheduler: Scheduler<SystemClock>,
    clock: SystemClock,
    settings: SchedulerSettings,
    start_tick: u64,
) -> anyhow::Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let worker = PlaybackWorker::spawn(scheduler)?;
    worker.send(PlaybackCommand::Play { start_tick })?;
    println!("Playing, press Ctrl+C to stop...");

    let wait = settings.interval;
    while running.load(Ordering::SeqCst) {
        match worker.messages().recv_timeout(wait) {
            Ok(message) => {
                if session.handle(message, clock.now() * 1000.0) == Flow::Ended {
                    worker.shutdown();
                    return Ok(());
                }
            }
            Err(e) if e.is_timeout() => {}
            Err(_) => break,
        }
    }

    println!("\nStopping...");
    worker.send(PlaybackCommand::Stop)?;
    // Route the stop sweep before the thread goes away.
    while let Ok(message) = worker.messages().recv_timeout(wait * 4) {
        let sweep = matches!(message, PlaybackMessage::AllNotesOff(_));
        session.handle(message, clock.now() * 1000.0);
        if sweep {
            break;
        }
    }
    worker.shutdown();
    Ok(())
}
