//! Tempo-mapped lookahead scheduler.
//!
//! [`Scheduler`] is a synchronous state machine. Each [`poll`](Scheduler::poll)
//! reads the clock, fires pending events whose time has come, and schedules
//! every event inside the lookahead window `[last_scheduled_tick,
//! lookahead_tick)`. An event due now or earlier fires in the same poll; a
//! later one waits in a time-ordered pending queue. Each event is scheduled
//! at most once per pass through the timeline.
//!
//! The playhead is an anchor `(tick, clock time)` plus the tempo map, so
//! changing the tempo re-anchors at the current tick and the position stays
//! continuous. Events already scheduled keep their computed times.
//!
//! [`PlaybackWorker`] runs a scheduler on its own thread and talks to it
//! only through [`PlaybackCommand`] and [`PlaybackMessage`] channels.

mod clock;
mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use worker::{PlaybackCommand, PlaybackWorker};

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;

use patchbay_core::{MIDI_CHANNELS, MidiMessage, TempoMap, TimelineEvent};

/// Default wall-clock poll interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(25);

/// Default lookahead window.
pub const DEFAULT_LOOKAHEAD: Duration = Duration::from_millis(100);

/// Timing of the scheduling loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchedulerSettings {
    /// How often the loop polls.
    pub interval: Duration,
    /// How far ahead of the playhead events are scheduled.
    pub lookahead: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            lookahead: DEFAULT_LOOKAHEAD,
        }
    }
}

/// An event handed to the router.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FiredEvent {
    /// Position in the loaded (tick-sorted) event list.
    pub index: usize,
    /// Tick of the event.
    pub tick: u64,
    /// The message.
    pub message: MidiMessage,
    /// Clock time the event was due.
    pub scheduled_time: f64,
    /// Clock time it actually fired.
    pub actual_time: f64,
}

/// Outbound notifications from a scheduler.
#[derive(Clone, Debug, PartialEq)]
pub enum PlaybackMessage {
    /// An event reached its time.
    EventFired(FiredEvent),
    /// All-notes-off on every channel.
    AllNotesOff(Vec<MidiMessage>),
    /// Playback wrapped to tick 0.
    Looped,
    /// Playback reached the end without looping.
    PlaybackEnded,
}

/// All-notes-off for every MIDI channel.
pub fn all_notes_off_sweep() -> Vec<MidiMessage> {
    (0..MIDI_CHANNELS).map(MidiMessage::all_notes_off).collect()
}

#[derive(Clone, Copy, Debug)]
struct Pending {
    at: f64,
    index: usize,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    // Reversed: BinaryHeap is a max-heap and the earliest entry must be on top.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .total_cmp(&self.at)
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// Plays a tick-positioned event list against a clock.
#[derive(Debug)]
pub struct Scheduler<C: Clock> {
    clock: C,
    settings: SchedulerSettings,
    tempo: TempoMap,
    events: Vec<TimelineEvent>,
    duration_ticks: u64,
    looping: bool,
    playing: bool,
    anchor_tick: f64,
    anchor_time: f64,
    last_scheduled_tick: f64,
    seen: HashSet<usize>,
    pending: BinaryHeap<Pending>,
}

impl<C: Clock> Scheduler<C> {
    /// Creates a stopped scheduler with no events.
    pub fn new(clock: C, tempo: TempoMap, settings: SchedulerSettings) -> Self {
        Self {
            clock,
            settings,
            tempo,
            events: Vec::new(),
            duration_ticks: 0,
            looping: false,
            playing: false,
            anchor_tick: 0.0,
            anchor_time: 0.0,
            last_scheduled_tick: 0.0,
            seen: HashSet::new(),
            pending: BinaryHeap::new(),
        }
    }

    /// Loop timing.
    pub fn settings(&self) -> SchedulerSettings {
        self.settings
    }

    /// The active tempo map.
    pub fn tempo(&self) -> &TempoMap {
        &self.tempo
    }

    /// Loaded events, sorted by tick.
    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// End of the timeline.
    pub fn duration_ticks(&self) -> u64 {
        self.duration_ticks
    }

    /// Returns `true` while playing.
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Returns `true` if playback wraps at the end.
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Number of scheduled events still waiting to fire.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Current playhead in ticks.
    pub fn position(&self) -> f64 {
        if self.playing {
            self.tick_at(self.clock.now())
        } else {
            self.anchor_tick
        }
    }

    /// Replaces the event list. Events are sorted by tick; ones past
    /// `duration_ticks` never play. While playing, scheduling restarts from
    /// the current position.
    pub fn load_events(&mut self, mut events: Vec<TimelineEvent>, duration_ticks: u64) {
        events.sort_by_key(|e| e.tick);
        let position = self.position().min(duration_ticks as f64);
        self.events = events;
        self.duration_ticks = duration_ticks;
        self.reset_scheduling(position);
        tracing::debug!(events = self.events.len(), duration_ticks, "events loaded");
    }

    /// Turns looping on or off.
    pub fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Starts playback at `start_tick`. Nothing fires until the next poll.
    pub fn play(&mut self, start_tick: u64) {
        let start = (start_tick as f64).min(self.duration_ticks as f64);
        self.reset_scheduling(start);
        self.playing = true;
        tracing::info!(start_tick, "playback started");
    }

    /// Stops playback and clears everything scheduled.
    ///
    /// Always returns an all-notes-off sweep. Stopping a stopped scheduler
    /// changes nothing else.
    pub fn stop(&mut self) -> Vec<PlaybackMessage> {
        if self.playing {
            let position = self.position();
            self.playing = false;
            self.reset_scheduling(position);
            tracing::info!(position, "playback stopped");
        }
        vec![PlaybackMessage::AllNotesOff(all_notes_off_sweep())]
    }

    /// Moves the playhead. While playing, scheduled events are dropped and an
    /// all-notes-off sweep is returned.
    pub fn seek(&mut self, tick: u64) -> Vec<PlaybackMessage> {
        let target = (tick as f64).min(self.duration_ticks as f64);
        self.reset_scheduling(target);
        if self.playing {
            vec![PlaybackMessage::AllNotesOff(all_notes_off_sweep())]
        } else {
            Vec::new()
        }
    }

    /// Swaps the tempo map, keeping the current tick.
    pub fn set_tempo(&mut self, tempo: TempoMap) {
        let now = self.clock.now();
        let position = self.position();
        self.tempo = tempo;
        self.anchor_tick = position;
        self.anchor_time = now;
    }

    /// Rebuilds the tempo map with a new multiplier, keeping the current tick.
    pub fn set_tempo_multiplier(&mut self, multiplier: f64) {
        let tempo = self.tempo.with_multiplier(multiplier);
        self.set_tempo(tempo);
    }

    /// Advances playback to the current clock time.
    pub fn poll(&mut self) -> Vec<PlaybackMessage> {
        let mut messages = Vec::new();
        if !self.playing {
            return messages;
        }
        let now = self.clock.now();
        let lookahead = self.settings.lookahead.as_secs_f64();
        let end = self.duration_ticks as f64;

        loop {
            let mut fired = Vec::new();
            self.fire_due(now, &mut fired);
            self.schedule_window(now, lookahead, &mut fired);
            fired.sort_by(|a: &FiredEvent, b: &FiredEvent| {
                a.scheduled_time
                    .total_cmp(&b.scheduled_time)
                    .then(a.index.cmp(&b.index))
            });
            messages.extend(fired.into_iter().map(PlaybackMessage::EventFired));

            if self.tick_at(now) < end {
                break;
            }

            let end_time = self.time_of_tick(end);
            if self.looping && self.duration_ticks > 0 {
                self.reset_scheduling(0.0);
                self.anchor_time = end_time;
                tracing::debug!(end_time, "playback looped");
                messages.push(PlaybackMessage::Looped);
            } else {
                self.playing = false;
                self.reset_scheduling(end);
                tracing::info!("playback ended");
                messages.push(PlaybackMessage::AllNotesOff(all_notes_off_sweep()));
                messages.push(PlaybackMessage::PlaybackEnded);
                break;
            }
        }
        messages
    }

    fn fire_due(&mut self, now: f64, fired: &mut Vec<FiredEvent>) {
        while self.pending.peek().is_some_and(|p| p.at <= now) {
            let Some(entry) = self.pending.pop() else {
                break;
            };
            fired.push(self.fired(entry.index, entry.at, now));
        }
    }

    fn schedule_window(&mut self, now: f64, lookahead: f64, fired: &mut Vec<FiredEvent>) {
        let end = self.duration_ticks as f64;
        let lookahead_tick = self.tick_at(now + lookahead);
        let reaches_end = lookahead_tick >= end;
        let from = self.last_scheduled_tick;
        let first = self.events.partition_point(|e| (e.tick as f64) < from);

        for index in first..self.events.len() {
            let tick = self.events[index].tick as f64;
            let inside = if reaches_end { tick <= end } else { tick < lookahead_tick };
            if !inside {
                break;
            }
            if !self.seen.insert(index) {
                continue;
            }
            let at = self.time_of_tick(tick);
            if at <= now {
                fired.push(self.fired(index, at, now));
            } else {
                self.pending.push(Pending { at, index });
            }
        }

        let next = lookahead_tick.min(end);
        tracing::trace!(from, to = next, pending = self.pending.len(), "window scheduled");
        self.last_scheduled_tick = self.last_scheduled_tick.max(next);
    }

    fn fired(&self, index: usize, scheduled_time: f64, actual_time: f64) -> FiredEvent {
        let event = self.events[index];
        FiredEvent {
            index,
            tick: event.tick,
            message: event.message,
            scheduled_time,
            actual_time,
        }
    }

    /// Re-anchors at `tick` now and forgets everything scheduled.
    fn reset_scheduling(&mut self, tick: f64) {
        self.anchor_tick = tick;
        self.anchor_time = self.clock.now();
        self.last_scheduled_tick = tick;
        self.seen.clear();
        self.pending.clear();
    }

    fn tick_at(&self, time: f64) -> f64 {
        let anchor_seconds = self.tempo.tick_to_seconds(self.anchor_tick);
        self.tempo
            .seconds_to_tick(anchor_seconds + (time - self.anchor_time))
    }

    fn time_of_tick(&self, tick: f64) -> f64 {
        self.anchor_time + self.tempo.tick_to_seconds(tick)
            - self.tempo.tick_to_seconds(self.anchor_tick)
    }
}
