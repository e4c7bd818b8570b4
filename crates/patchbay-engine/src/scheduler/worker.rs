//! Playback actor: a [`Scheduler`] on its own thread.
//!
//! The worker owns the scheduler outright. Hosts send [`PlaybackCommand`]s
//! and read [`PlaybackMessage`]s; neither side waits on the other.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, select, unbounded};
use patchbay_core::{TempoMap, TimelineEvent};

use super::{Clock, PlaybackMessage, Scheduler};
use crate::error::EngineError;

/// Commands accepted by a [`PlaybackWorker`].
#[derive(Clone, Debug, PartialEq)]
pub enum PlaybackCommand {
    /// Start playing at a tick.
    Play {
        /// Tick to start from.
        start_tick: u64,
    },
    /// Stop and sweep all notes off.
    Stop,
    /// Enable or disable looping.
    SetLoop(bool),
    /// Replace the event list.
    LoadEvents {
        /// Events at absolute ticks.
        events: Vec<TimelineEvent>,
        /// End of the timeline.
        duration_ticks: u64,
    },
    /// Move the playhead.
    Seek(u64),
    /// Replace the tempo map.
    SetTempo(TempoMap),
    /// Rebuild the tempo map with a new multiplier.
    SetTempoMultiplier(f64),
    /// Stop and end the thread.
    Shutdown,
}

/// Handle to a scheduler running on a background thread.
#[derive(Debug)]
pub struct PlaybackWorker {
    commands: Sender<PlaybackCommand>,
    messages: Receiver<PlaybackMessage>,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackWorker {
    /// Moves `scheduler` onto a new thread and starts its poll loop.
    pub fn spawn<C>(scheduler: Scheduler<C>) -> Result<Self, EngineError>
    where
        C: Clock + 'static,
    {
        let (command_tx, command_rx) = unbounded();
        let (message_tx, message_rx) = unbounded();
        let handle = thread::Builder::new()
            .name("patchbay-playback".to_owned())
            .spawn(move || run(scheduler, &command_rx, &message_tx))
            .map_err(EngineError::Spawn)?;
        Ok(Self {
            commands: command_tx,
            messages: message_rx,
            handle: Some(handle),
        })
    }

    /// Sends a command.
    pub fn send(&self, command: PlaybackCommand) -> Result<(), EngineError> {
        self.commands
            .send(command)
            .map_err(|_| EngineError::WorkerStopped)
    }

    /// Outbound message channel.
    pub fn messages(&self) -> &Receiver<PlaybackMessage> {
        &self.messages
    }

    /// Every message available right now.
    pub fn try_messages(&self) -> Vec<PlaybackMessage> {
        self.messages.try_iter().collect()
    }

    /// Stops playback, ends the thread and waits for it.
    pub fn shutdown(mut self) {
        self.stop_thread();
    }

    fn stop_thread(&mut self) {
        let _ = self.commands.send(PlaybackCommand::Shutdown);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("playback worker panicked");
        }
    }
}

impl Drop for PlaybackWorker {
    fn drop(&mut self) {
        self.stop_thread();
    }
}

fn run<C: Clock>(
    mut scheduler: Scheduler<C>,
    commands: &Receiver<PlaybackCommand>,
    messages: &Sender<PlaybackMessage>,
) {
    let ticker = crossbeam_channel::tick(scheduler.settings().interval);
    tracing::debug!("playback worker started");

    loop {
        let mut out = Vec::new();
        select! {
            recv(commands) -> command => match command {
                Ok(PlaybackCommand::Shutdown) | Err(_) => {
                    if scheduler.is_playing() {
                        out.extend(scheduler.stop());
                    }
                    send_all(messages, out);
                    break;
                }
                Ok(command) => out.extend(apply(&mut scheduler, command)),
            },
            recv(ticker) -> _ => {}
        }
        out.extend(scheduler.poll());
        if !send_all(messages, out) {
            break;
        }
    }
    tracing::debug!("playback worker stopped");
}

fn apply<C: Clock>(scheduler: &mut Scheduler<C>, command: PlaybackCommand) -> Vec<PlaybackMessage> {
    match command {
        PlaybackCommand::Play { start_tick } => {
            scheduler.play(start_tick);
            Vec::new()
        }
        PlaybackCommand::Stop => scheduler.stop(),
        PlaybackCommand::SetLoop(looping) => {
            scheduler.set_loop(looping);
            Vec::new()
        }
        PlaybackCommand::LoadEvents {
            events,
            duration_ticks,
        } => {
            scheduler.load_events(events, duration_ticks);
            Vec::new()
        }
        PlaybackCommand::Seek(tick) => scheduler.seek(tick),
        PlaybackCommand::SetTempo(tempo) => {
            scheduler.set_tempo(tempo);
            Vec::new()
        }
        PlaybackCommand::SetTempoMultiplier(multiplier) => {
            scheduler.set_tempo_multiplier(multiplier);
            Vec::new()
        }
        PlaybackCommand::Shutdown => Vec::new(),
    }
}

/// Returns `false` once the host has dropped its receiver.
fn send_all(messages: &Sender<PlaybackMessage>, out: Vec<PlaybackMessage>) -> bool {
    out.into_iter().all(|message| messages.send(message).is_ok())
}
