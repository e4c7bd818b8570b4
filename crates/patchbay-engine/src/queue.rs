//! Serial MIDI dispatch queue.
//!
//! Incoming MIDI is queued and drained by a single consumer, one item at a
//! time, in arrival order. The first drain of a burst satisfies the backend
//! prerequisite once before any delivery; cancelling is clearing the queue.

use std::collections::VecDeque;

use patchbay_core::{MidiEvent, NodeId, PortId};

use crate::error::DeviceError;

/// Where a queued event enters the graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueTarget {
    /// Routed out of an output port.
    Routed {
        /// Source node.
        node: NodeId,
        /// Source output port.
        port: PortId,
    },
    /// Delivered straight to one node's handler.
    Direct {
        /// Target node.
        node: NodeId,
        /// Input port the handler sees.
        port: PortId,
    },
}

/// One queued event.
#[derive(Clone, Debug, PartialEq)]
pub struct QueuedMidi {
    /// Entry point.
    pub target: QueueTarget,
    /// The event.
    pub event: MidiEvent,
    /// Host time of arrival in milliseconds.
    pub time_ms: f64,
}

/// FIFO of pending MIDI deliveries.
#[derive(Debug, Default)]
pub struct MidiDispatchQueue {
    items: VecDeque<QueuedMidi>,
}

impl MidiDispatchQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an item.
    pub fn push(&mut self, item: QueuedMidi) {
        self.items.push_back(item);
    }

    /// Drops every pending item, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.items.len();
        self.items.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "midi queue cleared");
        }
        dropped
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Delivers every pending item in order.
    ///
    /// `prepare` runs once before the first delivery and only if something is
    /// queued. If it fails, nothing is delivered and the items stay queued for
    /// the next drain. Returns the number of items delivered.
    pub fn drain<P, F>(&mut self, prepare: P, mut deliver: F) -> Result<usize, DeviceError>
    where
        P: FnOnce() -> Result<(), DeviceError>,
        F: FnMut(QueuedMidi),
    {
        if self.items.is_empty() {
            return Ok(0);
        }
        prepare()?;
        let mut delivered = 0;
        while let Some(item) = self.items.pop_front() {
            deliver(item);
            delivered += 1;
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchbay_core::MidiMessage;

    fn item(note: u8) -> QueuedMidi {
        QueuedMidi {
            target: QueueTarget::Routed {
                node: NodeId::from("kbd"),
                port: PortId::from("midi_out"),
            },
            event: MidiEvent::new(MidiMessage::note_on(0, note, 100)),
            time_ms: 0.0,
        }
    }

    #[test]
    fn drains_in_order_with_one_prepare() {
        let mut queue = MidiDispatchQueue::new();
        for note in [60, 64, 67] {
            queue.push(item(note));
        }
        let mut prepared = 0;
        let mut notes = Vec::new();
        let delivered = queue
            .drain(
                || {
                    prepared += 1;
                    Ok(())
                },
                |q| notes.push(q.event.message.note()),
            )
            .unwrap();
        assert_eq!(delivered, 3);
        assert_eq!(prepared, 1);
        assert_eq!(notes, vec![Some(60), Some(64), Some(67)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn empty_drain_skips_prepare() {
        let mut queue = MidiDispatchQueue::new();
        let mut prepared = false;
        let delivered = queue
            .drain(
                || {
                    prepared = true;
                    Ok(())
                },
                |_| {},
            )
            .unwrap();
        assert_eq!(delivered, 0);
        assert!(!prepared);
    }

    #[test]
    fn failed_prepare_keeps_items() {
        let mut queue = MidiDispatchQueue::new();
        queue.push(item(60));
        let result = queue.drain(|| Err(DeviceError::Unavailable("stopped".into())), |_| {});
        assert!(result.is_err());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn clear_cancels() {
        let mut queue = MidiDispatchQueue::new();
        queue.push(item(60));
        queue.push(item(62));
        assert_eq!(queue.clear(), 2);
        assert_eq!(queue.clear(), 0);
    }
}
