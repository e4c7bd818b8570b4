//! Voice pools and voice-index mappings.
//!
//! A [`VoiceAllocator`] owns a fixed pool of voices addressed by index. Nodes
//! between the allocator and a polyphonic consumer may renumber voices; each
//! such hop is described by a [`VoiceMap`], and a chain of hops by a
//! [`VoiceMapping`].
//!
//! Mappings translate a voice index in a *consumer's* address space into the
//! address space one hop further upstream. Composition is ordered list
//! concatenation, so it is associative by construction:
//!
//! ```rust
//! use patchbay_core::voice::{VoiceMap, VoiceMapping};
//!
//! let a = VoiceMapping::from(VoiceMap::Offset(1));
//! let b = VoiceMapping::from(VoiceMap::Table(vec![3, 2, 1, 0]));
//! let c = VoiceMapping::from(VoiceMap::Modulo(3));
//!
//! let left = a.clone().then(b.clone()).then(c.clone());
//! let right = a.then(b.then(c));
//! for i in 0..4 {
//!     assert_eq!(left.apply(i), right.apply(i));
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Default number of voices in a pool.
pub const DEFAULT_POOL_SIZE: usize = 8;

/// Largest pool [`VoiceAllocator`] will build; larger requests are clamped.
pub const MAX_POOL_SIZE: usize = 256;

/// One hop's voice renumbering.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VoiceMap {
    /// Index passes through unchanged.
    Identity,
    /// Index is shifted; results below zero are unmapped.
    Offset(i64),
    /// Index selects an entry; indices past the end are unmapped.
    Table(Vec<usize>),
    /// Index wraps into `0..n`; `n == 0` leaves every index unmapped.
    Modulo(usize),
}

impl VoiceMap {
    /// Maps one index.
    pub fn apply(&self, index: usize) -> Option<usize> {
        match self {
            Self::Identity => Some(index),
            Self::Offset(delta) => {
                let shifted = i64::try_from(index).ok()?.checked_add(*delta)?;
                usize::try_from(shifted).ok()
            }
            Self::Table(table) => table.get(index).copied(),
            Self::Modulo(n) => index.checked_rem(*n),
        }
    }

    /// Maps one index backwards: the smallest input that [`apply`](Self::apply)
    /// sends to `index`.
    pub fn unapply(&self, index: usize) -> Option<usize> {
        match self {
            Self::Identity => Some(index),
            Self::Offset(delta) => {
                let shifted = i64::try_from(index).ok()?.checked_sub(*delta)?;
                usize::try_from(shifted).ok()
            }
            Self::Table(table) => table.iter().position(|&entry| entry == index),
            Self::Modulo(n) => (index < *n).then_some(index),
        }
    }

    fn is_identity(&self) -> bool {
        matches!(self, Self::Identity | Self::Offset(0))
    }
}

/// A composed chain of [`VoiceMap`]s, applied first to last.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoiceMapping {
    steps: Vec<VoiceMap>,
}

impl VoiceMapping {
    /// The identity mapping.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Returns `true` if every index maps to itself.
    pub fn is_identity(&self) -> bool {
        self.steps.iter().all(VoiceMap::is_identity)
    }

    /// Returns a mapping that applies `self`, then `next`.
    pub fn then(mut self, next: VoiceMapping) -> Self {
        self.steps
            .extend(next.steps.into_iter().filter(|step| !step.is_identity()));
        self
    }

    /// Maps `index` through every step. `None` if any step leaves it
    /// unmapped.
    pub fn apply(&self, index: usize) -> Option<usize> {
        self.steps
            .iter()
            .try_fold(index, |current, step| step.apply(current))
    }

    /// Maps `index` from the far end back to the near end, undoing the
    /// steps last to first.
    pub fn unapply(&self, index: usize) -> Option<usize> {
        self.steps
            .iter()
            .rev()
            .try_fold(index, |current, step| step.unapply(current))
    }

    /// The individual hops.
    pub fn steps(&self) -> &[VoiceMap] {
        &self.steps
    }
}

impl From<VoiceMap> for VoiceMapping {
    fn from(step: VoiceMap) -> Self {
        Self::identity().then(Self { steps: vec![step] })
    }
}

/// Voice stealing policy when every voice is busy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AllocationMode {
    /// Cycle through voices in order.
    RoundRobin,
    /// Steal the voice that started earliest.
    #[default]
    OldestNote,
    /// Steal the lowest-pitched voice.
    LowestNote,
    /// Steal the highest-pitched voice.
    HighestNote,
}

/// What a pool voice is currently playing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VoiceSlot {
    /// Note held by the voice, if active.
    pub note: Option<u8>,
    /// Channel of the held note.
    pub channel: u8,
    /// Allocation order; larger is newer.
    pub age: u64,
}

impl VoiceSlot {
    /// Returns `true` if the voice holds a note.
    pub fn is_active(&self) -> bool {
        self.note.is_some()
    }
}

/// Result of [`VoiceAllocator::allocate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    /// Voice index now holding the note.
    pub voice: usize,
    /// Note that was cut off to make room, if any.
    pub stolen: Option<(u8, u8)>,
}

/// A fixed pool of polyphonic voices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoiceAllocator {
    voices: Vec<VoiceSlot>,
    mode: AllocationMode,
    age_counter: u64,
    round_robin_idx: usize,
}

impl Default for VoiceAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

impl VoiceAllocator {
    /// Creates a pool of `size` voices, clamped to `1..=MAX_POOL_SIZE`.
    pub fn new(size: usize) -> Self {
        Self {
            voices: vec![VoiceSlot::default(); size.clamp(1, MAX_POOL_SIZE)],
            mode: AllocationMode::default(),
            age_counter: 0,
            round_robin_idx: 0,
        }
    }

    /// Sets the stealing policy, returning the updated pool.
    pub fn with_mode(mut self, mode: AllocationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Stealing policy.
    pub fn mode(&self) -> AllocationMode {
        self.mode
    }

    /// Number of voices in the pool.
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Number of voices holding a note.
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// Returns a voice by index.
    pub fn voice(&self, index: usize) -> Option<&VoiceSlot> {
        self.voices.get(index)
    }

    /// Index of the voice holding `note` on `channel`.
    pub fn find(&self, note: u8, channel: u8) -> Option<usize> {
        self.voices
            .iter()
            .position(|v| v.note == Some(note) && v.channel == channel)
    }

    /// Assigns a voice to `note`.
    ///
    /// Re-striking a held note reuses its voice. Otherwise a free voice is
    /// taken, or one is stolen according to the pool's mode.
    pub fn allocate(&mut self, note: u8, channel: u8) -> Allocation {
        let (voice, stolen) = match self.find(note, channel) {
            Some(voice) => (voice, None),
            None => match self.voices.iter().position(|v| !v.is_active()) {
                Some(voice) => (voice, None),
                None => {
                    let voice = self.steal();
                    let slot = self.voices[voice];
                    (voice, slot.note.map(|n| (n, slot.channel)))
                }
            },
        };

        self.age_counter += 1;
        self.voices[voice] = VoiceSlot {
            note: Some(note),
            channel,
            age: self.age_counter,
        };
        Allocation { voice, stolen }
    }

    /// Frees the voice holding `note` on `channel`.
    pub fn release(&mut self, note: u8, channel: u8) -> Option<usize> {
        let voice = self.find(note, channel)?;
        self.voices[voice].note = None;
        Some(voice)
    }

    /// Frees every voice, returning the indices that were active.
    pub fn release_all(&mut self) -> Vec<usize> {
        let mut released = Vec::new();
        for (i, voice) in self.voices.iter_mut().enumerate() {
            if voice.note.take().is_some() {
                released.push(i);
            }
        }
        released
    }

    /// Changes the pool size, keeping every voice that still fits.
    ///
    /// Returns the indices of held voices that were cut off.
    pub fn resize(&mut self, size: usize) -> Vec<usize> {
        let size = size.clamp(1, MAX_POOL_SIZE);
        let cut = self
            .voices
            .iter()
            .enumerate()
            .skip(size)
            .filter(|(_, v)| v.is_active())
            .map(|(i, _)| i)
            .collect();
        self.voices.resize(size, VoiceSlot::default());
        self.round_robin_idx %= size;
        cut
    }

    fn steal(&mut self) -> usize {
        let voices = self.voices.iter().enumerate();
        let pick = match self.mode {
            AllocationMode::RoundRobin => None,
            AllocationMode::OldestNote => voices.min_by_key(|(_, v)| v.age),
            AllocationMode::LowestNote => voices.min_by_key(|(_, v)| v.note),
            AllocationMode::HighestNote => voices.max_by_key(|(_, v)| v.note),
        };
        match pick {
            Some((i, _)) => i,
            None => {
                let idx = self.round_robin_idx % self.voices.len();
                self.round_robin_idx = (idx + 1) % self.voices.len();
                idx
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_and_table_edges() {
        assert_eq!(VoiceMap::Offset(-2).apply(1), None);
        assert_eq!(VoiceMap::Offset(-2).apply(5), Some(3));
        assert_eq!(VoiceMap::Table(vec![4, 5]).apply(2), None);
        assert_eq!(VoiceMap::Modulo(0).apply(3), None);
        assert_eq!(VoiceMap::Modulo(4).apply(9), Some(1));
    }

    #[test]
    fn identity_steps_are_elided() {
        let mapping = VoiceMapping::identity()
            .then(VoiceMap::Identity.into())
            .then(VoiceMap::Offset(0).into());
        assert!(mapping.is_identity());
        assert!(mapping.steps().is_empty());
    }

    #[test]
    fn then_applies_in_order() {
        let mapping = VoiceMapping::from(VoiceMap::Offset(2)).then(VoiceMap::Table(vec![9, 8, 7, 6]).into());
        // 1 + 2 = 3, table[3] = 6
        assert_eq!(mapping.apply(1), Some(6));
        assert_eq!(mapping.apply(2), None);
    }

    #[test]
    fn unapply_inverts_permutations() {
        let mapping = VoiceMapping::from(VoiceMap::Table(vec![2, 0, 3, 1]))
            .then(VoiceMap::Offset(4).into());
        for i in 0..4 {
            let forward = mapping.apply(i).unwrap();
            assert_eq!(mapping.unapply(forward), Some(i));
        }
        assert_eq!(mapping.unapply(1), None);
    }

    #[test]
    fn allocates_free_voices_first() {
        let mut pool = VoiceAllocator::new(3);
        assert_eq!(pool.allocate(60, 0).voice, 0);
        assert_eq!(pool.allocate(62, 0).voice, 1);
        assert_eq!(pool.release(60, 0), Some(0));
        assert_eq!(pool.allocate(64, 0).voice, 0);
        assert_eq!(pool.active_count(), 2);
    }

    #[test]
    fn restrike_reuses_voice() {
        let mut pool = VoiceAllocator::new(2);
        pool.allocate(60, 0);
        let again = pool.allocate(60, 0);
        assert_eq!(again.voice, 0);
        assert_eq!(again.stolen, None);
        assert_eq!(pool.active_count(), 1);
    }

    #[test]
    fn steals_oldest_by_default() {
        let mut pool = VoiceAllocator::new(2);
        pool.allocate(60, 0);
        pool.allocate(62, 0);
        let third = pool.allocate(64, 0);
        assert_eq!(third.voice, 0);
        assert_eq!(third.stolen, Some((60, 0)));
        assert_eq!(pool.find(60, 0), None);
    }

    #[test]
    fn steals_by_pitch() {
        let mut low = VoiceAllocator::new(2).with_mode(AllocationMode::LowestNote);
        low.allocate(70, 0);
        low.allocate(50, 0);
        assert_eq!(low.allocate(60, 0).voice, 1);

        let mut high = VoiceAllocator::new(2).with_mode(AllocationMode::HighestNote);
        high.allocate(70, 0);
        high.allocate(50, 0);
        assert_eq!(high.allocate(60, 0).voice, 0);
    }

    #[test]
    fn round_robin_cycles() {
        let mut pool = VoiceAllocator::new(2).with_mode(AllocationMode::RoundRobin);
        pool.allocate(1, 0);
        pool.allocate(2, 0);
        assert_eq!(pool.allocate(3, 0).voice, 0);
        assert_eq!(pool.allocate(4, 0).voice, 1);
        assert_eq!(pool.allocate(5, 0).voice, 0);
    }

    #[test]
    fn release_all_reports_active() {
        let mut pool = VoiceAllocator::new(4);
        pool.allocate(60, 0);
        pool.allocate(61, 1);
        assert_eq!(pool.release_all(), vec![0, 1]);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.voice_count(), 4);
    }

    #[test]
    fn channels_are_distinct() {
        let mut pool = VoiceAllocator::new(4);
        pool.allocate(60, 0);
        pool.allocate(60, 1);
        assert_eq!(pool.active_count(), 2);
        assert_eq!(pool.release(60, 1), Some(1));
    }

    #[test]
    fn resize_keeps_voices_that_fit() {
        let mut pool = VoiceAllocator::new(4);
        for note in [60, 62, 64, 65] {
            pool.allocate(note, 0);
        }
        pool.release(62, 0);
        assert_eq!(pool.resize(2), vec![2, 3]);
        assert_eq!(pool.voice_count(), 2);
        assert_eq!(pool.voice(0).and_then(|v| v.note), Some(60));
        assert_eq!(pool.find(64, 0), None);

        assert!(pool.resize(6).is_empty());
        assert_eq!(pool.voice_count(), 6);
        assert_eq!(pool.active_count(), 1);
    }

    #[test]
    fn pool_size_is_bounded() {
        assert_eq!(VoiceAllocator::new(usize::MAX).voice_count(), MAX_POOL_SIZE);
        assert_eq!(VoiceAllocator::new(0).voice_count(), 1);
        let mut pool = VoiceAllocator::new(2);
        pool.resize(usize::MAX);
        assert_eq!(pool.voice_count(), MAX_POOL_SIZE);
    }
}
